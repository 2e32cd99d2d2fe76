// src/main.rs
//! Headless driver: zooms into the Mandelbrot set until floating point runs
//! out of resolution, logging pipeline statistics along the way.
//!
//! Configuration is read from the JSON file named by `ZOOMER_CONFIG`, if set.

use anyhow::Context;
use log::{debug, info, warn};
use std::thread;
use std::time::{Duration, Instant};
use zoomer::{Frame, StepOutcome, ViewState, Viewport, Zoomer, ZoomerConfig, ZoomerHooks};

const VIEW_WIDTH: usize = 320;
const VIEW_HEIGHT: usize = 240;
const MAX_ITERATIONS: u16 = 255;
/// Seahorse valley.
const TARGET_X: f64 = -0.743_643_887_037_151;
const TARGET_Y: f64 = 0.131_825_904_205_330;
const ZOOM_PER_FRAME: f64 = 0.97;
const ROTATION_PER_FRAME: f64 = 0.25;
const MAX_FRAMES: u64 = 2000;
const STATS_EVERY: u64 = 50;

fn mandelbrot(cx: f64, cy: f64) -> u16 {
    let (mut x, mut y) = (0.0f64, 0.0f64);
    for i in 0..MAX_ITERATIONS {
        let (x2, y2) = (x * x, y * y);
        if x2 + y2 > 4.0 {
            return i;
        }
        y = 2.0 * x * y + cy;
        x = x2 - y2 + cx;
    }
    MAX_ITERATIONS
}

/// Cyclic gradient with the interior in black.
fn build_palette() -> Vec<u32> {
    let mut palette: Vec<u32> = (0..MAX_ITERATIONS as u32)
        .map(|i| {
            let t = i as f64 / 32.0 * std::f64::consts::TAU;
            let channel = |phase: f64| ((0.5 + 0.5 * (t + phase).cos()) * 255.0) as u32;
            let (r, g, b) = (channel(0.0), channel(2.1), channel(4.2));
            0xff00_0000 | (b << 16) | (g << 8) | r
        })
        .collect();
    palette.push(0xff00_0000);
    palette
}

struct HeadlessSink {
    palette: Vec<u32>,
    painted: u64,
    /// Running checksum over every presented pixel, so the output is used.
    checksum: u64,
}

impl ZoomerHooks for HeadlessSink {
    fn on_begin_frame(&mut self, view: &mut ViewState, _previous: Option<&Viewport>) {
        view.radius *= ZOOM_PER_FRAME;
        view.angle = (view.angle + ROTATION_PER_FRAME) % 360.0;
    }

    fn on_render_frame(&mut self, frame: &mut Frame) {
        if let Err(e) = frame.set_palette(&self.palette) {
            warn!("HeadlessSink: {}; rendering direct colour", e);
        }
    }

    fn on_put_image_data(&mut self, frame: &Frame) {
        self.painted += 1;
        self.checksum = frame.output.iter().fold(self.checksum, |acc, &b| {
            acc.wrapping_mul(31).wrapping_add(b as u64)
        });
    }
}

fn load_config() -> anyhow::Result<ZoomerConfig> {
    match std::env::var_os("ZOOMER_CONFIG") {
        Some(path) => {
            let config = ZoomerConfig::load(&path)
                .with_context(|| format!("Failed to load config from {:?}", path))?;
            info!("Loaded configuration from {:?}", path);
            Ok(config)
        }
        None => {
            info!("ZOOMER_CONFIG not set, using default configuration");
            Ok(ZoomerConfig::default())
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    info!("Starting zoomer...");
    let config = load_config()?;
    debug!("Configuration: {:?}", config);

    let sink = HeadlessSink {
        palette: build_palette(),
        painted: 0,
        checksum: 0,
    };
    let mut zoomer = Zoomer::new(VIEW_WIDTH, VIEW_HEIGHT, config, mandelbrot, sink)
        .context("Failed to create zoomer")?;
    zoomer.set_position(TARGET_X, TARGET_Y, 2.0, 0.0);
    zoomer.start();

    let started = Instant::now();
    let mut last_reported = 0;
    loop {
        match zoomer.step() {
            StepOutcome::Continue => {}
            StepOutcome::Idle(delay) => thread::sleep(delay),
            StepOutcome::Stopped => break,
        }

        let painted = zoomer.hooks().painted;
        if painted >= last_reported + STATS_EVERY {
            last_reported = painted;
            let stats = serde_json::to_string(zoomer.stats())
                .context("Failed to serialize statistics")?;
            info!("Frame {} radius {:e}: {}", painted, zoomer.view().radius, stats);
        }

        if zoomer.reached_limits() {
            info!("Reached floating point limits at radius {:e}", zoomer.view().radius);
            break;
        }
        if painted >= MAX_FRAMES {
            info!("Frame limit reached");
            break;
        }
    }
    zoomer.stop();

    let elapsed = started.elapsed().max(Duration::from_millis(1));
    let sink = zoomer.hooks();
    info!(
        "Painted {} frames in {:.2?} ({:.1} fps), checksum {:016x}",
        sink.painted,
        elapsed,
        sink.painted as f64 / elapsed.as_secs_f64(),
        sink.checksum
    );
    info!(
        "Final statistics: {}",
        serde_json::to_string_pretty(zoomer.stats()).context("Failed to serialize statistics")?
    );
    Ok(())
}
