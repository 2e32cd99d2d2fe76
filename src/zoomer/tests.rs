// src/zoomer/tests.rs

use super::*;
use std::thread;
use test_log::test;

fn field(x: f64, y: f64) -> u16 {
    ((x * 3.0).sin() * 100.0 + (y * 2.0).cos() * 100.0 + 300.0) as u16
}

fn fast_config(disable_workers: bool) -> ZoomerConfig {
    ZoomerConfig {
        frame_rate: 200.0,
        update_slice_ms: 1,
        update_idle_burst_ms: 20,
        wake_timeout_ms: 10_000,
        coef: 0.5,
        disable_workers,
        num_workers: 2,
        max_pooled_frames: 4,
    }
}

#[derive(Debug, Clone)]
struct Painted {
    frame_nr: u64,
    width: usize,
    height: usize,
    quality: f64,
    output: Vec<u8>,
}

#[derive(Default)]
struct Recorder {
    painted: Vec<Painted>,
    resized: Vec<(usize, usize)>,
    begun: usize,
    ended: usize,
    /// Radius multiplier applied at every generation; zero leaves the view.
    zoom: f64,
    palette: Vec<u32>,
}

impl ZoomerHooks for Recorder {
    fn on_resize(&mut self, _view: &mut ViewState, width: usize, height: usize) {
        self.resized.push((width, height));
    }

    fn on_begin_frame(&mut self, view: &mut ViewState, _previous: Option<&Viewport>) {
        self.begun += 1;
        if self.zoom > 0.0 {
            view.radius *= self.zoom;
        }
    }

    fn on_render_frame(&mut self, frame: &mut Frame) {
        if !self.palette.is_empty() {
            frame.set_palette(&self.palette).unwrap();
        }
    }

    fn on_end_frame(&mut self, _frame: &Frame) {
        self.ended += 1;
    }

    fn on_put_image_data(&mut self, frame: &Frame) {
        self.painted.push(Painted {
            frame_nr: frame.frame_nr,
            width: frame.view_width,
            height: frame.view_height,
            quality: frame.quality,
            output: frame.output.to_vec(),
        });
    }
}

type TestZoomer = Zoomer<fn(f64, f64) -> u16, Recorder>;

fn zoomer(width: usize, height: usize, config: ZoomerConfig) -> TestZoomer {
    Zoomer::new(width, height, config, field as fn(f64, f64) -> u16, Recorder::default()).unwrap()
}

fn run_until(zoomer: &mut TestZoomer, done: impl Fn(&TestZoomer) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done(zoomer) {
        assert!(Instant::now() < deadline, "condition not reached in time");
        match zoomer.step() {
            StepOutcome::Continue => {}
            StepOutcome::Idle(delay) => thread::sleep(delay.min(Duration::from_millis(1))),
            StepOutcome::Stopped => panic!("zoomer stopped unexpectedly"),
        }
    }
}

fn painted(zoomer: &TestZoomer) -> usize {
    zoomer.hooks().painted.len()
}

#[test]
fn rejects_bad_setup() {
    let result = Zoomer::new(1, 4, fast_config(true), field, Recorder::default());
    assert!(matches!(
        result,
        Err(ZoomerError::InvalidDimensions { width: 1, height: 4 })
    ));

    let config = ZoomerConfig {
        frame_rate: 0.0,
        ..fast_config(true)
    };
    let result = Zoomer::new(8, 6, config, field, Recorder::default());
    assert!(matches!(result, Err(ZoomerError::InvalidConfig(_))));
}

#[test]
fn stopped_zoomer_does_no_work() {
    let mut z = zoomer(8, 6, fast_config(true));
    assert_eq!(z.state(), ZoomerState::Stop);
    assert_eq!(z.step(), StepOutcome::Stopped);
    assert!(!z.reached_limits());
    assert_eq!(z.hooks().begun, 0);
}

#[test]
fn inline_pipeline_paints_in_order() {
    let mut z = zoomer(8, 6, fast_config(true));
    z.start();
    run_until(&mut z, |z| painted(z) >= 3);

    let hooks = z.hooks();
    assert_eq!(hooks.painted[0].frame_nr, 1);
    // The first generation is filled from scratch.
    assert_eq!(hooks.painted[0].quality, 1.0);
    for w in hooks.painted.windows(2) {
        assert!(w[0].frame_nr < w[1].frame_nr);
    }
    for p in &hooks.painted {
        assert_eq!((p.width, p.height), (8, 6));
        assert_eq!(p.output.len(), 8 * 6 * 4);
    }
    assert_eq!(hooks.ended, hooks.painted.len());
    assert_eq!(z.live_workers(), 0);
    assert!(z.stats().inline_renders >= 3);
    assert_eq!(z.stats().worker_renders, 0);
    assert_eq!(z.stats().frames_painted, 3);
}

#[test]
fn worker_pipeline_paints_in_order() {
    let mut z = zoomer(8, 6, fast_config(false));
    assert_eq!(z.live_workers(), 2);
    z.start();
    run_until(&mut z, |z| painted(z) >= 4);

    let hooks = z.hooks();
    for w in hooks.painted.windows(2) {
        assert!(w[0].frame_nr < w[1].frame_nr);
    }
    assert!(z.stats().worker_renders >= 1);
    assert!(z.stats().avg_round_trip_ms > 0.0);
}

#[test]
fn zooming_refines_to_full_quality() {
    let mut z = zoomer(8, 6, fast_config(true));
    z.hooks_mut().zoom = 0.8;
    z.start();
    run_until(&mut z, |z| painted(z) >= 5);

    // Inheritance leaves gaps that UPDATE closes well within the budget of
    // a view this small.
    let last = z.hooks().painted.last().cloned().unwrap();
    assert_eq!(last.quality, 1.0);
    assert!(z.view().radius < 0.8f64.powi(4));
    assert!(z.stats().avg_pixels_per_frame > 0.0);
}

#[test]
fn palette_set_in_render_hook_is_applied() {
    let mut z = Zoomer::new(
        4,
        4,
        fast_config(true),
        |_: f64, _: f64| 1u16,
        Recorder {
            palette: vec![0, 0x1122_3344],
            ..Default::default()
        },
    )
    .unwrap();
    z.start();
    let deadline = Instant::now() + Duration::from_secs(10);
    while z.hooks().painted.is_empty() {
        assert!(Instant::now() < deadline);
        if let StepOutcome::Idle(d) = z.step() {
            thread::sleep(d.min(Duration::from_millis(1)));
        }
    }
    for px in z.hooks().painted[0].output.chunks_exact(4) {
        assert_eq!(px, &[0x44, 0x33, 0x22, 0x11]);
    }
}

#[test]
fn stop_discards_frames_in_flight() {
    let mut z = zoomer(8, 6, fast_config(false));
    z.start();
    run_until(&mut z, |z| painted(z) >= 1 && z.in_flight() == 1);

    let generation = z.generation;
    let painted_before = painted(&z);
    z.stop();
    assert_eq!(z.step(), StepOutcome::Stopped);
    // Let the worker finish; its result must not be painted.
    thread::sleep(Duration::from_millis(20));

    z.start();
    run_until(&mut z, |z| painted(z) >= painted_before + 2);
    assert!(z.stats().frames_dropped >= 1);
    for p in &z.hooks().painted[painted_before..] {
        assert!(
            p.frame_nr >= generation,
            "frame {} from before the stop was painted",
            p.frame_nr
        );
    }
}

#[test]
fn resize_rebuilds_viewports() {
    let mut z = zoomer(8, 6, fast_config(true));
    z.start();
    run_until(&mut z, |z| painted(z) >= 1);

    assert!(matches!(
        z.resize(1, 1),
        Err(ZoomerError::InvalidDimensions { .. })
    ));
    z.resize(12, 9).unwrap();
    run_until(&mut z, |z| {
        z.hooks()
            .painted
            .last()
            .is_some_and(|p| (p.width, p.height) == (12, 9))
    });

    assert_eq!(z.hooks().resized, vec![(12, 9)]);
    assert_eq!(z.current_viewport().view_width, 12);
    assert_eq!(z.current_viewport().view_height, 9);
    let last = z.hooks().painted.last().unwrap();
    assert_eq!(last.output.len(), 12 * 9 * 4);
    assert!(z.frame_pool().free_count() <= 4);
}

#[test]
fn set_config_switches_to_inline_rendering() {
    let mut z = zoomer(8, 6, fast_config(false));
    z.start();
    run_until(&mut z, |z| painted(z) >= 1);

    let bad = ZoomerConfig {
        coef: 0.0,
        ..fast_config(true)
    };
    assert!(z.set_config(bad).is_err());
    assert!(!z.config().disable_workers);

    z.set_config(fast_config(true)).unwrap();
    let inline_before = z.stats().inline_renders;
    run_until(&mut z, |z| z.stats().inline_renders > inline_before + 1);
    assert_eq!(z.live_workers(), 0);
}

#[test]
fn idles_between_frames() {
    let config = ZoomerConfig {
        frame_rate: 10.0,
        ..fast_config(true)
    };
    let mut z = zoomer(4, 4, config);
    z.start();
    let deadline = Instant::now() + Duration::from_secs(10);
    let delay = loop {
        assert!(Instant::now() < deadline, "never idled");
        if let StepOutcome::Idle(delay) = z.step() {
            break delay;
        }
    };
    assert!(delay > Duration::ZERO);
    assert!(delay <= Duration::from_millis(100));
    assert_eq!(z.state(), ZoomerState::Copy);
}

#[test]
fn reached_limits_tracks_current_view() {
    let mut z = zoomer(8, 6, fast_config(true));
    z.start();
    run_until(&mut z, |z| painted(z) >= 1);
    assert!(!z.reached_limits());

    z.set_position(1.0, 0.5, 1e-17, 0.0);
    let generation = z.generation;
    run_until(&mut z, |z| z.generation > generation);
    assert!(z.reached_limits());
}

#[test]
fn screen_to_logical_follows_view() {
    let mut z = zoomer(8, 6, fast_config(true));
    z.set_position(2.0, -1.0, 5.0, 0.0);
    z.start();
    run_until(&mut z, |z| painted(z) >= 1);

    // One cell is one logical unit here; pixel (4, 3) sits half a cell right
    // of and below the view centre.
    let (x, y) = z.screen_to_logical(4.0, 3.0);
    assert!((x - 2.5).abs() < 1e-9, "x = {}", x);
    assert!((y + 0.5).abs() < 1e-9, "y = {}", y);
}

fn assert_near(actual: Instant, expected: Instant) {
    let diff = if actual > expected {
        actual - expected
    } else {
        expected - actual
    };
    assert!(diff < Duration::from_micros(1), "off by {:?}", diff);
}

fn budget_config() -> ZoomerConfig {
    ZoomerConfig {
        frame_rate: 50.0,
        update_slice_ms: 1,
        update_idle_burst_ms: 200,
        wake_timeout_ms: 100,
        ..fast_config(true)
    }
}

#[test]
fn deadline_subtracts_copy_and_paint_from_period() {
    let mut z = zoomer(8, 6, budget_config());
    z.stats.avg_copy_ms = 3.0;
    z.stats.avg_paint_ms = 2.0;
    let frame_start = Instant::now();
    z.last_moved = frame_start;

    let deadline = z.compute_deadline(frame_start, frame_start);
    assert_near(deadline, frame_start + Duration::from_millis(15));
}

#[test]
fn saturated_budget_still_gets_one_slice() {
    let mut z = zoomer(8, 6, budget_config());
    z.stats.avg_copy_ms = 30.0;
    z.stats.avg_paint_ms = 5.0;
    let frame_start = Instant::now();
    z.last_moved = frame_start;

    let now = frame_start + Duration::from_millis(4);
    let deadline = z.compute_deadline(frame_start, now);
    assert_near(deadline, now + Duration::from_millis(1));
}

#[test]
fn stationary_view_gets_idle_burst() {
    let mut z = zoomer(8, 6, budget_config());
    z.stats.avg_copy_ms = 3.0;
    z.stats.avg_paint_ms = 2.0;
    let moved = Instant::now();
    z.last_moved = moved;

    // Still within the wake timeout: the normal budget applies.
    let frame_start = moved + Duration::from_millis(50);
    assert_near(
        z.compute_deadline(frame_start, frame_start),
        frame_start + Duration::from_millis(15),
    );

    let frame_start = moved + Duration::from_millis(150);
    assert_near(
        z.compute_deadline(frame_start, frame_start),
        frame_start + Duration::from_millis(200),
    );
}

#[test]
fn overshoot_is_recorded() {
    let mut z = zoomer(8, 6, fast_config(true));
    z.start();
    run_until(&mut z, |z| z.state() == ZoomerState::Update);
    assert_eq!(z.stats().avg_overshoot_ms, 0.0);

    z.deadline = Instant::now();
    thread::sleep(Duration::from_millis(10));
    assert_eq!(z.step(), StepOutcome::Continue);

    assert_eq!(z.state(), ZoomerState::Copy);
    // coef 0.5 of an overshoot of at least 10ms.
    assert!(
        z.stats().avg_overshoot_ms >= 5.0,
        "overshoot {}",
        z.stats().avg_overshoot_ms
    );
}

#[test]
fn invalid_positions_are_ignored() {
    let mut z = zoomer(8, 6, fast_config(true));
    z.set_position(1.0, 2.0, 3.0, 45.0);
    let view = z.view();

    z.set_position(0.0, 0.0, 0.0, 0.0);
    z.set_position(0.0, 0.0, -1.0, 0.0);
    z.set_position(0.0, 0.0, f64::NAN, 0.0);
    z.set_position(f64::INFINITY, 0.0, 1.0, 0.0);
    assert_eq!(z.view(), view);
}

#[test]
fn invalid_radius_from_begin_frame_hook_is_reverted() {
    struct Collapse {
        painted: Vec<f64>,
    }
    impl ZoomerHooks for Collapse {
        fn on_begin_frame(&mut self, view: &mut ViewState, _previous: Option<&Viewport>) {
            view.radius = if self.painted.len() % 2 == 0 { 0.0 } else { f64::NAN };
        }
        fn on_put_image_data(&mut self, frame: &Frame) {
            self.painted.push(frame.quality);
        }
    }

    let hooks = Collapse {
        painted: Vec::new(),
    };
    let mut z = Zoomer::new(8, 6, fast_config(true), field, hooks).unwrap();
    z.set_position(0.5, 0.5, 2.0, 0.0);
    z.start();
    let deadline = Instant::now() + Duration::from_secs(10);
    while z.hooks().painted.len() < 4 {
        assert!(Instant::now() < deadline, "never painted");
        if let StepOutcome::Idle(d) = z.step() {
            thread::sleep(d.min(Duration::from_millis(1)));
        }
    }

    assert_eq!(z.view().radius, 2.0);
    let viewport = z.current_viewport();
    for w in viewport.x_ruler.coord.windows(2) {
        assert!(w[0] < w[1]);
    }
    assert!(z.hooks().painted.iter().all(|&q| q == 1.0));
}

#[test]
fn pending_resize_keeps_frames_in_flight() {
    let mut z = zoomer(8, 6, fast_config(false));
    z.start();
    run_until(&mut z, |z| {
        painted(z) >= 1 && z.in_flight() == 1 && z.state() == ZoomerState::Update
    });
    let painted_before = painted(&z);
    let dropped_before = z.stats().frames_dropped;

    z.resize(12, 9).unwrap();
    // Let the worker finish the frame it holds at the old size.
    thread::sleep(Duration::from_millis(20));
    run_until(&mut z, |z| painted(z) > painted_before);

    let last = z.hooks().painted.last().unwrap();
    assert_eq!((last.width, last.height), (8, 6));
    assert_eq!(z.stats().frames_dropped, dropped_before);
}
