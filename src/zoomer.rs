// src/zoomer.rs
//! Zoomer - cooperative scheduler that keeps a progressively refined view of
//! a scalar field on screen.
//!
//! The host drives it by calling `step()` repeatedly. Each call performs one
//! bounded piece of work and returns, so the host event loop stays
//! responsive. A generation runs through:
//!
//! - COPY: acquire a `Frame`, inherit the previous viewport's samples into
//!   it, and hand the previous (finished) frame to a render worker.
//! - UPDATE: refine the worst rows and columns until the generation's
//!   deadline, collecting rendered frames from workers as they arrive.
//! - RENDER: extract the output inline when no worker took the frame.
//! - PAINT: present the output through `ZoomerHooks::on_put_image_data` and
//!   return the frame to the pool.
//!
//! Ownership model:
//! - The control loop owns both viewports, the frame pool and the worker
//!   pool. Workers only ever hold a frame between dispatch and collect.
//! - Stopping bumps an epoch; frames that come back from workers tagged with
//!   an older epoch are recycled without being painted.

pub mod stats;

pub use stats::ZoomerStats;

use crate::config::ZoomerConfig;
use crate::error::{Result, ZoomerError};
use crate::frame::{Frame, FramePool};
use crate::renderer::render_frame;
use crate::renderer::worker::RenderWorkerPool;
use crate::viewport::{UpdateResult, Viewport};
use log::*;
use std::time::{Duration, Instant};

/// Scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomerState {
    Stop,
    Copy,
    Update,
    Render,
    Paint,
}

/// What the driver should do after a `step()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// More work is ready; call `step()` again.
    Continue,
    /// Nothing to do until the next frame slot; call again after the delay.
    Idle(Duration),
    /// The zoomer is stopped.
    Stopped,
}

/// Authoritative position of the view in field coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    pub center_x: f64,
    pub center_y: f64,
    /// Half the logical span of the square sample buffer.
    pub radius: f64,
    /// Rotation in degrees.
    pub angle: f64,
}

impl ViewState {
    /// Finite coordinates and a strictly positive radius; anything else
    /// cannot be laid out as an increasing ruler.
    pub fn is_valid(&self) -> bool {
        self.center_x.is_finite()
            && self.center_y.is_finite()
            && self.angle.is_finite()
            && self.radius.is_finite()
            && self.radius > 0.0
    }
}

impl Default for ViewState {
    fn default() -> Self {
        ViewState {
            center_x: 0.0,
            center_y: 0.0,
            radius: 1.0,
            angle: 0.0,
        }
    }
}

/// Integration points called by the scheduler. Only `on_put_image_data` is
/// required.
pub trait ZoomerHooks {
    /// The view dimensions changed. Called before the first generation at the
    /// new size.
    fn on_resize(&mut self, _view: &mut ViewState, _width: usize, _height: usize) {}

    /// A new generation is starting. `previous` is the viewport it will
    /// inherit from, if any. Adjust `view` to move, zoom or rotate.
    fn on_begin_frame(&mut self, _view: &mut ViewState, _previous: Option<&Viewport>) {}

    /// A finished frame is about to be rendered. Set its palette here.
    fn on_render_frame(&mut self, _frame: &mut Frame) {}

    /// A frame has been painted.
    fn on_end_frame(&mut self, _frame: &Frame) {}

    /// Present `frame.output` (RGBA, `view_width * view_height * 4` bytes).
    fn on_put_image_data(&mut self, frame: &Frame);
}

pub struct Zoomer<F, H>
where
    F: Fn(f64, f64) -> u16,
    H: ZoomerHooks,
{
    config: ZoomerConfig,
    sample: F,
    hooks: H,
    state: ZoomerState,
    view: ViewState,

    /// Requested view dimensions; viewports are rebuilt on the next COPY when
    /// they differ.
    view_width: usize,
    view_height: usize,

    /// Alternating by generation parity; the current one is
    /// `viewports[generation % 2]`.
    viewports: [Viewport; 2],
    generation: u64,

    pool: FramePool,
    workers: Option<RenderWorkerPool>,
    workers_dirty: bool,
    epoch: u64,

    /// Frame waiting for RENDER or PAINT.
    pending: Option<Frame>,
    /// State PAINT returns to.
    resume: ZoomerState,
    last_painted: Option<u64>,
    last_paint_at: Option<Instant>,

    frame_start: Option<Instant>,
    deadline: Instant,
    last_moved: Instant,

    stats: ZoomerStats,
}

fn spawn_workers(config: &ZoomerConfig) -> Result<Option<RenderWorkerPool>> {
    if config.disable_workers {
        info!("Zoomer: Render workers disabled, rendering inline");
        return Ok(None);
    }
    RenderWorkerPool::spawn(config.num_workers).map(Some)
}

/// Splits the viewport pair into `(current, previous)`.
fn split_viewports(viewports: &mut [Viewport; 2], current: usize) -> (&mut Viewport, &Viewport) {
    let (first, second) = viewports.split_at_mut(1);
    if current == 0 {
        (&mut first[0], &second[0])
    } else {
        (&mut second[0], &first[0])
    }
}

impl<F, H> Zoomer<F, H>
where
    F: Fn(f64, f64) -> u16,
    H: ZoomerHooks,
{
    /// Builds a stopped zoomer for a `width` x `height` view.
    pub fn new(
        width: usize,
        height: usize,
        config: ZoomerConfig,
        sample: F,
        hooks: H,
    ) -> Result<Self> {
        config.validate()?;
        let viewports = [Viewport::new(width, height)?, Viewport::new(width, height)?];
        let workers = spawn_workers(&config)?;
        let now = Instant::now();

        info!(
            "Zoomer: Created {}x{} view (diameter {})",
            width, height, viewports[0].diameter
        );

        Ok(Zoomer {
            pool: FramePool::new(config.max_pooled_frames),
            config,
            sample,
            hooks,
            state: ZoomerState::Stop,
            view: ViewState::default(),
            view_width: width,
            view_height: height,
            viewports,
            generation: 0,
            workers,
            workers_dirty: false,
            epoch: 0,
            pending: None,
            resume: ZoomerState::Update,
            last_painted: None,
            last_paint_at: None,
            frame_start: None,
            deadline: now,
            last_moved: now,
            stats: ZoomerStats::default(),
        })
    }

    pub fn start(&mut self) {
        if self.state == ZoomerState::Stop {
            info!("Zoomer: Starting");
            self.state = ZoomerState::Copy;
        }
    }

    /// Stops scheduling immediately. Renders in flight are left to finish
    /// and are discarded when they come back.
    pub fn stop(&mut self) {
        if self.state == ZoomerState::Stop {
            return;
        }
        info!("Zoomer: Stopping in state {:?}", self.state);
        self.state = ZoomerState::Stop;
        self.epoch += 1;
        if let Some(frame) = self.pending.take() {
            self.pool.release(frame);
        }
    }

    pub fn is_running(&self) -> bool {
        self.state != ZoomerState::Stop
    }

    pub fn state(&self) -> ZoomerState {
        self.state
    }

    /// Requests new view dimensions, applied at the start of the next
    /// generation.
    pub fn resize(&mut self, width: usize, height: usize) -> Result<()> {
        if width < 2 || height < 2 {
            return Err(ZoomerError::InvalidDimensions { width, height });
        }
        if (width, height) != (self.view_width, self.view_height) {
            debug!("Zoomer: Resize to {}x{} requested", width, height);
            self.view_width = width;
            self.view_height = height;
        }
        Ok(())
    }

    pub fn view(&self) -> ViewState {
        self.view
    }

    /// Moves the view. Takes effect at the start of the next generation.
    /// Non-finite positions and non-positive radii are ignored.
    pub fn set_position(&mut self, center_x: f64, center_y: f64, radius: f64, angle: f64) {
        let view = ViewState {
            center_x,
            center_y,
            radius,
            angle,
        };
        if !view.is_valid() {
            warn!("Zoomer: Ignoring invalid position {:?}", view);
            return;
        }
        if view != self.view {
            self.view = view;
            self.last_moved = Instant::now();
        }
    }

    pub fn config(&self) -> &ZoomerConfig {
        &self.config
    }

    /// Replaces the configuration. Worker changes apply on the next COPY.
    pub fn set_config(&mut self, config: ZoomerConfig) -> Result<()> {
        config.validate()?;
        if config.disable_workers != self.config.disable_workers
            || config.num_workers != self.config.num_workers
        {
            self.workers_dirty = true;
        }
        self.pool.set_max_frames(config.max_pooled_frames);
        self.config = config;
        Ok(())
    }

    pub fn stats(&self) -> &ZoomerStats {
        &self.stats
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    pub fn frame_pool(&self) -> &FramePool {
        &self.pool
    }

    /// Live render workers; zero when rendering inline.
    pub fn live_workers(&self) -> usize {
        self.workers.as_ref().map_or(0, |w| w.live_workers())
    }

    /// Frames currently held by render workers.
    pub fn in_flight(&self) -> usize {
        self.workers.as_ref().map_or(0, |w| w.in_flight())
    }

    fn current_index(&self) -> usize {
        (self.generation % 2) as usize
    }

    /// The viewport being refined (or most recently refined).
    pub fn current_viewport(&self) -> &Viewport {
        &self.viewports[self.current_index()]
    }

    /// Field coordinate under an on-screen pixel of the current view.
    pub fn screen_to_logical(&self, px: f64, py: f64) -> (f64, f64) {
        self.current_viewport()
            .screen_to_logical(px, py, self.view.angle)
    }

    /// True once zooming further cannot add resolution.
    pub fn reached_limits(&self) -> bool {
        let viewport = self.current_viewport();
        viewport.has_frame() && viewport.reached_limits()
    }

    /// Performs one unit of work.
    pub fn step(&mut self) -> StepOutcome {
        trace!("Zoomer: Step in state {:?}", self.state);
        match self.state {
            ZoomerState::Stop => StepOutcome::Stopped,
            ZoomerState::Copy => match self.copy() {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Zoomer: Failed to start generation: {}", e);
                    self.stop();
                    StepOutcome::Stopped
                }
            },
            ZoomerState::Update => self.update(),
            ZoomerState::Render => self.render(),
            ZoomerState::Paint => self.paint(),
        }
    }

    fn copy(&mut self) -> Result<StepOutcome> {
        let now = Instant::now();
        if let Some(started) = self.frame_start {
            let next = started + self.config.frame_period();
            if now < next {
                if self.poll_workers() {
                    return Ok(StepOutcome::Continue);
                }
                return Ok(StepOutcome::Idle(next - now));
            }
        }

        if self.workers_dirty {
            self.rebuild_workers();
        }

        self.generation += 1;
        self.stats.generations += 1;
        self.frame_start = Some(now);
        let (width, height) = (self.view_width, self.view_height);
        let cur = self.current_index();
        let prev = 1 - cur;

        if let Some(stale) = self.viewports[cur].take_frame() {
            self.pool.release(stale);
        }
        let before = self.view;
        if !self.viewports[cur].matches(width, height) {
            info!("Zoomer: Rebuilding viewports for {}x{}", width, height);
            self.viewports[cur] = Viewport::new(width, height)?;
            self.pool.purge_mismatched(width, height);
            self.hooks.on_resize(&mut self.view, width, height);
        }

        let previous = &self.viewports[prev];
        self.hooks
            .on_begin_frame(&mut self.view, previous.has_frame().then_some(previous));
        if !self.view.is_valid() {
            warn!(
                "Zoomer: Ignoring invalid position {:?} set by hooks",
                self.view
            );
            self.view = before;
        }
        if self.view != before {
            self.last_moved = now;
        }

        let view = self.view;
        let frame = self
            .pool
            .acquire(width, height, self.generation, view.angle)?;
        let (current, previous) = split_viewports(&mut self.viewports, cur);
        if previous.has_frame() {
            current.set_position(frame, view.center_x, view.center_y, view.radius, previous);
        } else {
            debug!("Zoomer: Nothing to inherit, filling frame {}", self.generation);
            current.fill(frame, view.center_x, view.center_y, view.radius, &self.sample);
        }
        if let Some(frame) = current.frame_mut() {
            frame.time_copy = now.elapsed();
        }

        self.deadline = self.compute_deadline(now, Instant::now());

        // The previous viewport's frame is final now; send it off for
        // extraction.
        let finished = self.viewports[prev].take_frame();
        if !self.viewports[prev].matches(width, height) {
            self.viewports[prev] = Viewport::new(width, height)?;
        }
        let Some(mut finished) = finished else {
            self.state = ZoomerState::Update;
            return Ok(StepOutcome::Continue);
        };
        if !finished.matches(width, height) {
            debug!(
                "Zoomer: Discarding frame {} rendered for the old size",
                finished.frame_nr
            );
            self.state = ZoomerState::Update;
            return Ok(StepOutcome::Continue);
        }

        self.hooks.on_render_frame(&mut finished);
        if let Some(workers) = self.workers.as_mut() {
            match workers.try_dispatch(finished, self.epoch) {
                Ok(()) => {
                    self.stats.worker_renders += 1;
                    self.state = ZoomerState::Update;
                    return Ok(StepOutcome::Continue);
                }
                Err(frame) => {
                    trace!("Zoomer: No idle worker, rendering frame {} inline", frame.frame_nr);
                    finished = frame;
                }
            }
        }
        self.pending = Some(finished);
        self.resume = ZoomerState::Update;
        self.state = ZoomerState::Render;
        Ok(StepOutcome::Continue)
    }

    /// `frame_start + period - avg copy - avg paint`, never closer than one
    /// update slice, stretched to the idle burst once the view has been still
    /// for the wake timeout.
    fn compute_deadline(&self, frame_start: Instant, now: Instant) -> Instant {
        let budget = self
            .config
            .frame_period()
            .saturating_sub(self.stats.copy_duration() + self.stats.paint_duration());
        let mut deadline = frame_start + budget;
        let min = now + self.config.update_slice();
        if deadline < min {
            deadline = min;
        }
        if frame_start.saturating_duration_since(self.last_moved) > self.config.wake_timeout() {
            deadline = deadline.max(frame_start + self.config.update_idle_burst());
        }
        deadline
    }

    fn update(&mut self) -> StepOutcome {
        if self.poll_workers() {
            return StepOutcome::Continue;
        }

        let start = Instant::now();
        if start >= self.deadline {
            self.finish_update(start.duration_since(self.deadline));
            return StepOutcome::Continue;
        }

        let slice_end = (start + self.config.update_slice()).min(self.deadline);
        let cur = self.current_index();
        let viewport = &mut self.viewports[cur];
        let mut lines = 0usize;
        let mut complete = false;
        loop {
            match viewport.update_lines(&self.sample) {
                UpdateResult::Refined { .. } => lines += 1,
                UpdateResult::Complete => {
                    complete = true;
                    break;
                }
            }
            if Instant::now() >= slice_end {
                break;
            }
        }
        if let Some(frame) = viewport.frame_mut() {
            frame.time_update += start.elapsed();
        }
        trace!("Zoomer: Refined {} lines", lines);

        if complete {
            self.finish_update(Duration::ZERO);
        }
        StepOutcome::Continue
    }

    fn finish_update(&mut self, overshoot: Duration) {
        let coef = self.config.coef;
        if let Some(frame) = self.viewports[self.current_index()].frame() {
            trace!(
                "Zoomer: Frame {} leaves UPDATE at quality {:.3}",
                frame.frame_nr,
                frame.quality
            );
            self.stats.record_update(coef, frame.time_update, overshoot);
        }
        self.state = ZoomerState::Copy;
    }

    fn render(&mut self) -> StepOutcome {
        if let Some(frame) = self.pending.as_mut() {
            render_frame(frame);
            self.stats.inline_renders += 1;
            self.state = ZoomerState::Paint;
        } else {
            self.state = ZoomerState::Update;
        }
        StepOutcome::Continue
    }

    fn paint(&mut self) -> StepOutcome {
        self.state = self.resume;
        let Some(mut frame) = self.pending.take() else {
            return StepOutcome::Continue;
        };
        if self.last_painted.is_some_and(|nr| frame.frame_nr <= nr) {
            warn!(
                "Zoomer: Dropping frame {} older than painted frame {:?}",
                frame.frame_nr, self.last_painted
            );
            self.stats.frames_dropped += 1;
            self.pool.release(frame);
            return StepOutcome::Continue;
        }

        let start = Instant::now();
        self.hooks.on_put_image_data(&frame);
        frame.time_paint = start.elapsed();
        self.hooks.on_end_frame(&frame);

        let interval = self.last_paint_at.map(|t| start.duration_since(t));
        self.stats.record_paint(self.config.coef, &frame, interval);
        debug!(
            "Zoomer: Painted frame {} quality {:.3} copy {:?} update {:?} render {:?} round trip {:?}",
            frame.frame_nr,
            frame.quality,
            frame.time_copy,
            frame.time_update,
            frame.time_render,
            frame.time_round_trip
        );
        self.last_painted = Some(frame.frame_nr);
        self.last_paint_at = Some(start);
        self.pool.release(frame);
        StepOutcome::Continue
    }

    /// Collects a rendered frame from the workers. Returns true and moves to
    /// PAINT when one is ready; PAINT then resumes the current state.
    ///
    /// Frames are checked against the size the viewports currently hold, so
    /// a resize that COPY has not applied yet does not discard them.
    fn poll_workers(&mut self) -> bool {
        let (width, height) = {
            let viewport = &self.viewports[self.current_index()];
            (viewport.view_width, viewport.view_height)
        };
        let Some(workers) = self.workers.as_mut() else {
            return false;
        };
        while let Some(result) = workers.try_collect() {
            let frame = result.frame;
            if result.epoch != self.epoch || !frame.matches(width, height) {
                warn!(
                    "Zoomer: Discarding stale frame {} from worker {}",
                    frame.frame_nr, result.worker_id
                );
                self.stats.frames_dropped += 1;
                self.pool.release(frame);
                continue;
            }
            self.pending = Some(frame);
            self.resume = self.state;
            self.state = ZoomerState::Paint;
            return true;
        }
        false
    }

    fn rebuild_workers(&mut self) {
        self.workers_dirty = false;
        // Frames still with the old workers are dropped with them.
        self.workers = None;
        self.epoch += 1;
        self.workers = match spawn_workers(&self.config) {
            Ok(workers) => workers,
            Err(e) => {
                warn!("Zoomer: {}; falling back to inline rendering", e);
                None
            }
        };
    }
}

#[cfg(test)]
mod tests;
