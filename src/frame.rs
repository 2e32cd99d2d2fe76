// src/frame.rs
//! Frames and the frame pool.
//!
//! A `Frame` carries one generation's buffers between pipeline stages. It is
//! always owned by exactly one party: the control loop while it is being
//! inherited and refined, a render worker (or the inline render path) while it
//! is being extracted, and the control loop again while it is painted and then
//! parked in the `FramePool`. Hand-off is a move; nothing aliases a frame.

use crate::error::{Result, ZoomerError};
use log::{debug, trace};
use std::time::{Duration, Instant};

/// Largest palette a frame accepts (one entry per possible 16-bit sample).
pub const MAX_PALETTE_ENTRIES: usize = 65536;

/// Side length of the square buffer that covers a `width` x `height` view
/// under any rotation: `ceil(sqrt(w² + h²))`.
pub fn diameter_for(width: usize, height: usize) -> usize {
    let diagonal = ((width * width + height * height) as f64).sqrt().ceil() as usize;
    // Guard against the float rounding down on an exact square.
    if diagonal * diagonal < width * width + height * height {
        diagonal + 1
    } else {
        diagonal
    }
}

#[derive(Debug)]
pub struct Frame {
    /// Generation number assigned by the scheduler.
    pub frame_nr: u64,
    pub view_width: usize,
    pub view_height: usize,
    pub diameter: usize,
    /// Rotation in degrees.
    pub angle: f64,
    /// Raw samples, `diameter * diameter`, row-major.
    pub raw: Vec<u16>,
    /// RGBA output, `view_width * view_height * 4` bytes.
    pub output: Box<[u8]>,
    /// Packed colours indexed by sample value. Empty means the raw samples
    /// are direct colour (RGB565).
    pub palette: Vec<u32>,

    /// Cells holding an exactly computed sample.
    pub cnt_pixels: usize,
    /// Exact rows.
    pub cnt_h_lines: usize,
    /// Exact columns.
    pub cnt_v_lines: usize,
    /// Sample callback invocations spent on this frame.
    pub cnt_evaluations: usize,
    /// `cnt_pixels / diameter²`.
    pub quality: f64,

    pub time_start: Instant,
    pub time_copy: Duration,
    pub time_update: Duration,
    pub time_render: Duration,
    pub time_paint: Duration,
    /// Time spent away from the control loop while being rendered.
    pub time_round_trip: Duration,
    pub(crate) dispatched_at: Option<Instant>,
}

impl Frame {
    pub fn new(view_width: usize, view_height: usize) -> Result<Self> {
        if view_width < 2 || view_height < 2 {
            return Err(ZoomerError::InvalidDimensions {
                width: view_width,
                height: view_height,
            });
        }
        let diameter = diameter_for(view_width, view_height);
        Ok(Frame {
            frame_nr: 0,
            view_width,
            view_height,
            diameter,
            angle: 0.0,
            raw: vec![0; diameter * diameter],
            output: vec![0u8; view_width * view_height * 4].into_boxed_slice(),
            palette: Vec::new(),
            cnt_pixels: 0,
            cnt_h_lines: 0,
            cnt_v_lines: 0,
            cnt_evaluations: 0,
            quality: 0.0,
            time_start: Instant::now(),
            time_copy: Duration::ZERO,
            time_update: Duration::ZERO,
            time_render: Duration::ZERO,
            time_paint: Duration::ZERO,
            time_round_trip: Duration::ZERO,
            dispatched_at: None,
        })
    }

    /// Prepares a recycled frame for a new generation. Buffers keep their
    /// allocation; the raw buffer is overwritten by inheritance or fill.
    pub fn reset(&mut self, frame_nr: u64, angle: f64) {
        self.frame_nr = frame_nr;
        self.angle = angle;
        self.palette.clear();
        self.cnt_pixels = 0;
        self.cnt_h_lines = 0;
        self.cnt_v_lines = 0;
        self.cnt_evaluations = 0;
        self.quality = 0.0;
        self.time_start = Instant::now();
        self.time_copy = Duration::ZERO;
        self.time_update = Duration::ZERO;
        self.time_render = Duration::ZERO;
        self.time_paint = Duration::ZERO;
        self.time_round_trip = Duration::ZERO;
        self.dispatched_at = None;
    }

    /// Replaces the palette, reusing the existing allocation.
    pub fn set_palette(&mut self, palette: &[u32]) -> Result<()> {
        if palette.len() > MAX_PALETTE_ENTRIES {
            return Err(ZoomerError::PaletteTooLarge(palette.len()));
        }
        self.palette.clear();
        self.palette.extend_from_slice(palette);
        Ok(())
    }

    pub fn matches(&self, view_width: usize, view_height: usize) -> bool {
        self.view_width == view_width && self.view_height == view_height
    }

    pub(crate) fn update_quality(&mut self) {
        let cells = (self.diameter * self.diameter) as f64;
        self.quality = self.cnt_pixels as f64 / cells;
    }
}

/// Free list of frames, matched by view dimensions.
#[derive(Debug)]
pub struct FramePool {
    free: Vec<Frame>,
    max_frames: usize,
    allocated: usize,
}

impl FramePool {
    pub fn new(max_frames: usize) -> Self {
        FramePool {
            free: Vec::new(),
            max_frames,
            allocated: 0,
        }
    }

    /// Hands out a frame of the requested dimensions, recycled when possible.
    pub fn acquire(
        &mut self,
        view_width: usize,
        view_height: usize,
        frame_nr: u64,
        angle: f64,
    ) -> Result<Frame> {
        let mut frame = match self
            .free
            .iter()
            .position(|f| f.matches(view_width, view_height))
        {
            Some(idx) => {
                trace!("FramePool: Reusing frame for {}x{}", view_width, view_height);
                self.free.swap_remove(idx)
            }
            None => {
                self.allocated += 1;
                debug!(
                    "FramePool: Allocating frame {}x{} (total allocated {})",
                    view_width, view_height, self.allocated
                );
                Frame::new(view_width, view_height)?
            }
        };
        frame.reset(frame_nr, angle);
        Ok(frame)
    }

    /// Takes a frame back. Surplus frames are dropped.
    pub fn release(&mut self, frame: Frame) {
        if self.free.len() < self.max_frames {
            self.free.push(frame);
        } else {
            trace!("FramePool: Pool full, dropping frame {}", frame.frame_nr);
        }
    }

    /// Drops every pooled frame whose dimensions no longer match the view.
    pub fn purge_mismatched(&mut self, view_width: usize, view_height: usize) {
        let before = self.free.len();
        self.free.retain(|f| f.matches(view_width, view_height));
        if before != self.free.len() {
            debug!(
                "FramePool: Purged {} frames after resize to {}x{}",
                before - self.free.len(),
                view_width,
                view_height
            );
        }
    }

    pub fn set_max_frames(&mut self, max_frames: usize) {
        self.max_frames = max_frames;
        self.free.truncate(max_frames);
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Frames constructed over the pool's lifetime.
    pub fn allocated(&self) -> usize {
        self.allocated
    }
}
