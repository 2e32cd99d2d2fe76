// src/zoomer/stats.rs
//! Running statistics for the zoomer.
//!
//! Every average is a first-order low-pass filter,
//! `avg += coef * (sample - avg)`, so recent frames dominate and a single
//! slow frame fades out after a few generations.

use crate::frame::Frame;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ZoomerStats {
    pub avg_copy_ms: f64,
    pub avg_update_ms: f64,
    pub avg_render_ms: f64,
    pub avg_paint_ms: f64,
    /// Time a frame spent with a render worker, including queueing.
    pub avg_round_trip_ms: f64,
    /// Time UPDATE ran past its deadline.
    pub avg_overshoot_ms: f64,
    pub avg_frame_rate: f64,
    /// Sample evaluations per painted frame.
    pub avg_pixels_per_frame: f64,
    /// Rows and columns evaluated per painted frame.
    pub avg_lines_per_frame: f64,
    pub avg_quality: f64,

    pub generations: u64,
    pub frames_painted: u64,
    /// Worker results discarded as stale.
    pub frames_dropped: u64,
    pub inline_renders: u64,
    pub worker_renders: u64,
}

fn low_pass(avg: &mut f64, coef: f64, sample: f64) {
    *avg += coef * (sample - *avg);
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

impl ZoomerStats {
    pub(crate) fn record_update(&mut self, coef: f64, update: Duration, overshoot: Duration) {
        low_pass(&mut self.avg_update_ms, coef, ms(update));
        low_pass(&mut self.avg_overshoot_ms, coef, ms(overshoot));
    }

    /// Folds a painted frame into the averages. `interval` is the time since
    /// the previous paint, if there was one.
    pub(crate) fn record_paint(&mut self, coef: f64, frame: &Frame, interval: Option<Duration>) {
        self.frames_painted += 1;
        low_pass(&mut self.avg_copy_ms, coef, ms(frame.time_copy));
        low_pass(&mut self.avg_render_ms, coef, ms(frame.time_render));
        low_pass(&mut self.avg_paint_ms, coef, ms(frame.time_paint));
        if !frame.time_round_trip.is_zero() {
            low_pass(&mut self.avg_round_trip_ms, coef, ms(frame.time_round_trip));
        }
        low_pass(&mut self.avg_quality, coef, frame.quality);
        low_pass(
            &mut self.avg_pixels_per_frame,
            coef,
            frame.cnt_evaluations as f64,
        );
        low_pass(
            &mut self.avg_lines_per_frame,
            coef,
            (frame.cnt_evaluations / frame.diameter.max(1)) as f64,
        );
        if let Some(interval) = interval.filter(|i| !i.is_zero()) {
            low_pass(&mut self.avg_frame_rate, coef, 1.0 / interval.as_secs_f64());
        }
    }

    pub(crate) fn copy_duration(&self) -> Duration {
        Duration::from_secs_f64(self.avg_copy_ms.max(0.0) / 1000.0)
    }

    pub(crate) fn paint_duration(&self) -> Duration {
        Duration::from_secs_f64(self.avg_paint_ms.max(0.0) / 1000.0)
    }
}
