// src/viewport.rs

//! The `Viewport` maps a logical window of the scalar field onto a square
//! sample buffer and keeps that buffer as accurate as the time budget allows.
//!
//! The buffer is `diameter` x `diameter` cells, where `diameter` is the
//! diagonal of the on-screen view, so any rotation of the view stays inside
//! it. Cell `(i, j)` should represent the field at `(x_ruler.coord[i],
//! y_ruler.coord[j])` and always holds the sample taken at
//! `(x_ruler.nearest[i], y_ruler.nearest[j])`.
//!
//! Three ways to populate it:
//!
//! * `set_position` inherits every cell from the previous viewport through
//!   the rulers. This is cheap and approximate.
//! * `update_lines` recomputes the single worst row or column. It is called
//!   repeatedly by the scheduler until the time slice runs out.
//! * `fill` computes every cell. It is only used when there is nothing to
//!   inherit from.
//!
//! The viewport holds its `Frame` exclusively while it is attached; the
//! scheduler detaches it with `take_frame` before handing it to a renderer.

use crate::error::{Result, ZoomerError};
use crate::frame::{diameter_for, Frame};
use crate::ruler::Ruler;
use log::{trace, warn};

/// Which axis a refinement step worked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// A row: constant y, every x.
    Horizontal,
    /// A column: constant x, every y.
    Vertical,
}

/// Outcome of one `update_lines` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateResult {
    /// One line was recomputed; `propagated` trailing duplicates were patched
    /// with its values.
    Refined {
        axis: Axis,
        index: usize,
        propagated: usize,
    },
    /// Both rulers are exact; nothing left to do.
    Complete,
}

#[derive(Debug)]
pub struct Viewport {
    pub view_width: usize,
    pub view_height: usize,
    pub diameter: usize,

    pub center_x: f64,
    pub center_y: f64,
    /// Half the logical span of the square buffer.
    pub radius: f64,
    /// Half the logical width of the on-screen view.
    pub radius_x: f64,
    /// Half the logical height of the on-screen view.
    pub radius_y: f64,

    pub x_ruler: Ruler,
    pub y_ruler: Ruler,

    frame: Option<Frame>,
}

impl Viewport {
    pub fn new(view_width: usize, view_height: usize) -> Result<Self> {
        if view_width < 2 || view_height < 2 {
            return Err(ZoomerError::InvalidDimensions {
                width: view_width,
                height: view_height,
            });
        }
        let diameter = diameter_for(view_width, view_height);
        Ok(Viewport {
            view_width,
            view_height,
            diameter,
            center_x: 0.0,
            center_y: 0.0,
            radius: 0.0,
            radius_x: 0.0,
            radius_y: 0.0,
            x_ruler: Ruler::new(diameter)?,
            y_ruler: Ruler::new(diameter)?,
            frame: None,
        })
    }

    pub fn matches(&self, view_width: usize, view_height: usize) -> bool {
        self.view_width == view_width && self.view_height == view_height
    }

    pub fn frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    pub fn frame_mut(&mut self) -> Option<&mut Frame> {
        self.frame.as_mut()
    }

    pub fn has_frame(&self) -> bool {
        self.frame.is_some()
    }

    /// Detaches the frame, leaving the viewport empty.
    pub fn take_frame(&mut self) -> Option<Frame> {
        self.frame.take()
    }

    /// Logical span covered by the buffer along one axis, expressed as the
    /// coordinates of the first and last cell centres.
    fn span(center: f64, radius: f64, diameter: usize) -> (f64, f64) {
        let half_cell = radius / diameter as f64;
        (center - radius + half_cell, center + radius - half_cell)
    }

    fn attach(&mut self, mut frame: Frame, center_x: f64, center_y: f64, radius: f64) {
        if frame.diameter != self.diameter {
            warn!(
                "Viewport: Frame diameter {} does not match viewport diameter {}; resizing buffer",
                frame.diameter, self.diameter
            );
            frame.diameter = self.diameter;
            frame.raw.resize(self.diameter * self.diameter, 0);
        }
        self.center_x = center_x;
        self.center_y = center_y;
        self.radius = radius;
        self.radius_x = radius * self.view_width as f64 / self.diameter as f64;
        self.radius_y = radius * self.view_height as f64 / self.diameter as f64;
        self.frame = Some(frame);
    }

    /// Attaches `frame` at the new position and populates it from
    /// `previous`, which must hold a completed frame.
    ///
    /// Rows whose source row equals the previous row's source are copied from
    /// the row just written instead of being gathered again.
    pub fn set_position(
        &mut self,
        frame: Frame,
        center_x: f64,
        center_y: f64,
        radius: f64,
        previous: &Viewport,
    ) {
        self.attach(frame, center_x, center_y, radius);

        let Some(old_frame) = previous.frame.as_ref() else {
            warn!("Viewport: Previous viewport holds no frame; starting from a blank buffer");
            self.blank();
            return;
        };

        let d = self.diameter;
        let (x_start, x_end) = Self::span(center_x, radius, d);
        let (y_start, y_end) = Self::span(center_y, radius, d);
        let x_exact = self.x_ruler.inherit_from(&previous.x_ruler, x_start, x_end);
        let y_exact = self.y_ruler.inherit_from(&previous.y_ruler, y_start, y_end);

        let old_d = previous.diameter;
        let old_raw = &old_frame.raw;
        let x_from = &self.x_ruler.from;
        let y_from = &self.y_ruler.from;
        let Some(frame) = self.frame.as_mut() else {
            return;
        };
        let raw = &mut frame.raw;

        for j in 0..d {
            if j > 0 && y_from[j] == y_from[j - 1] {
                raw.copy_within((j - 1) * d..j * d, j * d);
                continue;
            }
            let Some(src_row) = y_from[j] else {
                continue;
            };
            let old_row = &old_raw[src_row * old_d..(src_row + 1) * old_d];
            let new_row = &mut raw[j * d..(j + 1) * d];
            for (cell, from) in new_row.iter_mut().zip(x_from.iter()) {
                if let Some(src) = *from {
                    *cell = old_row[src];
                }
            }
        }

        self.x_ruler.release_duplicate_sources();
        self.y_ruler.release_duplicate_sources();

        frame.cnt_pixels += x_exact * y_exact;
        frame.cnt_v_lines += x_exact;
        frame.cnt_h_lines += y_exact;
        frame.update_quality();

        trace!(
            "Viewport: Inherited frame {} ({} exact columns, {} exact rows, quality {:.3})",
            frame.frame_nr,
            x_exact,
            y_exact,
            frame.quality
        );
    }

    /// Zeroes the buffer and marks every row as unknown. Columns are laid
    /// out exact so each recomputed row is sampled at real positions.
    fn blank(&mut self) {
        let d = self.diameter;
        let (x_start, x_end) = Self::span(self.center_x, self.radius, d);
        let (y_start, y_end) = Self::span(self.center_y, self.radius, d);
        self.x_ruler.fill_linear(x_start, x_end);
        self.y_ruler.fill_unknown(y_start, y_end);
        if let Some(frame) = self.frame.as_mut() {
            frame.raw.fill(0);
            frame.cnt_v_lines = d;
        }
    }

    /// Attaches `frame` and computes every cell from scratch.
    pub fn fill<F>(&mut self, frame: Frame, center_x: f64, center_y: f64, radius: f64, sample: &F)
    where
        F: Fn(f64, f64) -> u16,
    {
        self.attach(frame, center_x, center_y, radius);

        let d = self.diameter;
        let (x_start, x_end) = Self::span(center_x, radius, d);
        let (y_start, y_end) = Self::span(center_y, radius, d);
        self.x_ruler.fill_linear(x_start, x_end);
        self.y_ruler.fill_linear(y_start, y_end);

        let x_coord = &self.x_ruler.coord;
        let y_coord = &self.y_ruler.coord;
        let Some(frame) = self.frame.as_mut() else {
            return;
        };
        for (row, &y) in frame.raw.chunks_exact_mut(d).zip(y_coord.iter()) {
            for (cell, &x) in row.iter_mut().zip(x_coord.iter()) {
                *cell = sample(x, y);
            }
        }

        frame.cnt_evaluations += d * d;
        frame.cnt_pixels = d * d;
        frame.cnt_h_lines = d;
        frame.cnt_v_lines = d;
        frame.update_quality();
    }

    /// Recomputes the row or column with the largest outstanding error.
    ///
    /// Every cell always holds the sample taken at its rulers' `nearest`
    /// positions, so a recomputed row is sampled at each column's `nearest`
    /// and only becomes exact where that column already is. Trailing lines
    /// that inherited the same source receive a copy of the new values while
    /// the copy is closer than what they hold.
    pub fn update_lines<F>(&mut self, sample: &F) -> UpdateResult
    where
        F: Fn(f64, f64) -> u16,
    {
        let Some(frame) = self.frame.as_mut() else {
            return UpdateResult::Complete;
        };

        let (x_idx, x_max) = self.x_ruler.worst();
        let (y_idx, y_max) = self.y_ruler.worst();
        if x_max == 0.0 && y_max == 0.0 {
            return UpdateResult::Complete;
        }

        let d = self.diameter;
        let result = if y_max >= x_max {
            let j = y_idx;
            let y = self.y_ruler.coord[j];
            let row = &mut frame.raw[j * d..(j + 1) * d];
            for (cell, &x) in row.iter_mut().zip(self.x_ruler.nearest.iter()) {
                *cell = sample(x, y);
            }

            let propagated = Self::propagate(&mut self.y_ruler, j, |k| {
                frame.raw.copy_within(j * d..(j + 1) * d, k * d);
            });

            self.y_ruler.mark_exact(j);
            frame.cnt_pixels += self.x_ruler.exact_count();
            frame.cnt_h_lines += 1;
            UpdateResult::Refined {
                axis: Axis::Horizontal,
                index: j,
                propagated,
            }
        } else {
            let i = x_idx;
            let x = self.x_ruler.coord[i];
            for (j, &y) in self.y_ruler.nearest.iter().enumerate() {
                frame.raw[j * d + i] = sample(x, y);
            }

            let propagated = Self::propagate(&mut self.x_ruler, i, |k| {
                for j in 0..d {
                    frame.raw[j * d + k] = frame.raw[j * d + i];
                }
            });

            self.x_ruler.mark_exact(i);
            frame.cnt_pixels += self.y_ruler.exact_count();
            frame.cnt_v_lines += 1;
            UpdateResult::Refined {
                axis: Axis::Vertical,
                index: i,
                propagated,
            }
        };

        frame.cnt_evaluations += d;
        frame.update_quality();
        result
    }

    /// Walks the run of lines after `line` that share its inherited source,
    /// handing each one to `copy` while the freshly computed line is a closer
    /// sample than the one it holds. Returns how many lines were patched.
    fn propagate(ruler: &mut Ruler, line: usize, mut copy: impl FnMut(usize)) -> usize {
        let Some(src) = ruler.from[line] else {
            return 0;
        };
        let mut propagated = 0;
        let mut k = line + 1;
        while k < ruler.len() && ruler.from[k] == Some(src) && ruler.error[k] != 0.0 {
            if (ruler.coord[k] - ruler.coord[line]).abs() >= ruler.error[k] {
                break;
            }
            copy(k);
            ruler.mark_copied(k, line);
            propagated += 1;
            k += 1;
        }
        propagated
    }

    /// True when adjacent tab-stops on either axis have become the same
    /// float, i.e. zooming further cannot add resolution.
    pub fn reached_limits(&self) -> bool {
        self.x_ruler.has_collapsed() || self.y_ruler.has_collapsed()
    }

    /// Logical field coordinate under on-screen pixel `(px, py)` when the
    /// view is rotated by `angle` degrees.
    pub fn screen_to_logical(&self, px: f64, py: f64, angle: f64) -> (f64, f64) {
        let (sin, cos) = angle.to_radians().sin_cos();
        let dx = px + 0.5 - self.view_width as f64 / 2.0;
        let dy = py + 0.5 - self.view_height as f64 / 2.0;
        let cell = 2.0 * self.radius / self.diameter as f64;
        (
            self.center_x + (dx * cos - dy * sin) * cell,
            self.center_y + (dx * sin + dy * cos) * cell,
        )
    }
}
