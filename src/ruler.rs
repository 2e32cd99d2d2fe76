// src/ruler.rs
//! Per-axis sampling rulers.
//!
//! A ruler tracks, for every tab-stop of one axis, where the sample *should*
//! be taken (`coord`), where the sample currently held was *actually* taken
//! (`nearest`), the distance between the two (`error`) and which tab-stop of
//! the previous ruler the held sample was inherited from (`from`).
//!
//! `from[i] == None` marks a tab-stop that is no longer eligible for cheap
//! duplicate propagation: either it has been recomputed exactly, or it was the
//! less accurate of two neighbours inheriting the same source.

use crate::error::{Result, ZoomerError};

/// Logical coordinate of tab-stop `i` out of `len` spread evenly over
/// `[start, end]`. Both ends are included, so `len` must be at least 2.
#[inline]
pub fn tab_stop(start: f64, end: f64, i: usize, len: usize) -> f64 {
    start + (end - start) * i as f64 / (len - 1) as f64
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ruler {
    pub coord: Vec<f64>,
    pub nearest: Vec<f64>,
    pub error: Vec<f64>,
    pub from: Vec<Option<usize>>,
}

impl Ruler {
    /// Creates a ruler of `len` tab-stops with every sample marked infinitely
    /// wrong, so the first refinement pass recomputes everything.
    pub fn new(len: usize) -> Result<Self> {
        if len < 2 {
            return Err(ZoomerError::RulerTooShort(len));
        }
        Ok(Ruler {
            coord: vec![0.0; len],
            nearest: vec![f64::INFINITY; len],
            error: vec![f64::INFINITY; len],
            from: vec![None; len],
        })
    }

    pub fn len(&self) -> usize {
        self.coord.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coord.is_empty()
    }

    /// Builds a fresh ruler over `[start, end]` by inheriting from `old`.
    /// Returns the ruler and the number of tab-stops that map exactly.
    pub fn inherit(old: &Ruler, start: f64, end: f64, len: usize) -> Result<(Ruler, usize)> {
        let mut ruler = Ruler::new(len)?;
        let exact = ruler.inherit_from(old, start, end);
        Ok((ruler, exact))
    }

    /// Re-targets this ruler at `[start, end]`, matching each new tab-stop to
    /// the closest sample still held by `old`.
    ///
    /// Both axes are monotonic, so a single forward pointer into `old` is
    /// enough: for each new tab-stop it only ever moves right, while the next
    /// old sample is at least as close as the current one. Once `old` runs out,
    /// the remaining tab-stops all inherit its last sample.
    ///
    /// Returns the number of tab-stops whose error is exactly zero.
    pub fn inherit_from(&mut self, old: &Ruler, start: f64, end: f64) -> usize {
        let len = self.len();
        let old_len = old.len();
        let mut exact = 0;
        let mut i_old = 0;

        for i_new in 0..len {
            let coord = tab_stop(start, end, i_new, len);

            let mut best = (coord - old.nearest[i_old]).abs();
            while i_old + 1 < old_len {
                let next = (coord - old.nearest[i_old + 1]).abs();
                if next > best {
                    break;
                }
                best = next;
                i_old += 1;
            }

            self.coord[i_new] = coord;
            self.nearest[i_new] = old.nearest[i_old];
            self.error[i_new] = best;
            self.from[i_new] = Some(i_old);
            if best == 0.0 {
                exact += 1;
            }
        }
        exact
    }

    /// Lays out `[start, end]` with every tab-stop exact and nothing inherited.
    pub fn fill_linear(&mut self, start: f64, end: f64) {
        let len = self.len();
        for i in 0..len {
            let coord = tab_stop(start, end, i, len);
            self.coord[i] = coord;
            self.nearest[i] = coord;
            self.error[i] = 0.0;
            self.from[i] = None;
        }
    }

    /// Lays out `[start, end]` with no usable sample behind any tab-stop.
    pub fn fill_unknown(&mut self, start: f64, end: f64) {
        let len = self.len();
        for i in 0..len {
            self.coord[i] = tab_stop(start, end, i, len);
            self.nearest[i] = f64::INFINITY;
            self.error[i] = f64::INFINITY;
            self.from[i] = None;
        }
    }

    /// Where two neighbours inherit from the same source, the one with the
    /// strictly larger error loses its claim on that source.
    ///
    /// One forward pass, then one backward pass, each reading the values the
    /// previous step may already have cleared.
    pub fn release_duplicate_sources(&mut self) {
        let len = self.len();
        for i in 1..len {
            if self.from[i].is_some()
                && self.from[i] == self.from[i - 1]
                && self.error[i] > self.error[i - 1]
            {
                self.from[i] = None;
            }
        }
        for i in (0..len - 1).rev() {
            if self.from[i].is_some()
                && self.from[i] == self.from[i + 1]
                && self.error[i] > self.error[i + 1]
            {
                self.from[i] = None;
            }
        }
    }

    /// Index and value of the largest outstanding error.
    pub fn worst(&self) -> (usize, f64) {
        let mut idx = 0;
        let mut max = self.error[0];
        for (i, &err) in self.error.iter().enumerate().skip(1) {
            if err > max {
                max = err;
                idx = i;
            }
        }
        (idx, max)
    }

    /// Marks tab-stop `i` as freshly recomputed at its own coordinate.
    pub fn mark_exact(&mut self, i: usize) {
        self.nearest[i] = self.coord[i];
        self.error[i] = 0.0;
        self.from[i] = None;
    }

    /// Tab-stop `i` now holds a copy of the sample computed for tab-stop `src`.
    pub fn mark_copied(&mut self, i: usize, src: usize) {
        self.nearest[i] = self.coord[src];
        self.error[i] = (self.coord[i] - self.coord[src]).abs();
    }

    pub fn exact_count(&self) -> usize {
        self.error.iter().filter(|&&e| e == 0.0).count()
    }

    /// True when two adjacent tab-stops have collapsed onto the same float.
    pub fn has_collapsed(&self) -> bool {
        self.coord.windows(2).any(|w| w[0] == w[1])
    }
}
