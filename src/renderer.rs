// src/renderer.rs

//! Extraction of the on-screen image from a completed sample buffer.
//!
//! This stage is a pure transform: square raw buffer + palette + angle in,
//! RGBA rectangle out. It knows nothing about rulers or inheritance, which is
//! what makes it safe to run on a render worker while the control loop is
//! already refining the next generation.
//!
//! Two paths:
//! - angle zero: the view is a centred sub-rectangle of the buffer and each
//!   output row is read from one contiguous source row.
//! - rotated: source positions are walked with 16.16 fixed-point
//!   accumulators, one trigonometric evaluation per frame.

pub mod worker;

use crate::frame::Frame;
use std::time::Instant;

/// Number of fractional bits in the rotation accumulators.
const FIXED_SHIFT: u32 = 16;
const FIXED_ONE: f64 = (1u64 << FIXED_SHIFT) as f64;

/// Expands a 16-bit RGB565 sample to packed RGBA bytes.
#[inline]
pub fn rgb565_to_rgba(sample: u16) -> [u8; 4] {
    let r5 = ((sample >> 11) & 0x1f) as u8;
    let g6 = ((sample >> 5) & 0x3f) as u8;
    let b5 = (sample & 0x1f) as u8;
    [
        (r5 << 3) | (r5 >> 2),
        (g6 << 2) | (g6 >> 4),
        (b5 << 3) | (b5 >> 2),
        0xff,
    ]
}

/// Colour of one sample. Indices past the end of the palette are transparent.
#[inline]
fn resolve(sample: u16, palette: &[u32]) -> [u8; 4] {
    if palette.is_empty() {
        rgb565_to_rgba(sample)
    } else {
        palette
            .get(sample as usize)
            .copied()
            .unwrap_or(0)
            .to_le_bytes()
    }
}

/// Writes the `width` x `height` view centred in the `diameter`² buffer `raw`
/// into `output`, rotated by `angle` degrees around the view centre.
///
/// `output` must hold `width * height * 4` bytes; `width` and `height` must
/// not exceed `diameter`.
pub fn render(
    raw: &[u16],
    diameter: usize,
    palette: &[u32],
    width: usize,
    height: usize,
    angle: f64,
    output: &mut [u8],
) {
    debug_assert_eq!(raw.len(), diameter * diameter);
    debug_assert_eq!(output.len(), width * height * 4);
    debug_assert!(width <= diameter && height <= diameter);

    if angle.rem_euclid(360.0) == 0.0 {
        render_aligned(raw, diameter, palette, width, height, output);
    } else {
        render_rotated(raw, diameter, palette, width, height, angle, output);
    }
}

fn render_aligned(
    raw: &[u16],
    diameter: usize,
    palette: &[u32],
    width: usize,
    height: usize,
    output: &mut [u8],
) {
    let x0 = (diameter - width + 1) / 2;
    let y0 = (diameter - height + 1) / 2;

    for (y, out_row) in output.chunks_exact_mut(width * 4).enumerate() {
        let start = (y0 + y) * diameter + x0;
        let src_row = &raw[start..start + width];
        if palette.is_empty() {
            for (px, &sample) in out_row.chunks_exact_mut(4).zip(src_row) {
                px.copy_from_slice(&rgb565_to_rgba(sample));
            }
        } else {
            for (px, &sample) in out_row.chunks_exact_mut(4).zip(src_row) {
                let colour = palette.get(sample as usize).copied().unwrap_or(0);
                px.copy_from_slice(&colour.to_le_bytes());
            }
        }
    }
}

fn render_rotated(
    raw: &[u16],
    diameter: usize,
    palette: &[u32],
    width: usize,
    height: usize,
    angle: f64,
    output: &mut [u8],
) {
    let (sin, cos) = angle.to_radians().sin_cos();
    let step_x = (cos * FIXED_ONE).round() as i64;
    let step_y = (sin * FIXED_ONE).round() as i64;
    let half_d = diameter as f64 / 2.0;
    let dx0 = 0.5 - width as f64 / 2.0;
    let max = diameter as i64 - 1;

    for (y, out_row) in output.chunks_exact_mut(width * 4).enumerate() {
        let dy = y as f64 + 0.5 - height as f64 / 2.0;
        let mut sx = ((half_d + dx0 * cos - dy * sin) * FIXED_ONE) as i64;
        let mut sy = ((half_d + dx0 * sin + dy * cos) * FIXED_ONE) as i64;
        for px in out_row.chunks_exact_mut(4) {
            let ix = (sx >> FIXED_SHIFT).clamp(0, max) as usize;
            let iy = (sy >> FIXED_SHIFT).clamp(0, max) as usize;
            px.copy_from_slice(&resolve(raw[iy * diameter + ix], palette));
            sx += step_x;
            sy += step_y;
        }
    }
}

/// Renders a completed frame into its own output buffer and records how long
/// it took.
pub fn render_frame(frame: &mut Frame) {
    let start = Instant::now();
    let Frame {
        raw,
        diameter,
        palette,
        view_width,
        view_height,
        angle,
        output,
        ..
    } = frame;
    render(
        raw,
        *diameter,
        palette,
        *view_width,
        *view_height,
        *angle,
        output,
    );
    frame.time_render = start.elapsed();
}
