// src/lib.rs
//! Progressive, real-time viewport renderer for an explorable 2D scalar field.
//!
//! A [`Zoomer`] keeps a square buffer of samples for the current view, reuses
//! as many samples as possible from the previous view when it moves, and
//! spends the rest of each frame budget recomputing the least accurate rows
//! and columns. Finished frames are extracted (cropped, rotated, palette
//! mapped) on render worker threads and presented through [`ZoomerHooks`].

pub mod config;
pub mod error;
pub mod frame;
pub mod renderer;
pub mod ruler;
pub mod viewport;
pub mod zoomer;

pub use config::ZoomerConfig;
pub use error::{Result, ZoomerError};
pub use frame::{Frame, FramePool};
pub use viewport::{Axis, UpdateResult, Viewport};
pub use zoomer::{StepOutcome, ViewState, Zoomer, ZoomerHooks, ZoomerState, ZoomerStats};
