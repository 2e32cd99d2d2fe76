// src/error.rs
//! Error type for the zoomer pipeline.
//!
//! Only setup can fail. Once a `Zoomer` is running, `step()` always makes
//! forward progress and reports degraded conditions through statistics.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ZoomerError>;

#[derive(Error, Debug)]
pub enum ZoomerError {
    #[error("Invalid view dimensions {width}x{height} (both must be at least 2)")]
    InvalidDimensions { width: usize, height: usize },
    #[error("Ruler length {0} is too short (at least 2 tab-stops required)")]
    RulerTooShort(usize),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Palette has {0} entries (maximum is 65536)")]
    PaletteTooLarge(usize),
    #[error("Failed to spawn render worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),
    #[error("Failed to read configuration: {0}")]
    ConfigIo(#[from] std::io::Error),
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),
}
