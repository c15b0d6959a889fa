//! Error type shared by the generator, the grid and the erosion driver.
//!
//! Only malformed configuration and host I/O surface as errors. Numeric edge
//! cases (flat noise fields, clamped coordinates, stalled droplets) are normal
//! simulation outcomes and are reported through return values instead.

use thiserror::Error;

/// Errors raised while building or configuring a terrain.
#[derive(Error, Debug)]
pub enum TerrainError {
    #[error("Invalid grid resolution {0}: must be at least 2")]
    InvalidResolution(usize),
    #[error("Invalid value {value} for '{name}': expected {expected}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        expected: &'static str,
    },
    #[error("Grid size mismatch: expected {expected} heights, got {actual}")]
    GridSizeMismatch { expected: usize, actual: usize },
    #[error("Invalid spawn area: min ({min_x}, {min_z}) exceeds max ({max_x}, {max_z})")]
    InvalidSpawnArea {
        min_x: f32,
        min_z: f32,
        max_x: f32,
        max_z: f32,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, TerrainError>;

/// Fail with `InvalidParameter` unless `ok` holds.
pub(crate) fn ensure(
    ok: bool,
    name: &'static str,
    value: f64,
    expected: &'static str,
) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(TerrainError::InvalidParameter { name, value, expected })
    }
}
