//! Terrain sculpting library
//!
//! Generates a Perlin-noise heightfield and erodes it with simulated water
//! droplets. Re-exports modules for use by binaries and tools.

pub mod config;
pub mod erosion;
pub mod error;
pub mod export;
pub mod height_grid;
pub mod heightmap;
pub mod seeds;
pub mod tilemap;

pub use config::SculptConfig;
pub use error::{Result, TerrainError};
pub use height_grid::{
    ErosionSurface, GridCoord, GridFrame, HeightGrid, HeightSnapshot, HeightStorage, RadialBrush,
};
pub use heightmap::{generate_heightmap, GeneratedField, NoiseConfig};
pub use seeds::TerrainSeeds;
