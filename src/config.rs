//! Run configuration loaded from and saved to JSON.
//!
//! ```json
//! {
//!   "seed": 42,
//!   "terrain": { "resolution": 257, "world_origin": [0, 0, 0], "world_size": [50, 10, 50] },
//!   "noise": { "octaves": 4, "persistence": 0.5 },
//!   "erosion": { "inertia": 0.05, "brush": "bilinear" },
//!   "batch": { "droplets": 50000, "parallel": true }
//! }
//! ```
//!
//! Every section is optional and falls back to its defaults. The noise seed
//! is derived from the master `seed`, so `noise.seed` is ignored here.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::erosion::{DropletParams, SpawnArea};
use crate::error::{ensure, Result};
use crate::height_grid::GridFrame;
use crate::heightmap::NoiseConfig;
use crate::seeds::TerrainSeeds;

/// How droplets are scheduled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Total droplets to run
    pub droplets: usize,
    /// Run on rayon in batches of `batch_size`
    pub parallel: bool,
    pub batch_size: usize,
    /// Sequential mode only: spawn this many droplets per tick and step them
    /// together. 0 runs each droplet to termination before the next.
    pub spawn_per_tick: usize,
    /// Planar spawn rectangle; the whole terrain when absent
    pub spawn_area: Option<SpawnArea>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            droplets: 50_000,
            parallel: true,
            batch_size: 1024,
            spawn_per_tick: 0,
            spawn_area: None,
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<()> {
        ensure(self.batch_size >= 1, "batch.batch_size", self.batch_size as f64, "at least 1")?;
        if let Some(area) = &self.spawn_area {
            area.validate()?;
        }
        Ok(())
    }
}

/// Everything needed to generate and erode one terrain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SculptConfig {
    /// Master seed for noise and erosion
    pub seed: u64,
    /// Ignore `seed` and draw one from entropy
    pub randomize_seed: bool,
    pub terrain: GridFrame,
    pub noise: NoiseConfig,
    pub erosion: DropletParams,
    pub batch: BatchConfig,
}

impl Default for SculptConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            randomize_seed: false,
            terrain: GridFrame::default(),
            noise: NoiseConfig::default(),
            erosion: DropletParams::default(),
            batch: BatchConfig::default(),
        }
    }
}

impl SculptConfig {
    /// Read and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.terrain.validate()?;
        self.noise.validate()?;
        self.erosion.validate()?;
        self.batch.validate()
    }

    /// Seeds for this run. Entropy is consulted only when `randomize_seed` is set.
    pub fn resolve_seeds(&self) -> TerrainSeeds {
        if self.randomize_seed {
            TerrainSeeds::random()
        } else {
            TerrainSeeds::from_master(self.seed)
        }
    }

    /// Noise settings with the stage seed filled in.
    pub fn noise_config(&self, seeds: &TerrainSeeds) -> NoiseConfig {
        NoiseConfig {
            seed: seeds.noise,
            randomize_seed: false,
            ..self.noise.clone()
        }
    }

    pub fn spawn_area(&self) -> SpawnArea {
        self.batch
            .spawn_area
            .unwrap_or_else(|| SpawnArea::covering(&self.terrain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::erosion::DepositBrush;
    use crate::error::TerrainError;
    use glam::Vec2;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SculptConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{
            "seed": 7,
            "terrain": { "resolution": 65, "world_origin": [0, 0, 0], "world_size": [10, 2, 10] },
            "erosion": { "brush": "radial" },
            "batch": { "droplets": 10, "parallel": false }
        }"#;
        let config: SculptConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.terrain.resolution, 65);
        assert_eq!(config.erosion.brush, DepositBrush::Radial);
        assert_eq!(config.erosion.inertia, DropletParams::default().inertia);
        assert_eq!(config.batch.batch_size, BatchConfig::default().batch_size);
        assert_eq!(config.noise, NoiseConfig::default());
    }

    #[test]
    fn test_spawn_area_defaults_to_terrain() {
        let mut config = SculptConfig::default();
        let area = config.spawn_area();
        assert_eq!(area.min, Vec2::ZERO);
        assert_eq!(area.max, Vec2::new(50.0, 50.0));

        config.batch.spawn_area = Some(SpawnArea { min: Vec2::ONE, max: Vec2::splat(2.0) });
        assert_eq!(config.spawn_area().max, Vec2::splat(2.0));
    }

    #[test]
    fn test_validate_catches_nested_errors() {
        let mut config = SculptConfig::default();
        config.terrain.resolution = 1;
        assert!(matches!(config.validate(), Err(TerrainError::InvalidResolution(1))));

        let mut config = SculptConfig::default();
        config.batch.spawn_area = Some(SpawnArea { min: Vec2::splat(3.0), max: Vec2::ZERO });
        assert!(matches!(config.validate(), Err(TerrainError::InvalidSpawnArea { .. })));
    }

    #[test]
    fn test_save_load_roundtrip() {
        let path = std::env::temp_dir().join("terrain_sculptor_test_config.json");
        let mut config = SculptConfig::default();
        config.seed = 99;
        config.batch.spawn_per_tick = 50;

        config.save(&path).unwrap();
        let loaded = SculptConfig::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_seeds_follow_master() {
        let config = SculptConfig::default();
        let seeds = config.resolve_seeds();
        assert_eq!(seeds, TerrainSeeds::from_master(42));
        assert_eq!(config.noise_config(&seeds).seed, seeds.noise);
    }
}
