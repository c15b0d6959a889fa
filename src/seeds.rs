//! Seed management for terrain generation
//!
//! One master seed derives a separate seed for the noise field and for the
//! erosion pass, so either stage can be varied while the other stays fixed.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Seeds for each generation stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TerrainSeeds {
    /// Master seed (used for display/reference)
    pub master: u64,
    /// Octave offsets and permutation table of the noise field
    pub noise: u64,
    /// Droplet spawn positions and headings
    pub erosion: u64,
}

impl TerrainSeeds {
    /// Create seeds from a master seed, deriving all sub-seeds deterministically.
    pub fn from_master(master: u64) -> Self {
        Self {
            master,
            noise: derive_seed(master, "noise"),
            erosion: derive_seed(master, "erosion"),
        }
    }

    /// Draw a fresh master seed from entropy.
    pub fn random() -> Self {
        Self::from_master(rand::random())
    }

    /// Override the noise seed
    pub fn with_noise(mut self, seed: u64) -> Self {
        self.noise = seed;
        self
    }

    /// Override the erosion seed
    pub fn with_erosion(mut self, seed: u64) -> Self {
        self.erosion = seed;
        self
    }
}

/// Derive a sub-seed from a master seed and a stage name.
fn derive_seed(master: u64, stage: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    master.hash(&mut hasher);
    stage.hash(&mut hasher);
    hasher.finish()
}

impl std::fmt::Display for TerrainSeeds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TerrainSeeds {{ master: {}, noise: {}, erosion: {} }}",
            self.master, self.noise, self.erosion
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_derivation() {
        assert_eq!(TerrainSeeds::from_master(12345), TerrainSeeds::from_master(12345));
    }

    #[test]
    fn test_stages_get_different_seeds() {
        let seeds = TerrainSeeds::from_master(12345);
        assert_ne!(seeds.noise, seeds.erosion);
        assert_ne!(seeds.noise, TerrainSeeds::from_master(12346).noise);
    }

    #[test]
    fn test_override_keeps_other_stage() {
        let seeds = TerrainSeeds::from_master(12345).with_erosion(99999);
        assert_eq!(seeds.erosion, 99999);
        assert_eq!(seeds.noise, TerrainSeeds::from_master(12345).noise);

        let seeds = TerrainSeeds::from_master(12345).with_noise(7);
        assert_eq!(seeds.noise, 7);
        assert_eq!(seeds.erosion, TerrainSeeds::from_master(12345).erosion);
        assert_eq!(seeds.master, 12345);
    }
}
