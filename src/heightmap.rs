use log::{info, warn};
use noise::{NoiseFn, Perlin};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{ensure, Result, TerrainError};
use crate::height_grid::{GridFrame, HeightGrid};
use crate::tilemap::Tilemap;

// =============================================================================
// NOISE PARAMETERS
// =============================================================================

/// Multi-octave noise settings for the initial elevation grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// Seed for octave offsets and the noise permutation table
    pub seed: u64,
    /// Draw a fresh seed from entropy instead of using `seed`
    pub randomize_seed: bool,
    /// Number of noise octaves
    pub octaves: u32,
    /// Amplitude decay per octave (0.0-1.0]
    pub persistence: f32,
    /// Frequency multiplier per octave
    pub lacunarity: f32,
    /// Frequency of the first octave across the whole grid
    pub initial_scale: f32,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            randomize_seed: false,
            octaves: 4,
            persistence: 0.5,
            lacunarity: 2.0,
            initial_scale: 2.0,
        }
    }
}

impl NoiseConfig {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure(self.octaves >= 1, "octaves", self.octaves as f64, "at least 1")?;
        ensure(
            self.persistence > 0.0 && self.persistence <= 1.0,
            "persistence",
            self.persistence as f64,
            "a value in (0, 1]",
        )?;
        ensure(self.lacunarity > 1.0, "lacunarity", self.lacunarity as f64, "a value above 1")?;
        ensure(
            self.initial_scale > 0.0 && self.initial_scale.is_finite(),
            "initial_scale",
            self.initial_scale as f64,
            "a positive finite value",
        )
    }

    /// Copy of this config with a concrete seed. Entropy is only consulted
    /// here, when `randomize_seed` is set.
    pub fn resolved(&self) -> Self {
        if self.randomize_seed {
            Self {
                seed: rand::random(),
                randomize_seed: false,
                ..self.clone()
            }
        } else {
            self.clone()
        }
    }
}

// =============================================================================
// NOISE FIELD
// =============================================================================

/// Seeded octave stack: one Perlin source sampled at per-octave offsets.
pub struct NoiseField {
    config: NoiseConfig,
    perlin: Perlin,
    offsets: Vec<(f64, f64)>,
}

impl NoiseField {
    /// Build the field. A randomized seed is drawn once, here.
    pub fn new(config: &NoiseConfig) -> Result<Self> {
        config.validate()?;
        let config = config.resolved();

        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let offsets = (0..config.octaves)
            .map(|_| {
                (
                    rng.gen_range(-1000..1000) as f64,
                    rng.gen_range(-1000..1000) as f64,
                )
            })
            .collect();
        let perlin = Perlin::new((config.seed ^ (config.seed >> 32)) as u32);

        Ok(Self { config, perlin, offsets })
    }

    /// The resolved seed actually used.
    pub fn seed(&self) -> u64 {
        self.config.seed
    }

    /// Weighted octave sum at normalized coordinates (u, v) in [0, 1).
    /// Each octave contributes noise in [0, 1].
    pub fn sample(&self, u: f64, v: f64) -> f32 {
        let mut total = 0.0f64;
        let mut scale = self.config.initial_scale as f64;
        let mut weight = 1.0f64;

        for &(ox, oy) in &self.offsets {
            let n = self.perlin.get([ox + u * scale, oy + v * scale]);
            total += (n * 0.5 + 0.5).clamp(0.0, 1.0) * weight;
            weight *= self.config.persistence as f64;
            scale *= self.config.lacunarity as f64;
        }

        total as f32
    }

    /// Fill a `resolution x resolution` grid and normalize it to [0, 1].
    pub fn generate(&self, resolution: usize) -> Result<GeneratedField> {
        if resolution < 2 {
            return Err(TerrainError::InvalidResolution(resolution));
        }

        let inv = 1.0 / resolution as f64;
        let mut heights = Tilemap::new_with(resolution, resolution, 0.0f32);
        heights
            .as_mut_slice()
            .par_chunks_mut(resolution)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, cell) in row.iter_mut().enumerate() {
                    *cell = self.sample(x as f64 * inv, y as f64 * inv);
                }
            });

        let (raw_min, raw_max) = heights.min_max();
        let normalized = normalize_heightmap(&mut heights);
        if !normalized {
            warn!(
                "Noise field is flat ({:.4}); leaving heights unnormalized",
                raw_min
            );
        }

        info!(
            "Generated {}x{} noise field (seed {}, {} octaves, raw range {:.4}..{:.4})",
            resolution, resolution, self.config.seed, self.config.octaves, raw_min, raw_max
        );

        Ok(GeneratedField {
            heights,
            seed: self.config.seed,
            raw_min,
            raw_max,
            normalized,
        })
    }
}

/// Output of [`generate_heightmap`].
#[derive(Clone, Debug)]
pub struct GeneratedField {
    /// Elevation samples, row-major
    pub heights: Tilemap<f32>,
    /// The seed actually used (differs from the config when randomized)
    pub seed: u64,
    /// Range before normalization
    pub raw_min: f32,
    pub raw_max: f32,
    /// False when every sample was equal and normalization was skipped
    pub normalized: bool,
}

impl GeneratedField {
    /// Place the generated heights in the world.
    pub fn into_grid(self, frame: GridFrame) -> Result<HeightGrid> {
        if frame.resolution != self.heights.width {
            return Err(TerrainError::GridSizeMismatch {
                expected: frame.resolution * frame.resolution,
                actual: self.heights.width * self.heights.height,
            });
        }
        HeightGrid::from_tilemap(frame, self.heights)
    }
}

// =============================================================================
// MAIN HEIGHTMAP GENERATION
// =============================================================================

/// Generate a normalized elevation grid from multi-octave noise.
///
/// Deterministic for a given resolved seed: the octave offsets come from a
/// seeded ChaCha stream and the Perlin table from the same seed.
pub fn generate_heightmap(resolution: usize, config: &NoiseConfig) -> Result<GeneratedField> {
    NoiseField::new(config)?.generate(resolution)
}

/// Rescale a heightmap in place to [0, 1].
/// Returns false (and leaves the map untouched) if every value is equal.
pub fn normalize_heightmap(heightmap: &mut Tilemap<f32>) -> bool {
    let (min_h, max_h) = heightmap.min_max();
    let range = max_h - min_h;
    if !(range.abs() > f32::EPSILON) {
        return false;
    }

    for (_, _, h) in heightmap.iter_mut() {
        *h = (*h - min_h) / range;
    }
    true
}
