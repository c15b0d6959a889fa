//! Droplet erosion parameters and configuration

use serde::{Deserialize, Serialize};

use crate::error::{ensure, Result};

/// Erosion intensity preset
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErosionPreset {
    /// Slow carving, short-lived droplets
    Gentle,
    /// Balanced erosion
    #[default]
    Default,
    /// Fast carving, long-lived droplets - deep gullies
    Aggressive,
}

impl ErosionPreset {
    pub fn all() -> &'static [Self] {
        &[Self::Gentle, Self::Default, Self::Aggressive]
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Gentle => "Subtle smoothing",
            Self::Default => "Balanced erosion",
            Self::Aggressive => "Deep gullies and fans",
        }
    }
}

impl std::fmt::Display for ErosionPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gentle => write!(f, "gentle"),
            Self::Default => write!(f, "default"),
            Self::Aggressive => write!(f, "aggressive"),
        }
    }
}

impl std::str::FromStr for ErosionPreset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gentle" => Ok(Self::Gentle),
            "default" => Ok(Self::Default),
            "aggressive" => Ok(Self::Aggressive),
            other => Err(format!("unknown erosion preset '{}'", other)),
        }
    }
}

/// How a droplet writes its erosion and deposition into the grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepositBrush {
    /// Spread over the 2x2 cells under the droplet by bilinear weights
    #[default]
    Bilinear,
    /// Linear falloff over every cell within `erosion_radius`
    Radial,
}

/// Physical constants of a water droplet. Immutable during a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DropletParams {
    /// Momentum conservation factor (0.0-1.0)
    /// Higher values = droplets keep their heading instead of following the slope
    pub inertia: f32,

    /// Acceleration from height loss
    pub gravity: f32,

    /// Fraction of water lost per step (0.0-1.0)
    pub evaporate_speed: f32,

    /// Sediment carrying capacity multiplier
    pub sediment_capacity_factor: f32,

    /// Capacity floor, so a droplet on flat ground can still carry something
    pub min_sediment_capacity: f32,

    /// Fraction of spare capacity eroded per step (0.0-1.0)
    pub erode_speed: f32,

    /// Fraction of excess sediment deposited per step (0.0-1.0)
    pub deposit_speed: f32,

    /// Brush radius in cells, used by the radial brush
    pub erosion_radius: f32,

    /// Maximum number of steps per droplet
    pub max_lifetime: u32,

    pub initial_speed: f32,

    pub initial_water_volume: f32,

    /// World distance travelled per step
    pub step_length: f32,

    /// Scatter operation used for erosion and deposition
    pub brush: DepositBrush,
}

impl Default for DropletParams {
    fn default() -> Self {
        Self {
            inertia: 0.05,
            gravity: 4.0,
            evaporate_speed: 0.01,
            sediment_capacity_factor: 4.0,
            min_sediment_capacity: 0.01,
            erode_speed: 0.03,
            deposit_speed: 0.03,
            erosion_radius: 3.0,
            max_lifetime: 30,
            initial_speed: 1.0,
            initial_water_volume: 1.0,
            step_length: 0.025,
            brush: DepositBrush::Bilinear,
        }
    }
}

impl DropletParams {
    /// Create parameters from a preset
    pub fn from_preset(preset: ErosionPreset) -> Self {
        match preset {
            ErosionPreset::Gentle => Self {
                erode_speed: 0.01,
                deposit_speed: 0.05,
                evaporate_speed: 0.02,
                max_lifetime: 20,
                ..Default::default()
            },
            ErosionPreset::Default => Self::default(),
            ErosionPreset::Aggressive => Self {
                erode_speed: 0.1,
                deposit_speed: 0.02,
                sediment_capacity_factor: 8.0,
                evaporate_speed: 0.005,
                max_lifetime: 80,
                ..Default::default()
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        unit_interval("inertia", self.inertia)?;
        unit_interval("evaporate_speed", self.evaporate_speed)?;
        unit_interval("erode_speed", self.erode_speed)?;
        ensure(
            self.deposit_speed > 0.0 && self.deposit_speed <= 1.0,
            "deposit_speed",
            self.deposit_speed as f64,
            "a value in (0, 1]",
        )?;
        non_negative("gravity", self.gravity)?;
        non_negative("sediment_capacity_factor", self.sediment_capacity_factor)?;
        non_negative("min_sediment_capacity", self.min_sediment_capacity)?;
        non_negative("initial_speed", self.initial_speed)?;
        non_negative("initial_water_volume", self.initial_water_volume)?;
        ensure(
            self.erosion_radius > 0.0 && self.erosion_radius.is_finite(),
            "erosion_radius",
            self.erosion_radius as f64,
            "a positive finite radius",
        )?;
        ensure(
            self.step_length > 0.0 && self.step_length.is_finite(),
            "step_length",
            self.step_length as f64,
            "a positive finite distance",
        )
    }
}

fn unit_interval(name: &'static str, value: f32) -> Result<()> {
    ensure((0.0..=1.0).contains(&value), name, value as f64, "a value in [0, 1]")
}

fn non_negative(name: &'static str, value: f32) -> Result<()> {
    ensure(value >= 0.0 && value.is_finite(), name, value as f64, "a non-negative finite value")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TerrainError;

    #[test]
    fn test_presets_are_valid() {
        for &preset in ErosionPreset::all() {
            assert!(DropletParams::from_preset(preset).validate().is_ok(), "{}", preset);
        }
    }

    #[test]
    fn test_rejects_non_positive_radius() {
        let params = DropletParams {
            erosion_radius: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(TerrainError::InvalidParameter { name: "erosion_radius", .. })
        ));
    }

    #[test]
    fn test_rejects_out_of_range_rates() {
        for params in [
            DropletParams { inertia: 1.5, ..Default::default() },
            DropletParams { deposit_speed: 0.0, ..Default::default() },
            DropletParams { evaporate_speed: -0.1, ..Default::default() },
            DropletParams { gravity: f32::NAN, ..Default::default() },
            DropletParams { step_length: 0.0, ..Default::default() },
        ] {
            assert!(params.validate().is_err(), "{:?}", params);
        }
    }

    #[test]
    fn test_preset_parsing() {
        assert_eq!("Aggressive".parse::<ErosionPreset>(), Ok(ErosionPreset::Aggressive));
        assert!("wild".parse::<ErosionPreset>().is_err());
    }

    #[test]
    fn test_params_json_fills_defaults() {
        let json = r#"{ "inertia": 0.2, "brush": "radial" }"#;
        let params: DropletParams = serde_json::from_str(json).unwrap();
        assert_eq!(params.inertia, 0.2);
        assert_eq!(params.brush, DepositBrush::Radial);
        assert_eq!(params.max_lifetime, DropletParams::default().max_lifetime);
    }
}
