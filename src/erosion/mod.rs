//! Droplet-based hydraulic erosion
//!
//! - **droplet**: a single water droplet and its step rule
//! - **hydraulic**: spawning and running droplets (sequential, interleaved, parallel)
//! - **gradient**: discrete downhill estimators and sink diagnostics
//! - **params**: droplet constants and presets

pub mod droplet;
pub mod gradient;
pub mod hydraulic;
pub mod params;

pub use droplet::{
    step_droplet, Droplet, DropletState, ErosionBrush, StepOutcome, TerminationReason,
};
pub use gradient::{count_sinks, GradientStrategy};
pub use hydraulic::{
    run_batch, run_batch_parallel, ScatterOp, SimulationDriver, SpawnArea, StagedSurface,
};
pub use params::{DepositBrush, DropletParams, ErosionPreset};

/// How many droplets ended for each reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TerminationCounts {
    pub max_lifetime: usize,
    pub out_of_bounds: usize,
    pub stalled: usize,
}

impl TerminationCounts {
    pub fn record(&mut self, reason: TerminationReason) {
        match reason {
            TerminationReason::MaxLifetime => self.max_lifetime += 1,
            TerminationReason::OutOfBounds => self.out_of_bounds += 1,
            TerminationReason::Stalled => self.stalled += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.max_lifetime + self.out_of_bounds + self.stalled
    }
}

/// Statistics from erosion simulation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErosionStats {
    /// Total material eroded (in height units)
    pub total_eroded: f64,
    /// Total material deposited
    pub total_deposited: f64,
    /// Total number of droplet steps taken
    pub steps_taken: u64,
    /// Number of droplets spawned
    pub droplets: usize,
    /// Largest erosion in a single step
    pub max_erosion: f32,
    /// Largest deposition in a single step
    pub max_deposition: f32,
    pub terminations: TerminationCounts,
}

impl ErosionStats {
    /// Fold one droplet step into the totals.
    pub fn record_step(&mut self, outcome: &StepOutcome) {
        self.steps_taken += 1;
        self.total_eroded += outcome.eroded as f64;
        self.total_deposited += outcome.deposited as f64;
        self.max_erosion = self.max_erosion.max(outcome.eroded);
        self.max_deposition = self.max_deposition.max(outcome.deposited);
        if let DropletState::Terminated(reason) = outcome.state {
            self.terminations.record(reason);
        }
    }

    pub fn merge(&mut self, other: &ErosionStats) {
        self.total_eroded += other.total_eroded;
        self.total_deposited += other.total_deposited;
        self.steps_taken += other.steps_taken;
        self.droplets += other.droplets;
        self.max_erosion = self.max_erosion.max(other.max_erosion);
        self.max_deposition = self.max_deposition.max(other.max_deposition);
        self.terminations.max_lifetime += other.terminations.max_lifetime;
        self.terminations.out_of_bounds += other.terminations.out_of_bounds;
        self.terminations.stalled += other.terminations.stalled;
    }

    /// Net height added to the terrain. Negative means material is still
    /// suspended in droplets that left or ran dry.
    pub fn net_change(&self) -> f64 {
        self.total_deposited - self.total_eroded
    }
}

impl std::fmt::Display for ErosionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} droplets, {} steps, eroded {:.4}, deposited {:.4} ",
            self.droplets, self.steps_taken, self.total_eroded, self.total_deposited
        )?;
        write!(
            f,
            "(ended: {} lifetime, {} out of bounds, {} stalled)",
            self.terminations.max_lifetime,
            self.terminations.out_of_bounds,
            self.terminations.stalled
        )
    }
}
