//! Discrete downhill-direction estimators over integer grid cells.
//!
//! The droplet step samples a bilinear gradient at continuous positions; these
//! cell-based strategies answer "which way is down from this sample" and back
//! the sink diagnostics. Edge cells have no defined gradient and return zero.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::height_grid::{GridCoord, HeightGrid, HeightStorage};

/// Strategy for estimating the downhill direction at a grid cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradientStrategy {
    /// Unit offset toward the 8-neighbour with the steepest drop (D8)
    #[default]
    SteepestDescent,
    /// Negated, normalized central-difference gradient
    CentralDifference,
}

impl GradientStrategy {
    /// Unit downhill direction at `coord` as (dCol, dRow), or zero at the
    /// border, on flat ground, and (for steepest descent) in a pit.
    pub fn downhill<S: HeightStorage>(&self, grid: &HeightGrid<S>, coord: GridCoord) -> Vec2 {
        let n = grid.resolution();
        let GridCoord { col, row } = coord;
        if col == 0 || row == 0 || col >= n - 1 || row >= n - 1 {
            return Vec2::ZERO;
        }

        match self {
            Self::SteepestDescent => steepest_descent(grid, col, row),
            Self::CentralDifference => central_difference(grid, col, row),
        }
    }
}

fn steepest_descent<S: HeightStorage>(grid: &HeightGrid<S>, col: usize, row: usize) -> Vec2 {
    let storage = grid.storage();
    let current = storage.get_height(col, row);

    let mut steepest = Vec2::ZERO;
    let mut steepest_slope = 0.0f32;

    for dy in -1i32..=1 {
        for dx in -1i32..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let neighbor =
                storage.get_height((col as i32 + dx) as usize, (row as i32 + dy) as usize);
            let distance = ((dx * dx + dy * dy) as f32).sqrt();
            let slope = (current - neighbor) / distance;

            if slope > steepest_slope {
                steepest_slope = slope;
                steepest = Vec2::new(dx as f32, dy as f32);
            }
        }
    }

    steepest.normalize_or_zero()
}

fn central_difference<S: HeightStorage>(grid: &HeightGrid<S>, col: usize, row: usize) -> Vec2 {
    let storage = grid.storage();
    let d_col = (storage.get_height(col + 1, row) - storage.get_height(col - 1, row)) / 2.0;
    let d_row = (storage.get_height(col, row + 1) - storage.get_height(col, row - 1)) / 2.0;

    -Vec2::new(d_col, d_row).normalize_or_zero()
}

/// Number of interior cells with no downhill direction (pits and flats).
pub fn count_sinks<S: HeightStorage>(grid: &HeightGrid<S>, strategy: GradientStrategy) -> usize {
    let n = grid.resolution();
    if n < 3 {
        return 0;
    }

    let mut sinks = 0;
    for row in 1..n - 1 {
        for col in 1..n - 1 {
            if strategy.downhill(grid, GridCoord::new(col, row)) == Vec2::ZERO {
                sinks += 1;
            }
        }
    }
    sinks
}
