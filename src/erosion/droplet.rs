//! A single water droplet and its per-step update rule.
//!
//! Each step the droplet samples height and slope under itself, turns toward
//! the downhill direction (tempered by inertia), moves a fixed distance, and
//! then either erodes or deposits depending on how much sediment it can carry
//! at its current speed and water volume:
//!
//! ```text
//! capacity = max(-dh * speed * water * capacity_factor, min_capacity)
//! dh > 0 or sediment > capacity  => deposit
//! otherwise                      => erode min((capacity - sediment) * erode_speed, -dh)
//! ```
//!
//! Droplets never see each other; they interact only through the heights they
//! write into the shared surface.

use glam::{Vec2, Vec3};
use log::trace;
use rand::Rng;

use crate::erosion::params::{DepositBrush, DropletParams};
use crate::height_grid::{ErosionSurface, GridFrame, RadialBrush};

/// Below this speed a droplet is considered stuck.
pub const MIN_SPEED: f32 = 0.01;

/// Blended directions shorter than this cannot be normalized; the droplet
/// holds position for the tick.
const MIN_DIRECTION_LENGTH: f32 = 1e-6;

/// How a droplet spreads its erosion and deposition over the grid.
#[derive(Clone, Debug, PartialEq)]
pub enum ErosionBrush {
    Bilinear,
    Radial(RadialBrush),
}

impl ErosionBrush {
    /// The brush `params` select, sized for `frame`.
    pub fn new(params: &DropletParams, frame: &GridFrame) -> Self {
        match params.brush {
            DepositBrush::Bilinear => Self::Bilinear,
            DepositBrush::Radial => Self::Radial(RadialBrush::new(params.erosion_radius, frame)),
        }
    }

    /// Add `amount` at `position`; negative amounts erode.
    pub fn scatter<E>(&self, surface: &mut E, position: Vec3, amount: f32)
    where
        E: ErosionSurface + ?Sized,
    {
        match self {
            Self::Bilinear => surface.scatter_add_bilinear(position, amount),
            Self::Radial(brush) => surface.scatter_add_radial(position, amount, brush),
        }
    }
}

/// Why a droplet stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TerminationReason {
    /// Lifetime exhausted or no water left before a step
    MaxLifetime,
    /// Left the area where a 2x2 sample window exists
    OutOfBounds,
    /// Slowed to a halt or fully evaporated
    Stalled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropletState {
    Alive,
    Terminated(TerminationReason),
}

impl DropletState {
    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated(_))
    }
}

/// Result of a single step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepOutcome {
    pub state: DropletState,
    /// Material removed from the terrain this step
    pub eroded: f32,
    /// Material added to the terrain this step
    pub deposited: f32,
}

impl StepOutcome {
    fn quiet(state: DropletState) -> Self {
        Self {
            state,
            eroded: 0.0,
            deposited: 0.0,
        }
    }
}

/// A water droplet
#[derive(Clone, Debug, PartialEq)]
pub struct Droplet {
    /// World position. Y follows the terrain and is rewritten every step.
    pub position: Vec3,
    /// Unit travel direction in the X/Z plane
    pub direction: Vec2,
    pub speed: f32,
    pub water_volume: f32,
    /// Carried sediment, never negative
    pub sediment: f32,
    /// Steps taken so far
    pub lifetime: u32,
    pub state: DropletState,
    /// Running totals over the droplet's life
    pub total_eroded: f64,
    pub total_deposited: f64,
}

impl Droplet {
    pub fn new(position: Vec3, direction: Vec2, params: &DropletParams) -> Self {
        Self {
            position,
            direction: direction.normalize_or_zero(),
            speed: params.initial_speed,
            water_volume: params.initial_water_volume,
            sediment: 0.0,
            lifetime: 0,
            state: DropletState::Alive,
            total_eroded: 0.0,
            total_deposited: 0.0,
        }
    }

    /// Drop a droplet at a planar (X, Z) position with a random heading.
    pub fn spawn<E, R>(surface: &E, planar: Vec2, params: &DropletParams, rng: &mut R) -> Self
    where
        E: ErosionSurface + ?Sized,
        R: Rng,
    {
        let angle = rng.gen_range(0.0..std::f32::consts::TAU);
        let mut position = Vec3::new(planar.x, 0.0, planar.y);
        position.y = surface.sample_height(position);
        Self::new(position, Vec2::from_angle(angle), params)
    }

    pub fn is_alive(&self) -> bool {
        self.state == DropletState::Alive
    }

    fn terminate(&mut self, reason: TerminationReason) -> StepOutcome {
        trace!(
            "Droplet terminated ({:?}) after {} steps at ({:.3}, {:.3}), carrying {:.5}",
            reason,
            self.lifetime,
            self.position.x,
            self.position.z,
            self.sediment
        );
        self.state = DropletState::Terminated(reason);
        StepOutcome::quiet(self.state)
    }

    /// Advance one time step, reading from and writing to `surface`.
    /// Terminated droplets are left untouched.
    ///
    /// Builds the brush on every call; drivers stepping many droplets use
    /// [`step_with_brush`](Self::step_with_brush) instead.
    pub fn step<E>(&mut self, surface: &mut E, params: &DropletParams) -> StepOutcome
    where
        E: ErosionSurface + ?Sized,
    {
        let brush = ErosionBrush::new(params, surface.frame());
        self.step_with_brush(surface, params, &brush)
    }

    /// [`step`](Self::step) with a brush built once by the caller.
    pub fn step_with_brush<E>(
        &mut self,
        surface: &mut E,
        params: &DropletParams,
        brush: &ErosionBrush,
    ) -> StepOutcome
    where
        E: ErosionSurface + ?Sized,
    {
        if self.state.is_terminated() {
            return StepOutcome::quiet(self.state);
        }

        if self.lifetime > params.max_lifetime || self.water_volume <= 0.0 {
            return self.terminate(TerminationReason::MaxLifetime);
        }
        self.lifetime += 1;

        if !surface.frame().contains_sample_window(self.position) {
            return self.terminate(TerminationReason::OutOfBounds);
        }

        let current_height = surface.sample_height(self.position);
        let gradient = surface.sample_gradient(self.position);

        // Turn toward downhill, keeping some of the previous heading
        let blended = self.direction * params.inertia - gradient * (1.0 - params.inertia);
        let displacement = if blended.length() > MIN_DIRECTION_LENGTH {
            self.direction = blended.normalize();
            self.direction * params.step_length
        } else {
            Vec2::ZERO
        };

        self.position.x += displacement.x;
        self.position.z += displacement.y;
        let new_height = surface.sample_height(self.position);
        self.position.y = new_height;

        let delta_height = new_height - current_height;

        let capacity = (-delta_height
            * self.speed
            * self.water_volume
            * params.sediment_capacity_factor)
            .max(params.min_sediment_capacity);

        let mut outcome = StepOutcome::quiet(DropletState::Alive);

        if self.sediment > capacity || delta_height > 0.0 {
            // Uphill: fill the hole behind us. Over capacity: drop the excess.
            let deposit_amount = if delta_height > 0.0 {
                self.sediment.min(delta_height)
            } else {
                (self.sediment - capacity) * params.deposit_speed
            };

            if deposit_amount > 0.0 && deposit_amount.is_finite() {
                brush.scatter(surface, self.position, deposit_amount);
                self.sediment -= deposit_amount;
                self.total_deposited += deposit_amount as f64;
                outcome.deposited = deposit_amount;
            }
        } else {
            // Never dig deeper than the drop we just made
            let erode_amount = ((capacity - self.sediment) * params.erode_speed).min(-delta_height);

            if erode_amount > 0.0 && erode_amount.is_finite() {
                brush.scatter(surface, self.position, -erode_amount);
                self.sediment += erode_amount;
                self.total_eroded += erode_amount as f64;
                outcome.eroded = erode_amount;
            }
        }
        self.sediment = self.sediment.max(0.0);

        self.speed = (self.speed * self.speed + delta_height * params.gravity).max(0.0).sqrt();
        self.water_volume *= 1.0 - params.evaporate_speed;

        if self.speed <= MIN_SPEED || self.water_volume <= 0.0 {
            let mut stalled = self.terminate(TerminationReason::Stalled);
            stalled.eroded = outcome.eroded;
            stalled.deposited = outcome.deposited;
            return stalled;
        }

        outcome
    }
}

/// Host-facing step: consume a droplet, advance it once, and hand back the
/// new state together with whether it has terminated.
pub fn step_droplet<E>(
    mut droplet: Droplet,
    surface: &mut E,
    params: &DropletParams,
) -> (Droplet, bool)
where
    E: ErosionSurface + ?Sized,
{
    let outcome = droplet.step(surface, params);
    (droplet, outcome.state.is_terminated())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::height_grid::{GridFrame, HeightGrid};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn grid_from(resolution: usize, f: impl Fn(usize, usize) -> f32) -> HeightGrid {
        let heights = (0..resolution * resolution)
            .map(|i| f(i % resolution, i / resolution))
            .collect();
        HeightGrid::from_heights(GridFrame::unit(resolution).unwrap(), heights).unwrap()
    }

    #[test]
    fn test_dry_droplet_terminates_without_writing() {
        let mut grid = grid_from(5, |c, _| c as f32 / 4.0);
        let before = grid.to_tilemap();
        let params = DropletParams {
            initial_water_volume: 0.0,
            ..Default::default()
        };
        let mut droplet = Droplet::new(Vec3::new(2.0, 0.0, 2.0), Vec2::X, &params);

        let outcome = droplet.step(&mut grid, &params);
        assert_eq!(outcome.state, DropletState::Terminated(TerminationReason::MaxLifetime));
        assert_eq!(grid.to_tilemap(), before);
    }

    #[test]
    fn test_expired_droplet_terminates_with_max_lifetime() {
        let mut grid = grid_from(5, |c, _| c as f32 / 4.0);
        let before = grid.to_tilemap();
        let params = DropletParams::default();
        let mut droplet = Droplet::new(Vec3::new(2.0, 0.0, 2.0), Vec2::X, &params);
        droplet.lifetime = params.max_lifetime + 1;

        let (droplet, terminated) = step_droplet(droplet, &mut grid, &params);
        assert!(terminated);
        assert_eq!(droplet.state, DropletState::Terminated(TerminationReason::MaxLifetime));
        assert_eq!(grid.to_tilemap(), before);
    }

    #[test]
    fn test_terminated_state_is_absorbing() {
        let mut grid = grid_from(5, |c, _| c as f32 / 4.0);
        let params = DropletParams::default();
        let mut droplet = Droplet::new(Vec3::new(-1.0, 0.0, 2.0), Vec2::X, &params);

        let first = droplet.step(&mut grid, &params);
        assert_eq!(first.state, DropletState::Terminated(TerminationReason::OutOfBounds));
        let snapshot = droplet.clone();
        let again = droplet.step(&mut grid, &params);
        assert_eq!(again.state, first.state);
        assert_eq!(droplet, snapshot);
    }

    #[test]
    fn test_far_edge_is_out_of_bounds() {
        let mut grid = grid_from(5, |_, _| 0.5);
        let params = DropletParams::default();
        let mut droplet = Droplet::new(Vec3::new(4.0, 0.0, 1.0), Vec2::X, &params);
        assert_eq!(
            droplet.step(&mut grid, &params).state,
            DropletState::Terminated(TerminationReason::OutOfBounds)
        );
    }

    #[test]
    fn test_zero_blend_holds_position() {
        let mut grid = grid_from(5, |_, _| 0.5);
        let params = DropletParams {
            inertia: 0.0,
            ..Default::default()
        };
        let start = Vec3::new(2.0, 0.5, 2.0);
        let mut droplet = Droplet::new(start, Vec2::X, &params);

        let outcome = droplet.step(&mut grid, &params);
        assert_eq!(outcome.state, DropletState::Alive);
        assert_eq!(droplet.lifetime, 1);
        assert_eq!(droplet.position.x, start.x);
        assert_eq!(droplet.position.z, start.z);
        assert_eq!(droplet.direction, Vec2::X);
    }

    #[test]
    fn test_slow_droplet_stalls() {
        let mut grid = grid_from(5, |_, _| 0.5);
        let params = DropletParams {
            initial_speed: 0.005,
            ..Default::default()
        };
        let mut droplet = Droplet::new(Vec3::new(2.0, 0.0, 2.0), Vec2::Y, &params);
        assert_eq!(
            droplet.step(&mut grid, &params).state,
            DropletState::Terminated(TerminationReason::Stalled)
        );
    }

    #[test]
    fn test_downhill_step_erodes() {
        let mut grid = grid_from(5, |c, _| c as f32 / 4.0);
        let before = grid.to_tilemap().sum();
        let params = DropletParams {
            inertia: 0.0,
            step_length: 0.25,
            ..Default::default()
        };
        let mut droplet = Droplet::new(Vec3::new(3.0, 0.0, 2.0), Vec2::Y, &params);

        let outcome = droplet.step(&mut grid, &params);
        assert!(droplet.position.x < 3.0);
        assert!((droplet.direction - Vec2::new(-1.0, 0.0)).length() < 1e-6);
        assert!(outcome.eroded > 0.0);
        assert_eq!(outcome.deposited, 0.0);
        assert!((droplet.sediment - outcome.eroded).abs() < 1e-7);

        let after = grid.to_tilemap().sum();
        assert!((before - after - outcome.eroded as f64).abs() < 1e-5);
    }

    #[test]
    fn test_uphill_step_deposits_into_the_rise() {
        let mut grid = grid_from(5, |c, _| c as f32 / 4.0);
        let params = DropletParams {
            inertia: 1.0,
            gravity: 0.0,
            step_length: 0.1,
            ..Default::default()
        };
        let mut droplet = Droplet::new(Vec3::new(1.5, 0.0, 2.0), Vec2::X, &params);
        droplet.sediment = 0.5;

        let outcome = droplet.step(&mut grid, &params);
        // Rise over 0.1 cells on a 0.25/cell ramp
        assert!((outcome.deposited - 0.025).abs() < 1e-5);
        assert!((droplet.sediment - 0.475).abs() < 1e-5);
        assert_eq!(outcome.eroded, 0.0);
    }

    #[test]
    fn test_spawn_direction_is_unit_and_height_sampled() {
        let grid = grid_from(5, |c, _| c as f32 / 4.0);
        let params = DropletParams::default();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..20 {
            let droplet = Droplet::spawn(&grid, Vec2::new(2.0, 1.0), &params, &mut rng);
            assert!((droplet.direction.length() - 1.0).abs() < 1e-5);
            assert!((droplet.position.y - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_sediment_never_negative() {
        let mut grid = grid_from(9, |c, r| ((c * 7 + r * 3) % 5) as f32 / 5.0);
        let params = DropletParams {
            deposit_speed: 1.0,
            step_length: 0.4,
            max_lifetime: 200,
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..50 {
            let planar = Vec2::new(rng.gen_range(0.0..8.0), rng.gen_range(0.0..8.0));
            let mut droplet = Droplet::spawn(&grid, planar, &params, &mut rng);
            while droplet.is_alive() {
                droplet.step(&mut grid, &params);
                assert!(droplet.sediment >= 0.0);
            }
        }
    }

    #[test]
    fn test_radial_brush_matches_across_step_forms() {
        let params = DropletParams {
            brush: DepositBrush::Radial,
            erosion_radius: 2.5,
            step_length: 0.5,
            ..Default::default()
        };
        let mut built_per_step = grid_from(9, |c, r| (c + r) as f32 / 16.0);
        let mut built_once = built_per_step.clone();
        let brush = ErosionBrush::new(&params, built_once.frame());
        assert!(matches!(brush, ErosionBrush::Radial(ref b) if b.len() > 1));

        let mut a = Droplet::new(Vec3::new(6.5, 0.0, 6.2), Vec2::X, &params);
        let mut b = a.clone();
        while a.is_alive() {
            assert_eq!(
                a.step(&mut built_per_step, &params),
                b.step_with_brush(&mut built_once, &params, &brush)
            );
        }
        assert_eq!(a, b);
        assert_eq!(built_per_step.to_tilemap(), built_once.to_tilemap());
    }
}
