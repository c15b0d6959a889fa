//! The mutable elevation grid and its world-space frame.
//!
//! A `HeightGrid` pairs a square height storage with the world placement of the
//! terrain (origin and extent). All reads go through bilinear sampling over a
//! clamped 2x2 window, and all writes go through one of the two scatter
//! operations, so no access can land outside the grid.
//!
//! Coordinates: `col` runs along world X, `row` along world Z. Planar positions
//! are carried as `Vec3` with the Y component ignored by the grid maths.

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{ensure, Result, TerrainError};
use crate::tilemap::Tilemap;

/// Integer grid coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GridCoord {
    pub col: usize,
    pub row: usize,
}

impl GridCoord {
    pub fn new(col: usize, row: usize) -> Self {
        Self { col, row }
    }
}

/// World placement of a square grid.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridFrame {
    /// Grid side length in samples (`resolution x resolution` cells).
    pub resolution: usize,
    /// World position of cell (0, 0).
    pub world_origin: Vec3,
    /// World extent (width, height, depth). Y is carried for the host only.
    pub world_size: Vec3,
}

impl Default for GridFrame {
    fn default() -> Self {
        Self {
            resolution: 257,
            world_origin: Vec3::ZERO,
            world_size: Vec3::new(50.0, 10.0, 50.0),
        }
    }
}

impl GridFrame {
    pub fn new(resolution: usize, world_origin: Vec3, world_size: Vec3) -> Result<Self> {
        let frame = Self { resolution, world_origin, world_size };
        frame.validate()?;
        Ok(frame)
    }

    /// Unit-sized frame where world X/Z equal grid coordinates.
    pub fn unit(resolution: usize) -> Result<Self> {
        let span = resolution.saturating_sub(1) as f32;
        Self::new(resolution, Vec3::ZERO, Vec3::new(span, 1.0, span))
    }

    pub fn validate(&self) -> Result<()> {
        if self.resolution < 2 {
            return Err(TerrainError::InvalidResolution(self.resolution));
        }
        ensure(
            self.world_size.x > 0.0 && self.world_size.x.is_finite(),
            "world_size.x",
            self.world_size.x as f64,
            "a positive finite extent",
        )?;
        ensure(
            self.world_size.z > 0.0 && self.world_size.z.is_finite(),
            "world_size.z",
            self.world_size.z as f64,
            "a positive finite extent",
        )
    }

    /// Highest valid index along either axis.
    pub(crate) fn max_index(&self) -> usize {
        self.resolution - 1
    }

    /// World distance between neighbouring samples along X and Z.
    pub fn cell_pitch(&self) -> Vec2 {
        let span = self.max_index() as f32;
        Vec2::new(self.world_size.x / span, self.world_size.z / span)
    }

    /// Planar world extent covered by the grid, as (min, max) in X/Z.
    pub fn planar_bounds(&self) -> (Vec2, Vec2) {
        let min = Vec2::new(self.world_origin.x, self.world_origin.z);
        let max = min + Vec2::new(self.world_size.x, self.world_size.z);
        (min, max)
    }

    /// Continuous grid coordinate of a world position, without clamping.
    pub fn world_to_grid_f(&self, pos: Vec3) -> Vec2 {
        let span = self.max_index() as f32;
        Vec2::new(
            (pos.x - self.world_origin.x) / self.world_size.x * span,
            (pos.z - self.world_origin.z) / self.world_size.z * span,
        )
    }

    /// Grid cell containing a world position. Positions outside the terrain
    /// are clamped onto its border.
    pub fn world_to_grid(&self, pos: Vec3) -> GridCoord {
        let rel_x = ((pos.x - self.world_origin.x) / self.world_size.x).clamp(0.0, 1.0);
        let rel_z = ((pos.z - self.world_origin.z) / self.world_size.z).clamp(0.0, 1.0);
        let span = self.max_index() as f32;
        GridCoord {
            col: ((rel_x * span).floor() as usize).min(self.max_index()),
            row: ((rel_z * span).floor() as usize).min(self.max_index()),
        }
    }

    /// Planar world position (X, Z) of a grid sample.
    pub fn grid_to_world_planar(&self, coord: GridCoord) -> Vec2 {
        let span = self.max_index() as f32;
        Vec2::new(
            self.world_origin.x + coord.col as f32 / span * self.world_size.x,
            self.world_origin.z + coord.row as f32 / span * self.world_size.z,
        )
    }

    /// Whether a position has a full 2x2 sampling window inside the grid,
    /// i.e. its grid coordinate lies in `[0, resolution - 1)` on both axes.
    pub fn contains_sample_window(&self, pos: Vec3) -> bool {
        let g = self.world_to_grid_f(pos);
        let limit = self.max_index() as f32;
        g.x >= 0.0 && g.y >= 0.0 && g.x < limit && g.y < limit
    }

    /// The 2x2 neighbourhood used for sampling and bilinear writes.
    pub fn bilinear_footprint(&self, pos: Vec3) -> BilinearFootprint {
        let limit = self.max_index() as f32;
        let g = self.world_to_grid_f(pos);
        let gx = if g.x.is_finite() { g.x.clamp(0.0, limit) } else { 0.0 };
        let gz = if g.y.is_finite() { g.y.clamp(0.0, limit) } else { 0.0 };

        let col = (gx.floor() as usize).min(self.resolution - 2);
        let row = (gz.floor() as usize).min(self.resolution - 2);

        BilinearFootprint {
            col,
            row,
            frac_x: gx - col as f32,
            frac_z: gz - row as f32,
        }
    }
}

/// Cell offsets within a radius of a center cell, with linear falloff weights
/// `1 - d / radius`. Built once per run and shifted to each write position.
#[derive(Clone, Debug, PartialEq)]
pub struct RadialBrush {
    reach: usize,
    offsets: Vec<(isize, isize, f32)>,
}

impl RadialBrush {
    /// Offsets further than the frame's last index can never land on the grid,
    /// so the reach is capped there.
    pub fn new(radius: f32, frame: &GridFrame) -> Self {
        if !(radius > 0.0) {
            return Self { reach: 0, offsets: Vec::new() };
        }

        let reach = (radius.ceil() as usize).min(frame.max_index());
        let r = reach as isize;
        let mut offsets = Vec::new();
        for dz in -r..=r {
            for dx in -r..=r {
                let distance = ((dx * dx + dz * dz) as f32).sqrt();
                if distance < radius {
                    offsets.push((dx, dz, (1.0 - distance / radius).max(0.0)));
                }
            }
        }
        Self { reach, offsets }
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Inclusive (min, max) corners of the brush around `center`, cropped to the frame.
    pub fn bounds(&self, frame: &GridFrame, center: GridCoord) -> (GridCoord, GridCoord) {
        let last = frame.max_index();
        (
            GridCoord::new(
                center.col.saturating_sub(self.reach),
                center.row.saturating_sub(self.reach),
            ),
            GridCoord::new(
                center.col.saturating_add(self.reach).min(last),
                center.row.saturating_add(self.reach).min(last),
            ),
        )
    }

    /// Cells and weights around the cell under `pos`, cropped to the frame.
    pub fn cells(
        &self,
        frame: GridFrame,
        pos: Vec3,
    ) -> impl Iterator<Item = (GridCoord, f32)> + '_ {
        let center = frame.world_to_grid(pos);
        let last = frame.max_index() as isize;
        self.offsets.iter().filter_map(move |&(dx, dz, weight)| {
            let col = center.col as isize + dx;
            let row = center.row as isize + dz;
            (col >= 0 && row >= 0 && col <= last && row <= last)
                .then(|| (GridCoord::new(col as usize, row as usize), weight))
        })
    }
}

/// Base cell and fractional offsets of a bilinear 2x2 window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BilinearFootprint {
    pub col: usize,
    pub row: usize,
    pub frac_x: f32,
    pub frac_z: f32,
}

impl BilinearFootprint {
    /// The four cells and their bilinear weights. Weights sum to 1.
    pub fn weights(&self) -> [(GridCoord, f32); 4] {
        let (fx, fz) = (self.frac_x, self.frac_z);
        [
            (GridCoord::new(self.col, self.row), (1.0 - fx) * (1.0 - fz)),
            (GridCoord::new(self.col, self.row + 1), (1.0 - fx) * fz),
            (GridCoord::new(self.col + 1, self.row), fx * (1.0 - fz)),
            (GridCoord::new(self.col + 1, self.row + 1), fx * fz),
        ]
    }

    /// Bilinear interpolation of the corner heights `[h00, h10, h01, h11]`,
    /// where the first digit is the X offset and the second the Z offset.
    pub fn interpolate(&self, corners: [f32; 4]) -> f32 {
        let [h00, h10, h01, h11] = corners;
        let (fx, fz) = (self.frac_x, self.frac_z);
        h00 * (1.0 - fx) * (1.0 - fz)
            + h10 * fx * (1.0 - fz)
            + h01 * (1.0 - fx) * fz
            + h11 * fx * fz
    }

    /// Height gradient (dX, dZ) across the window, in height per cell.
    pub fn gradient(&self, corners: [f32; 4]) -> Vec2 {
        let [h00, h10, h01, h11] = corners;
        let (fx, fz) = (self.frac_x, self.frac_z);
        Vec2::new(
            (h10 - h00) * (1.0 - fz) + (h11 - h01) * fz,
            (h01 - h00) * (1.0 - fx) + (h11 - h10) * fx,
        )
    }
}

/// Host-side height storage with cell and rectangular-region access.
///
/// The grid never assumes a layout beyond (col, row) addressability, so a host
/// engine's terrain data can back a `HeightGrid` directly.
pub trait HeightStorage {
    /// Side length of the square storage.
    fn resolution(&self) -> usize;

    fn get_height(&self, col: usize, row: usize) -> f32;

    /// Copy the block of `width x height` cells starting at (col, row).
    fn get_heights(&self, col: usize, row: usize, width: usize, height: usize) -> Tilemap<f32>;

    /// Overwrite the block starting at (col, row) with `values`.
    fn set_heights(&mut self, col: usize, row: usize, values: &Tilemap<f32>);
}

impl HeightStorage for Tilemap<f32> {
    fn resolution(&self) -> usize {
        self.width
    }

    fn get_height(&self, col: usize, row: usize) -> f32 {
        *self.get(col, row)
    }

    fn get_heights(&self, col: usize, row: usize, width: usize, height: usize) -> Tilemap<f32> {
        self.region(col, row, width, height)
    }

    fn set_heights(&mut self, col: usize, row: usize, values: &Tilemap<f32>) {
        self.set_region(col, row, values);
    }
}

/// Full-grid copy taken with [`HeightGrid::snapshot`].
#[derive(Clone, Debug, PartialEq)]
pub struct HeightSnapshot {
    heights: Tilemap<f32>,
}

impl HeightSnapshot {
    pub fn heights(&self) -> &Tilemap<f32> {
        &self.heights
    }

    pub fn resolution(&self) -> usize {
        self.heights.width
    }
}

/// Elevation grid placed in world space.
#[derive(Clone, Debug)]
pub struct HeightGrid<S = Tilemap<f32>> {
    frame: GridFrame,
    storage: S,
}

impl HeightGrid<Tilemap<f32>> {
    /// Flat grid at height zero.
    pub fn new(frame: GridFrame) -> Result<Self> {
        frame.validate()?;
        let storage = Tilemap::new_with(frame.resolution, frame.resolution, 0.0f32);
        Ok(Self { frame, storage })
    }

    /// Grid from a row-major buffer of `resolution^2` heights.
    pub fn from_heights(frame: GridFrame, heights: Vec<f32>) -> Result<Self> {
        frame.validate()?;
        let expected = frame.resolution * frame.resolution;
        let actual = heights.len();
        let storage = Tilemap::from_vec(frame.resolution, frame.resolution, heights)
            .ok_or(TerrainError::GridSizeMismatch { expected, actual })?;
        Ok(Self { frame, storage })
    }

    pub fn from_tilemap(frame: GridFrame, heights: Tilemap<f32>) -> Result<Self> {
        if heights.width != heights.height {
            return Err(TerrainError::GridSizeMismatch {
                expected: frame.resolution * frame.resolution,
                actual: heights.width * heights.height,
            });
        }
        Self::with_storage(frame, heights)
    }

    /// Copy of the heights as a plain tilemap.
    pub fn to_tilemap(&self) -> Tilemap<f32> {
        self.storage.clone()
    }
}

impl<S: HeightStorage> HeightGrid<S> {
    /// Wrap host-provided storage. Its resolution must match the frame.
    pub fn with_storage(frame: GridFrame, storage: S) -> Result<Self> {
        frame.validate()?;
        let actual = storage.resolution();
        if actual != frame.resolution {
            return Err(TerrainError::GridSizeMismatch {
                expected: frame.resolution * frame.resolution,
                actual: actual * actual,
            });
        }
        Ok(Self { frame, storage })
    }

    pub fn frame(&self) -> &GridFrame {
        &self.frame
    }

    pub fn resolution(&self) -> usize {
        self.frame.resolution
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Height of a single sample. Indices are clamped to the grid.
    pub fn height(&self, coord: GridCoord) -> f32 {
        let max = self.frame.resolution - 1;
        self.storage.get_height(coord.col.min(max), coord.row.min(max))
    }

    pub fn world_to_grid(&self, pos: Vec3) -> GridCoord {
        self.frame.world_to_grid(pos)
    }

    /// World position of a sample; Y is the origin height plus the grid value.
    pub fn grid_to_world(&self, coord: GridCoord) -> Vec3 {
        let planar = self.frame.grid_to_world_planar(coord);
        Vec3::new(planar.x, self.frame.world_origin.y + self.height(coord), planar.y)
    }

    fn corners(&self, fp: &BilinearFootprint) -> [f32; 4] {
        [
            self.storage.get_height(fp.col, fp.row),
            self.storage.get_height(fp.col + 1, fp.row),
            self.storage.get_height(fp.col, fp.row + 1),
            self.storage.get_height(fp.col + 1, fp.row + 1),
        ]
    }

    /// Bilinearly interpolated height under a world position.
    pub fn sample_height(&self, pos: Vec3) -> f32 {
        let fp = self.frame.bilinear_footprint(pos);
        fp.interpolate(self.corners(&fp))
    }

    /// Raw height gradient (dX, dZ) under a world position.
    pub fn sample_gradient(&self, pos: Vec3) -> Vec2 {
        let fp = self.frame.bilinear_footprint(pos);
        fp.gradient(self.corners(&fp))
    }

    /// Unit gradient direction, or zero on flat ground.
    pub fn sample_gradient_normalized(&self, pos: Vec3) -> Vec2 {
        self.sample_gradient(pos).normalize_or_zero()
    }

    /// Add `amount` spread over the 2x2 window by bilinear weights.
    pub fn scatter_add_bilinear(&mut self, pos: Vec3, amount: f32) {
        let fp = self.frame.bilinear_footprint(pos);
        let mut block = self.storage.get_heights(fp.col, fp.row, 2, 2);
        for (coord, weight) in fp.weights() {
            *block.get_mut(coord.col - fp.col, coord.row - fp.row) += amount * weight;
        }
        self.storage.set_heights(fp.col, fp.row, &block);
    }

    /// Add `amount` weighted by `brush` around the cell under `pos`.
    pub fn scatter_add_radial(&mut self, pos: Vec3, amount: f32, brush: &RadialBrush) {
        if brush.is_empty() {
            return;
        }
        let (min, max) = brush.bounds(&self.frame, self.frame.world_to_grid(pos));
        let mut block = self.storage.get_heights(
            min.col,
            min.row,
            max.col - min.col + 1,
            max.row - min.row + 1,
        );
        for (coord, weight) in brush.cells(self.frame, pos) {
            *block.get_mut(coord.col - min.col, coord.row - min.row) += amount * weight;
        }
        self.storage.set_heights(min.col, min.row, &block);
    }

    /// Deep copy of every height.
    pub fn snapshot(&self) -> HeightSnapshot {
        let n = self.frame.resolution;
        HeightSnapshot {
            heights: self.storage.get_heights(0, 0, n, n),
        }
    }

    /// Replace every height with a snapshot's values.
    pub fn restore(&mut self, snapshot: &HeightSnapshot) -> Result<()> {
        let n = self.frame.resolution;
        if snapshot.resolution() != n || snapshot.heights.height != n {
            return Err(TerrainError::GridSizeMismatch {
                expected: n * n,
                actual: snapshot.heights.width * snapshot.heights.height,
            });
        }
        self.storage.set_heights(0, 0, &snapshot.heights);
        Ok(())
    }
}

/// What a droplet needs from the terrain it runs over.
///
/// Implemented by [`HeightGrid`] for direct simulation, and by the staging
/// surface used for parallel batches.
pub trait ErosionSurface {
    fn frame(&self) -> &GridFrame;
    fn sample_height(&self, pos: Vec3) -> f32;
    fn sample_gradient(&self, pos: Vec3) -> Vec2;
    fn scatter_add_bilinear(&mut self, pos: Vec3, amount: f32);
    fn scatter_add_radial(&mut self, pos: Vec3, amount: f32, brush: &RadialBrush);
}

impl<S: HeightStorage> ErosionSurface for HeightGrid<S> {
    fn frame(&self) -> &GridFrame {
        &self.frame
    }

    fn sample_height(&self, pos: Vec3) -> f32 {
        HeightGrid::sample_height(self, pos)
    }

    fn sample_gradient(&self, pos: Vec3) -> Vec2 {
        HeightGrid::sample_gradient(self, pos)
    }

    fn scatter_add_bilinear(&mut self, pos: Vec3, amount: f32) {
        HeightGrid::scatter_add_bilinear(self, pos, amount)
    }

    fn scatter_add_radial(&mut self, pos: Vec3, amount: f32, brush: &RadialBrush) {
        HeightGrid::scatter_add_radial(self, pos, amount, brush)
    }
}
