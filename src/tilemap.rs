/// A row-major 2D grid addressed by (column, row).
///
/// Unlike a planetary map there is no wrapping: indices outside the grid are a
/// programming error and panic, so callers clamp before indexing.
#[derive(Clone, Debug, PartialEq)]
pub struct Tilemap<T> {
    pub width: usize,
    pub height: usize,
    data: Vec<T>,
}

impl<T: Clone> Tilemap<T> {
    pub fn new_with(width: usize, height: usize, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    /// Wrap an existing row-major buffer. Returns `None` if the length is wrong.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Option<Self> {
        if data.len() != width * height {
            return None;
        }
        Some(Self { width, height, data })
    }

    fn index(&self, x: usize, y: usize) -> usize {
        assert!(
            x < self.width && y < self.height,
            "tilemap index ({}, {}) out of range for {}x{}",
            x,
            y,
            self.width,
            self.height
        );
        y * self.width + x
    }

    pub fn get(&self, x: usize, y: usize) -> &T {
        &self.data[self.index(x, y)]
    }

    pub fn get_mut(&mut self, x: usize, y: usize) -> &mut T {
        let idx = self.index(x, y);
        &mut self.data[idx]
    }

    /// Raw row-major data.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Copy out the rectangular block starting at (x, y).
    /// The block is cropped to the map bounds.
    pub fn region(&self, x: usize, y: usize, width: usize, height: usize) -> Tilemap<T> {
        let x_end = (x + width).min(self.width);
        let y_end = (y + height).min(self.height);
        let w = x_end.saturating_sub(x);
        let h = y_end.saturating_sub(y);

        let mut data = Vec::with_capacity(w * h);
        for row in y..y_end {
            let start = row * self.width + x;
            data.extend_from_slice(&self.data[start..start + w]);
        }
        Tilemap { width: w, height: h, data }
    }

    /// Write a block back with its top-left corner at (x, y).
    /// Cells that would land outside the map are dropped.
    pub fn set_region(&mut self, x: usize, y: usize, block: &Tilemap<T>) {
        for by in 0..block.height {
            let ty = y + by;
            if ty >= self.height {
                break;
            }
            for bx in 0..block.width {
                let tx = x + bx;
                if tx >= self.width {
                    break;
                }
                self.data[ty * self.width + tx] = block.get(bx, by).clone();
            }
        }
    }

    /// Iterate over all cells with their coordinates.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &T)> {
        self.data.iter().enumerate().map(move |(idx, val)| {
            let x = idx % self.width;
            let y = idx / self.width;
            (x, y, val)
        })
    }

    /// Iterate mutably over all cells with their coordinates.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, usize, &mut T)> {
        let width = self.width;
        self.data.iter_mut().enumerate().map(move |(idx, val)| {
            let x = idx % width;
            let y = idx / width;
            (x, y, val)
        })
    }
}

impl Tilemap<f32> {
    /// Minimum and maximum value in the map.
    pub fn min_max(&self) -> (f32, f32) {
        let mut min_h = f32::MAX;
        let mut max_h = f32::MIN;
        for &h in &self.data {
            if h < min_h {
                min_h = h;
            }
            if h > max_h {
                max_h = h;
            }
        }
        (min_h, max_h)
    }

    /// Sum of all cells, accumulated in f64.
    pub fn sum(&self) -> f64 {
        self.data.iter().map(|&h| h as f64).sum()
    }
}
