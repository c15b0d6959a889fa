//! PNG previews of a height grid.
//!
//! These are debug images for looking at a run, not a persistence format.

use std::path::Path;

use image::{ImageBuffer, Luma, Rgb, RgbImage};

use crate::error::{Result, TerrainError};
use crate::tilemap::Tilemap;

/// Export a heightmap as 16-bit grayscale, stretched to the map's own range.
pub fn export_grayscale(heightmap: &Tilemap<f32>, path: impl AsRef<Path>) -> Result<()> {
    let (min_h, max_h) = heightmap.min_max();
    let range = (max_h - min_h).max(f32::EPSILON);

    let img: ImageBuffer<Luma<u16>, Vec<u16>> =
        ImageBuffer::from_fn(heightmap.width as u32, heightmap.height as u32, |x, y| {
            let t = (*heightmap.get(x as usize, y as usize) - min_h) / range;
            Luma([(t.clamp(0.0, 1.0) * u16::MAX as f32) as u16])
        });

    img.save(path)?;
    Ok(())
}

/// Export a heightmap using spectral colormap.
/// Values are expected to be normalized (0.0-1.0).
pub fn export_heightmap(heightmap: &Tilemap<f32>, path: impl AsRef<Path>) -> Result<()> {
    let mut img: RgbImage = ImageBuffer::new(heightmap.width as u32, heightmap.height as u32);

    for (x, y, &val) in heightmap.iter() {
        img.put_pixel(x as u32, y as u32, Rgb(spectral_colormap(val.clamp(0.0, 1.0))));
    }

    img.save(path)?;
    Ok(())
}

/// Spectral colormap (matplotlib style): dark blue -> cyan -> green -> yellow -> orange -> red
fn spectral_colormap(t: f32) -> [u8; 3] {
    let colors: [[f32; 3]; 11] = [
        [0.37, 0.31, 0.64],  // Dark blue/purple (low)
        [0.20, 0.53, 0.74],
        [0.40, 0.76, 0.65],
        [0.67, 0.87, 0.64],
        [0.90, 0.96, 0.60],
        [1.00, 1.00, 0.75],
        [1.00, 0.88, 0.55],
        [0.99, 0.68, 0.38],
        [0.96, 0.43, 0.26],
        [0.84, 0.24, 0.31],
        [0.62, 0.00, 0.26],  // Dark red (high)
    ];

    let t_scaled = t * 10.0;
    let idx = (t_scaled as usize).min(9);
    let frac = t_scaled - idx as f32;

    let c1 = colors[idx];
    let c2 = colors[idx + 1];

    [
        ((c1[0] + (c2[0] - c1[0]) * frac) * 255.0) as u8,
        ((c1[1] + (c2[1] - c1[1]) * frac) * 255.0) as u8,
        ((c1[2] + (c2[2] - c1[2]) * frac) * 255.0) as u8,
    ]
}

/// Half-Lambert hillshade, light from the top-left.
///
/// `z_factor` exaggerates height relative to the cell pitch; gullies carved by
/// erosion only show up on a normalized map with a fairly large factor.
pub fn compute_hillshade(heightmap: &Tilemap<f32>, z_factor: f32) -> Tilemap<f32> {
    let width = heightmap.width;
    let height = heightmap.height;

    let light_dir = glam::Vec3::new(-0.6, -0.6, 0.5).normalize();
    let mut hillshade = Tilemap::new_with(width, height, 1.0f32);

    for (x, y, shade) in hillshade.iter_mut() {
        // One-sided differences on the border
        let h_left = *heightmap.get(x.saturating_sub(1), y);
        let h_right = *heightmap.get((x + 1).min(width - 1), y);
        let h_up = *heightmap.get(x, y.saturating_sub(1));
        let h_down = *heightmap.get(x, (y + 1).min(height - 1));

        let dzdx = (h_right - h_left) * z_factor / 2.0;
        let dzdy = (h_down - h_up) * z_factor / 2.0;
        let normal = glam::Vec3::new(-dzdx, -dzdy, 1.0).normalize();

        let half_lambert = (normal.dot(light_dir) * 0.5 + 0.5).powi(2);
        *shade = (0.25 + half_lambert * 0.75).clamp(0.2, 1.15);
    }

    hillshade
}

/// Export the spectral heightmap modulated by hillshade.
pub fn export_shaded(
    heightmap: &Tilemap<f32>,
    z_factor: f32,
    path: impl AsRef<Path>,
) -> Result<()> {
    let shade = compute_hillshade(heightmap, z_factor);
    let mut img: RgbImage = ImageBuffer::new(heightmap.width as u32, heightmap.height as u32);

    for (x, y, &val) in heightmap.iter() {
        let base = spectral_colormap(val.clamp(0.0, 1.0));
        let s = *shade.get(x, y);
        let px = base.map(|c| (c as f32 * s).clamp(0.0, 255.0) as u8);
        img.put_pixel(x as u32, y as u32, Rgb(px));
    }

    img.save(path)?;
    Ok(())
}

/// Export where erosion removed (red) and deposited (blue) material.
/// Intensity is relative to the largest absolute change. Both maps must have
/// the same dimensions.
pub fn export_erosion_delta(
    before: &Tilemap<f32>,
    after: &Tilemap<f32>,
    path: impl AsRef<Path>,
) -> Result<()> {
    if (before.width, before.height) != (after.width, after.height) {
        return Err(TerrainError::GridSizeMismatch {
            expected: after.width * after.height,
            actual: before.width * before.height,
        });
    }

    let delta: Vec<f32> = before
        .as_slice()
        .iter()
        .zip(after.as_slice())
        .map(|(&b, &a)| a - b)
        .collect();
    let max_abs = delta.iter().fold(0.0f32, |m, d| m.max(d.abs())).max(f32::EPSILON);

    let width = after.width;
    let img: RgbImage = ImageBuffer::from_fn(width as u32, after.height as u32, |x, y| {
        let d = delta[y as usize * width + x as usize] / max_abs;
        let t = (d.abs().sqrt() * 255.0) as u8;
        if d < 0.0 {
            Rgb([255, 255 - t, 255 - t])
        } else {
            Rgb([255 - t, 255 - t, 255])
        }
    });

    img.save(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> Tilemap<f32> {
        let mut map = Tilemap::new_with(n, n, 0.0f32);
        for (x, _, h) in map.iter_mut() {
            *h = x as f32 / (n - 1) as f32;
        }
        map
    }

    #[test]
    fn test_hillshade_flat_is_uniform() {
        let flat = Tilemap::new_with(6, 6, 0.5f32);
        let shade = compute_hillshade(&flat, 10.0);
        let first = *shade.get(0, 0);
        assert!(shade.iter().all(|(_, _, &s)| (s - first).abs() < 1e-6));
    }

    #[test]
    fn test_hillshade_lights_slopes_facing_the_sun() {
        // Light comes from -x, so a surface rising toward +x faces it
        let rising = ramp(8);
        let mut falling = ramp(8);
        for (_, _, h) in falling.iter_mut() {
            *h = 1.0 - *h;
        }
        let lit = *compute_hillshade(&rising, 20.0).get(4, 4);
        let dark = *compute_hillshade(&falling, 20.0).get(4, 4);
        assert!(lit > dark);
    }

    #[test]
    fn test_exports_write_png_files() {
        let dir = std::env::temp_dir();
        let map = ramp(16);
        let gray = dir.join("terrain_sculptor_test_gray.png");
        let shaded = dir.join("terrain_sculptor_test_shaded.png");
        let delta = dir.join("terrain_sculptor_test_delta.png");

        export_grayscale(&map, &gray).unwrap();
        export_shaded(&map, 8.0, &shaded).unwrap();
        export_erosion_delta(&map, &ramp(16), &delta).unwrap();

        let img = image::open(&gray).unwrap();
        assert_eq!((img.width(), img.height()), (16, 16));
        assert!(shaded.exists());
        assert!(delta.exists());

        for path in [gray, shaded, delta] {
            let _ = std::fs::remove_file(path);
        }
    }

    #[test]
    fn test_erosion_delta_rejects_mismatched_maps() {
        let path = std::env::temp_dir().join("terrain_sculptor_test_mismatch.png");
        let result = export_erosion_delta(&ramp(8), &ramp(16), &path);

        assert!(matches!(
            result,
            Err(TerrainError::GridSizeMismatch { expected: 256, actual: 64 })
        ));
        assert!(!path.exists());
    }
}
