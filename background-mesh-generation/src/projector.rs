//! Pinhole back-projection of a depth map into a coloured point map.

use crate::camera::CameraIntrinsics;
use crate::dds::{read_rgba_texture, write_rgba16f_texture, write_rgba32f_texture};
use crate::depth::DepthMap;
use crate::error::{PipelineError, PipelineResult};
use crate::progress::progress_bar;
use image::RgbImage;
use log::info;
use rayon::prelude::*;
use std::path::Path;

/// Channels per point map cell: X, Y, Z, R, G, B.
pub const POINT_MAP_CHANNELS: usize = 6;

/// Dense `H×W` grid of camera-space points with the colour of their pixel.
///
/// Cell `(i, j)` lives at index `i * width + j` and holds `(X, Y, Z, R, G, B)`
/// with colour normalised to `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PointMap {
    width: usize,
    height: usize,
    cells: Vec<[f32; POINT_MAP_CHANNELS]>,
}

impl PointMap {
    pub fn from_raw(
        width: usize,
        height: usize,
        cells: Vec<[f32; POINT_MAP_CHANNELS]>,
    ) -> Option<Self> {
        (cells.len() == width * height).then_some(Self {
            width,
            height,
            cells,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, i: usize, j: usize) -> &[f32; POINT_MAP_CHANNELS] {
        &self.cells[i * self.width + j]
    }

    pub fn cells(&self) -> &[[f32; POINT_MAP_CHANNELS]] {
        &self.cells
    }

    /// Flattened XYZ, colour dropped.
    pub fn positions(&self) -> Vec<[f64; 3]> {
        self.cells
            .iter()
            .map(|c| [c[0] as f64, c[1] as f64, c[2] as f64])
            .collect()
    }

    pub fn colours(&self) -> Vec<[f32; 3]> {
        self.cells.iter().map(|c| [c[3], c[4], c[5]]).collect()
    }

    /// Stores the point map as a position texture (RGBA32F) and a colour texture (RGBA16F).
    pub fn save(&self, position_path: &Path, colour_path: &Path) -> PipelineResult<()> {
        let mut position = Vec::with_capacity(self.cells.len() * 4);
        let mut colour = Vec::with_capacity(self.cells.len() * 4);
        for cell in &self.cells {
            position.extend_from_slice(&[cell[0], cell[1], cell[2], 1.0]);
            colour.extend_from_slice(&[cell[3], cell[4], cell[5], 1.0]);
        }

        write_rgba32f_texture(position_path, self.width, self.height, &position)?;
        write_rgba16f_texture(colour_path, self.width, self.height, &colour)?;
        Ok(())
    }

    pub fn load(position_path: &Path, colour_path: &Path) -> PipelineResult<Self> {
        let position = read_rgba_texture(position_path)?;
        let colour = read_rgba_texture(colour_path)?;

        if (colour.width, colour.height) != (position.width, position.height) {
            return Err(PipelineError::ShapeMismatch {
                what: "point map colour texture",
                expected_width: position.width,
                expected_height: position.height,
                actual_width: colour.width,
                actual_height: colour.height,
            });
        }

        let cells = position
            .data
            .chunks_exact(4)
            .zip(colour.data.chunks_exact(4))
            .map(|(p, c)| [p[0], p[1], p[2], c[0], c[1], c[2]])
            .collect();

        Self::from_raw(position.width, position.height, cells)
            .ok_or_else(|| PipelineError::parse(position_path, "point map texture is truncated"))
    }
}

/// Back-projects every pixel with the principal point at the image centre.
///
/// `x = (j - W/2) / f`, `y = (i - H/2) / f`, point `(x * z, y * z, z)`.
/// Non-positive depth is not special-cased; a zero depth lands on the
/// camera origin.
pub fn project(
    depth: &DepthMap,
    colour: &RgbImage,
    focal_length: f64,
) -> PipelineResult<(PointMap, CameraIntrinsics)> {
    let (width, height) = depth.dimensions();
    let (colour_width, colour_height) = (colour.width() as usize, colour.height() as usize);
    if (colour_width, colour_height) != (width, height) {
        return Err(PipelineError::ShapeMismatch {
            what: "colour image",
            expected_width: width,
            expected_height: height,
            actual_width: colour_width,
            actual_height: colour_height,
        });
    }

    let camera = CameraIntrinsics::new(width, height, focal_length);
    let (cx, cy) = camera.principal_point();
    info!(
        "Projecting {}x{} depth map (f = {:.2}px)",
        width, height, focal_length
    );

    let mut cells = vec![[0.0f32; POINT_MAP_CHANNELS]; width * height];
    if width > 0 {
        let pb = progress_bar(height as u64, "rows", "Projecting depth");
        cells
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(i, row)| {
                let y = (i as f64 - cy) / focal_length;
                let depth_row = depth.row(i);
                for (j, cell) in row.iter_mut().enumerate() {
                    let x = (j as f64 - cx) / focal_length;
                    let z = depth_row[j] as f64;
                    let rgb = colour.get_pixel(j as u32, i as u32).0;
                    *cell = [
                        (x * z) as f32,
                        (y * z) as f32,
                        z as f32,
                        rgb[0] as f32 / 255.0,
                        rgb[1] as f32 / 255.0,
                        rgb[2] as f32 / 255.0,
                    ];
                }
                pb.inc(1);
            });
        pb.finish_with_message("Depth projected");
    }

    let point_map = PointMap {
        width,
        height,
        cells,
    };
    Ok((point_map, camera))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn gradient_depth(width: usize, height: usize) -> DepthMap {
        let values = (0..width * height)
            .map(|k| 1.0 + (k % 7) as f32 * 0.5)
            .collect();
        DepthMap::from_raw(width, height, values).unwrap()
    }

    #[test]
    fn pinhole_round_trip_recovers_pixel_column() {
        let (width, height, f) = (9, 5, 120.0);
        let depth = gradient_depth(width, height);
        let colour = RgbImage::new(width as u32, height as u32);

        let (points, _) = project(&depth, &colour, f).unwrap();

        for i in 0..height {
            for j in 0..width {
                let [x, y, z, ..] = *points.get(i, j);
                let column = x as f64 / z as f64 * f;
                let row = y as f64 / z as f64 * f;
                assert!((column - (j as f64 - width as f64 / 2.0)).abs() < 1e-3);
                assert!((row - (i as f64 - height as f64 / 2.0)).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn colour_is_normalised_and_copied() {
        let depth = DepthMap::filled(2, 2, 1.0);
        let mut colour = RgbImage::new(2, 2);
        colour.put_pixel(1, 0, Rgb([255, 0, 51]));

        let (points, _) = project(&depth, &colour, 100.0).unwrap();
        let cell = points.get(0, 1);

        assert_eq!(cell[3], 1.0);
        assert_eq!(cell[4], 0.0);
        assert!((cell[5] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn zero_depth_collapses_to_origin() {
        let mut values = vec![2.0; 4];
        values[3] = 0.0;
        let depth = DepthMap::from_raw(2, 2, values).unwrap();
        let colour = RgbImage::new(2, 2);

        let (points, _) = project(&depth, &colour, 10.0).unwrap();
        assert_eq!(points.get(1, 1)[..3], [0.0f32; 3]);
    }

    #[test]
    fn mismatched_colour_is_rejected() {
        let depth = DepthMap::filled(4, 4, 1.0);
        let colour = RgbImage::new(4, 3);

        match project(&depth, &colour, 100.0) {
            Err(PipelineError::ShapeMismatch {
                actual_height: 3, ..
            }) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn records_intrinsics() {
        let depth = DepthMap::filled(6, 4, 1.0);
        let colour = RgbImage::new(6, 4);
        let (_, camera) = project(&depth, &colour, 321.0).unwrap();

        assert_eq!(camera, CameraIntrinsics::new(6, 4, 321.0));
    }

    #[test]
    fn texture_pair_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let depth = gradient_depth(5, 3);
        let mut colour = RgbImage::new(5, 3);
        colour.put_pixel(2, 1, Rgb([10, 200, 30]));
        let (points, _) = project(&depth, &colour, 50.0).unwrap();

        let position = dir.path().join("position.dds");
        let colour_path = dir.path().join("colour.dds");
        points.save(&position, &colour_path).unwrap();
        let loaded = PointMap::load(&position, &colour_path).unwrap();

        assert_eq!(loaded.width(), 5);
        assert_eq!(loaded.height(), 3);
        for (a, b) in loaded.cells().iter().zip(points.cells()) {
            assert_eq!(a[..3], b[..3]);
            for c in 3..6 {
                assert!((a[c] - b[c]).abs() < 1e-3);
            }
        }
    }
}
