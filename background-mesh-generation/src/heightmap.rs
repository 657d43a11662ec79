/// Heightmap triangulation of a point map into a textured surface
use crate::camera::CameraIntrinsics;
use crate::config::{MeshConfig, VertexSource};
use crate::error::{PipelineError, PipelineResult};
use crate::mesh::TexturedMesh;
use crate::projector::PointMap;
use image::{RgbImage, imageops};
use log::{info, warn};
use nalgebra::Point3;
use rayon::prelude::*;

pub struct HeightmapMesher {
    config: MeshConfig,
}

impl HeightmapMesher {
    pub fn new(config: MeshConfig) -> Self {
        Self { config }
    }

    /// Build one vertex per pixel and two triangles per 2x2 pixel block.
    ///
    /// The camera record is always required; `reprojected` mode derives
    /// X/Y from it, `point_map` mode only checks that the stages agree.
    /// A record whose size differs from the point map is rejected.
    pub fn build(
        &self,
        point_map: &PointMap,
        camera: &CameraIntrinsics,
        texture: &RgbImage,
    ) -> PipelineResult<TexturedMesh> {
        let (width, height) = (point_map.width(), point_map.height());
        let (camera_width, camera_height) = (camera.width as usize, camera.height as usize);
        if width == 0 || height == 0 {
            return Err(PipelineError::ShapeMismatch {
                what: "point map",
                expected_width: camera_width,
                expected_height: camera_height,
                actual_width: width,
                actual_height: height,
            });
        }
        if (camera_width, camera_height) != (width, height) {
            return Err(PipelineError::ShapeMismatch {
                what: "camera record",
                expected_width: width,
                expected_height: height,
                actual_width: camera_width,
                actual_height: camera_height,
            });
        }

        info!(
            "Meshing {}x{} point map ({:?} vertices)",
            width, height, self.config.vertex_source
        );

        let vertices = self.vertices(point_map, camera);
        let uvs = grid_uvs(width, height);
        let triangles = grid_triangles(width, height);
        let texture = self.fit_texture(texture, width, height);

        info!(
            "Mesh has {} vertices and {} triangles",
            vertices.len(),
            triangles.len()
        );

        Ok(TexturedMesh {
            vertices,
            uvs,
            triangles,
            texture,
        })
    }

    fn vertices(&self, point_map: &PointMap, camera: &CameraIntrinsics) -> Vec<Point3<f64>> {
        let width = point_map.width();
        match self.config.vertex_source {
            VertexSource::PointMap => point_map
                .cells()
                .par_iter()
                .map(|c| Point3::new(c[0] as f64, c[1] as f64, c[2] as f64))
                .collect(),
            VertexSource::Reprojected => {
                let (cx, cy) = camera.principal_point();
                let f = camera.focal_length;
                let min_depth = self.config.min_depth;
                point_map
                    .cells()
                    .par_iter()
                    .enumerate()
                    .map(|(idx, c)| {
                        let (i, j) = (idx / width, idx % width);
                        let z = c[2] as f64;
                        let d = if z <= 0.0 { min_depth } else { z };
                        Point3::new(
                            (j as f64 - cx) / f * d,
                            (i as f64 - cy) / f * d,
                            d,
                        )
                    })
                    .collect()
            }
        }
    }

    /// Texture at point map resolution; a mismatched photo is resampled.
    fn fit_texture(&self, texture: &RgbImage, width: usize, height: usize) -> RgbImage {
        let (tw, th) = texture.dimensions();
        if (tw as usize, th as usize) == (width, height) {
            return texture.clone();
        }

        warn!(
            "Texture is {}x{} but the point map is {}x{}; resizing with {:?}",
            tw, th, width, height, self.config.resize_filter
        );
        imageops::resize(
            texture,
            width as u32,
            height as u32,
            self.config.resize_filter.into(),
        )
    }
}

/// `u = j/(W-1)`, `v = 1 - i/(H-1)`; a single column or row sits at `u = 0` / `v = 1`.
pub fn grid_uvs(width: usize, height: usize) -> Vec<[f32; 2]> {
    let u_step = if width > 1 { 1.0 / (width - 1) as f64 } else { 0.0 };
    let v_step = if height > 1 { 1.0 / (height - 1) as f64 } else { 0.0 };

    (0..width * height)
        .into_par_iter()
        .map(|idx| {
            let (i, j) = (idx / width, idx % width);
            [(j as f64 * u_step) as f32, (1.0 - i as f64 * v_step) as f32]
        })
        .collect()
}

/// Two triangles per block, winding `(i,j) (i,j+1) (i+1,j)` and `(i,j+1) (i+1,j+1) (i+1,j)`.
pub fn grid_triangles(width: usize, height: usize) -> Vec<[u32; 3]> {
    let idx = move |i: usize, j: usize| (i * width + j) as u32;

    (0..height.saturating_sub(1))
        .into_par_iter()
        .flat_map_iter(move |i| {
            (0..width.saturating_sub(1)).flat_map(move |j| {
                [
                    [idx(i, j), idx(i, j + 1), idx(i + 1, j)],
                    [idx(i, j + 1), idx(i + 1, j + 1), idx(i + 1, j)],
                ]
            })
        })
        .collect()
}
