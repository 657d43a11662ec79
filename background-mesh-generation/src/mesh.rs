//! Textured triangle mesh and the rigid/scale transforms applied to it.

use crate::bounds::AxisAlignedBounds;
use image::RgbImage;
use nalgebra::{Matrix4, Point3, Vector3};
use rayon::prelude::*;

/// Triangle mesh with one UV per vertex and a single texture image.
///
/// Topology and UVs are fixed at construction; later stages only move
/// vertices (rotation, translation, uniform scale).
#[derive(Debug, Clone, PartialEq)]
pub struct TexturedMesh {
    pub vertices: Vec<Point3<f64>>,
    pub uvs: Vec<[f32; 2]>,
    pub triangles: Vec<[u32; 3]>,
    pub texture: RgbImage,
}

impl TexturedMesh {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Axis-aligned bounds of the vertices, `None` for an empty mesh.
    pub fn bounds(&self) -> Option<AxisAlignedBounds> {
        self.vertices
            .par_chunks(25_000)
            .map(|chunk| {
                let mut local_bounds = AxisAlignedBounds::new();
                for v in chunk {
                    local_bounds.update(v.x, v.y, v.z);
                }
                local_bounds
            })
            .reduce_with(AxisAlignedBounds::merge)
            .filter(|bounds| !bounds.is_empty())
    }

    /// Applies a homogeneous transform to every vertex.
    pub fn apply_transform(&mut self, transform: &Matrix4<f64>) {
        self.vertices
            .par_iter_mut()
            .for_each(|v| *v = transform.transform_point(v));
    }

    /// Uniform scale about the origin.
    pub fn apply_scale(&mut self, factor: f64) {
        self.vertices.par_iter_mut().for_each(|v| *v *= factor);
    }

    pub fn apply_translation(&mut self, offset: &Vector3<f64>) {
        self.vertices.par_iter_mut().for_each(|v| *v += offset);
    }
}
