//! Places the gravity-aligned background under the generated objects.

use crate::bounds::AxisAlignedBounds;
use crate::config::FitConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::mesh::TexturedMesh;
use crate::scene::ObjectPlacement;
use constants::coordinate_system::COORDINATE_TRANSFORM;
use log::info;
use nalgebra::{Matrix3, Matrix4, Vector3};
use serde::{Deserialize, Serialize};

/// What the fitter did to the mesh, in the reconstruction frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    pub object_bounds: AxisAlignedBounds,
    pub mesh_bounds_before: AxisAlignedBounds,
    pub mesh_bounds_after: AxisAlignedBounds,
    /// Candidate factor, applied only when it exceeds 1.
    pub scale_factor: f64,
    pub scale_applied: bool,
    pub translation: [f64; 3],
}

/// Reconstruction frame to target engine frame as a homogeneous matrix.
pub fn frame_conversion() -> Matrix4<f64> {
    Matrix3::from_fn(|i, j| COORDINATE_TRANSFORM[i][j]).to_homogeneous()
}

pub struct SceneFitter {
    config: FitConfig,
}

impl SceneFitter {
    pub fn new(config: FitConfig) -> Self {
        Self { config }
    }

    /// Gravity rotation, fit to the objects, then frame conversion.
    pub fn apply(
        &self,
        mesh: &mut TexturedMesh,
        t_gravity: &Matrix4<f64>,
        objects: &[ObjectPlacement],
    ) -> PipelineResult<FitReport> {
        if objects.is_empty() {
            return Err(PipelineError::NoObjects);
        }
        mesh.apply_transform(t_gravity);
        let report = self.fit_to_objects(mesh, objects)?;
        mesh.apply_transform(&frame_conversion());
        Ok(report)
    }

    /// Uniformly enlarges the mesh to cover the objects' XY footprint and
    /// moves it under them. The mesh is never shrunk.
    pub fn fit_to_objects(
        &self,
        mesh: &mut TexturedMesh,
        objects: &[ObjectPlacement],
    ) -> PipelineResult<FitReport> {
        let object_bounds = AxisAlignedBounds::from_points(
            objects
                .iter()
                .map(|o| [o.position.x, o.position.y, o.position.z]),
        )
        .ok_or(PipelineError::NoObjects)?;

        let mesh_bounds_before = mesh
            .bounds()
            .ok_or(PipelineError::MeshDegenerate { axis: 'x' })?;
        let (mesh_x, mesh_y, _) = mesh_bounds_before.dimensions();
        if mesh_x <= 0.0 {
            return Err(PipelineError::MeshDegenerate { axis: 'x' });
        }
        if mesh_y <= 0.0 {
            return Err(PipelineError::MeshDegenerate { axis: 'y' });
        }

        let (object_x, object_y, _) = object_bounds.dimensions();
        let scale_factor = (object_x / mesh_x).max(object_y / mesh_y) * self.config.margin_factor;
        let scale_applied = scale_factor > 1.0;
        if scale_applied {
            info!("Scaling background mesh by {:.3} to cover all objects", scale_factor);
            mesh.apply_scale(scale_factor);
        } else {
            info!("Background mesh is large enough, no scaling needed");
        }

        let scaled = mesh
            .bounds()
            .ok_or(PipelineError::MeshDegenerate { axis: 'x' })?;
        let (mesh_cx, mesh_cy, _) = scaled.center();
        let (object_cx, object_cy, _) = object_bounds.center();
        let translation = Vector3::new(
            object_cx - mesh_cx,
            object_cy - mesh_cy,
            object_bounds.min_z - self.config.floor_offset - scaled.min_z,
        );
        mesh.apply_translation(&translation);

        let mesh_bounds_after = mesh
            .bounds()
            .ok_or(PipelineError::MeshDegenerate { axis: 'x' })?;
        info!(
            "Background recentred by ({:.3}, {:.3}, {:.3})",
            translation.x, translation.y, translation.z
        );

        Ok(FitReport {
            object_bounds,
            mesh_bounds_before,
            mesh_bounds_after,
            scale_factor,
            scale_applied,
            translation: [translation.x, translation.y, translation.z],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Position;
    use image::RgbImage;
    use nalgebra::Point3;
    use serde_json::Map;

    fn object(x: f64, y: f64, z: f64) -> ObjectPlacement {
        ObjectPlacement {
            name: format!("obj_{x}_{y}_{z}"),
            position: Position { x, y, z },
            extra: Map::new(),
        }
    }

    fn square_mesh(half: f64) -> TexturedMesh {
        TexturedMesh {
            vertices: vec![
                Point3::new(-half, -half, 0.0),
                Point3::new(half, -half, 0.2),
                Point3::new(-half, half, 0.1),
                Point3::new(half, half, 0.3),
            ],
            uvs: vec![[0.0, 1.0], [1.0, 1.0], [0.0, 0.0], [1.0, 0.0]],
            triangles: vec![[0, 1, 2], [1, 3, 2]],
            texture: RgbImage::new(2, 2),
        }
    }

    fn scenario_objects() -> Vec<ObjectPlacement> {
        vec![object(0.0, 0.0, 0.0), object(10.0, 0.0, 0.0), object(0.0, 10.0, 0.0)]
    }

    #[test]
    fn scales_and_recentres_under_objects() {
        let mut mesh = square_mesh(1.0);
        let report = SceneFitter::new(FitConfig::default())
            .fit_to_objects(&mut mesh, &scenario_objects())
            .unwrap();

        assert!((report.scale_factor - 5.5).abs() < 1e-12);
        assert!(report.scale_applied);

        let bounds = mesh.bounds().unwrap();
        let (dx, dy, _) = bounds.dimensions();
        assert!((dx - 11.0).abs() < 1e-9);
        assert!((dy - 11.0).abs() < 1e-9);
        let (cx, cy, _) = bounds.center();
        assert!((cx - 5.0).abs() < 1e-9);
        assert!((cy - 5.0).abs() < 1e-9);
        assert!((bounds.min_z + 0.7).abs() < 1e-9);
        assert_eq!(report.mesh_bounds_after, bounds);
    }

    #[test]
    fn never_shrinks_a_large_mesh() {
        let mut mesh = square_mesh(50.0);
        let report = SceneFitter::new(FitConfig::default())
            .fit_to_objects(&mut mesh, &scenario_objects())
            .unwrap();

        assert!(report.scale_factor < 1.0);
        assert!(!report.scale_applied);
        let (dx, dy, _) = mesh.bounds().unwrap().dimensions();
        assert_eq!((dx, dy), (100.0, 100.0));
    }

    #[test]
    fn floor_follows_lowest_object() {
        let mut mesh = square_mesh(20.0);
        let objects = vec![object(1.0, 1.0, 2.0), object(3.0, 2.0, 0.5)];
        SceneFitter::new(FitConfig::default())
            .fit_to_objects(&mut mesh, &objects)
            .unwrap();

        assert!((mesh.bounds().unwrap().min_z - (0.5 - 0.7)).abs() < 1e-9);
    }

    #[test]
    fn floor_offset_is_configurable() {
        let mut mesh = square_mesh(20.0);
        let config = FitConfig {
            floor_offset: 0.25,
            ..FitConfig::default()
        };
        SceneFitter::new(config)
            .fit_to_objects(&mut mesh, &scenario_objects())
            .unwrap();

        assert!((mesh.bounds().unwrap().min_z + 0.25).abs() < 1e-9);
    }

    #[test]
    fn empty_object_list_is_rejected() {
        let mut mesh = square_mesh(1.0);
        let result = SceneFitter::new(FitConfig::default()).apply(&mut mesh, &Matrix4::identity(), &[]);

        assert!(matches!(result, Err(PipelineError::NoObjects)));
        assert_eq!(mesh, square_mesh(1.0));
    }

    #[test]
    fn flat_mesh_is_degenerate() {
        let mut mesh = square_mesh(1.0);
        for v in &mut mesh.vertices {
            v.y = 0.0;
        }
        let result = SceneFitter::new(FitConfig::default()).fit_to_objects(&mut mesh, &scenario_objects());

        assert!(matches!(result, Err(PipelineError::MeshDegenerate { axis: 'y' })));
    }

    #[test]
    fn apply_ends_in_engine_frame() {
        let mut mesh = square_mesh(1.0);
        SceneFitter::new(FitConfig::default())
            .apply(&mut mesh, &Matrix4::identity(), &scenario_objects())
            .unwrap();

        // (x, y, z) -> (x, z, -y): the floor becomes the lowest engine Y
        let bounds = mesh.bounds().unwrap();
        assert!((bounds.min_y + 0.7).abs() < 1e-9);
        assert!((bounds.max_z - 0.5).abs() < 1e-9);
        assert!((bounds.min_z + 10.5).abs() < 1e-9);
    }

    #[test]
    fn conversion_matrix_matches_axis_mapping() {
        let p = frame_conversion().transform_point(&Point3::new(1.0, 2.0, 3.0));
        assert_eq!(p, Point3::new(1.0, 3.0, -2.0));
    }
}
