//! Ground plane driven gravity alignment.
//!
//! The dominant plane of the reconstruction is taken as the ground. Its
//! normal, oriented by the configured [`NormalPolicy`], is rotated onto the
//! world up axis; the same rotation yields the camera orientation.

use crate::config::{AlignmentConfig, NormalPolicy, OrientationPolicy, RansacConfig};
use crate::error::PipelineResult;
use crate::plane::{Plane, fit_plane};
use constants::coordinate_system::{PARALLEL_EPSILON, WORLD_UP};
use constants::pipeline::{NORMAL_ARROW_COLOUR, PLANE_POINT_COLOUR};
use log::{debug, info};
use nalgebra::{Matrix4, Rotation3, Unit, UnitQuaternion, Vector3};
use rayon::prelude::*;

/// Result of the gravity alignment stage.
#[derive(Debug, Clone, PartialEq)]
pub struct GravityAlignment {
    pub plane: Plane,
    pub inlier_count: usize,
    /// Ground normal after the normal policy was applied.
    pub normal: Vector3<f64>,
    pub rotation: Rotation3<f64>,
    /// Camera orientation `[w, x, y, z]`.
    pub cam_orientation: [f64; 4],
}

impl GravityAlignment {
    /// `T_gravity`: rotation only, no translation.
    pub fn transform(&self) -> Matrix4<f64> {
        self.rotation.to_homogeneous()
    }
}

pub struct GroundAligner {
    ransac: RansacConfig,
    alignment: AlignmentConfig,
}

impl GroundAligner {
    pub fn new(ransac: RansacConfig, alignment: AlignmentConfig) -> Self {
        Self { ransac, alignment }
    }

    pub fn align(&self, points: &[[f64; 3]]) -> PipelineResult<GravityAlignment> {
        info!("Aligning {} points to gravity", points.len());
        let fit = fit_plane(points, &self.ransac)?;

        let normal = orient_normal(
            fit.plane.normal.into_inner(),
            self.alignment.normal_policy,
            &centroid(points),
        );
        let rotation = rotation_to_up(&normal);
        let cam_orientation = camera_orientation(&rotation, self.alignment.orientation_policy);

        debug!(
            "Ground normal ({:.4}, {:.4}, {:.4}), rotation angle {:.4} rad",
            normal.x,
            normal.y,
            normal.z,
            rotation.angle()
        );

        Ok(GravityAlignment {
            plane: fit.plane,
            inlier_count: fit.inliers.len(),
            normal,
            rotation,
            cam_orientation,
        })
    }

    /// All points in grey plus a red arrow along the normal from their centroid.
    pub fn diagnostic_cloud(
        &self,
        points: &[[f64; 3]],
        normal: &Vector3<f64>,
    ) -> (Vec<[f64; 3]>, Vec<[f32; 3]>) {
        let origin = centroid(points);
        let samples = self.alignment.arrow_points;
        let length = self.alignment.arrow_length;

        let mut positions = points.to_vec();
        positions.extend((0..samples).map(|k| {
            let t = if samples > 1 {
                length * k as f64 / (samples - 1) as f64
            } else {
                0.0
            };
            let p = origin + normal * t;
            [p.x, p.y, p.z]
        }));

        let mut colours = vec![PLANE_POINT_COLOUR; points.len()];
        colours.extend(std::iter::repeat_n(NORMAL_ARROW_COLOUR, samples));
        (positions, colours)
    }
}

fn centroid(points: &[[f64; 3]]) -> Vector3<f64> {
    if points.is_empty() {
        return Vector3::zeros();
    }
    let sum = points
        .par_iter()
        .map(|p| Vector3::new(p[0], p[1], p[2]))
        .reduce(Vector3::zeros, |a, b| a + b);
    sum / points.len() as f64
}

/// Apply the normal policy to a unit plane normal.
pub fn orient_normal(
    normal: Vector3<f64>,
    policy: NormalPolicy,
    centroid: &Vector3<f64>,
) -> Vector3<f64> {
    match policy {
        NormalPolicy::Flip => -normal,
        NormalPolicy::Keep => normal,
        // The camera sits at the origin
        NormalPolicy::TowardCamera => {
            if normal.dot(&-centroid) < 0.0 {
                -normal
            } else {
                normal
            }
        }
    }
}

/// Rotation taking `normal` onto world up.
///
/// Parallel and antiparallel normals both give the identity.
pub fn rotation_to_up(normal: &Vector3<f64>) -> Rotation3<f64> {
    let up = Vector3::from(WORLD_UP);
    let n = normal.normalize();
    let axis = n.cross(&up);
    let axis_len = axis.norm();
    if axis_len < PARALLEL_EPSILON {
        return Rotation3::identity();
    }

    let angle = n.dot(&up).clamp(-1.0, 1.0).acos();
    Rotation3::from_axis_angle(&Unit::new_unchecked(axis / axis_len), angle)
}

/// Quaternion `[w, x, y, z]` of the gravity rotation or of its inverse.
pub fn camera_orientation(rotation: &Rotation3<f64>, policy: OrientationPolicy) -> [f64; 4] {
    let rotation = match policy {
        OrientationPolicy::Rotation => *rotation,
        OrientationPolicy::Inverse => rotation.inverse(),
    };
    let q = UnitQuaternion::from_rotation_matrix(&rotation);
    [q.w, q.i, q.j, q.k]
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Matrix3;

    fn plane_grid(f: impl Fn(f64, f64) -> [f64; 3]) -> Vec<[f64; 3]> {
        (0..100)
            .map(|k| f((k % 10) as f64 * 0.2 - 1.0, (k / 10) as f64 * 0.2 - 1.0))
            .collect()
    }

    fn aligner(policy: NormalPolicy) -> GroundAligner {
        GroundAligner::new(
            RansacConfig::default(),
            AlignmentConfig {
                normal_policy: policy,
                ..AlignmentConfig::default()
            },
        )
    }

    fn assert_proper_rotation(r: &Rotation3<f64>) {
        let m = r.matrix();
        assert!((m * m.transpose() - Matrix3::identity()).norm() < 1e-9);
        assert!((m.determinant() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn ground_plane_at_zero_maps_normal_to_up() {
        let points = plane_grid(|x, y| [x, y, 0.0]);
        let alignment = aligner(NormalPolicy::Keep).align(&points).unwrap();

        let up = alignment.rotation * alignment.normal;
        assert!((up - Vector3::new(0.0, 0.0, 1.0)).norm() < 1e-6);
        assert_proper_rotation(&alignment.rotation);
    }

    #[test]
    fn tilted_plane_becomes_horizontal() {
        // Ground seen from a camera looking along +Z, image rows pointing down
        let points = plane_grid(|x, t| [x, 1.5 + 0.3 * t, 4.0 + t]);
        let alignment = aligner(NormalPolicy::default()).align(&points).unwrap();

        assert_proper_rotation(&alignment.rotation);
        let up = alignment.rotation * alignment.normal;
        assert!((up - Vector3::new(0.0, 0.0, 1.0)).norm() < 1e-6);

        let rotated: Vec<f64> = points
            .iter()
            .map(|p| (alignment.rotation * Vector3::new(p[0], p[1], p[2])).z)
            .collect();
        let spread = rotated.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
            - rotated.iter().cloned().fold(f64::INFINITY, f64::min);
        assert!(spread < 1e-9);

        // Flipped canonical normal points up, towards the camera side (-Y)
        assert!(alignment.normal.y < 0.0);
    }

    #[test]
    fn antiparallel_normal_gives_identity() {
        assert_eq!(rotation_to_up(&Vector3::new(0.0, 0.0, -1.0)), Rotation3::identity());
        assert_eq!(rotation_to_up(&Vector3::new(0.0, 0.0, 2.0)), Rotation3::identity());
    }

    #[test]
    fn camera_facing_plane_keeps_identity() {
        let points = plane_grid(|x, y| [x * 0.01, y * 0.01, 5.0]);
        let alignment = aligner(NormalPolicy::Flip).align(&points).unwrap();

        assert_eq!(alignment.rotation, Rotation3::identity());
        assert_eq!(alignment.cam_orientation, [1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn toward_camera_policy_points_at_origin() {
        let centroid = Vector3::new(0.0, 2.0, 5.0);
        let n = orient_normal(Vector3::new(0.0, 1.0, 0.0), NormalPolicy::TowardCamera, &centroid);
        assert_eq!(n, Vector3::new(0.0, -1.0, 0.0));
        let n = orient_normal(Vector3::new(0.0, -1.0, 0.0), NormalPolicy::TowardCamera, &centroid);
        assert_eq!(n, Vector3::new(0.0, -1.0, 0.0));
    }

    #[test]
    fn inverse_orientation_is_conjugate() {
        let r = rotation_to_up(&Vector3::new(0.0, -1.0, 0.0));
        let q = camera_orientation(&r, OrientationPolicy::Rotation);
        let q_inv = camera_orientation(&r, OrientationPolicy::Inverse);

        assert!((q[0] - q_inv[0]).abs() < 1e-12);
        for k in 1..4 {
            assert!((q[k] + q_inv[k]).abs() < 1e-12);
        }
        // Quarter turn about -X
        let half = std::f64::consts::FRAC_1_SQRT_2;
        assert!((q[0] - half).abs() < 1e-12);
        assert!((q[1] + half).abs() < 1e-12);
    }

    #[test]
    fn diagnostic_cloud_appends_red_arrow() {
        let points = vec![[0.0, 0.0, 0.0], [2.0, 0.0, 0.0]];
        let aligner = aligner(NormalPolicy::Keep);
        let (positions, colours) = aligner.diagnostic_cloud(&points, &Vector3::new(0.0, 0.0, 1.0));

        assert_eq!(positions.len(), 202);
        assert_eq!(colours[1], [0.6, 0.6, 0.6]);
        assert_eq!(colours[2], [1.0, 0.0, 0.0]);
        assert_eq!(positions[2], [1.0, 0.0, 0.0]);
        assert!((positions[201][2] - 0.5).abs() < 1e-12);
    }
}
