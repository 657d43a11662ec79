//! Ground plane estimation on top of the generic RANSAC engine.

use crate::config::RansacConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::ransac::{Estimator, RansacOptions, ransac};
use log::{debug, info};
use nalgebra::{Matrix3, SymmetricEigen, Unit, Vector3};
use rayon::prelude::*;

/// Relative tolerance below which three samples count as collinear.
const COLLINEAR_EPSILON: f64 = 1e-9;
/// Planes closer than this to the origin are oriented by their dominant axis.
const ORIGIN_EPSILON: f64 = 1e-12;

/// Plane `n·p + d = 0` with unit normal.
///
/// Canonical orientation: the normal points away from the camera origin
/// (`d <= 0`); for a plane through the origin the largest normal component
/// is positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Unit<Vector3<f64>>,
    pub d: f64,
}

impl Plane {
    /// Plane through `point` with the given (not necessarily unit) normal.
    pub fn from_normal_and_point(normal: Vector3<f64>, point: &Vector3<f64>) -> Option<Self> {
        let normal = Unit::try_new(normal, f64::EPSILON)?;
        let d = -normal.dot(point);
        Some(Self::canonical(normal, d))
    }

    fn canonical(normal: Unit<Vector3<f64>>, d: f64) -> Self {
        let flip = if d.abs() > ORIGIN_EPSILON {
            d > 0.0
        } else {
            normal[normal.iamax()] < 0.0
        };
        if flip {
            Self {
                normal: Unit::new_unchecked(-normal.into_inner()),
                d: -d,
            }
        } else {
            Self { normal, d }
        }
    }

    /// `(a, b, c, d)` with `ax + by + cz + d = 0`.
    pub fn coefficients(&self) -> [f64; 4] {
        [self.normal.x, self.normal.y, self.normal.z, self.d]
    }

    pub fn signed_distance(&self, p: &[f64; 3]) -> f64 {
        self.normal.x * p[0] + self.normal.y * p[1] + self.normal.z * p[2] + self.d
    }
}

fn to_vector(p: &[f64; 3]) -> Vector3<f64> {
    Vector3::new(p[0], p[1], p[2])
}

/// Least-squares plane: centroid plus the eigenvector of the smallest
/// covariance eigenvalue. `None` when the points do not span a plane.
fn least_squares_plane(data: &[[f64; 3]], indices: &[usize]) -> Option<Plane> {
    if indices.len() < 3 {
        return None;
    }

    let n = indices.len() as f64;
    let centroid = indices
        .par_iter()
        .map(|&i| to_vector(&data[i]))
        .reduce(Vector3::zeros, |a, b| a + b)
        / n;
    let covariance = indices
        .par_iter()
        .map(|&i| {
            let c = to_vector(&data[i]) - centroid;
            c * c.transpose()
        })
        .reduce(Matrix3::zeros, |a, b| a + b)
        / n;

    let eigen = SymmetricEigen::new(covariance);
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));
    let (smallest, middle, largest) = (
        order[0],
        eigen.eigenvalues[order[1]],
        eigen.eigenvalues[order[2]],
    );

    // Collinear or coincident points leave two vanishing eigenvalues
    if largest <= 0.0 || middle <= COLLINEAR_EPSILON * largest {
        return None;
    }

    let normal = eigen.eigenvectors.column(smallest).into_owned();
    Plane::from_normal_and_point(normal, &centroid)
}

pub struct PlaneEstimator;

impl Estimator for PlaneEstimator {
    type Datum = [f64; 3];
    type Model = Plane;

    const MIN_SAMPLES: usize = 3;

    fn fit(data: &[Self::Datum], sample_indices: &[usize]) -> Option<Self::Model> {
        if sample_indices.len() == 3 {
            let a = to_vector(&data[sample_indices[0]]);
            let b = to_vector(&data[sample_indices[1]]);
            let c = to_vector(&data[sample_indices[2]]);
            return Plane::from_normal_and_point((b - a).cross(&(c - a)), &a);
        }
        least_squares_plane(data, sample_indices)
    }

    fn residual(model: &Self::Model, datum: &Self::Datum) -> f64 {
        model.signed_distance(datum).abs()
    }

    fn is_degenerate(data: &[Self::Datum], sample_indices: &[usize]) -> bool {
        if sample_indices.len() != 3 {
            return false;
        }
        let a = to_vector(&data[sample_indices[0]]);
        let ab = to_vector(&data[sample_indices[1]]) - a;
        let ac = to_vector(&data[sample_indices[2]]) - a;
        ab.cross(&ac).norm() <= COLLINEAR_EPSILON * ab.norm() * ac.norm()
    }

    fn refit(data: &[Self::Datum], inliers: &[usize]) -> Option<Self::Model> {
        least_squares_plane(data, inliers)
    }
}

/// Winning plane with its consensus set.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaneFit {
    pub plane: Plane,
    pub inliers: Vec<usize>,
    pub inlier_rms: f64,
    pub iterations: usize,
}

/// Fit the dominant plane with the full set of RANSAC knobs.
pub fn fit_plane(points: &[[f64; 3]], config: &RansacConfig) -> PipelineResult<PlaneFit> {
    if config.ransac_n < PlaneEstimator::MIN_SAMPLES {
        return Err(PipelineError::PlaneFitFailed {
            reason: format!("ransac_n must be at least 3, got {}", config.ransac_n),
        });
    }
    if points.len() < config.ransac_n {
        return Err(PipelineError::PlaneFitFailed {
            reason: format!(
                "need at least {} points, got {}",
                config.ransac_n,
                points.len()
            ),
        });
    }

    let opts = RansacOptions {
        max_iters: config.iterations,
        thresh: config.distance_threshold,
        min_inliers: config.min_inliers,
        confidence: config.confidence,
        seed: config.seed,
        sample_size: Some(config.ransac_n),
        refit_on_inliers: true,
    };
    debug!("Plane RANSAC options: {:?}", opts);

    let result = ransac::<PlaneEstimator>(points, &opts);
    let plane = match (result.success, result.model) {
        (true, Some(plane)) => plane,
        _ => {
            return Err(PipelineError::PlaneFitFailed {
                reason: format!(
                    "no plane gathered {} inliers within {} iterations",
                    config.min_inliers, result.iters
                ),
            });
        }
    };

    info!(
        "Plane [{:.4}, {:.4}, {:.4}, {:.4}] with {}/{} inliers after {} iterations",
        plane.normal.x,
        plane.normal.y,
        plane.normal.z,
        plane.d,
        result.inliers.len(),
        points.len(),
        result.iters
    );

    Ok(PlaneFit {
        plane,
        inliers: result.inliers,
        inlier_rms: result.inlier_rms,
        iterations: result.iters,
    })
}

/// `(plane, inliers)` with the default seed, inlier floor and confidence.
pub fn fit_plane_ransac(
    points: &[[f64; 3]],
    distance_threshold: f64,
    ransac_n: usize,
    iterations: usize,
) -> PipelineResult<([f64; 4], Vec<usize>)> {
    let config = RansacConfig {
        distance_threshold,
        ransac_n,
        iterations,
        ..RansacConfig::default()
    };
    let fit = fit_plane(points, &config)?;
    Ok((fit.plane.coefficients(), fit.inliers))
}
