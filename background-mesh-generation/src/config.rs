//! Pipeline configuration loaded from TOML.
//!
//! Every numeric constant the stages use is exposed here so a run can be
//! tuned without recompiling. Missing sections or keys fall back to the
//! defaults in the `constants` crate.

use crate::error::PipelineResult;
use constants::pipeline::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub ransac: RansacConfig,
    pub alignment: AlignmentConfig,
    pub mesh: MeshConfig,
    pub fit: FitConfig,
    pub output: OutputConfig,
}

impl PipelineConfig {
    /// Loads a config file; absent keys keep their defaults.
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let content = fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> PipelineResult<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// Ground plane RANSAC parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacConfig {
    /// Maximum point-to-plane distance for an inlier.
    pub distance_threshold: f64,
    /// Points drawn per hypothesis (3 is the minimum for a plane).
    pub ransac_n: usize,
    /// Iteration budget, never exceeded.
    pub iterations: usize,
    /// Smallest consensus set accepted as the ground.
    pub min_inliers: usize,
    /// Early termination confidence in `[0, 1]`; 1.0 runs the full budget.
    pub confidence: f64,
    pub seed: u64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            distance_threshold: RANSAC_DISTANCE_THRESHOLD,
            ransac_n: RANSAC_SAMPLE_SIZE,
            iterations: RANSAC_ITERATIONS,
            min_inliers: RANSAC_MIN_INLIERS,
            confidence: RANSAC_CONFIDENCE,
            seed: RANSAC_SEED,
        }
    }
}

/// How the fitted plane normal is oriented before computing the rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalPolicy {
    /// Negate the fitted normal unconditionally.
    #[default]
    Flip,
    /// Use the fitted normal as returned.
    Keep,
    /// Orient the normal towards the camera origin.
    TowardCamera,
}

/// Which rotation the camera orientation quaternion is derived from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrientationPolicy {
    /// Quaternion of the gravity rotation itself.
    #[default]
    Rotation,
    /// Quaternion of the transposed (inverse) gravity rotation.
    Inverse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    pub normal_policy: NormalPolicy,
    pub orientation_policy: OrientationPolicy,
    /// Samples along the normal arrow in `ground_normal.ply`.
    pub arrow_points: usize,
    pub arrow_length: f64,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            normal_policy: NormalPolicy::default(),
            orientation_policy: OrientationPolicy::default(),
            arrow_points: NORMAL_ARROW_POINTS,
            arrow_length: NORMAL_ARROW_LENGTH,
        }
    }
}

/// Where mesh vertex positions come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VertexSource {
    /// Recompute X/Y from the point map depth and the camera record.
    #[default]
    Reprojected,
    /// Use the stored point map XYZ.
    PointMap,
}

/// Resampling filter used when the texture does not match the point map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    #[default]
    Nearest,
    Triangle,
    CatmullRom,
    Lanczos3,
}

impl From<ResizeFilter> for image::imageops::FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => Self::Nearest,
            ResizeFilter::Triangle => Self::Triangle,
            ResizeFilter::CatmullRom => Self::CatmullRom,
            ResizeFilter::Lanczos3 => Self::Lanczos3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    pub vertex_source: VertexSource,
    /// Replaces depth `<= 0` when reprojecting.
    pub min_depth: f64,
    pub resize_filter: ResizeFilter,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            vertex_source: VertexSource::default(),
            min_depth: MIN_MESH_DEPTH,
            resize_filter: ResizeFilter::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Multiplier on the object/mesh extent ratio.
    pub margin_factor: f64,
    /// Distance from the lowest object down to the background floor.
    pub floor_offset: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            margin_factor: FIT_MARGIN_FACTOR,
            floor_offset: FIT_FLOOR_OFFSET,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointCloudFormat {
    #[default]
    Ply,
    Las,
    Laz,
}

impl PointCloudFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Ply => "ply",
            Self::Las => "las",
            Self::Laz => "laz",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub point_cloud_format: PointCloudFormat,
}
