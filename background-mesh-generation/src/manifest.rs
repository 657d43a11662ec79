/// Run manifest summarising the artefacts of every completed stage.
use crate::config::{PointCloudFormat, VertexSource};
use crate::error::PipelineResult;
use crate::fitter::FitReport;
use crate::storage::write_atomically;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Manifest of one working directory. Each stage fills its own section and
/// leaves the others as they were, so stages can be re-run independently.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackgroundManifest {
    pub depth: Option<DepthInfo>,
    pub points: Option<PointsInfo>,
    pub mesh: Option<MeshInfo>,
    pub refine: Option<RefineInfo>,
}

/// Depth raster and its visualisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthInfo {
    pub depth_map: String,
    pub preview: String,
    pub focal_length_px: f64,
    pub width: usize,
    pub height: usize,
    /// Minimum and maximum depth in metres.
    pub depth_range: [f32; 2],
}

/// Point map textures, camera record and point cloud export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsInfo {
    /// Position texture (RGBA32F) with camera-space XYZ.
    pub position_texture: String,
    /// Colour texture (RGBA16F) with normalised RGB.
    pub colour_texture: String,
    pub point_cloud: String,
    pub point_cloud_format: PointCloudFormat,
    pub camera: String,
    pub point_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshInfo {
    pub mesh: String,
    pub vertex_source: VertexSource,
    pub vertex_count: usize,
    pub triangle_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefineInfo {
    pub mesh: String,
    pub ground_normal: String,
    /// `(a, b, c, d)` of the fitted ground plane.
    pub plane: [f64; 4],
    pub inlier_count: usize,
    pub ground_normal_vector: [f64; 3],
    /// `[w, x, y, z]`.
    pub cam_orientation: [f64; 4],
    pub fit: FitReport,
}

impl BackgroundManifest {
    /// Loads an existing manifest or starts an empty one.
    pub fn load_or_default(path: &Path) -> PipelineResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> PipelineResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomically(path, |file| {
            file.write_all(json.as_bytes())?;
            Ok(())
        })
    }

    /// Read-modify-write of a single section.
    pub fn update<F>(path: &Path, edit: F) -> PipelineResult<Self>
    where
        F: FnOnce(&mut Self),
    {
        let mut manifest = Self::load_or_default(path)?;
        edit(&mut manifest);
        manifest.save(path)?;
        Ok(manifest)
    }
}
