//! Error taxonomy shared by every pipeline stage.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors that abort a pipeline stage.
///
/// Every variant is fatal for the stage that raised it. Outputs are only
/// renamed into place after a successful write, so files left by earlier
/// stages (or earlier runs) stay untouched.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Colour and depth (or point map) resolutions disagree.
    #[error("shape mismatch: {what} is {actual_width}x{actual_height}, expected {expected_width}x{expected_height}")]
    ShapeMismatch {
        what: &'static str,
        expected_width: usize,
        expected_height: usize,
        actual_width: usize,
        actual_height: usize,
    },

    /// Camera record from the projection stage is absent.
    #[error("camera file not found at {path}; re-run the `points` stage")]
    MissingCameraFile { path: PathBuf },

    /// An input produced by an earlier stage (or supplied by the user) is absent.
    #[error("input file not found at {path}; re-run the `{stage}` stage")]
    MissingInputFile { path: PathBuf, stage: &'static str },

    /// RANSAC found no plane with enough support.
    #[error("ground plane fit failed: {reason}")]
    PlaneFitFailed { reason: String },

    /// Scene description lists no objects, the target bounds are undefined.
    #[error("scene contains no objects to fit the background to")]
    NoObjects,

    /// Mesh has zero extent along an axis the fit divides by.
    #[error("background mesh is degenerate: zero extent along {axis}")]
    MeshDegenerate { axis: char },

    /// Malformed content in a file this crate reads.
    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("EXR error: {0}")]
    Exr(#[from] exr::error::Error),

    #[error("DDS error: {0}")]
    Dds(#[from] ddsfile::Error),

    #[error("LAS error: {0}")]
    Las(#[from] las::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
}

impl PipelineError {
    pub fn parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
