//! Camera intrinsics record shared between the projection and refinement stages.

use crate::error::{PipelineError, PipelineResult};
use crate::storage::write_atomically;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Pinhole camera with the principal point fixed at the image centre.
///
/// Written once after projection and amended once after gravity alignment,
/// when `cam_orientation` (`[w, x, y, z]`) is added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub width: f64,
    pub height: f64,
    pub focal_length: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cam_orientation: Option<[f64; 4]>,
}

impl CameraIntrinsics {
    pub fn new(width: usize, height: usize, focal_length: f64) -> Self {
        Self {
            width: width as f64,
            height: height as f64,
            focal_length,
            cam_orientation: None,
        }
    }

    /// Principal point `(cx, cy)`.
    pub fn principal_point(&self) -> (f64, f64) {
        (self.width / 2.0, self.height / 2.0)
    }

    /// Loads the record, reporting a missing file as `MissingCameraFile`.
    pub fn load(path: &Path) -> PipelineResult<Self> {
        if !path.exists() {
            return Err(PipelineError::MissingCameraFile {
                path: path.to_path_buf(),
            });
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn orientation_is_optional_on_disk() {
        let camera: CameraIntrinsics =
            serde_json::from_str(r#"{"width": 640.0, "height": 480.0, "focal_length": 500.0}"#)
                .unwrap();
        assert_eq!(camera, CameraIntrinsics::new(640, 480, 500.0));
        assert_eq!(camera.principal_point(), (320.0, 240.0));

        let json = serde_json::to_string(&camera).unwrap();
        assert!(!json.contains("cam_orientation"));
    }

    #[test]
    fn amended_record_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camera.json");

        let mut camera = CameraIntrinsics::new(4, 4, 500.0);
        camera.save(&path).unwrap();
        camera.cam_orientation = Some([1.0, 0.0, 0.0, 0.0]);
        camera.save(&path).unwrap();

        assert_eq!(CameraIntrinsics::load(&path).unwrap(), camera);
    }

    #[test]
    fn missing_record_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camera.json");

        match CameraIntrinsics::load(&path) {
            Err(PipelineError::MissingCameraFile { path: reported }) => assert_eq!(reported, path),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
