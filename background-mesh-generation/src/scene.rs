//! Object placements produced by the scene generator.

use crate::bounds::AxisAlignedBounds;
use crate::error::PipelineResult;
use crate::storage::require_input;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// One placed object. Fields other than `name` and `position` are kept opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectPlacement {
    pub name: String,
    pub position: Position,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneDescription {
    #[serde(default)]
    pub objects: Vec<ObjectPlacement>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SceneDescription {
    pub fn load(path: &Path) -> PipelineResult<Self> {
        require_input(path, "scene generation")?;
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Bounds of the object positions, `None` without objects.
    pub fn bounds(&self) -> Option<AxisAlignedBounds> {
        AxisAlignedBounds::from_points(
            self.objects
                .iter()
                .map(|o| [o.position.x, o.position.y, o.position.z]),
        )
    }
}
