/// Artefact names shared by every stage of the background pipeline.
/// All paths are relative to the working directory.

/// Source colour photo of the background.
pub const BACKGROUND_IMAGE: &str = "background.webp";

/// Raw metric depth (single channel OpenEXR).
pub const DEPTH_MAP: &str = "depth_map.exr";
/// Normalised 8-bit depth visualisation.
pub const DEPTH_PREVIEW: &str = "depth_map.png";
pub const FOCAL_LENGTH: &str = "focal_length.json";

pub const CAMERA: &str = "camera.json";
pub const POINT_MAP_POSITION: &str = "background_pointmap_position.dds";
pub const POINT_MAP_COLOUR: &str = "background_pointmap_colour.dds";
/// Point cloud export stem, extension follows the configured format.
pub const POINT_CLOUD_STEM: &str = "background_points";

pub const MESH: &str = "background_textured_mesh.obj";
pub const MESH_ALIGNED: &str = "background_textured_mesh_aligned.obj";
pub const GROUND_NORMAL: &str = "ground_normal.ply";

/// Object placements produced by the scene generator.
pub const SCENE: &str = "scene_generated.json";
pub const MANIFEST: &str = "background_manifest.json";
