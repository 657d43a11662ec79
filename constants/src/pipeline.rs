/// Default tuning values for the reconstruction stages.
/// Every value here can be overridden through the pipeline config file.

/// RANSAC inlier distance threshold (scene units)
pub const RANSAC_DISTANCE_THRESHOLD: f64 = 0.01;

/// Points drawn per RANSAC hypothesis
pub const RANSAC_SAMPLE_SIZE: usize = 3;

pub const RANSAC_ITERATIONS: usize = 1000;

/// Smallest consensus set accepted as a ground plane
pub const RANSAC_MIN_INLIERS: usize = 3;

/// 1.0 disables adaptive early termination
pub const RANSAC_CONFIDENCE: f64 = 1.0;

pub const RANSAC_SEED: u64 = 1_234_567;

/// Substitute for non-positive depth when reprojecting mesh vertices
pub const MIN_MESH_DEPTH: f64 = 1e-6;

/// Background covers the object bounds plus 10%
pub const FIT_MARGIN_FACTOR: f64 = 1.1;

/// Background floor sits this far below the lowest object
pub const FIT_FLOOR_OFFSET: f64 = 0.7;

/// Samples along the ground normal arrow in the diagnostic cloud
pub const NORMAL_ARROW_POINTS: usize = 200;
pub const NORMAL_ARROW_LENGTH: f64 = 0.5;

/// Colours for the diagnostic cloud (linear RGB 0-1)
pub const PLANE_POINT_COLOUR: [f32; 3] = [0.6, 0.6, 0.6];
pub const NORMAL_ARROW_COLOUR: [f32; 3] = [1.0, 0.0, 0.0];

/// Guards the min/max normalisation of the depth preview
pub const DEPTH_PREVIEW_EPSILON: f32 = 1e-8;
