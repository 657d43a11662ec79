/// Reconstruction frame to target engine frame (row-major: [x_new, y_new, z_new])
/// -90° X rotation (X→X, Y→-Z, Z→Y)
pub const COORDINATE_TRANSFORM: [[f64; 3]; 3] = [
    [1.0, 0.0, 0.0],  // X = X
    [0.0, 0.0, 1.0],  // Y = Z
    [0.0, -1.0, 0.0], // Z = -Y
];

/// World up axis the ground plane normal is aligned with.
pub const WORLD_UP: [f64; 3] = [0.0, 0.0, 1.0];

/// Below this cross product magnitude the normal is treated as already vertical.
pub const PARALLEL_EPSILON: f64 = 1e-8;
