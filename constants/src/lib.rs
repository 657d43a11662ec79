pub mod coordinate_system;
pub mod files;
pub mod pipeline;
