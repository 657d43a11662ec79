//! Background mesh reconstruction: depth to point map, heightmap mesh,
//! gravity alignment and fitting under a set of placed objects.

pub mod aligner;
pub mod bounds;
pub mod camera;
pub mod config;
pub mod dds;
pub mod depth;
pub mod error;
pub mod fitter;
pub mod heightmap;
pub mod manifest;
pub mod mesh;
pub mod mesh_io;
pub mod pipeline;
pub mod plane;
pub mod point_cloud_io;
pub mod progress;
pub mod projector;
pub mod ransac;
pub mod scene;
pub mod storage;

pub use config::PipelineConfig;
pub use depth::{DepthEstimate, DepthEstimator, DepthMap, PrecomputedDepth};
pub use error::{PipelineError, PipelineResult};
pub use pipeline::BackgroundPipeline;
