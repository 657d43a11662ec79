//! Depth map raster and the depth estimator seam.
//!
//! Monocular depth estimation itself runs outside this crate. Callers hand
//! the pipeline an explicit [`DepthEstimator`] handle; the pipeline never
//! keeps a model alive on its own.

use crate::error::{PipelineError, PipelineResult};
use crate::storage::{require_input, save_atomically, write_atomically};
use constants::pipeline::DEPTH_PREVIEW_EPSILON;
use exr::prelude::{
    AnyChannel, AnyChannels, Encoding, FlatSamples, Image as ExrImage, Layer, LayerAttributes,
    WritableImage, read_first_flat_layer_from_file,
};
use image::{GrayImage, ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Channel name used for the depth samples in OpenEXR files.
const DEPTH_CHANNEL: &str = "Z";

/// Per-pixel metric depth, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthMap {
    width: usize,
    height: usize,
    values: Vec<f32>,
}

impl DepthMap {
    /// Wraps raw samples; `None` if the buffer does not hold `width * height` values.
    pub fn from_raw(width: usize, height: usize, values: Vec<f32>) -> Option<Self> {
        (values.len() == width * height).then_some(Self {
            width,
            height,
            values,
        })
    }

    pub fn filled(width: usize, height: usize, depth: f32) -> Self {
        Self {
            width,
            height,
            values: vec![depth; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.values[i * self.width..(i + 1) * self.width]
    }

    pub fn range(&self) -> (f32, f32) {
        self.values
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &d| {
                (lo.min(d), hi.max(d))
            })
    }

    /// 8-bit visualisation, depth normalised to the map's own min/max.
    pub fn preview(&self) -> GrayImage {
        let (min, max) = self.range();
        let span = max - min + DEPTH_PREVIEW_EPSILON;
        let pixels = self
            .values
            .iter()
            .map(|&d| (((d - min) / span) * 255.0) as u8)
            .collect();
        GrayImage::from_raw(self.width as u32, self.height as u32, pixels)
            .unwrap_or_else(|| GrayImage::new(self.width as u32, self.height as u32))
    }

    /// Writes a single channel float OpenEXR file.
    pub fn save_exr(&self, path: &Path) -> PipelineResult<()> {
        let channel = AnyChannel::new(DEPTH_CHANNEL, FlatSamples::F32(self.values.clone()));
        let layer = Layer::new(
            (self.width, self.height),
            LayerAttributes::named("depth"),
            Encoding::FAST_LOSSLESS,
            AnyChannels::sort(vec![channel].into()),
        );
        let image = ExrImage::from_layer(layer);
        save_atomically(path, |partial| {
            image.write().to_file(partial)?;
            Ok(())
        })
    }

    /// Reads the first channel of the first layer of an OpenEXR file.
    pub fn load_exr(path: &Path) -> PipelineResult<Self> {
        let image = read_first_flat_layer_from_file(path)?;
        let layer = image.layer_data;
        let width = layer.size.width();
        let height = layer.size.height();

        let channel = layer
            .channel_data
            .list
            .first()
            .ok_or_else(|| PipelineError::parse(path, "EXR layer has no channels"))?;
        let values: Vec<f32> = channel.sample_data.values_as_f32().collect();

        Self::from_raw(width, height, values)
            .ok_or_else(|| PipelineError::parse(path, "EXR sample count does not match its size"))
    }

    pub fn save_preview(&self, path: &Path) -> PipelineResult<()> {
        let preview = self.preview();
        save_atomically(path, |partial| {
            preview.save_with_format(partial, ImageFormat::Png)?;
            Ok(())
        })
    }
}

/// Output of a depth estimator run.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthEstimate {
    pub depth: DepthMap,
    pub focal_length_px: f64,
}

/// External monocular depth model.
///
/// Implementations own whatever model state they need; the pipeline only
/// borrows the handle for the duration of one call.
pub trait DepthEstimator {
    fn estimate(&self, image: &RgbImage) -> PipelineResult<DepthEstimate>;
}

/// Depth computed ahead of time by an external tool, stored as OpenEXR.
#[derive(Debug, Clone)]
pub struct PrecomputedDepth {
    pub depth_path: PathBuf,
    pub focal_length_px: f64,
}

impl PrecomputedDepth {
    pub fn new(depth_path: impl Into<PathBuf>, focal_length_px: f64) -> Self {
        Self {
            depth_path: depth_path.into(),
            focal_length_px,
        }
    }
}

impl DepthEstimator for PrecomputedDepth {
    fn estimate(&self, _image: &RgbImage) -> PipelineResult<DepthEstimate> {
        require_input(&self.depth_path, "depth")?;
        Ok(DepthEstimate {
            depth: DepthMap::load_exr(&self.depth_path)?,
            focal_length_px: self.focal_length_px,
        })
    }
}

/// `focal_length.json` written next to the depth map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FocalLengthRecord {
    pub focal_length_px: f64,
}

impl FocalLengthRecord {
    pub fn load(path: &Path) -> PipelineResult<Self> {
        require_input(path, "depth")?;
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

    #[test]
    fn from_raw_rejects_wrong_sample_count() {
        assert!(DepthMap::from_raw(4, 4, vec![1.0; 15]).is_none());
        assert!(DepthMap::from_raw(4, 4, vec![1.0; 16]).is_some());
    }

    #[test]
    fn preview_spans_full_byte_range() {
        let depth = DepthMap::from_raw(3, 1, vec![1.0, 2.0, 3.0]).unwrap();
        let preview = depth.preview();

        assert_eq!(preview.get_pixel(0, 0).0, [0]);
        assert_eq!(preview.get_pixel(1, 0).0, [127]);
        assert_eq!(preview.get_pixel(2, 0).0, [255]);
    }

    #[test]
    fn constant_depth_preview_is_black() {
        let preview = DepthMap::filled(2, 2, 5.0).preview();
        assert!(preview.pixels().all(|p| p.0 == [0]));
    }

    #[test]
    fn exr_round_trip_preserves_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("depth_map.exr");
        let values: Vec<f32> = (0..12).map(|v| 0.5 + v as f32 * 0.25).collect();
        let depth = DepthMap::from_raw(4, 3, values).unwrap();

        depth.save_exr(&path).unwrap();
        let loaded = DepthMap::load_exr(&path).unwrap();

        assert_eq!(loaded, depth);
    }

    #[test]
    fn precomputed_estimator_reports_missing_file() {
        let estimator = PrecomputedDepth::new("/nonexistent/depth.exr", 500.0);
        let image = RgbImage::new(2, 2);
        assert!(matches!(
            estimator.estimate(&image),
            Err(PipelineError::MissingInputFile { stage: "depth", .. })
        ));
    }
}
