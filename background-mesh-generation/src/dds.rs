//! Float DDS textures holding the point map channels.

use crate::error::{PipelineError, PipelineResult};
use crate::storage::write_atomically;
use ddsfile::{AlphaMode, D3D10ResourceDimension, Dds, DxgiFormat, NewDxgiParams};
use half::f16;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Decoded RGBA float texture.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatTexture {
    pub width: usize,
    pub height: usize,
    /// Interleaved RGBA samples, row-major.
    pub data: Vec<f32>,
}

/// Write RGBA32F texture (positions need full precision)
pub fn write_rgba32f_texture(
    path: &Path,
    width: usize,
    height: usize,
    data: &[f32],
) -> PipelineResult<()> {
    let mut bytes = Vec::with_capacity(data.len() * 4);
    for &value in data {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    write_texture(path, width, height, DxgiFormat::R32G32B32A32_Float, bytes)
}

/// Write RGBA16F texture (normalised colour fits half precision)
pub fn write_rgba16f_texture(
    path: &Path,
    width: usize,
    height: usize,
    data: &[f32],
) -> PipelineResult<()> {
    let mut bytes = Vec::with_capacity(data.len() * 2);
    for &value in data {
        bytes.extend_from_slice(&f16::from_f32(value).to_bits().to_le_bytes());
    }
    write_texture(path, width, height, DxgiFormat::R16G16B16A16_Float, bytes)
}

fn write_texture(
    path: &Path,
    width: usize,
    height: usize,
    format: DxgiFormat,
    bytes: Vec<u8>,
) -> PipelineResult<()> {
    let params = NewDxgiParams {
        height: height as u32,
        width: width as u32,
        depth: None,
        format,
        mipmap_levels: Some(1),
        array_layers: Some(1),
        caps2: None,
        is_cubemap: false,
        resource_dimension: D3D10ResourceDimension::Texture2D,
        alpha_mode: AlphaMode::Unknown,
    };

    let mut dds = Dds::new_dxgi(params)?;
    dds.data = bytes;
    write_atomically(path, |file| {
        dds.write(file)?;
        Ok(())
    })
}

/// Read an RGBA32F or RGBA16F texture back into f32 samples.
pub fn read_rgba_texture(path: &Path) -> PipelineResult<FloatTexture> {
    let mut reader = BufReader::new(File::open(path)?);
    let dds = Dds::read(&mut reader)?;
    let width = dds.get_width() as usize;
    let height = dds.get_height() as usize;
    let expected = width * height * 4;

    let data: Vec<f32> = match dds.get_dxgi_format() {
        Some(DxgiFormat::R32G32B32A32_Float) => dds
            .data
            .chunks_exact(4)
            .take(expected)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
        Some(DxgiFormat::R16G16B16A16_Float) => dds
            .data
            .chunks_exact(2)
            .take(expected)
            .map(|b| f16::from_bits(u16::from_le_bytes([b[0], b[1]])).to_f32())
            .collect(),
        other => {
            return Err(PipelineError::parse(
                path,
                format!("unsupported texture format {:?}", other),
            ));
        }
    };

    if data.len() != expected {
        return Err(PipelineError::parse(
            path,
            format!("expected {} samples, found {}", expected, data.len()),
        ));
    }

    Ok(FloatTexture {
        width,
        height,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_precision_texture_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("position.dds");
        let data: Vec<f32> = (0..3 * 2 * 4).map(|v| v as f32 * 0.013 - 0.1).collect();

        write_rgba32f_texture(&path, 3, 2, &data).unwrap();
        let texture = read_rgba_texture(&path).unwrap();

        assert_eq!(texture.width, 3);
        assert_eq!(texture.height, 2);
        assert_eq!(texture.data, data);
    }

    #[test]
    fn half_precision_texture_keeps_colour_accuracy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("colour.dds");
        let data: Vec<f32> = (0..2 * 2 * 4).map(|v| v as f32 / 15.0).collect();

        write_rgba16f_texture(&path, 2, 2, &data).unwrap();
        let texture = read_rgba_texture(&path).unwrap();

        for (read, written) in texture.data.iter().zip(&data) {
            assert!((read - written).abs() < 1e-3);
        }
    }
}
