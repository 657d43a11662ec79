use crate::config::PointCloudFormat;
use crate::error::{PipelineError, PipelineResult};
use crate::storage::{save_atomically, write_atomically};
use las::point::Format;
use las::{Builder, Color, Point, Transform, Vector, Writer};
use log::info;
use std::io::Write;
use std::path::Path;

/// Coordinate resolution of LAS exports (0.1 mm).
const LAS_SCALE: f64 = 0.0001;

/// Export coloured points; colours are normalised `[0, 1]` RGB.
pub fn write_point_cloud(
    path: &Path,
    positions: &[[f64; 3]],
    colours: &[[f32; 3]],
    format: PointCloudFormat,
) -> PipelineResult<()> {
    if positions.len() != colours.len() {
        return Err(PipelineError::ShapeMismatch {
            what: "point colours",
            expected_width: positions.len(),
            expected_height: 1,
            actual_width: colours.len(),
            actual_height: 1,
        });
    }

    match format {
        PointCloudFormat::Ply => write_ply(path, positions, colours)?,
        PointCloudFormat::Las => write_las(path, positions, colours, false)?,
        PointCloudFormat::Laz => write_las(path, positions, colours, true)?,
    }

    info!("Saved {} ({} points)", path.display(), positions.len());
    Ok(())
}

/// ASCII PLY with float XYZ and 8-bit colour.
pub fn write_ply(path: &Path, positions: &[[f64; 3]], colours: &[[f32; 3]]) -> PipelineResult<()> {
    write_atomically(path, |writer| {
        writeln!(writer, "ply")?;
        writeln!(writer, "format ascii 1.0")?;
        writeln!(writer, "element vertex {}", positions.len())?;
        writeln!(writer, "property float x")?;
        writeln!(writer, "property float y")?;
        writeln!(writer, "property float z")?;
        writeln!(writer, "property uchar red")?;
        writeln!(writer, "property uchar green")?;
        writeln!(writer, "property uchar blue")?;
        writeln!(writer, "end_header")?;

        for (p, c) in positions.iter().zip(colours) {
            let [r, g, b] = c.map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8);
            writeln!(writer, "{} {} {} {} {} {}", p[0], p[1], p[2], r, g, b)?;
        }
        Ok(())
    })
}

fn write_las(
    path: &Path,
    positions: &[[f64; 3]],
    colours: &[[f32; 3]],
    compressed: bool,
) -> PipelineResult<()> {
    let mut builder = Builder::from((1, 4));
    let mut point_format = Format::new(2)?;
    point_format.is_compressed = compressed;
    builder.point_format = point_format;
    let transform = || Transform {
        scale: LAS_SCALE,
        offset: 0.0,
    };
    builder.transforms = Vector {
        x: transform(),
        y: transform(),
        z: transform(),
    };
    let header = builder.into_header()?;

    save_atomically(path, |partial| {
        let mut writer = Writer::from_path(partial, header)?;
        for (p, c) in positions.iter().zip(colours) {
            let [red, green, blue] = c.map(|v| (v.clamp(0.0, 1.0) * u16::MAX as f32).round() as u16);
            let point = Point {
                x: p[0],
                y: p[1],
                z: p[2],
                color: Some(Color::new(red, green, blue)),
                ..Default::default()
            };
            writer.write_point(point)?;
        }
        writer.close()?;
        Ok(())
    })
}
