//! Wavefront OBJ export and import for textured meshes.
//!
//! `name.obj` is written together with `name.mtl` and `name.png`; the
//! material references the texture through `map_Kd`. Faces are triangles
//! with `v/vt` pairs sharing one index, since every vertex has one UV.

use crate::error::{PipelineError, PipelineResult};
use crate::mesh::TexturedMesh;
use crate::progress::progress_bar;
use crate::storage::{save_all_atomically, write_buffered};
use image::{ImageFormat, RgbImage};
use log::{debug, info};
use nalgebra::Point3;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

const MATERIAL_NAME: &str = "background";
const PROGRESS_STEP: usize = 10_000;

/// Sidecar paths `(mtl, png)` for an OBJ path.
pub fn sidecar_paths(obj_path: &Path) -> (PathBuf, PathBuf) {
    (obj_path.with_extension("mtl"), obj_path.with_extension("png"))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Writes the mesh, its material and its texture. The three files are
/// renamed into place together once all of them were written.
pub fn write_obj(path: &Path, mesh: &TexturedMesh) -> PipelineResult<()> {
    let (mtl_path, texture_path) = sidecar_paths(path);
    let total = mesh.vertex_count() + mesh.triangle_count();
    let pb = progress_bar(total as u64, "elements", "Writing OBJ");

    save_all_atomically(&[texture_path.as_path(), mtl_path.as_path(), path], |partials| {
        mesh.texture.save_with_format(&partials[0], ImageFormat::Png)?;

        write_buffered(&partials[1], |writer| {
            writeln!(writer, "newmtl {}", MATERIAL_NAME)?;
            writeln!(writer, "Ka 1.000000 1.000000 1.000000")?;
            writeln!(writer, "Kd 1.000000 1.000000 1.000000")?;
            writeln!(writer, "Ks 0.000000 0.000000 0.000000")?;
            writeln!(writer, "illum 1")?;
            writeln!(writer, "map_Kd {}", file_name(&texture_path))?;
            Ok(())
        })?;

        write_buffered(&partials[2], |writer| {
            writeln!(writer, "# background mesh")?;
            writeln!(writer, "# vertices {}", mesh.vertex_count())?;
            writeln!(writer, "# triangles {}", mesh.triangle_count())?;
            writeln!(writer, "mtllib {}", file_name(&mtl_path))?;

            for (k, v) in mesh.vertices.iter().enumerate() {
                writeln!(writer, "v {} {} {}", v.x, v.y, v.z)?;
                if k % PROGRESS_STEP == 0 {
                    pb.set_position(k as u64);
                }
            }
            for [u, v] in &mesh.uvs {
                writeln!(writer, "vt {} {}", u, v)?;
            }

            writeln!(writer, "usemtl {}", MATERIAL_NAME)?;
            let offset = mesh.vertex_count();
            for (k, tri) in mesh.triangles.iter().enumerate() {
                // OBJ indices are 1-based
                let [a, b, c] = tri.map(|idx| idx + 1);
                writeln!(writer, "f {a}/{a} {b}/{b} {c}/{c}")?;
                if k % PROGRESS_STEP == 0 {
                    pb.set_position((offset + k) as u64);
                }
            }
            Ok(())
        })
    })?;

    pb.finish_with_message("OBJ written");
    info!(
        "Saved {} ({} vertices, {} triangles)",
        path.display(),
        mesh.vertex_count(),
        mesh.triangle_count()
    );
    Ok(())
}

/// Reads a mesh written by [`write_obj`], including its texture.
pub fn read_obj(path: &Path) -> PipelineResult<TexturedMesh> {
    let reader = BufReader::new(File::open(path)?);

    let mut vertices: Vec<Point3<f64>> = Vec::new();
    let mut texcoords: Vec<[f32; 2]> = Vec::new();
    let mut faces: Vec<[(usize, Option<usize>); 3]> = Vec::new();
    let mut material_library: Option<String> = None;

    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = trimmed.split_whitespace().collect();
        let bad_line = |what: &str| PipelineError::parse(path, format!("line {}: {}", line_num + 1, what));

        match parts[0] {
            "v" => {
                let coords = parse_floats::<f64>(&parts[1..])
                    .filter(|c| c.len() >= 3)
                    .ok_or_else(|| bad_line("vertex requires 3 coordinates"))?;
                vertices.push(Point3::new(coords[0], coords[1], coords[2]));
            }
            "vt" => {
                let uv = parse_floats::<f32>(&parts[1..])
                    .filter(|c| c.len() >= 2)
                    .ok_or_else(|| bad_line("texture coordinate requires u and v"))?;
                texcoords.push([uv[0], uv[1]]);
            }
            "f" => {
                if parts.len() != 4 {
                    return Err(bad_line("only triangular faces are supported"));
                }
                let mut face = [(0, None); 3];
                for (slot, corner) in face.iter_mut().zip(&parts[1..]) {
                    *slot = parse_corner(corner).ok_or_else(|| bad_line("invalid face index"))?;
                }
                faces.push(face);
            }
            "mtllib" => material_library = parts.get(1).map(|s| s.to_string()),
            _ => {}
        }
    }

    // One `vt` per `v` in written order means the UVs are per vertex already;
    // otherwise they are gathered from the face corners.
    let per_vertex_uvs = texcoords.len() == vertices.len();
    let mut uvs = if per_vertex_uvs {
        texcoords.clone()
    } else {
        vec![[0.0f32; 2]; vertices.len()]
    };
    let mut triangles = Vec::with_capacity(faces.len());
    for face in &faces {
        let mut tri = [0u32; 3];
        for (slot, &(v, vt)) in tri.iter_mut().zip(face) {
            if v == 0 || v > vertices.len() {
                return Err(PipelineError::parse(path, "vertex index out of bounds"));
            }
            if let Some(vt) = vt {
                let uv = texcoords
                    .get(vt - 1)
                    .ok_or_else(|| PipelineError::parse(path, "texture index out of bounds"))?;
                if !per_vertex_uvs {
                    uvs[v - 1] = *uv;
                }
            }
            *slot = (v - 1) as u32;
        }
        triangles.push(tri);
    }

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let texture = match material_library {
        Some(library) => read_material_texture(&base.join(library))?,
        None => RgbImage::new(1, 1),
    };

    debug!(
        "Read {} ({} vertices, {} triangles)",
        path.display(),
        vertices.len(),
        triangles.len()
    );

    Ok(TexturedMesh {
        vertices,
        uvs,
        triangles,
        texture,
    })
}

fn parse_floats<T: std::str::FromStr>(parts: &[&str]) -> Option<Vec<T>> {
    parts.iter().map(|s| s.parse().ok()).collect()
}

/// `v`, `v/vt`, `v//vn` or `v/vt/vn`, 1-based.
fn parse_corner(corner: &str) -> Option<(usize, Option<usize>)> {
    let mut fields = corner.split('/');
    let v = fields.next()?.parse().ok()?;
    let vt = match fields.next() {
        Some("") | None => None,
        Some(s) => Some(s.parse().ok().filter(|&vt: &usize| vt > 0)?),
    };
    Some((v, vt))
}

fn read_material_texture(mtl_path: &Path) -> PipelineResult<RgbImage> {
    let content = fs::read_to_string(mtl_path)?;
    let texture_name = content
        .lines()
        .filter_map(|line| line.trim().strip_prefix("map_Kd"))
        .map(str::trim)
        .next()
        .ok_or_else(|| PipelineError::parse(mtl_path, "material has no map_Kd texture"))?;

    let base = mtl_path.parent().unwrap_or_else(|| Path::new("."));
    Ok(image::open(base.join(texture_name))?.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heightmap::{grid_triangles, grid_uvs};
    use image::Rgb;

    fn sample_mesh() -> TexturedMesh {
        let mut texture = RgbImage::new(3, 2);
        texture.put_pixel(2, 1, Rgb([9, 120, 240]));
        TexturedMesh {
            vertices: (0..6)
                .map(|k| Point3::new(k as f64 * 0.1, -(k as f64) / 3.0, 5.0 + k as f64))
                .collect(),
            uvs: grid_uvs(3, 2),
            triangles: grid_triangles(3, 2),
            texture,
        }
    }

    #[test]
    fn writes_obj_with_material_and_texture() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mesh.obj");
        write_obj(&path, &sample_mesh()).unwrap();

        let obj = fs::read_to_string(&path).unwrap();
        assert!(obj.contains("mtllib mesh.mtl"));
        assert!(obj.contains("usemtl background"));
        assert!(obj.contains("f 1/1 2/2 4/4"));
        assert_eq!(obj.lines().filter(|l| l.starts_with("v ")).count(), 6);
        assert_eq!(obj.lines().filter(|l| l.starts_with("f ")).count(), 4);

        let mtl = fs::read_to_string(dir.path().join("mesh.mtl")).unwrap();
        assert!(mtl.contains("map_Kd mesh.png"));
        assert!(dir.path().join("mesh.png").exists());
        assert!(!dir.path().join("mesh.partial.obj").exists());
    }

    #[test]
    fn reads_back_what_it_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mesh.obj");
        let mesh = sample_mesh();
        write_obj(&path, &mesh).unwrap();

        let loaded = read_obj(&path).unwrap();
        assert_eq!(loaded, mesh);
    }

    #[test]
    fn single_row_keeps_its_uvs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("row.obj");
        let mesh = TexturedMesh {
            vertices: (0..3).map(|k| Point3::new(k as f64, 0.0, 2.0)).collect(),
            uvs: grid_uvs(3, 1),
            triangles: grid_triangles(3, 1),
            texture: RgbImage::new(3, 1),
        };
        write_obj(&path, &mesh).unwrap();

        let loaded = read_obj(&path).unwrap();
        assert_eq!(loaded.uvs, vec![[0.0, 1.0], [0.5, 1.0], [1.0, 1.0]]);
        assert_eq!(loaded, mesh);
    }

    #[test]
    fn corner_uvs_fill_unshared_coordinates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tri.obj");
        fs::write(
            &path,
            "v 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0.25 0.75\nf 1/1 2/1 3/1\n",
        )
        .unwrap();

        let loaded = read_obj(&path).unwrap();
        assert_eq!(loaded.uvs, vec![[0.25, 0.75]; 3]);
        assert_eq!(loaded.triangles, vec![[0, 1, 2]]);
    }

    #[test]
    fn rejects_quads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quad.obj");
        fs::write(&path, "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n").unwrap();

        assert!(matches!(read_obj(&path), Err(PipelineError::Parse { .. })));
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.obj");
        fs::write(&path, "v 0 0 0\nv 1 0 0\nf 1 2 3\n").unwrap();

        assert!(matches!(read_obj(&path), Err(PipelineError::Parse { .. })));
    }
}
