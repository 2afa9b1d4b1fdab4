//! OBJ format support
//!
//! Polygons are fan-triangulated on read. Each distinct `v/vt/vn` corner
//! becomes its own output vertex, so UV seams split positions.

use crate::{IoError, MeshReader, MeshWriter};
use polyreduce_core::{Point3f, Result, TriangleMesh, Vector3f, UV};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

pub struct ObjReader;
pub struct ObjWriter;

type CornerKey = (usize, Option<usize>, Option<usize>);

#[derive(Default)]
struct ObjBuilder {
    positions: Vec<Point3f>,
    texcoords: Vec<UV>,
    normals: Vec<Vector3f>,
    corners: HashMap<CornerKey, usize>,
    corner_keys: Vec<CornerKey>,
    faces: Vec<[usize; 3]>,
    face_materials: Vec<Option<usize>>,
    material_libs: Vec<String>,
    materials: Vec<String>,
    material_lookup: HashMap<String, usize>,
    current_material: Option<usize>,
}

/// Library names on an `mtllib` line
///
/// Several names are split only when every token ends in `.mtl`; otherwise
/// the whole argument is one file name that contains spaces.
pub fn mtllib_names(rest: &str) -> Vec<String> {
    let rest = rest.trim();
    if rest.is_empty() {
        return Vec::new();
    }
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    if tokens.len() > 1 && !tokens.iter().all(|t| t.to_ascii_lowercase().ends_with(".mtl")) {
        return vec![rest.to_string()];
    }
    tokens.into_iter().map(str::to_string).collect()
}

impl ObjReader {
    /// Parse OBJ text from any buffered reader
    pub fn parse<R: BufRead>(reader: R) -> std::result::Result<TriangleMesh, IoError> {
        let mut builder = ObjBuilder::default();

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line_no = idx + 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (keyword, rest) = match line.split_once(char::is_whitespace) {
                Some((k, r)) => (k, r.trim()),
                None => (line, ""),
            };

            match keyword {
                "v" => {
                    let [x, y, z] = parse_floats::<3>(rest, line_no, "vertex")?;
                    builder.positions.push(Point3f::new(x, y, z));
                }
                "vt" => {
                    let [u, v] = parse_floats::<2>(rest, line_no, "texture coordinate")?;
                    builder.texcoords.push([u, v]);
                }
                "vn" => {
                    let [x, y, z] = parse_floats::<3>(rest, line_no, "normal")?;
                    builder.normals.push(Vector3f::new(x, y, z));
                }
                "f" => builder.push_polygon(rest, line_no)?,
                "mtllib" => builder.material_libs.extend(mtllib_names(rest)),
                "usemtl" => builder.use_material(rest),
                // Groups, objects, smoothing and lines carry nothing we keep
                _ => {}
            }
        }

        Ok(builder.finish())
    }
}

impl ObjBuilder {
    fn resolve(&self, raw: &str, len: usize, line: usize, what: &str) -> std::result::Result<usize, IoError> {
        let idx: i64 = raw
            .parse()
            .map_err(|_| IoError::parse(line, format!("invalid {what} index '{raw}'")))?;
        let resolved = match idx {
            0 => return Err(IoError::parse(line, format!("{what} index 0 is not valid"))),
            i if i < 0 => len as i64 + i,
            i => i - 1,
        };
        if resolved < 0 || resolved as usize >= len {
            return Err(IoError::parse(
                line,
                format!("{what} index {idx} out of range ({len} defined)"),
            ));
        }
        Ok(resolved as usize)
    }

    fn corner(&mut self, token: &str, line: usize) -> std::result::Result<usize, IoError> {
        let mut parts = token.split('/');
        let v = parts.next().unwrap_or_default();
        let vt = parts.next().filter(|s| !s.is_empty());
        let vn = parts.next().filter(|s| !s.is_empty());

        let key = (
            self.resolve(v, self.positions.len(), line, "vertex")?,
            vt.map(|s| self.resolve(s, self.texcoords.len(), line, "texture coordinate"))
                .transpose()?,
            vn.map(|s| self.resolve(s, self.normals.len(), line, "normal"))
                .transpose()?,
        );

        let next = self.corner_keys.len();
        let index = *self.corners.entry(key).or_insert(next);
        if index == next {
            self.corner_keys.push(key);
        }
        Ok(index)
    }

    fn push_polygon(&mut self, rest: &str, line: usize) -> std::result::Result<(), IoError> {
        let corners = rest
            .split_whitespace()
            .map(|token| self.corner(token, line))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if corners.len() < 3 {
            return Err(IoError::parse(
                line,
                format!("face needs at least 3 vertices, found {}", corners.len()),
            ));
        }

        for i in 1..corners.len() - 1 {
            self.faces.push([corners[0], corners[i], corners[i + 1]]);
            self.face_materials.push(self.current_material);
        }
        Ok(())
    }

    fn use_material(&mut self, name: &str) {
        let next = self.materials.len();
        let index = *self.material_lookup.entry(name.to_string()).or_insert(next);
        if index == next {
            self.materials.push(name.to_string());
        }
        self.current_material = Some(index);
    }

    fn finish(mut self) -> TriangleMesh {
        let vertices = self
            .corner_keys
            .iter()
            .map(|&(v, _, _)| self.positions[v])
            .collect();

        let uvs = self
            .corner_keys
            .iter()
            .any(|&(_, vt, _)| vt.is_some())
            .then(|| {
                self.corner_keys
                    .iter()
                    .map(|&(_, vt, _)| vt.map(|i| self.texcoords[i]).unwrap_or([0.0, 0.0]))
                    .collect()
            });

        let normals = (!self.corner_keys.is_empty()
            && self.corner_keys.iter().all(|&(_, _, vn)| vn.is_some()))
        .then(|| {
            self.corner_keys
                .iter()
                .map(|&(_, _, vn)| vn.map(|i| self.normals[i]).unwrap_or_else(Vector3f::zeros))
                .collect()
        });

        let face_materials = if self.face_materials.iter().any(Option::is_some) {
            let fallback = if self.face_materials.iter().any(Option::is_none) {
                self.use_material("default");
                self.current_material
            } else {
                None
            };
            Some(
                self.face_materials
                    .iter()
                    .map(|m| m.or(fallback).unwrap_or_default())
                    .collect(),
            )
        } else {
            None
        };

        tracing::debug!(
            vertices = self.corner_keys.len(),
            faces = self.faces.len(),
            has_uvs = uvs.is_some(),
            materials = self.materials.len(),
            "parsed OBJ"
        );

        TriangleMesh {
            vertices,
            faces: self.faces,
            normals,
            uvs,
            material_libs: self.material_libs,
            materials: self.materials,
            face_materials,
        }
    }
}

fn parse_floats<const N: usize>(
    rest: &str,
    line: usize,
    what: &str,
) -> std::result::Result<[f32; N], IoError> {
    let mut out = [0.0f32; N];
    let mut tokens = rest.split_whitespace();
    for slot in out.iter_mut() {
        let token = tokens
            .next()
            .ok_or_else(|| IoError::parse(line, format!("{what} needs {N} components")))?;
        *slot = token
            .parse()
            .map_err(|_| IoError::parse(line, format!("invalid {what} component '{token}'")))?;
    }
    if out.iter().any(|c| !c.is_finite()) {
        return Err(IoError::parse(line, format!("non-finite {what} component")));
    }
    Ok(out)
}

impl MeshReader for ObjReader {
    fn read_mesh<P: AsRef<Path>>(path: P) -> Result<TriangleMesh> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => IoError::FileNotFound {
                path: path.display().to_string(),
            },
            _ => IoError::Io(e),
        })?;
        Ok(Self::parse(BufReader::new(file))?)
    }
}

impl ObjWriter {
    /// Write OBJ text; faces are grouped under `usemtl` statements in order
    pub fn write<W: Write>(mesh: &TriangleMesh, mut writer: W) -> std::io::Result<()> {
        writeln!(writer, "# polyreduce")?;
        writeln!(writer, "# vertices: {} faces: {}", mesh.vertex_count(), mesh.face_count())?;
        for lib in &mesh.material_libs {
            writeln!(writer, "mtllib {lib}")?;
        }

        for v in &mesh.vertices {
            writeln!(writer, "v {} {} {}", v.x, v.y, v.z)?;
        }
        if let Some(uvs) = &mesh.uvs {
            for [u, v] in uvs {
                writeln!(writer, "vt {u} {v}")?;
            }
        }
        if let Some(normals) = &mesh.normals {
            for n in normals {
                writeln!(writer, "vn {} {} {}", n.x, n.y, n.z)?;
            }
        }

        let has_uv = mesh.uvs.is_some();
        let has_n = mesh.normals.is_some();
        let mut current = None;
        for (i, face) in mesh.faces.iter().enumerate() {
            let material = mesh.face_materials.as_ref().and_then(|fm| fm.get(i)).copied();
            if material.is_some() && material != current {
                if let Some(name) = material.and_then(|m| mesh.materials.get(m)) {
                    writeln!(writer, "usemtl {name}")?;
                }
                current = material;
            }

            write!(writer, "f")?;
            for &v in face {
                let i = v + 1;
                match (has_uv, has_n) {
                    (true, true) => write!(writer, " {i}/{i}/{i}")?,
                    (true, false) => write!(writer, " {i}/{i}")?,
                    (false, true) => write!(writer, " {i}//{i}")?,
                    (false, false) => write!(writer, " {i}")?,
                }
            }
            writeln!(writer)?;
        }
        writer.flush()
    }
}

impl MeshWriter for ObjWriter {
    fn write_mesh<P: AsRef<Path>>(mesh: &TriangleMesh, path: P) -> Result<()> {
        mesh.validate()?;
        let file = File::create(path)?;
        Self::write(mesh, BufWriter::new(file))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polyreduce_core::Error;

    fn parse(text: &str) -> std::result::Result<TriangleMesh, IoError> {
        ObjReader::parse(text.as_bytes())
    }

    #[test]
    fn test_quad_is_fan_triangulated() {
        let mesh = parse("v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n").unwrap();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.faces, vec![[0, 1, 2], [0, 2, 3]]);
        assert!(mesh.uvs.is_none());
        assert!(mesh.normals.is_none());
    }

    #[test]
    fn test_uv_seam_splits_position() {
        let text = "\
v 0 0 0
v 1 0 0
v 0 1 0
v 1 1 0
vt 0 0
vt 1 0
vt 0 1
vt 1 1
vt 0.5 0.5
f 1/1 2/2 3/3
f 2/5 4/4 3/3
";
        let mesh = parse(text).unwrap();
        // Vertex 2 appears with two different texture coordinates
        assert_eq!(mesh.vertex_count(), 5);
        assert_eq!(mesh.uvs.as_ref().unwrap().len(), 5);
        assert_eq!(mesh.vertices[1], mesh.vertices[3]);
    }

    #[test]
    fn test_negative_indices_are_relative() {
        let mesh = parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n").unwrap();
        assert_eq!(mesh.faces, vec![[0, 1, 2]]);
    }

    #[test]
    fn test_out_of_range_index_is_decode_error() {
        let err = parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 9\n").unwrap_err();
        assert!(matches!(err, IoError::ParseError { line: 4, .. }));

        let core: Error = err.into();
        assert!(core.is_decode());
    }

    #[test]
    fn test_malformed_vertex_is_rejected() {
        assert!(matches!(
            parse("v 0 zero 0\n"),
            Err(IoError::ParseError { line: 1, .. })
        ));
        assert!(parse("v 0 0 0\nv 1 0 0\nf 1 2\n").is_err());
    }

    #[test]
    fn test_materials_are_recorded_per_face() {
        let text = "\
mtllib scene.mtl
v 0 0 0
v 1 0 0
v 0 1 0
v 1 1 0
usemtl wood
f 1 2 3
usemtl metal
f 2 4 3
usemtl wood
f 1 3 4
";
        let mesh = parse(text).unwrap();
        assert_eq!(mesh.material_libs, vec!["scene.mtl"]);
        assert_eq!(mesh.materials, vec!["wood", "metal"]);
        assert_eq!(mesh.face_materials, Some(vec![0, 1, 0]));
    }

    #[test]
    fn test_write_then_read_keeps_attributes() {
        let text = "\
mtllib a.mtl
v 0 0 0
v 1 0 0
v 0 1 0
vt 0 0
vt 1 0
vt 0 1
vn 0 0 1
usemtl skin
f 1/1/1 2/2/1 3/3/1
";
        let mesh = parse(text).unwrap();
        let mut out = Vec::new();
        ObjWriter::write(&mesh, &mut out).unwrap();
        let written = String::from_utf8(out).unwrap();
        assert!(written.contains("mtllib a.mtl"));
        assert!(written.contains("usemtl skin"));
        assert!(written.contains("f 1/1/1 2/2/2 3/3/3"));

        let reread = parse(&written).unwrap();
        assert_eq!(reread.face_count(), 1);
        assert_eq!(reread.uvs, mesh.uvs);
        assert_eq!(reread.materials, mesh.materials);
    }

    #[test]
    fn test_mtllib_with_spaces_is_one_name() {
        assert_eq!(mtllib_names("my model.mtl"), vec!["my model.mtl"]);
        assert_eq!(mtllib_names(" a.mtl  b.MTL "), vec!["a.mtl", "b.MTL"]);
        assert!(mtllib_names("").is_empty());

        let mesh = ObjReader::parse("mtllib old chair.mtl\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n".as_bytes()).unwrap();
        assert_eq!(mesh.material_libs, vec!["old chair.mtl"]);
    }

    #[test]
    fn test_read_mesh_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ObjReader::read_mesh(dir.path().join("absent.obj")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
