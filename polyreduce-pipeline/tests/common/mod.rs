//! Shared fixtures for pipeline integration tests

#![allow(dead_code)]

use polyreduce_core::{Point3f, TriangleMesh};
use polyreduce_io::{MeshWriter, ObjWriter};
use polyreduce_pipeline::{JobContext, RetopologyBackend, RetopologyParams};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Torus with per-vertex UVs; seam vertices are duplicated with identical positions
pub fn torus(segments: usize, rings: usize) -> TriangleMesh {
    let (big, small) = (2.0f32, 0.6f32);
    let mut vertices = Vec::new();
    let mut uvs = Vec::new();
    for i in 0..=rings {
        for j in 0..=segments {
            let u = (j % segments) as f32 / segments as f32 * std::f32::consts::TAU;
            let v = (i % rings) as f32 / rings as f32 * std::f32::consts::TAU;
            vertices.push(Point3f::new(
                (big + small * v.cos()) * u.cos(),
                (big + small * v.cos()) * u.sin(),
                small * v.sin(),
            ));
            uvs.push([j as f32 / segments as f32, i as f32 / rings as f32]);
        }
    }
    let stride = segments + 1;
    let mut faces = Vec::new();
    for i in 0..rings {
        for j in 0..segments {
            let a = i * stride + j;
            let b = a + 1;
            let c = a + stride;
            let d = c + 1;
            faces.push([a, b, d]);
            faces.push([a, d, c]);
        }
    }
    let mut mesh = TriangleMesh::from_vertices_and_faces(vertices, faces);
    mesh.set_uvs(uvs);
    mesh
}

/// Torus with the quads at `(ring, segment)` removed, one hole each
pub fn holed_torus(segments: usize, rings: usize, holes: &[(usize, usize)]) -> TriangleMesh {
    let mut mesh = torus(segments, rings);
    let mut removed: Vec<usize> = holes
        .iter()
        .flat_map(|&(i, j)| {
            let quad = i * segments + j;
            [2 * quad, 2 * quad + 1]
        })
        .collect();
    removed.sort_unstable_by(|a, b| b.cmp(a));
    for face in removed {
        mesh.faces.remove(face);
    }
    mesh
}

/// Split every face into its own three corners carrying the face normal
pub fn flat_shaded(mesh: &TriangleMesh) -> TriangleMesh {
    let face_normals = mesh.calculate_face_normals();
    let mut out = TriangleMesh::new();
    let mut normals = Vec::new();
    let mut uvs = Vec::new();
    for (face, normal) in mesh.faces.iter().zip(face_normals) {
        let base = out.vertex_count();
        for &v in face {
            out.add_vertex(mesh.vertices[v]);
            normals.push(normal);
            if let Some(source) = &mesh.uvs {
                uvs.push(source[v]);
            }
        }
        out.add_face([base, base + 1, base + 2]);
    }
    out.normals = Some(normals);
    if mesh.uvs.is_some() {
        out.uvs = Some(uvs);
    }
    out
}

/// Write `<name>.obj` with a `<name>.mtl` whose diffuse map lives in `textures/`
pub fn write_textured_model(dir: &Path, name: &str, mut mesh: TriangleMesh) -> PathBuf {
    fs::create_dir_all(dir.join("textures")).unwrap();
    fs::write(dir.join("textures").join(format!("{name}_diffuse.png")), b"\x89PNG fake").unwrap();
    fs::write(
        dir.join(format!("{name}.mtl")),
        format!("newmtl surface\nKd 0.8 0.8 0.8\nmap_Kd textures/{name}_diffuse.png\n"),
    )
    .unwrap();

    mesh.material_libs = vec![format!("{name}.mtl")];
    mesh.materials = vec!["surface".to_string()];
    mesh.face_materials = Some(vec![0; mesh.face_count()]);
    let path = dir.join(format!("{name}.obj"));
    ObjWriter::write_mesh(&mesh, &path).unwrap();
    path
}

/// Retopology stand-in that returns a fixed mesh and records its calls
#[derive(Clone)]
pub struct FakeRetopology {
    result: TriangleMesh,
    pub calls: Arc<Mutex<Vec<RetopologyParams>>>,
}

impl FakeRetopology {
    pub fn returning(result: TriangleMesh) -> Self {
        Self {
            result,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl RetopologyBackend for FakeRetopology {
    fn invoke(
        &self,
        _mesh: &TriangleMesh,
        params: &RetopologyParams,
        _timeout: Duration,
        ctx: &JobContext,
    ) -> polyreduce_pipeline::Result<TriangleMesh> {
        fs::write(ctx.logs_dir().join("retopology_fake.log"), "fake run\n")?;
        self.calls.lock().unwrap().push(params.clone());
        let mut mesh = self.result.clone();
        mesh.uvs = None;
        Ok(mesh)
    }
}

/// Job directories left under a temp root
pub fn leftover_jobs(temp_root: &Path) -> Vec<PathBuf> {
    match fs::read_dir(temp_root) {
        Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    }
}
