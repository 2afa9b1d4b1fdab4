//! Mesh data structures and functionality

use crate::error::{Error, Result};
use crate::point::*;
use serde::{Deserialize, Serialize};

/// A triangle mesh with optional per-vertex attributes and material bindings
///
/// `normals` and `uvs`, when present, hold exactly one entry per vertex.
/// `face_materials`, when present, holds one index into `materials` per face.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<Point3f>,
    pub faces: Vec<[usize; 3]>,
    pub normals: Option<Vec<Vector3f>>,
    pub uvs: Option<Vec<UV>>,
    /// Material library files declared by the source (`mtllib`), as written
    pub material_libs: Vec<String>,
    /// Material names referenced by faces (`usemtl`)
    pub materials: Vec<String>,
    pub face_materials: Option<Vec<usize>>,
}

impl TriangleMesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mesh from vertices and faces
    pub fn from_vertices_and_faces(vertices: Vec<Point3f>, faces: Vec<[usize; 3]>) -> Self {
        Self {
            vertices,
            faces,
            ..Self::default()
        }
    }

    /// Get the number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of faces
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Check if the mesh is empty
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    pub fn has_uvs(&self) -> bool {
        self.uvs.as_ref().is_some_and(|uvs| !uvs.is_empty())
    }

    /// Add a vertex to the mesh
    pub fn add_vertex(&mut self, vertex: Point3f) -> usize {
        let index = self.vertices.len();
        self.vertices.push(vertex);
        index
    }

    /// Add a face to the mesh
    pub fn add_face(&mut self, face: [usize; 3]) {
        self.faces.push(face);
    }

    /// Set texture coordinates; ignored unless there is one per vertex
    pub fn set_uvs(&mut self, uvs: Vec<UV>) {
        if uvs.len() == self.vertices.len() {
            self.uvs = Some(uvs);
        }
    }

    /// Check that every face index refers to an existing vertex and that
    /// attribute arrays agree with the vertex count.
    pub fn validate(&self) -> Result<()> {
        let n = self.vertices.len();
        if let Some((face_idx, face)) = self
            .faces
            .iter()
            .enumerate()
            .find(|(_, face)| face.iter().any(|&v| v >= n))
        {
            return Err(Error::InvalidData(format!(
                "face {} references vertex {:?} but mesh has {} vertices",
                face_idx, face, n
            )));
        }
        if self.normals.as_ref().is_some_and(|v| v.len() != n) {
            return Err(Error::InvalidData("normal count does not match vertex count".into()));
        }
        if self.uvs.as_ref().is_some_and(|v| v.len() != n) {
            return Err(Error::InvalidData("uv count does not match vertex count".into()));
        }
        if let Some(fm) = &self.face_materials {
            if fm.len() != self.faces.len() {
                return Err(Error::InvalidData(
                    "face material count does not match face count".into(),
                ));
            }
            if fm.iter().any(|&m| m >= self.materials.len()) {
                return Err(Error::InvalidData("face material index out of range".into()));
            }
        }
        Ok(())
    }

    /// Area of a single face
    pub fn face_area(&self, face: usize) -> f32 {
        let [a, b, c] = self.faces[face];
        let (v0, v1, v2) = (self.vertices[a], self.vertices[b], self.vertices[c]);
        (v1 - v0).cross(&(v2 - v0)).norm() * 0.5
    }

    /// Calculate face normals
    pub fn calculate_face_normals(&self) -> Vec<Vector3f> {
        self.faces
            .iter()
            .map(|face| {
                let v0 = self.vertices[face[0]];
                let v1 = self.vertices[face[1]];
                let v2 = self.vertices[face[2]];

                let n = (v1 - v0).cross(&(v2 - v0));
                n.try_normalize(f32::EPSILON).unwrap_or_else(Vector3f::zeros)
            })
            .collect()
    }

    /// Drop vertices no face references, remapping faces and attributes.
    pub fn compact(&mut self) {
        let mut remap = vec![usize::MAX; self.vertices.len()];
        let mut next = 0;
        for face in &self.faces {
            for &v in face {
                if remap[v] == usize::MAX {
                    remap[v] = next;
                    next += 1;
                }
            }
        }
        if next == self.vertices.len() && remap.iter().enumerate().all(|(i, &r)| i == r) {
            return;
        }

        fn gather<T: Copy>(src: &[T], remap: &[usize], len: usize) -> Vec<T> {
            let mut out: Vec<Option<T>> = vec![None; len];
            for (old, &new) in remap.iter().enumerate() {
                if new != usize::MAX {
                    out[new] = Some(src[old]);
                }
            }
            out.into_iter().flatten().collect()
        }

        self.vertices = gather(&self.vertices, &remap, next);
        self.normals = self.normals.as_ref().map(|n| gather(n, &remap, next));
        self.uvs = self.uvs.as_ref().map(|uv| gather(uv, &remap, next));
        for face in &mut self.faces {
            for v in face.iter_mut() {
                *v = remap[*v];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn make_quad() -> TriangleMesh {
        TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(1.0, 1.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        )
    }

    #[test]
    fn test_face_area() {
        let mesh = make_quad();
        assert_relative_eq!(mesh.face_area(0), 0.5);
        assert_relative_eq!(mesh.face_area(1), 0.5);
    }

    #[test]
    fn test_validate_rejects_out_of_range_index() {
        let mut mesh = make_quad();
        mesh.add_face([0, 1, 7]);
        assert!(matches!(mesh.validate(), Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_set_uvs_requires_matching_length() {
        let mut mesh = make_quad();
        mesh.set_uvs(vec![[0.0, 0.0]; 3]);
        assert!(!mesh.has_uvs());
        mesh.set_uvs(vec![[0.0, 0.0]; 4]);
        assert!(mesh.has_uvs());
    }

    #[test]
    fn test_compact_drops_unreferenced_vertices() {
        let mut mesh = make_quad();
        mesh.set_uvs(vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]);
        mesh.faces = vec![[1, 2, 3]];
        mesh.compact();

        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.faces, vec![[0, 1, 2]]);
        assert_eq!(mesh.uvs.as_ref().unwrap()[0], [1.0, 0.0]);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_degenerate_face_normal_is_zero() {
        let mesh = TriangleMesh::from_vertices_and_faces(
            vec![Point3f::origin(); 3],
            vec![[0, 1, 2]],
        );
        assert_eq!(mesh.calculate_face_normals()[0], Vector3f::zeros());
    }
}
