//! I/O operations for meshes
//!
//! This crate reads and writes Wavefront OBJ meshes and their MTL material
//! libraries. Other mesh formats are recognised by extension and rejected
//! with [`polyreduce_core::Error::UnsupportedFormat`].

pub mod error;
pub mod mtl;
pub mod obj;

pub use error::*;
pub use mtl::{MaterialLibrary, MaterialDef, TextureStatement};
pub use obj::{mtllib_names, ObjReader, ObjWriter};

use polyreduce_core::{Result, TriangleMesh};
use std::path::Path;

/// Trait for reading meshes from files
pub trait MeshReader {
    fn read_mesh<P: AsRef<Path>>(path: P) -> Result<TriangleMesh>;
}

/// Trait for writing meshes to files
pub trait MeshWriter {
    fn write_mesh<P: AsRef<Path>>(mesh: &TriangleMesh, path: P) -> Result<()>;
}

/// Mesh file extensions this crate knows about, readable or not
pub const MODEL_EXTENSIONS: &[&str] = &["obj", "glb", "gltf", "fbx", "ply", "stl", "dae", "3ds"];

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
}

/// Whether the path has a known mesh file extension
pub fn is_model_file<P: AsRef<Path>>(path: P) -> bool {
    extension(path.as_ref()).is_some_and(|ext| MODEL_EXTENSIONS.contains(&ext.as_str()))
}

/// Auto-detect format and read mesh
pub fn read_mesh<P: AsRef<Path>>(path: P) -> Result<TriangleMesh> {
    let path = path.as_ref();
    match extension(path).as_deref() {
        Some("obj") => obj::ObjReader::read_mesh(path),
        Some("glb") | Some("gltf") => Err(polyreduce_core::Error::UnsupportedFormat(format!(
            "glTF decoding is not available: {}",
            path.display()
        ))),
        other => Err(polyreduce_core::Error::UnsupportedFormat(format!(
            "Unsupported mesh format: {:?}",
            other
        ))),
    }
}

/// Auto-detect format and write mesh
pub fn write_mesh<P: AsRef<Path>>(mesh: &TriangleMesh, path: P) -> Result<()> {
    let path = path.as_ref();
    match extension(path).as_deref() {
        Some("obj") => obj::ObjWriter::write_mesh(mesh, path),
        other => Err(polyreduce_core::Error::UnsupportedFormat(format!(
            "Unsupported mesh output format: {:?}",
            other
        ))),
    }
}
