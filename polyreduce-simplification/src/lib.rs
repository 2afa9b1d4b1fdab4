//! Mesh simplification and decimation algorithms
//!
//! This crate provides the polygon reduction primitive used by polyreduce
//! and the driver that applies it in bounded steps:
//! - Quadric error metrics
//! - Edge collapse decimation to an exact face budget
//! - Progressive multi-step reduction with UV-loss fallback

pub mod quadric_error;
pub mod edge_collapse;
pub mod progressive;

pub use quadric_error::*;
pub use edge_collapse::*;
pub use progressive::*;

use polyreduce_core::{Result, TriangleMesh};
use serde::{Deserialize, Serialize};

/// Constraints passed to a simplification primitive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReductionConstraints {
    /// Never move or remove vertices on open borders
    pub preserve_boundaries: bool,
    /// Carry texture coordinates and avoid collapses that stretch them
    pub preserve_uv: bool,
}

/// A polygon reduction primitive
///
/// `reduce` must be deterministic for identical inputs and must not return
/// fewer faces than `target_faces`; it may stop above the target when no
/// further collapse is legal.
pub trait MeshSimplifier {
    fn reduce(
        &self,
        mesh: &TriangleMesh,
        target_faces: usize,
        constraints: &ReductionConstraints,
    ) -> Result<TriangleMesh>;
}
