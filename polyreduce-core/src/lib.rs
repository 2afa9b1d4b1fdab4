//! Core data structures and traits for polyreduce
//!
//! This crate provides the triangle mesh type shared by the codec,
//! simplification and pipeline crates, along with the common error type.

pub mod point;
pub mod mesh;
pub mod traits;
pub mod error;

pub use point::*;
pub use mesh::*;
pub use traits::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Point3, Vector3};
