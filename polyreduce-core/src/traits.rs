//! Core traits for polyreduce

use crate::{mesh::*, point::*};

/// Trait for objects with spatial extent
pub trait Drawable {
    /// Get the bounding box of the object
    fn bounding_box(&self) -> (Point3f, Point3f);

    /// Get the center point of the object
    fn center(&self) -> Point3f {
        let (min, max) = self.bounding_box();
        nalgebra::center(&min, &max)
    }

    /// Length of the bounding box diagonal
    fn diagonal(&self) -> f32 {
        let (min, max) = self.bounding_box();
        (max - min).norm()
    }
}

impl Drawable for TriangleMesh {
    fn bounding_box(&self) -> (Point3f, Point3f) {
        let Some(first) = self.vertices.first() else {
            return (Point3f::origin(), Point3f::origin());
        };

        self.vertices.iter().fold((*first, *first), |(min, max), v| {
            (min.inf(v), max.sup(v))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bounding_box_and_diagonal() {
        let mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(-1.0, 0.0, 2.0),
                Point3f::new(1.0, 2.0, 0.0),
                Point3f::new(0.0, 1.0, 1.0),
            ],
            vec![[0, 1, 2]],
        );

        let (min, max) = mesh.bounding_box();
        assert_eq!(min, Point3f::new(-1.0, 0.0, 0.0));
        assert_eq!(max, Point3f::new(1.0, 2.0, 2.0));
        assert_relative_eq!(mesh.center(), Point3f::new(0.0, 1.0, 1.0));
        assert_relative_eq!(mesh.diagonal(), 12.0f32.sqrt());
    }

    #[test]
    fn test_empty_mesh_bounding_box() {
        let mesh = TriangleMesh::new();
        assert_eq!(mesh.bounding_box(), (Point3f::origin(), Point3f::origin()));
        assert_eq!(mesh.diagonal(), 0.0);
    }
}
