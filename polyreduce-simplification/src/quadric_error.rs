//! Quadric error metrics
//!
//! A quadric accumulates squared distances to a set of planes; evaluating it
//! at a point gives the collapse error of moving a vertex there.

use nalgebra::{Matrix4, Vector4};
use polyreduce_core::{Point3d, Point3f, Vector3d};
use std::ops::{Add, AddAssign, Mul};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quadric(Matrix4<f64>);

impl Default for Quadric {
    fn default() -> Self {
        Self::zero()
    }
}

impl Quadric {
    pub fn zero() -> Self {
        Quadric(Matrix4::zeros())
    }

    /// Quadric of the plane `n·p + d = 0`; `n` must be unit length
    pub fn from_plane(n: &Vector3d, d: f64) -> Self {
        let p = Vector4::new(n.x, n.y, n.z, d);
        Quadric(p * p.transpose())
    }

    /// Plane quadric of a triangle, zero for degenerate triangles
    pub fn from_triangle(a: &Point3f, b: &Point3f, c: &Point3f) -> Self {
        let (a, b, c) = (to_f64(a), to_f64(b), to_f64(c));
        match (b - a).cross(&(c - a)).try_normalize(1e-12) {
            Some(n) => Self::from_plane(&n, -n.dot(&a.coords)),
            None => Self::zero(),
        }
    }

    /// Quadric of the plane containing edge `a-b` and perpendicular to the
    /// face normal `face_n`. Used to keep open borders in place.
    pub fn edge_constraint(a: &Point3f, b: &Point3f, face_n: &Vector3d) -> Self {
        let (a, b) = (to_f64(a), to_f64(b));
        match (b - a).cross(face_n).try_normalize(1e-12) {
            Some(n) => Self::from_plane(&n, -n.dot(&a.coords)),
            None => Self::zero(),
        }
    }

    /// Squared-distance error at `p`
    pub fn evaluate(&self, p: &Point3d) -> f64 {
        let v = p.to_homogeneous();
        (v.transpose() * self.0 * v)[0].max(0.0)
    }

    /// Point minimising the error, if the system is well conditioned
    pub fn minimizer(&self) -> Option<Point3d> {
        let q3 = self.0.fixed_view::<3, 3>(0, 0);
        let q1 = self.0.fixed_view::<3, 1>(0, 3);
        if q3.determinant().abs() < 1e-12 {
            return None;
        }
        let inv = q3.try_inverse()?;
        let p = -inv * q1;
        p.iter().all(|c| c.is_finite()).then(|| Point3d::new(p[0], p[1], p[2]))
    }
}

impl Add for Quadric {
    type Output = Quadric;

    fn add(self, rhs: Quadric) -> Quadric {
        Quadric(self.0 + rhs.0)
    }
}

impl AddAssign for Quadric {
    fn add_assign(&mut self, rhs: Quadric) {
        self.0 += rhs.0;
    }
}

impl Mul<f64> for Quadric {
    type Output = Quadric;

    fn mul(self, rhs: f64) -> Quadric {
        Quadric(self.0 * rhs)
    }
}

#[inline]
fn to_f64(p: &Point3f) -> Point3d {
    polyreduce_core::to_f64(p)
}
