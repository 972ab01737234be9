#![warn(missing_docs)]

//! Math types for the surfpath tracing engine.
//!
//! Thin wrappers around nalgebra providing the point, vector and direction
//! types used in both parameter (UV) space and model (XYZ) space, an affine
//! transform for placing test geometry, and the tolerance constants threaded
//! through the tracer.

use nalgebra::{Matrix4, Unit, Vector2, Vector3, Vector4};

/// A point in 3D space.
pub type Point3 = nalgebra::Point3<f64>;

/// A vector in 3D space.
pub type Vec3 = Vector3<f64>;

/// A unit (normalized) direction vector in 3D space.
pub type Dir3 = Unit<Vector3<f64>>;

/// A point in 2D parameter space.
pub type Point2 = nalgebra::Point2<f64>;

/// A vector in 2D space.
pub type Vec2 = Vector2<f64>;

/// 2D cross product (z component of the 3D cross product).
#[inline]
pub fn cross2(a: &Vec2, b: &Vec2) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Solve the 2x2 system `[[a11, a12], [a21, a22]] * x = b`.
///
/// Returns `None` when the determinant is below `1e-300` in magnitude.
pub fn solve2(a11: f64, a12: f64, a21: f64, a22: f64, b: Vec2) -> Option<Vec2> {
    let det = a11 * a22 - a12 * a21;
    if det.abs() < 1e-300 {
        return None;
    }
    Some(Vec2::new(
        (a22 * b.x - a12 * b.y) / det,
        (a11 * b.y - a21 * b.x) / det,
    ))
}

/// A 4x4 affine transformation matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// The underlying 4x4 matrix.
    pub matrix: Matrix4<f64>,
}

impl Transform {
    /// Identity transform.
    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
        }
    }

    /// Translation by `(dx, dy, dz)`.
    pub fn translation(dx: f64, dy: f64, dz: f64) -> Self {
        let mut m = Matrix4::identity();
        m[(0, 3)] = dx;
        m[(1, 3)] = dy;
        m[(2, 3)] = dz;
        Self { matrix: m }
    }

    /// Uniform scale about the origin.
    pub fn uniform_scale(s: f64) -> Self {
        let mut m = Matrix4::identity();
        m[(0, 0)] = s;
        m[(1, 1)] = s;
        m[(2, 2)] = s;
        Self { matrix: m }
    }

    /// Rotation about an arbitrary axis through the origin by `angle` radians.
    ///
    /// Uses Rodrigues' rotation formula.
    pub fn rotation_about_axis(axis: &Dir3, angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        let t = 1.0 - c;
        let (x, y, z) = (axis.as_ref().x, axis.as_ref().y, axis.as_ref().z);
        let mut m = Matrix4::identity();
        m[(0, 0)] = t * x * x + c;
        m[(0, 1)] = t * x * y - s * z;
        m[(0, 2)] = t * x * z + s * y;
        m[(1, 0)] = t * x * y + s * z;
        m[(1, 1)] = t * y * y + c;
        m[(1, 2)] = t * y * z - s * x;
        m[(2, 0)] = t * x * z - s * y;
        m[(2, 1)] = t * y * z + s * x;
        m[(2, 2)] = t * z * z + c;
        Self { matrix: m }
    }

    /// Compose: `self` then `other` (self * other).
    pub fn then(&self, other: &Transform) -> Self {
        Self {
            matrix: self.matrix * other.matrix,
        }
    }

    /// Transform a point.
    pub fn apply_point(&self, p: &Point3) -> Point3 {
        let v = self.matrix * Vector4::new(p.x, p.y, p.z, 1.0);
        Point3::new(v.x, v.y, v.z)
    }

    /// Transform a direction vector (ignores translation).
    pub fn apply_vec(&self, v: &Vec3) -> Vec3 {
        let r = self.matrix * Vector4::new(v.x, v.y, v.z, 0.0);
        Vec3::new(r.x, r.y, r.z)
    }

    /// Inverse of this transform, if it exists.
    pub fn inverse(&self) -> Option<Self> {
        self.matrix.try_inverse().map(|matrix| Self { matrix })
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Tolerance constants for the tracer.
#[derive(Debug, Clone, Copy)]
pub struct Tolerance {
    /// Model-space distance tolerance.
    pub linear: f64,
    /// Parameter-space tolerance for "point lies on a trim".
    pub boundary: f64,
}

impl Tolerance {
    /// Default tolerances (1e-6 linear, 1e-4 boundary).
    pub const DEFAULT: Self = Self {
        linear: 1e-6,
        boundary: 1e-4,
    };
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::DEFAULT
    }
}
