//! Symmetric 2x2 tensors: basis changes, eigenvalues and the plane-stress
//! material law shared by the curvature and stress evaluators.

use nalgebra::{Matrix2, Matrix3, Vector3};

use crate::error::{Result, TraceError};
use crate::settings::Material;

/// Relative slack under which a negative discriminant is treated as zero.
const DISCRIMINANT_SLACK: f64 = 1e-12;

/// Roots `0.5 * (trace ∓ sqrt(trace² - 4 det))` of a 2x2 characteristic
/// polynomial, smaller root first.
pub fn eigenvalues(trace: f64, det: f64) -> Result<(f64, f64)> {
    let mut disc = trace * trace - 4.0 * det;
    if disc < 0.0 {
        if disc > -DISCRIMINANT_SLACK * (trace * trace + 1.0) {
            disc = 0.0;
        } else {
            return Err(TraceError::ComplexEigenvalues);
        }
    }
    let root = disc.sqrt();
    Ok((0.5 * (trace - root), 0.5 * (trace + root)))
}

/// A symmetric 2x2 tensor `[[xx, xy], [xy, yy]]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sym2 {
    /// First diagonal component.
    pub xx: f64,
    /// Second diagonal component.
    pub yy: f64,
    /// Off-diagonal component.
    pub xy: f64,
}

impl Sym2 {
    /// Create from components.
    pub fn new(xx: f64, yy: f64, xy: f64) -> Self {
        Self { xx, yy, xy }
    }

    /// Symmetric part of a general matrix.
    pub fn from_matrix(m: &Matrix2<f64>) -> Self {
        Self::new(m[(0, 0)], m[(1, 1)], 0.5 * (m[(0, 1)] + m[(1, 0)]))
    }

    /// Dense matrix form.
    pub fn matrix(&self) -> Matrix2<f64> {
        Matrix2::new(self.xx, self.xy, self.xy, self.yy)
    }

    /// Trace.
    pub fn trace(&self) -> f64 {
        self.xx + self.yy
    }

    /// Determinant.
    pub fn det(&self) -> f64 {
        self.xx * self.yy - self.xy * self.xy
    }

    /// Inverse, or `None` when singular.
    pub fn inverse(&self) -> Option<Self> {
        let det = self.det();
        if det.abs() < 1e-300 {
            return None;
        }
        Some(Self::new(self.yy / det, self.xx / det, -self.xy / det))
    }

    /// Component-wise difference.
    pub fn sub(&self, other: &Self) -> Self {
        Self::new(self.xx - other.xx, self.yy - other.yy, self.xy - other.xy)
    }

    /// Scale every component.
    pub fn scale(&self, s: f64) -> Self {
        Self::new(self.xx * s, self.yy * s, self.xy * s)
    }

    /// Eigenvalues, smaller first.
    pub fn eigenvalues(&self) -> Result<(f64, f64)> {
        eigenvalues(self.trace(), self.det())
    }

    /// Angle of the major principal axis, `0.5 * atan2(2 xy, xx - yy)`.
    pub fn principal_angle(&self) -> f64 {
        0.5 * (2.0 * self.xy).atan2(self.xx - self.yy)
    }

    /// `M T Mᵀ`.
    pub fn transform(&self, m: &Matrix2<f64>) -> Self {
        Self::from_matrix(&(m * self.matrix() * m.transpose()))
    }

    /// `Mᵀ T M`.
    pub fn transform_transpose(&self, m: &Matrix2<f64>) -> Self {
        Self::from_matrix(&(m.transpose() * self.matrix() * m))
    }

    /// Components in an orthonormal frame rotated by `angle`.
    pub fn rotated(&self, angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        self.transform(&Matrix2::new(c, s, -s, c))
    }

    /// Quadratic form `wᵀ T w`.
    pub fn quad(&self, a: f64, b: f64) -> f64 {
        self.bilinear((a, b), (a, b))
    }

    /// Bilinear form `pᵀ T q`.
    pub fn bilinear(&self, p: (f64, f64), q: (f64, f64)) -> f64 {
        p.0 * (self.xx * q.0 + self.xy * q.1) + p.1 * (self.xy * q.0 + self.yy * q.1)
    }
}

// =============================================================================
// Plane-stress material law
// =============================================================================

fn plane_stress(material: &Material, rigidity: f64) -> Matrix3<f64> {
    let nu = material.poisson;
    let c = rigidity / (1.0 - nu * nu);
    Matrix3::new(c, c * nu, 0.0, c * nu, c, 0.0, 0.0, 0.0, c * (1.0 - nu) / 2.0)
}

/// Membrane stiffness `Dm = E t / (1 - ν²) [[1, ν, 0], [ν, 1, 0], [0, 0, (1 - ν) / 2]]`.
pub fn membrane_stiffness(material: &Material) -> Matrix3<f64> {
    plane_stress(material, material.young * material.thickness)
}

/// Bending stiffness `Db`, the membrane matrix with `E t³ / 12` rigidity.
pub fn bending_stiffness(material: &Material) -> Matrix3<f64> {
    let t = material.thickness;
    plane_stress(material, material.young * t * t * t / 12.0)
}

/// Apply a material matrix to a strain tensor in Voigt form
/// `[xx, yy, 2 xy]`, returning the stress tensor.
pub fn apply_material(d: &Matrix3<f64>, strain: &Sym2) -> Sym2 {
    let s = d * Vector3::new(strain.xx, strain.yy, 2.0 * strain.xy);
    Sym2::new(s.x, s.y, s.z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_4;

    #[test]
    fn test_eigenvalues_ordered() {
        let t = Sym2::new(3.0, 1.0, 1.0);
        let (a, b) = t.eigenvalues().unwrap();
        assert!(a <= b);
        assert_relative_eq!(a + b, 4.0, epsilon = 1e-12);
        assert_relative_eq!(a * b, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_tiny_negative_discriminant_clamped() {
        // Exact double root perturbed below zero
        let (a, b) = eigenvalues(2.0, 1.0 + 1e-15).unwrap();
        assert_relative_eq!(a, 1.0, epsilon = 1e-7);
        assert_relative_eq!(b, 1.0, epsilon = 1e-7);
        assert!(matches!(
            eigenvalues(0.0, 1.0),
            Err(TraceError::ComplexEigenvalues)
        ));
    }

    #[test]
    fn test_principal_angle_and_rotation() {
        // Pure shear has principal axes at 45 degrees
        let t = Sym2::new(0.0, 0.0, 1.0);
        assert_relative_eq!(t.principal_angle(), FRAC_PI_4, epsilon = 1e-12);
        let r = t.rotated(t.principal_angle());
        assert_relative_eq!(r.xx, 1.0, epsilon = 1e-12);
        assert_relative_eq!(r.yy, -1.0, epsilon = 1e-12);
        assert!(r.xy.abs() < 1e-12);
        let back = r.rotated(-t.principal_angle());
        assert_relative_eq!(back.xy, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_inverse_and_forms() {
        let g = Sym2::new(4.0, 2.0, 1.0);
        let gi = g.inverse().unwrap();
        let id = g.matrix() * gi.matrix();
        assert!((id - Matrix2::identity()).norm() < 1e-12);
        assert_relative_eq!(g.quad(1.0, 1.0), 8.0, epsilon = 1e-12);
        assert!(Sym2::new(1.0, 1.0, 1.0).inverse().is_none());
    }

    #[test]
    fn test_material_law() {
        let m = Material::new(100.0, 0.25, 0.1).unwrap();
        let dm = membrane_stiffness(&m);
        let n = apply_material(&dm, &Sym2::new(0.01, 0.0, 0.0));
        let c = 100.0 * 0.1 / (1.0 - 0.0625);
        assert_relative_eq!(n.xx, c * 0.01, epsilon = 1e-12);
        assert_relative_eq!(n.yy, c * 0.25 * 0.01, epsilon = 1e-12);
        assert!(n.xy.abs() < 1e-15);

        // Shear modulus: n12 = E t / (2 (1 + ν)) * 2 ε12
        let s = apply_material(&dm, &Sym2::new(0.0, 0.0, 0.01));
        assert_relative_eq!(s.xy, 100.0 * 0.1 / 1.25 * 0.01, epsilon = 1e-12);

        let db = bending_stiffness(&m);
        assert_relative_eq!(db[(0, 0)], dm[(0, 0)] * 0.01 / 12.0, epsilon = 1e-12);
    }
}
