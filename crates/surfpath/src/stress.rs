//! Principal stress resultants from a reference/actual surface pair.
//!
//! Both surfaces are evaluated at the same parameter point. Membrane strain is
//! the Green-Lagrange difference of the two metrics, bending strain the
//! difference of the two second fundamental forms. Strains are mapped into an
//! orthonormal frame of the reference surface, the plane-stress material law
//! is applied there, and the resulting stress is pushed forward into the
//! actual surface's frame through the area ratio `detF = |a3| / |A3|`.

use nalgebra::Matrix2;
use surfpath_geom::{Surface, SurfaceJet};
use surfpath_math::{Point2, Point3, Vec2, Vec3};

use crate::error::{Result, TraceError};
use crate::settings::Material;
use crate::tensor::{apply_material, bending_stiffness, membrane_stiffness, Sym2};

/// Stress snapshot at one parameter point of the actual surface.
#[derive(Debug, Clone, Copy)]
pub struct StressSample {
    /// Parameter point.
    pub uv: Point2,
    /// Point on the actual surface.
    pub point: Point3,
    /// Actual `∂X/∂u`.
    pub a1: Vec3,
    /// Actual `∂X/∂v`.
    pub a2: Vec3,
    /// Actual unit normal.
    pub normal: Vec3,
    /// Cauchy membrane stress resultant in the actual frame `(ê1, ê2)`.
    pub stress: Sym2,
    /// Bending moment resultant in the reference frame.
    pub moment: Sym2,
    /// Major principal stress.
    pub s1: f64,
    /// Minor principal stress.
    pub s2: f64,
    /// Unit direction of `s1`.
    pub d1: Vec3,
    /// Unit direction of `s2`, `N × D1`.
    pub d2: Vec3,
    /// Parameter-space counterpart of `d1`.
    pub u1: Vec2,
    /// Parameter-space counterpart of `d2`.
    pub u2: Vec2,
    metric_inv: Sym2,
}

/// Orthonormal tangent frame and contravariant basis of one configuration.
struct Frame {
    e1: Vec3,
    e2: Vec3,
    normal: Vec3,
    area: f64,
    metric: Sym2,
    metric_inv: Sym2,
    contra: [Vec3; 2],
    curvature: Sym2,
}

impl Frame {
    fn new(jet: &SurfaceJet) -> Result<Self> {
        let (a1, a2) = (jet.du(), jet.dv());
        let a3 = a1.cross(&a2);
        let area = a3.norm();
        let len1 = a1.norm();
        if area <= 1e-300 || len1 <= 1e-300 || !area.is_finite() {
            return Err(TraceError::DegenerateMetric);
        }
        let normal = a3 / area;
        let e1 = a1 / len1;
        let e2 = normal.cross(&e1);
        let metric = Sym2::new(a1.dot(&a1), a2.dot(&a2), a1.dot(&a2));
        let metric_inv = metric.inverse().ok_or(TraceError::DegenerateMetric)?;
        let contra = [
            metric_inv.xx * a1 + metric_inv.xy * a2,
            metric_inv.xy * a1 + metric_inv.yy * a2,
        ];
        let curvature = Sym2::new(
            jet.duu().dot(&normal),
            jet.dvv().dot(&normal),
            jet.duv().dot(&normal),
        );
        Ok(Self {
            e1,
            e2,
            normal,
            area,
            metric,
            metric_inv,
            contra,
            curvature,
        })
    }

    /// `M[i][α] = e_i · A^α`: covariant components to frame components.
    fn to_cartesian(&self) -> Matrix2<f64> {
        Matrix2::new(
            self.e1.dot(&self.contra[0]),
            self.e1.dot(&self.contra[1]),
            self.e2.dot(&self.contra[0]),
            self.e2.dot(&self.contra[1]),
        )
    }

    /// `P[i][α] = e_i · a_α`: contravariant components to frame components.
    fn push_forward(&self, a1: &Vec3, a2: &Vec3) -> Matrix2<f64> {
        Matrix2::new(
            self.e1.dot(a1),
            self.e1.dot(a2),
            self.e2.dot(a1),
            self.e2.dot(a2),
        )
    }
}

impl StressSample {
    /// Evaluate principal stresses of `actual` relative to `reference` at `uv`.
    pub fn compute(
        reference: &dyn Surface,
        actual: &dyn Surface,
        uv: Point2,
        material: &Material,
    ) -> Result<Self> {
        let ref_jet = reference
            .jet(uv, 2)
            .ok_or(TraceError::EvaluationFailed(uv.x, uv.y))?;
        let act_jet = actual
            .jet(uv, 2)
            .ok_or(TraceError::EvaluationFailed(uv.x, uv.y))?;
        let rf = Frame::new(&ref_jet)?;
        let af = Frame::new(&act_jet)?;

        let m = rf.to_cartesian();

        // Membrane: Green-Lagrange strain, covariant then frame components
        let strain = af.metric.sub(&rf.metric).scale(0.5).transform(&m);
        let mut n = apply_material(&membrane_stiffness(material), &strain);

        // Bending: change of curvature
        let kappa = af.curvature.sub(&rf.curvature).transform(&m);
        let moment = apply_material(&bending_stiffness(material), &kappa);

        // Shell correction in the principal membrane frame
        let alpha0 = n.principal_angle();
        let mp = moment.rotated(alpha0);
        if mp.xx != 0.0 && mp.yy != 0.0 {
            let np = n.rotated(alpha0);
            let kp = kappa.rotated(alpha0);
            let corrected = Sym2::new(
                np.xx - mp.xx * kp.xx,
                np.yy - mp.yy * kp.yy,
                np.xy - mp.xy * kp.xy,
            );
            n = corrected.rotated(-alpha0);
        }

        // Frame components to contravariant, then push forward onto the actual surface
        let contravariant = n.transform_transpose(&m);
        let det_f = af.area / rf.area;
        let p = af.push_forward(&act_jet.du(), &act_jet.dv());
        let stress = contravariant.transform(&p).scale(1.0 / det_f);

        let (minor, major) = stress.eigenvalues()?;
        let alpha = stress.principal_angle();
        let (s, c) = alpha.sin_cos();
        let d1 = c * af.e1 + s * af.e2;
        let d2 = -s * af.e1 + c * af.e2;

        let mut sample = Self {
            uv,
            point: act_jet.point,
            a1: act_jet.du(),
            a2: act_jet.dv(),
            normal: af.normal,
            stress,
            moment,
            s1: major,
            s2: minor,
            d1,
            d2,
            u1: Vec2::zeros(),
            u2: Vec2::zeros(),
            metric_inv: af.metric_inv,
        };
        sample.u1 = sample.to_param(&d1);
        sample.u2 = sample.to_param(&d2);
        Ok(sample)
    }

    /// Parameter-space vector for the tangent part of `v` on the actual surface.
    pub fn to_param(&self, v: &Vec3) -> Vec2 {
        let rhs = Vec2::new(self.a1.dot(v), self.a2.dot(v));
        self.metric_inv.matrix() * rhs
    }

    /// `cos θ · D1 + sin θ · D2`.
    pub fn rotate(&self, theta: f64) -> Vec3 {
        let (s, c) = theta.sin_cos();
        c * self.d1 + s * self.d2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_1_SQRT_2;
    use surfpath_geom::{CylinderSurface, Plane};
    use surfpath_math::{Dir3, Transform};

    fn steel() -> Material {
        Material::new(1000.0, 0.3, 0.1).unwrap()
    }

    #[test]
    fn test_undeformed_is_stress_free() {
        let s = Plane::xy();
        let out = StressSample::compute(&s, &s, Point2::new(0.2, 0.7), &steel()).unwrap();
        assert!(out.s1.abs() < 1e-12);
        assert!(out.s2.abs() < 1e-12);
        assert!(out.d1.dot(&out.d2).abs() < 1e-12);
    }

    #[test]
    fn test_rigid_motion_is_stress_free() {
        let cyl = CylinderSurface::new(2.0);
        let t = Transform::rotation_about_axis(&Dir3::new_normalize(Vec3::new(1.0, 1.0, 0.0)), 0.7)
            .then(&Transform::translation(3.0, -1.0, 2.0));
        let moved = cyl.transform(&t);
        let out =
            StressSample::compute(&cyl, moved.as_ref(), Point2::new(0.4, 1.0), &steel()).unwrap();
        assert!(out.s1.abs() < 1e-9);
        assert!(out.s2.abs() < 1e-9);
    }

    #[test]
    fn test_uniaxial_stretch() {
        let reference = Plane::xy();
        let actual = Plane::new(Point3::origin(), Vec3::new(1.1, 0.0, 0.0), Vec3::y());
        let mat = steel();
        let out = StressSample::compute(&reference, &actual, Point2::new(0.5, 0.5), &mat).unwrap();

        let e11 = 0.5 * (1.21 - 1.0);
        let c = mat.young * mat.thickness / (1.0 - mat.poisson * mat.poisson);
        assert_relative_eq!(out.s1, 1.1 * c * e11, epsilon = 1e-9);
        assert_relative_eq!(out.s2, c * mat.poisson * e11 / 1.1, epsilon = 1e-9);
        assert_relative_eq!(out.d1.x.abs(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(out.d2.y.abs(), 1.0, epsilon = 1e-12);
        // Parameter direction maps back onto the unit 3D direction
        let back = out.u1.x * out.a1 + out.u1.y * out.a2;
        assert!((back - out.d1).norm() < 1e-12);
    }

    #[test]
    fn test_diagonal_stretch_rotates_frame() {
        // F = I + 0.2 d⊗d with d = (1, 1) / √2
        let eps = 0.2;
        let f = |v: Vec3| {
            let d = Vec3::new(FRAC_1_SQRT_2, FRAC_1_SQRT_2, 0.0);
            v + eps * d * d.dot(&v)
        };
        let reference = Plane::xy();
        let actual = Plane::new(Point3::origin(), f(Vec3::x()), f(Vec3::y()));
        let out =
            StressSample::compute(&reference, &actual, Point2::new(0.0, 0.0), &steel()).unwrap();
        assert!(out.s1 > out.s2);
        assert_relative_eq!(out.d1.x.abs(), FRAC_1_SQRT_2, epsilon = 1e-9);
        assert_relative_eq!(out.d1.y.abs(), FRAC_1_SQRT_2, epsilon = 1e-9);
        assert!(out.d1.x * out.d1.y > 0.0);
    }

    #[test]
    fn test_mixed_tension_compression() {
        let reference = Plane::xy();
        let actual = Plane::new(
            Point3::origin(),
            Vec3::new(1.2, 0.0, 0.0),
            Vec3::new(0.0, 0.7, 0.0),
        );
        let out =
            StressSample::compute(&reference, &actual, Point2::new(0.0, 0.0), &steel()).unwrap();
        assert!(out.s1 > 0.0);
        assert!(out.s2 < 0.0);
    }

    #[test]
    fn test_degenerate_reference() {
        let flat = Plane::new(Point3::origin(), Vec3::x(), Vec3::x());
        let r = StressSample::compute(&flat, &Plane::xy(), Point2::new(0.0, 0.0), &steel());
        assert!(matches!(r, Err(TraceError::DegenerateMetric)));
    }
}
