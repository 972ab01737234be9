//! Direction fields: turn a curvature or stress sample into a step direction.
//!
//! Every [`PathKind`] yields two candidate unit directions at a point. A trace
//! keeps to one family by re-selecting, at every step, the candidate closest
//! to its previous direction with [`choose`].

use std::f64::consts::FRAC_PI_2;

use surfpath_geom::Surface;
use surfpath_math::{Point2, Vec2, Vec3};

use crate::differential::SurfaceSample;
use crate::error::{Result, TraceError};
use crate::settings::{Branch, Material};
use crate::stress::StressSample;

/// What a path follows.
#[derive(Debug, Clone)]
pub enum PathKind {
    /// Lines of principal curvature.
    PrincipalCurvature,
    /// Lines of constant normal curvature `value`.
    NormalCurvature {
        /// Target normal curvature.
        value: f64,
    },
    /// Lines of constant geodesic torsion `value`.
    GeodesicTorsion {
        /// Target geodesic torsion.
        value: f64,
    },
    /// Principal stress trajectories of the traced (actual) surface.
    PrincipalStress {
        /// Undeformed surface sharing the traced surface's parameter domain.
        reference: Box<dyn Surface>,
        /// Shell material.
        material: Material,
    },
    /// Diagonal grid rotated `±atan(sqrt(S2 / S1))` from the stress frame.
    DGrid {
        /// Undeformed surface sharing the traced surface's parameter domain.
        reference: Box<dyn Surface>,
        /// Shell material.
        material: Material,
    },
}

impl PathKind {
    /// Reference surface and material for stress-based kinds.
    pub fn stress_inputs(&self) -> Option<(&dyn Surface, &Material)> {
        match self {
            PathKind::PrincipalStress {
                reference,
                material,
            }
            | PathKind::DGrid {
                reference,
                material,
            } => Some((reference.as_ref(), material)),
            _ => None,
        }
    }
}

/// A path-type descriptor: the field to follow and its ambiguity angle.
#[derive(Debug, Clone)]
pub struct PathSpec {
    /// Field kind.
    pub kind: PathKind,
    /// Rotation applied to the field's directions about the normal.
    pub angle: f64,
}

/// Both raw candidate directions at one point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSample {
    /// Parameter-space first direction.
    pub u1: Vec2,
    /// Parameter-space second direction.
    pub u2: Vec2,
    /// Unit 3D first direction.
    pub d1: Vec3,
    /// Unit 3D second direction.
    pub d2: Vec3,
}

/// Index (0 or 1) and sign of the candidate that best continues `sample`.
///
/// The candidate with the strictly larger absolute projection wins, ties go to
/// `d1`; the sign follows the signed projection, `+1` when it is zero.
pub fn choose_index(d1: &Vec3, d2: &Vec3, sample: &Vec3) -> (usize, f64) {
    let p1 = d1.dot(sample);
    let p2 = d2.dot(sample);
    let (index, p) = if p2.abs() > p1.abs() { (1, p2) } else { (0, p1) };
    (index, if p < 0.0 { -1.0 } else { 1.0 })
}

/// `±d·step` for whichever of `d1`, `d2` best continues `sample`.
pub fn choose(d1: &Vec3, d2: &Vec3, sample: &Vec3, step: f64) -> Vec3 {
    let (index, sign) = choose_index(d1, d2, sample);
    let d = if index == 0 { d1 } else { d2 };
    d * (sign * step)
}

impl PathSpec {
    /// A spec with no ambiguity rotation.
    pub fn new(kind: PathKind) -> Self {
        Self { kind, angle: 0.0 }
    }

    /// Set the ambiguity rotation.
    pub fn with_angle(mut self, angle: f64) -> Self {
        self.angle = angle;
        self
    }

    /// Both candidate directions of the field on `surface` at `uv`.
    pub fn directions(&self, surface: &dyn Surface, uv: Point2) -> Result<FieldSample> {
        match &self.kind {
            PathKind::PrincipalCurvature => {
                let s = SurfaceSample::compute(surface, uv)?;
                let (d1, d2) = if self.angle == 0.0 {
                    (s.d1, s.d2)
                } else {
                    (s.rotate(self.angle), s.rotate(self.angle + FRAC_PI_2))
                };
                Ok(field_sample(d1, d2, |d| s.to_param(d)))
            }
            PathKind::NormalCurvature { value } => {
                let s = SurfaceSample::compute(surface, uv)?;
                let (d1, d2) = s.find_normal_curvature(*value, self.angle)?;
                Ok(field_sample(d1, d2, |d| s.to_param(d)))
            }
            PathKind::GeodesicTorsion { value } => {
                let s = SurfaceSample::compute(surface, uv)?;
                let (d1, d2) = s.find_geodesic_torsion(*value, self.angle)?;
                Ok(field_sample(d1, d2, |d| s.to_param(d)))
            }
            PathKind::PrincipalStress {
                reference,
                material,
            } => {
                let s = StressSample::compute(reference.as_ref(), surface, uv, material)?;
                let (d1, d2) = if self.angle == 0.0 {
                    (s.d1, s.d2)
                } else {
                    (s.rotate(self.angle), s.rotate(self.angle + FRAC_PI_2))
                };
                Ok(field_sample(d1, d2, |d| s.to_param(d)))
            }
            PathKind::DGrid {
                reference,
                material,
            } => {
                let s = StressSample::compute(reference.as_ref(), surface, uv, material)?;
                if s.s1 == 0.0 {
                    return Err(TraceError::OutOfRange);
                }
                let ratio = s.s2 / s.s1;
                if ratio < 0.0 || ratio.is_nan() {
                    return Err(TraceError::OutOfRange);
                }
                let beta = ratio.sqrt().atan() + self.angle;
                let (d1, d2) = (s.rotate(beta), s.rotate(-beta));
                Ok(field_sample(d1, d2, |d| s.to_param(d)))
            }
        }
    }

    /// Seed direction in 3D: `D1` for [`Branch::First`], `D2` otherwise.
    ///
    /// `None` when the field has no direction at `uv`.
    pub fn initial_direction(&self, surface: &dyn Surface, uv: Point2, branch: Branch) -> Option<Vec3> {
        match self.directions(surface, uv) {
            Ok(f) => Some(if branch == Branch::First { f.d1 } else { f.d2 }),
            Err(e) => {
                log::debug!("no initial direction at ({}, {}): {}", uv.x, uv.y, e);
                None
            }
        }
    }

    /// Parameter-space step of length `step` (in 3D) continuing `last`.
    ///
    /// `None` when the field has no direction at `uv`.
    pub fn direction(
        &self,
        surface: &dyn Surface,
        uv: Point2,
        last: &Vec3,
        step: f64,
    ) -> Option<Vec2> {
        let f = self.directions(surface, uv).ok()?;
        let (index, sign) = choose_index(&f.d1, &f.d2, last);
        let u = if index == 0 { f.u1 } else { f.u2 };
        Some(u * (sign * step))
    }
}

fn field_sample(d1: Vec3, d2: Vec3, to_param: impl Fn(&Vec3) -> Vec2) -> FieldSample {
    FieldSample {
        u1: to_param(&d1),
        u2: to_param(&d2),
        d1,
        d2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use surfpath_geom::{CylinderSurface, Plane, SphereSurface};
    use surfpath_math::Point3;

    fn stretched() -> (Plane, Material) {
        (
            Plane::new(Point3::origin(), Vec3::new(1.1, 0.0, 0.0), Vec3::y()),
            Material::new(1000.0, 0.3, 0.1).unwrap(),
        )
    }

    #[test]
    fn test_choose_follows_sample() {
        let d1 = Vec3::x();
        let d2 = Vec3::y();
        let sample = Vec3::new(-0.9, 0.1, 0.0);
        let r = choose(&d1, &d2, &sample, 0.5);
        assert!((r - Vec3::new(-0.5, 0.0, 0.0)).norm() < 1e-15);

        // Feeding the result back keeps the same line
        let again = choose(&d1, &d2, &r, 0.5);
        assert!((again - r).norm() < 1e-15);
    }

    #[test]
    fn test_choose_tie_prefers_first() {
        let d1 = Vec3::x();
        let d2 = Vec3::y();
        let sample = Vec3::new(1.0, -1.0, 0.0);
        assert_eq!(choose_index(&d1, &d2, &sample), (0, 1.0));
        // Zero projection keeps the positive sign
        assert_eq!(choose_index(&d1, &d2, &Vec3::z()), (0, 1.0));
    }

    #[test]
    fn test_choose_uses_absolute_projection() {
        let d1 = Vec3::x();
        let d2 = Vec3::y();
        let sample = Vec3::new(0.3, -0.8, 0.0);
        let r = choose(&d1, &d2, &sample, 1.0);
        assert!((r + Vec3::y()).norm() < 1e-15);
    }

    #[test]
    fn test_principal_direction_step_length() {
        let cyl = CylinderSurface::new(2.0);
        let spec = PathSpec::new(PathKind::PrincipalCurvature);
        let uv = Point2::new(0.5, 0.0);
        let d0 = spec.initial_direction(&cyl, uv, Branch::First).unwrap();
        let step = spec.direction(&cyl, uv, &d0, 0.01).unwrap();
        // Circumferential: |A1| = 2, so du = 0.005
        assert_relative_eq!(step.x.abs(), 0.005, epsilon = 1e-12);
        assert!(step.y.abs() < 1e-12);
        let back = spec.direction(&cyl, uv, &(-d0), 0.01).unwrap();
        assert!((back + step).norm() < 1e-15);
    }

    #[test]
    fn test_angle_rotates_principal_frame() {
        let spec = PathSpec::new(PathKind::PrincipalCurvature).with_angle(FRAC_PI_2 / 2.0);
        let f = spec.directions(&Plane::xy(), Point2::new(0.0, 0.0)).unwrap();
        assert_relative_eq!(f.d1.x, f.d1.y, epsilon = 1e-12);
        assert!(f.d1.dot(&f.d2).abs() < 1e-12);
    }

    #[test]
    fn test_unattainable_normal_curvature_gives_no_direction() {
        let cyl = CylinderSurface::new(2.0);
        let spec = PathSpec::new(PathKind::NormalCurvature { value: 5.0 });
        let uv = Point2::new(0.0, 0.0);
        assert!(spec.initial_direction(&cyl, uv, Branch::First).is_none());
        assert!(spec.direction(&cyl, uv, &Vec3::x(), 0.1).is_none());
        assert!(matches!(
            spec.directions(&cyl, uv),
            Err(TraceError::OutOfRange)
        ));
    }

    #[test]
    fn test_geodesic_torsion_field() {
        let cyl = CylinderSurface::new(2.0);
        let spec = PathSpec::new(PathKind::GeodesicTorsion { value: 0.0 });
        let f = spec.directions(&cyl, Point2::new(0.3, 0.0)).unwrap();
        // Zero torsion lines are the principal lines
        assert!(f.d1.dot(&Vec3::z()).abs() < 1e-12 || f.d2.dot(&Vec3::z()).abs() < 1e-12);
    }

    #[test]
    fn test_sphere_second_branch_is_meridian() {
        let sphere = SphereSurface::new(1.0);
        let spec = PathSpec::new(PathKind::PrincipalCurvature);
        let d = spec
            .initial_direction(&sphere, Point2::new(1.0, 1.0), Branch::Second)
            .unwrap();
        // Meridian tangent has no east component
        let east = sphere.d_du(Point2::new(1.0, 1.0)).normalize();
        assert!(d.dot(&east).abs() < 1e-12);
        assert!(d.z > 0.0);
    }

    #[test]
    fn test_stress_fields() {
        let (actual, material) = stretched();
        let ps = PathSpec::new(PathKind::PrincipalStress {
            reference: Box::new(Plane::xy()),
            material,
        });
        let f = ps.directions(&actual, Point2::new(0.5, 0.5)).unwrap();
        assert_relative_eq!(f.d1.x.abs(), 1.0, epsilon = 1e-12);

        let dg = PathSpec::new(PathKind::DGrid {
            reference: Box::new(Plane::xy()),
            material,
        });
        let s = StressSample::compute(&Plane::xy(), &actual, Point2::new(0.5, 0.5), &material)
            .unwrap();
        let g = dg.directions(&actual, Point2::new(0.5, 0.5)).unwrap();
        let beta = (s.s2 / s.s1).sqrt().atan();
        assert_relative_eq!(g.d1.dot(&s.d1), beta.cos(), epsilon = 1e-12);
        assert_relative_eq!(g.d2.dot(&s.d1), beta.cos(), epsilon = 1e-12);
        assert_relative_eq!(g.d1.dot(&s.d2), beta.sin(), epsilon = 1e-12);
    }

    #[test]
    fn test_dgrid_rejects_mixed_stress() {
        let actual = Plane::new(
            Point3::origin(),
            Vec3::new(1.2, 0.0, 0.0),
            Vec3::new(0.0, 0.7, 0.0),
        );
        let dg = PathSpec::new(PathKind::DGrid {
            reference: Box::new(Plane::xy()),
            material: Material::new(1000.0, 0.3, 0.1).unwrap(),
        });
        assert!(matches!(
            dg.directions(&actual, Point2::new(0.0, 0.0)),
            Err(TraceError::OutOfRange)
        ));
    }
}
