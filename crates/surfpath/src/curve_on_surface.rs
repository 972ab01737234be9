//! Parameter-space curves riding on a surface.
//!
//! Curve derivatives are chained through the surface partials up to third
//! order, which gives the 3D derivatives needed for curvature and torsion.
//! [`CurveOnSurface::invert`] maps a 3D point back to a curve parameter; the
//! trimmed boundary uses it to find where a trace enters the neighbouring face.

use surfpath_geom::{Curve2d, Surface};
use surfpath_math::{Point2, Point3, Vec3};

use crate::differential::SurfaceSample;

/// Maximum Newton iterations in [`CurveOnSurface::invert`].
const MAX_NEWTON: usize = 10;
/// Maximum step halvings per Newton iteration.
const MAX_BACKTRACK: usize = 5;
/// Maximum Romberg refinement levels.
const MAX_ROMBERG: usize = 12;
/// Maximum recursive bisections of one tessellation segment.
const MAX_REFINE_DEPTH: usize = 12;

/// Result of a point inversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Inversion {
    /// Curve parameter of the closest point found.
    pub t: f64,
    /// Closest 3D point found.
    pub point: Point3,
    /// Distance from the query point.
    pub distance: f64,
    /// Whether Newton met its stopping criterion.
    pub converged: bool,
}

/// Adaptive polyline of a curve on a surface.
#[derive(Debug, Clone, Default)]
pub struct Tessellation {
    /// Curve parameters, increasing.
    pub params: Vec<f64>,
    /// 3D points at `params`.
    pub points: Vec<Point3>,
    /// Arc length of the whole curve.
    pub length: f64,
}

/// A trim or path curve `c(t) = (u(t), v(t))` on a surface `S`.
#[derive(Debug, Clone, Copy)]
pub struct CurveOnSurface<'a> {
    /// Parameter-space curve.
    pub curve: &'a dyn Curve2d,
    /// Carrier surface.
    pub surface: &'a dyn Surface,
}

impl<'a> CurveOnSurface<'a> {
    /// Pair a parameter-space curve with its surface.
    pub fn new(curve: &'a dyn Curve2d, surface: &'a dyn Surface) -> Self {
        Self { curve, surface }
    }

    /// Parameter-space point at `t`.
    pub fn uv(&self, t: f64) -> Point2 {
        self.curve.evaluate(t)
    }

    /// 3D point at `t`.
    pub fn point(&self, t: f64) -> Point3 {
        self.surface.evaluate(self.curve.evaluate(t))
    }

    /// `[X, X', X'', X''']` at `t`, or `None` when the surface fails to evaluate.
    pub fn derivatives(&self, t: f64) -> Option<(Point3, [Vec3; 3])> {
        let c = self.curve.jet(t);
        let s = self.surface.jet(c.point, 3)?;
        let (u1, v1) = (c.d1.x, c.d1.y);
        let (u2, v2) = (c.d2.x, c.d2.y);
        let (u3, v3) = (c.d3.x, c.d3.y);

        let x1 = s.du() * u1 + s.dv() * v1;
        let x2 = s.duu() * (u1 * u1)
            + s.duv() * (2.0 * u1 * v1)
            + s.dvv() * (v1 * v1)
            + s.du() * u2
            + s.dv() * v2;
        let x3 = s.duuu() * (u1 * u1 * u1)
            + s.duuv() * (3.0 * u1 * u1 * v1)
            + s.duvv() * (3.0 * u1 * v1 * v1)
            + s.dvvv() * (v1 * v1 * v1)
            + s.duu() * (3.0 * u1 * u2)
            + s.duv() * (3.0 * (u2 * v1 + u1 * v2))
            + s.dvv() * (3.0 * v1 * v2)
            + s.du() * u3
            + s.dv() * v3;
        Some((s.point, [x1, x2, x3]))
    }

    /// Unit tangent at `t`.
    pub fn tangent(&self, t: f64) -> Option<Vec3> {
        let (_, [x1, _, _]) = self.derivatives(t)?;
        let len = x1.norm();
        (len > 0.0).then(|| x1 / len)
    }

    /// Curvature vector `dT/ds` at `t`.
    pub fn curvature_vector(&self, t: f64) -> Option<Vec3> {
        let (_, [x1, x2, _]) = self.derivatives(t)?;
        let len2 = x1.norm_squared();
        if len2 <= 0.0 {
            return None;
        }
        Some((x2 - x1 * (x2.dot(&x1) / len2)) / len2)
    }

    /// Curvature `|X' × X''| / |X'|³` at `t`.
    pub fn curvature(&self, t: f64) -> Option<f64> {
        let (_, [x1, x2, _]) = self.derivatives(t)?;
        let len = x1.norm();
        if len <= 0.0 {
            return None;
        }
        Some(x1.cross(&x2).norm() / (len * len * len))
    }

    /// Torsion `(X' × X'') · X''' / |X' × X''|²` at `t`; zero for planar points.
    pub fn torsion(&self, t: f64) -> Option<f64> {
        let (_, [x1, x2, x3]) = self.derivatives(t)?;
        let b = x1.cross(&x2);
        let len2 = b.norm_squared();
        if len2 <= 1e-300 {
            return Some(0.0);
        }
        Some(b.dot(&x3) / len2)
    }

    /// Normal curvature: curvature vector projected on the surface normal.
    pub fn normal_curvature(&self, t: f64) -> Option<f64> {
        let k = self.curvature_vector(t)?;
        let n = self.surface.normal(self.curve.evaluate(t));
        Some(k.dot(n.as_ref()))
    }

    /// Geodesic curvature: curvature vector projected on `N × T`.
    pub fn geodesic_curvature(&self, t: f64) -> Option<f64> {
        let k = self.curvature_vector(t)?;
        let tangent = self.tangent(t)?;
        let n = self.surface.normal(self.curve.evaluate(t));
        Some(k.dot(&n.as_ref().cross(&tangent)))
    }

    /// Geodesic torsion of the surface along the curve tangent.
    pub fn geodesic_torsion(&self, t: f64) -> Option<f64> {
        let tangent = self.tangent(t)?;
        let sample = SurfaceSample::compute(self.surface, self.curve.evaluate(t)).ok()?;
        Some(sample.geodesic_torsion(&tangent))
    }

    fn speed(&self, t: f64) -> f64 {
        self.derivatives(t).map_or(0.0, |(_, [x1, _, _])| x1.norm())
    }

    /// Arc length between `t0` and `t1` by Romberg quadrature.
    pub fn arc_length(&self, t0: f64, t1: f64) -> f64 {
        romberg(t0, t1, 1e-10, |t| self.speed(t)).0
    }

    /// Adaptive tessellation: Romberg samples per span, then bisection of any
    /// segment whose midpoint strays more than `chord_tol` from its chord.
    pub fn tessellate(&self, chord_tol: f64) -> Tessellation {
        let mut params: Vec<f64> = Vec::new();
        let mut length = 0.0;
        for (a, b) in self.curve.spans() {
            let (len, samples) = romberg(a, b, 1e-10, |t| self.speed(t));
            length += len;
            for t in samples {
                if params.last().map_or(true, |&last| t > last) {
                    params.push(t);
                }
            }
        }

        let mut out = Tessellation {
            length,
            ..Default::default()
        };
        let Some(&first) = params.first() else {
            return out;
        };
        out.params.push(first);
        out.points.push(self.point(first));
        for w in params.windows(2) {
            let p1 = self.point(w[1]);
            self.refine(w[0], *out.points.last().unwrap_or(&p1), w[1], p1, chord_tol, 0, &mut out);
        }
        out
    }

    #[allow(clippy::too_many_arguments)]
    fn refine(
        &self,
        t0: f64,
        p0: Point3,
        t1: f64,
        p1: Point3,
        chord_tol: f64,
        depth: usize,
        out: &mut Tessellation,
    ) {
        let tm = 0.5 * (t0 + t1);
        let pm = self.point(tm);
        let chord_mid = Point3::from((p0.coords + p1.coords) * 0.5);
        if depth < MAX_REFINE_DEPTH && (pm - chord_mid).norm() > chord_tol {
            self.refine(t0, p0, tm, pm, chord_tol, depth + 1, out);
            self.refine(tm, pm, t1, p1, chord_tol, depth + 1, out);
        } else {
            out.params.push(t1);
            out.points.push(p1);
        }
    }

    /// Parameter of the curve point closest to `sample`.
    ///
    /// Seeds from the nearest vertex of an adaptive tessellation and refines
    /// with at most ten Newton steps inside the neighbouring vertices. When
    /// Newton does not converge the last iterate is returned with
    /// `converged: false`.
    pub fn invert(&self, sample: &Point3, tolerance: f64) -> Inversion {
        let tess = self.tessellate(100.0 * tolerance);
        let (t0, t1) = self.curve.domain();
        if tess.params.is_empty() {
            let point = self.point(t0);
            return Inversion {
                t: t0,
                point,
                distance: (point - sample).norm(),
                converged: false,
            };
        }

        let (best, _) = tess
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| (i, (p - sample).norm_squared()))
            .fold((0, f64::INFINITY), |acc, x| if x.1 < acc.1 { x } else { acc });
        let lo = tess.params[best.saturating_sub(1)].max(t0);
        let hi = tess.params[(best + 1).min(tess.params.len() - 1)].min(t1);

        let dist2 = |t: f64| (self.point(t) - sample).norm_squared();
        let mut t = tess.params[best];
        let mut converged = false;

        for _ in 0..MAX_NEWTON {
            let Some((x, [a1, _, _])) = self.derivatives(t) else {
                break;
            };
            let r = x - sample;
            let r_len = r.norm();
            if r_len < tolerance {
                converged = true;
                break;
            }
            let a1_len2 = a1.norm_squared();
            if a1_len2 <= 0.0 {
                break;
            }
            let along = a1.dot(&r);
            if along.abs() / (a1_len2.sqrt() * r_len) < tolerance {
                converged = true;
                break;
            }

            let current = r_len * r_len;
            let mut dt = -along / a1_len2;
            let mut next = (t + dt).clamp(lo, hi);
            let mut backtracks = 0;
            while dist2(next) > current && backtracks < MAX_BACKTRACK {
                dt *= 0.5;
                next = (t + dt).clamp(lo, hi);
                backtracks += 1;
            }
            if next == t {
                break;
            }
            t = next;
        }

        let point = self.point(t);
        let distance = (point - sample).norm();
        if !converged {
            log::warn!(
                "curve inversion did not converge: t = {}, distance = {:e}",
                t,
                distance
            );
        }
        Inversion {
            t,
            point,
            distance,
            converged,
        }
    }
}

/// Romberg integration of `f` over `[a, b]`.
///
/// Returns the integral and the abscissae of the finest trapezoid level.
fn romberg(a: f64, b: f64, rel_tol: f64, f: impl Fn(f64) -> f64) -> (f64, Vec<f64>) {
    let h0 = b - a;
    let mut rows: Vec<Vec<f64>> = vec![vec![0.5 * h0 * (f(a) + f(b))]];
    let mut n = 1usize;

    for level in 1..MAX_ROMBERG {
        n *= 2;
        let h = h0 / n as f64;
        let mid_sum: f64 = (0..n / 2).map(|i| f(a + (2 * i + 1) as f64 * h)).sum();
        let mut row = vec![0.5 * rows[level - 1][0] + h * mid_sum];
        let mut factor = 1.0;
        for k in 1..=level {
            factor *= 4.0;
            let prev = row[k - 1];
            row.push(prev + (prev - rows[level - 1][k - 1]) / (factor - 1.0));
        }
        let estimate = row[level];
        let last = rows[level - 1][level - 1];
        rows.push(row);
        if level >= 2 && (estimate - last).abs() <= rel_tol * estimate.abs().max(1e-300) {
            break;
        }
    }

    let level = rows.len() - 1;
    let integral = rows[level][level];
    let samples = (0..=n).map(|i| a + h0 * i as f64 / n as f64).collect();
    (integral, samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;
    use surfpath_geom::{Circle2d, CylinderSurface, Line2d, Plane, SphereSurface};
    use surfpath_math::Vec3;
    use surfpath_nurbs::BSplineCurve2d;

    #[test]
    fn test_romberg_polynomial() {
        let (v, samples) = romberg(0.0, 2.0, 1e-12, |t| t * t * t);
        assert_relative_eq!(v, 4.0, epsilon = 1e-12);
        assert!(samples.len() >= 5);
        assert_eq!(samples.first(), Some(&0.0));
        assert_eq!(samples.last(), Some(&2.0));
    }

    #[test]
    fn test_helix_on_cylinder() {
        // u = t, v = c t on a radius-r cylinder is a helix
        let (r, c) = (2.0, 0.5);
        let cyl = CylinderSurface::new(r);
        let line = Line2d::from_points(Point2::new(0.0, 0.0), Point2::new(1.0, c));
        let cos = CurveOnSurface::new(&line, &cyl);

        let expected_k = r / (r * r + c * c);
        let expected_tau = c / (r * r + c * c);
        assert_relative_eq!(cos.curvature(0.3).unwrap(), expected_k, epsilon = 1e-10);
        assert_relative_eq!(cos.torsion(0.3).unwrap(), expected_tau, epsilon = 1e-10);
        assert_relative_eq!(cos.arc_length(0.0, 1.0), (r * r + c * c).sqrt(), epsilon = 1e-9);
        // A helix is a geodesic: all curvature is normal
        assert!(cos.geodesic_curvature(0.3).unwrap().abs() < 1e-10);
        assert_relative_eq!(
            cos.normal_curvature(0.3).unwrap().abs(),
            expected_k,
            epsilon = 1e-10
        );
    }

    #[test]
    fn test_geodesic_quantities_agree_with_surface_sample() {
        let sphere = SphereSurface::new(3.0);
        let circle = Circle2d::arc(Point2::new(1.0, 0.2), 0.3, 0.0, PI);
        let cos = CurveOnSurface::new(&circle, &sphere);
        let t = 0.8;
        let sample = SurfaceSample::compute(&sphere, cos.uv(t)).unwrap();
        let tangent = cos.tangent(t).unwrap();
        assert_relative_eq!(
            cos.normal_curvature(t).unwrap(),
            sample.normal_curvature(&tangent),
            epsilon = 1e-9
        );
        // Umbilic surface: no geodesic torsion anywhere
        assert!(cos.geodesic_torsion(t).unwrap().abs() < 1e-9);
    }

    #[test]
    fn test_invert_on_line() {
        let plane = Plane::new(Point3::new(2.0, 0.0, 0.0), -Vec3::x(), Vec3::y());
        let line = Line2d::from_points(Point2::new(1.0, 0.0), Point2::new(1.0, 1.0));
        let cos = CurveOnSurface::new(&line, &plane);
        let inv = cos.invert(&Point3::new(1.0, 0.37, 0.0), 1e-6);
        assert!(inv.converged);
        assert_relative_eq!(inv.t, 0.37, epsilon = 1e-6);
        assert!(inv.distance < 1e-6);
    }

    #[test]
    fn test_invert_curved_trim() {
        let cyl = CylinderSurface::new(1.0);
        let curve = BSplineCurve2d::clamped_uniform(
            vec![
                Point2::new(0.0, 0.0),
                Point2::new(1.0, 1.0),
                Point2::new(2.0, -1.0),
                Point2::new(3.0, 0.5),
            ],
            3,
        );
        let cos = CurveOnSurface::new(&curve, &cyl);
        let target = cos.point(0.62);
        let inv = cos.invert(&target, 1e-8);
        assert!(inv.converged);
        assert!(inv.distance < 1e-8);
        assert_relative_eq!(inv.t, 0.62, epsilon = 1e-6);
    }

    #[test]
    fn test_invert_off_curve_projects() {
        let plane = Plane::xy();
        let line = Line2d::from_points(Point2::new(0.0, 0.0), Point2::new(1.0, 0.0));
        let cos = CurveOnSurface::new(&line, &plane);
        // Off the line: Newton stops on the perpendicular criterion
        let inv = cos.invert(&Point3::new(0.4, 0.5, 0.0), 1e-6);
        assert!(inv.converged);
        assert_relative_eq!(inv.t, 0.4, epsilon = 1e-6);
        assert_relative_eq!(inv.distance, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_invert_beyond_end_reports_non_convergence() {
        let plane = Plane::xy();
        let line = Line2d::from_points(Point2::new(0.0, 0.0), Point2::new(1.0, 0.0));
        let cos = CurveOnSurface::new(&line, &plane);
        let inv = cos.invert(&Point3::new(2.0, 0.0, 0.0), 1e-6);
        assert!(!inv.converged);
        assert_relative_eq!(inv.t, 1.0, epsilon = 1e-12);
        assert_relative_eq!(inv.distance, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_tessellation_respects_chord_tolerance() {
        let sphere = SphereSurface::new(1.0);
        let circle = Circle2d::arc(Point2::new(0.0, 0.0), 0.5, 0.0, 2.0 * PI);
        let cos = CurveOnSurface::new(&circle, &sphere);
        let tess = cos.tessellate(1e-4);
        assert_eq!(tess.params.len(), tess.points.len());
        assert!(tess.params.windows(2).all(|w| w[0] < w[1]));
        for (w, p) in tess.params.windows(2).zip(tess.points.windows(2)) {
            let mid = cos.point(0.5 * (w[0] + w[1]));
            let chord = Point3::from((p[0].coords + p[1].coords) * 0.5);
            assert!((mid - chord).norm() <= 1e-4);
        }
        assert_relative_eq!(tess.length, cos.arc_length(0.0, 2.0 * PI), epsilon = 1e-9);
    }
}
