//! Principal curvature analysis at a surface point.
//!
//! [`SurfaceSample::compute`] evaluates a surface to second order, builds the
//! first (`G`) and second (`H`) fundamental forms and solves the shape
//! operator `K = G⁻¹H` for the principal curvatures `K1 <= K2` and their
//! directions. The directions carry no canonical sign; direction fields pick
//! one with [`crate::field::choose`].

use std::f64::consts::FRAC_PI_2;

use surfpath_geom::Surface;
use surfpath_math::{Point2, Point3, Vec2, Vec3};

use crate::error::{Result, TraceError};
use crate::tensor::{eigenvalues, Sym2};

/// Relative gap under which two principal curvatures are treated as equal.
const UMBILIC_EPS: f64 = 1e-10;

/// Differential-geometric snapshot at one parameter point.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceSample {
    /// Parameter point.
    pub uv: Point2,
    /// Surface point `X`.
    pub point: Point3,
    /// First partial `∂X/∂u`.
    pub a1: Vec3,
    /// First partial `∂X/∂v`.
    pub a2: Vec3,
    /// Unit normal `A1 × A2 / |A1 × A2|`.
    pub normal: Vec3,
    /// First fundamental form `G`.
    pub metric: Sym2,
    /// Second fundamental form `H`.
    pub second: Sym2,
    /// Smaller principal curvature.
    pub k1: f64,
    /// Larger principal curvature.
    pub k2: f64,
    /// Unit principal direction of `k1`.
    pub d1: Vec3,
    /// Unit principal direction of `k2`, `N × D1`.
    pub d2: Vec3,
    /// Parameter-space counterpart of `d1`.
    pub u1: Vec2,
    /// Parameter-space counterpart of `d2`.
    pub u2: Vec2,
    metric_inv: Sym2,
}

impl SurfaceSample {
    /// Evaluate curvature quantities of `surface` at `uv`.
    pub fn compute(surface: &dyn Surface, uv: Point2) -> Result<Self> {
        let jet = surface
            .jet(uv, 2)
            .ok_or(TraceError::EvaluationFailed(uv.x, uv.y))?;
        let (a1, a2) = (jet.du(), jet.dv());

        let metric = Sym2::new(a1.dot(&a1), a2.dot(&a2), a1.dot(&a2));
        let det = metric.det();
        let scale = metric.trace();
        if det <= 1e-14 * scale * scale || !det.is_finite() {
            return Err(TraceError::DegenerateMetric);
        }
        let metric_inv = metric.inverse().ok_or(TraceError::DegenerateMetric)?;
        let normal = a1.cross(&a2).normalize();
        let second = Sym2::new(
            jet.duu().dot(&normal),
            jet.dvv().dot(&normal),
            jet.duv().dot(&normal),
        );

        // Shape operator K = G⁻¹ H
        let k = metric_inv.matrix() * second.matrix();
        let trace = k[(0, 0)] + k[(1, 1)];
        let det_k = k[(0, 0)] * k[(1, 1)] - k[(0, 1)] * k[(1, 0)];
        let (k1, k2) = eigenvalues(trace, det_k)?;

        let d1 = if (k2 - k1).abs() < UMBILIC_EPS * (k1.abs() + k2.abs() + 1.0) {
            a1.normalize()
        } else {
            // Larger of the two null-space candidates of K - k1 I
            let (a, b, c, d) = (k[(0, 0)], k[(0, 1)], k[(1, 0)], k[(1, 1)]);
            let w1 = Vec2::new(b, k1 - a);
            let w2 = Vec2::new(k1 - d, c);
            let w = if w1.norm_squared() >= w2.norm_squared() {
                w1
            } else {
                w2
            };
            (w.x * a1 + w.y * a2).normalize()
        };
        let d2 = normal.cross(&d1);

        let mut sample = Self {
            uv,
            point: jet.point,
            a1,
            a2,
            normal,
            metric,
            second,
            k1,
            k2,
            d1,
            d2,
            u1: Vec2::zeros(),
            u2: Vec2::zeros(),
            metric_inv,
        };
        sample.u1 = sample.to_param(&d1);
        sample.u2 = sample.to_param(&d2);
        Ok(sample)
    }

    /// Parameter-space vector whose image under `[A1 A2]` is the tangent part of `v`.
    pub fn to_param(&self, v: &Vec3) -> Vec2 {
        let rhs = Vec2::new(self.a1.dot(v), self.a2.dot(v));
        self.metric_inv.matrix() * rhs
    }

    /// `cos θ · D1 + sin θ · D2`.
    pub fn rotate(&self, theta: f64) -> Vec3 {
        let (s, c) = theta.sin_cos();
        c * self.d1 + s * self.d2
    }

    /// Gaussian curvature `K1 · K2`.
    pub fn gaussian_curvature(&self) -> f64 {
        self.k1 * self.k2
    }

    /// Mean curvature `(K1 + K2) / 2`.
    pub fn mean_curvature(&self) -> f64 {
        0.5 * (self.k1 + self.k2)
    }

    /// Normal curvature `II(w) / I(w)` along the tangent part of `dir`.
    pub fn normal_curvature(&self, dir: &Vec3) -> f64 {
        let w = self.to_param(dir);
        let len2 = self.metric.quad(w.x, w.y);
        if len2 <= 0.0 {
            return 0.0;
        }
        self.second.quad(w.x, w.y) / len2
    }

    /// Geodesic torsion `II(t, N × t)` for the unit tangent `t` along `dir`.
    pub fn geodesic_torsion(&self, dir: &Vec3) -> f64 {
        let tangent = dir - dir.dot(&self.normal) * self.normal;
        let len = tangent.norm();
        if len <= 0.0 {
            return 0.0;
        }
        let t = tangent / len;
        let s = self.normal.cross(&t);
        let wt = self.to_param(&t);
        let ws = self.to_param(&s);
        self.second.bilinear((wt.x, wt.y), (ws.x, ws.y))
    }

    /// The two directions of normal curvature `value`, rotated from `D1` by
    /// `±(α + angle)` where `cos 2α = (2 value - K1 - K2) / (K1 - K2)`.
    pub fn find_normal_curvature(&self, value: f64, angle: f64) -> Result<(Vec3, Vec3)> {
        let gap = self.k1 - self.k2;
        if gap.abs() < UMBILIC_EPS * (self.k1.abs() + self.k2.abs() + 1.0) {
            return Err(TraceError::OutOfRange);
        }
        let c = (2.0 * value - self.k1 - self.k2) / gap;
        if !(-1.0..=1.0).contains(&c) {
            return Err(TraceError::OutOfRange);
        }
        let alpha = 0.5 * c.acos() + angle;
        Ok((self.rotate(alpha), self.rotate(-alpha)))
    }

    /// The two directions of geodesic torsion `value`, at `α + angle` and
    /// `π/2 - α + angle` from `D1` where `sin 2α = 2 value / (K2 - K1)`.
    pub fn find_geodesic_torsion(&self, value: f64, angle: f64) -> Result<(Vec3, Vec3)> {
        let gap = self.k2 - self.k1;
        if gap.abs() < UMBILIC_EPS * (self.k1.abs() + self.k2.abs() + 1.0) {
            return Err(TraceError::OutOfRange);
        }
        let s = 2.0 * value / gap;
        if !(-1.0..=1.0).contains(&s) {
            return Err(TraceError::OutOfRange);
        }
        let alpha = 0.5 * s.asin();
        Ok((
            self.rotate(alpha + angle),
            self.rotate(FRAC_PI_2 - alpha + angle),
        ))
    }
}
