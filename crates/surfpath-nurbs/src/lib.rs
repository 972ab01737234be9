#![warn(missing_docs)]

//! B-spline and NURBS surfaces with analytic derivatives for surfpath.
//!
//! Implements the [`Surface`] trait from `surfpath-geom` with exact partial
//! derivatives up to third order, plus a planar B-spline trim curve that
//! implements [`Curve2d`].
//!
//! # Key types
//!
//! - [`BSplineSurface`]: non-rational tensor-product surface
//! - [`NurbsSurface`]: rational tensor-product surface
//! - [`BSplineCurve2d`]: non-rational trim curve in parameter space
//!
//! # Algorithms
//!
//! - Basis function derivatives (Piegl & Tiller A2.3)
//! - Rational surface derivatives by the quotient rule (Piegl & Tiller A4.4)

use nalgebra::Vector4;
use surfpath_geom::{Curve2d, CurveJet2, Surface, SurfaceJet, MAX_JET_ORDER};
use surfpath_math::{Point2, Point3, Transform, Vec2, Vec3};

// =============================================================================
// Knot vector utilities
// =============================================================================

/// Validate a knot vector: non-decreasing, length = n_control_points + degree + 1.
fn validate_knots(knots: &[f64], n_points: usize, degree: usize) -> bool {
    knots.len() == n_points + degree + 1 && knots.windows(2).all(|w| w[0] <= w[1])
}

/// Find the knot span index for parameter `t`.
///
/// Returns `i` such that `knots[i] <= t < knots[i+1]`, clamped to the valid
/// range. `n` is the last control point index.
fn find_span(knots: &[f64], n: usize, degree: usize, t: f64) -> usize {
    if t >= knots[n + 1] {
        // Last non-empty span
        let mut span = n;
        while span > degree && knots[span] >= knots[span + 1] {
            span -= 1;
        }
        return span;
    }
    if t <= knots[degree] {
        return degree;
    }
    let mut low = degree;
    let mut high = n + 1;
    let mut mid = (low + high) / 2;
    while t < knots[mid] || t >= knots[mid + 1] {
        if t < knots[mid] {
            high = mid;
        } else {
            low = mid;
        }
        mid = (low + high) / 2;
    }
    mid
}

/// Non-zero basis functions and their derivatives up to `order` at `t`.
///
/// Row `k` holds the `k`-th derivatives of `N[span-degree..=span]`. Rows above
/// `degree` are zero.
fn ders_basis_functions(
    knots: &[f64],
    span: usize,
    degree: usize,
    t: f64,
    order: usize,
) -> Vec<Vec<f64>> {
    let p = degree;
    let mut ders = vec![vec![0.0; p + 1]; order + 1];
    let mut ndu = vec![vec![0.0; p + 1]; p + 1];
    let mut left = vec![0.0; p + 1];
    let mut right = vec![0.0; p + 1];
    ndu[0][0] = 1.0;

    for j in 1..=p {
        left[j] = t - knots[span + 1 - j];
        right[j] = knots[span + j] - t;
        let mut saved = 0.0;
        for r in 0..j {
            // Lower triangle holds the knot differences
            ndu[j][r] = right[r + 1] + left[j - r];
            let temp = if ndu[j][r].abs() < 1e-300 {
                0.0
            } else {
                ndu[r][j - 1] / ndu[j][r]
            };
            ndu[r][j] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        ndu[j][j] = saved;
    }

    for j in 0..=p {
        ders[0][j] = ndu[j][p];
    }

    let n = order.min(p);
    let mut a = [vec![0.0; p + 1], vec![0.0; p + 1]];
    let div = |x: f64, y: f64| if y.abs() < 1e-300 { 0.0 } else { x / y };

    for r in 0..=p {
        let (mut s1, mut s2) = (0usize, 1usize);
        a[0][0] = 1.0;
        for k in 1..=n {
            let mut d = 0.0;
            let rk = r as isize - k as isize;
            let pk = p - k;
            if r >= k {
                let rk = rk as usize;
                a[s2][0] = div(a[s1][0], ndu[pk + 1][rk]);
                d = a[s2][0] * ndu[rk][pk];
            }
            let j1 = if rk >= -1 { 1 } else { (-rk) as usize };
            let j2 = if r as isize - 1 <= pk as isize {
                k - 1
            } else {
                p - r
            };
            for j in j1..=j2 {
                let idx = (rk + j as isize) as usize;
                a[s2][j] = div(a[s1][j] - a[s1][j - 1], ndu[pk + 1][idx]);
                d += a[s2][j] * ndu[idx][pk];
            }
            if r <= pk {
                a[s2][k] = div(-a[s1][k - 1], ndu[pk + 1][r]);
                d += a[s2][k] * ndu[r][pk];
            }
            ders[k][r] = d;
            std::mem::swap(&mut s1, &mut s2);
        }
    }

    let mut factor = p as f64;
    for k in 1..=n {
        for v in ders[k].iter_mut() {
            *v *= factor;
        }
        factor *= (p - k) as f64;
    }

    ders
}

/// Binomial coefficient for the small orders used in jets.
fn binomial(n: usize, k: usize) -> f64 {
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

/// Distinct non-empty knot intervals inside `[knots[degree], knots[n+1]]`.
fn knot_spans(knots: &[f64], n_points: usize, degree: usize) -> Vec<(f64, f64)> {
    (degree..n_points)
        .filter(|&i| knots[i + 1] > knots[i])
        .map(|i| (knots[i], knots[i + 1]))
        .collect()
}

/// Homogeneous tensor-product derivatives `S^(k,l)` for `k + l <= order`.
///
/// `cp(i, j)` returns the homogeneous control point at `(u_idx, v_idx)`.
#[allow(clippy::too_many_arguments)]
fn tensor_derivs<F: Fn(usize, usize) -> Vector4<f64>>(
    cp: F,
    n_u: usize,
    n_v: usize,
    knots_u: &[f64],
    knots_v: &[f64],
    degree_u: usize,
    degree_v: usize,
    uv: Point2,
    order: usize,
) -> [[Vector4<f64>; 4]; 4] {
    let mut skl = [[Vector4::zeros(); 4]; 4];
    let span_u = find_span(knots_u, n_u - 1, degree_u, uv.x);
    let span_v = find_span(knots_v, n_v - 1, degree_v, uv.y);
    let nu = ders_basis_functions(knots_u, span_u, degree_u, uv.x, order);
    let nv = ders_basis_functions(knots_v, span_v, degree_v, uv.y, order);

    for k in 0..=order.min(degree_u) {
        let mut temp = vec![Vector4::zeros(); degree_v + 1];
        for (s, t) in temp.iter_mut().enumerate() {
            for r in 0..=degree_u {
                *t += nu[k][r] * cp(span_u - degree_u + r, span_v - degree_v + s);
            }
        }
        for l in 0..=(order - k).min(degree_v) {
            let mut acc = Vector4::zeros();
            for (s, t) in temp.iter().enumerate() {
                acc += nv[l][s] * t;
            }
            skl[k][l] = acc;
        }
    }
    skl
}

/// Pack `S^(k,l)` into jet order `[u, v, uu, uv, vv, uuu, uuv, uvv, vvv]`.
fn pack_partials(skl: &[[Vec3; 4]; 4]) -> [Vec3; 9] {
    [
        skl[1][0], skl[0][1], skl[2][0], skl[1][1], skl[0][2], skl[3][0], skl[2][1], skl[1][2],
        skl[0][3],
    ]
}

// =============================================================================
// B-spline surface
// =============================================================================

/// A non-rational tensor-product B-spline surface.
///
/// Control points are stored in row-major order: `points[v_idx * n_u + u_idx]`.
#[derive(Debug, Clone)]
pub struct BSplineSurface {
    /// Control points in row-major order.
    pub control_points: Vec<Point3>,
    /// Number of control points in the u direction.
    pub n_u: usize,
    /// Number of control points in the v direction.
    pub n_v: usize,
    /// Knot vector in u. Length = n_u + degree_u + 1.
    pub knots_u: Vec<f64>,
    /// Knot vector in v. Length = n_v + degree_v + 1.
    pub knots_v: Vec<f64>,
    /// Polynomial degree in u.
    pub degree_u: usize,
    /// Polynomial degree in v.
    pub degree_v: usize,
}

impl BSplineSurface {
    /// Create a B-spline surface.
    ///
    /// # Panics
    /// Panics if the control net or knot vectors have inconsistent sizes.
    pub fn new(
        control_points: Vec<Point3>,
        n_u: usize,
        n_v: usize,
        knots_u: Vec<f64>,
        knots_v: Vec<f64>,
        degree_u: usize,
        degree_v: usize,
    ) -> Self {
        assert_eq!(
            control_points.len(),
            n_u * n_v,
            "control points count mismatch: {} != {} * {}",
            control_points.len(),
            n_u,
            n_v
        );
        assert!(validate_knots(&knots_u, n_u, degree_u), "invalid u knot vector");
        assert!(validate_knots(&knots_v, n_v, degree_v), "invalid v knot vector");
        Self {
            control_points,
            n_u,
            n_v,
            knots_u,
            knots_v,
            degree_u,
            degree_v,
        }
    }

    /// A single Bézier patch over `[0,1]²` with an `n_u` x `n_v` control net.
    pub fn bezier(control_points: Vec<Point3>, n_u: usize, n_v: usize) -> Self {
        let knots = |n: usize| {
            let mut k = vec![0.0; n];
            k.extend(std::iter::repeat(1.0).take(n));
            k
        };
        Self::new(
            control_points,
            n_u,
            n_v,
            knots(n_u),
            knots(n_v),
            n_u - 1,
            n_v - 1,
        )
    }

    fn cp(&self, u_idx: usize, v_idx: usize) -> &Point3 {
        &self.control_points[v_idx * self.n_u + u_idx]
    }

    fn derivs(&self, uv: Point2, order: usize) -> [[Vec3; 4]; 4] {
        let skl = tensor_derivs(
            |i, j| {
                let p = self.cp(i, j);
                Vector4::new(p.x, p.y, p.z, 1.0)
            },
            self.n_u,
            self.n_v,
            &self.knots_u,
            &self.knots_v,
            self.degree_u,
            self.degree_v,
            uv,
            order,
        );
        let mut out = [[Vec3::zeros(); 4]; 4];
        for k in 0..4 {
            for l in 0..4 {
                out[k][l] = skl[k][l].xyz();
            }
        }
        out
    }

    /// Non-empty knot intervals in `(u_spans, v_spans)`.
    pub fn spans(&self) -> (Vec<(f64, f64)>, Vec<(f64, f64)>) {
        (
            knot_spans(&self.knots_u, self.n_u, self.degree_u),
            knot_spans(&self.knots_v, self.n_v, self.degree_v),
        )
    }
}

impl Surface for BSplineSurface {
    fn jet(&self, uv: Point2, order: usize) -> Option<SurfaceJet> {
        let order = order.min(MAX_JET_ORDER);
        let skl = self.derivs(uv, order);
        Some(SurfaceJet::new(
            Point3::from(skl[0][0]),
            pack_partials(&skl),
            order,
        ))
    }

    fn evaluate(&self, uv: Point2) -> Point3 {
        Point3::from(self.derivs(uv, 0)[0][0])
    }

    fn domain(&self) -> ((f64, f64), (f64, f64)) {
        (
            (self.knots_u[self.degree_u], self.knots_u[self.n_u]),
            (self.knots_v[self.degree_v], self.knots_v[self.n_v]),
        )
    }

    fn clone_box(&self) -> Box<dyn Surface> {
        Box::new(self.clone())
    }

    fn transform(&self, t: &Transform) -> Box<dyn Surface> {
        let mut out = self.clone();
        for p in out.control_points.iter_mut() {
            *p = t.apply_point(p);
        }
        Box::new(out)
    }
}

// =============================================================================
// NURBS surface
// =============================================================================

/// A weighted control point for NURBS (homogeneous coordinates).
#[derive(Debug, Clone, Copy)]
pub struct WeightedPoint {
    /// 3D position (in Cartesian coordinates, not weighted).
    pub point: Point3,
    /// Weight (must be > 0).
    pub weight: f64,
}

impl WeightedPoint {
    /// Create a weighted point.
    pub fn new(point: Point3, weight: f64) -> Self {
        Self { point, weight }
    }

    /// Create with unit weight.
    pub fn unweighted(point: Point3) -> Self {
        Self { point, weight: 1.0 }
    }

    fn homogeneous(&self) -> Vector4<f64> {
        let w = self.weight;
        Vector4::new(w * self.point.x, w * self.point.y, w * self.point.z, w)
    }
}

/// A rational tensor-product NURBS surface.
#[derive(Debug, Clone)]
pub struct NurbsSurface {
    /// Weighted control points in row-major order.
    pub control_points: Vec<WeightedPoint>,
    /// Number of control points in u.
    pub n_u: usize,
    /// Number of control points in v.
    pub n_v: usize,
    /// Knot vector in u.
    pub knots_u: Vec<f64>,
    /// Knot vector in v.
    pub knots_v: Vec<f64>,
    /// Degree in u.
    pub degree_u: usize,
    /// Degree in v.
    pub degree_v: usize,
}

impl NurbsSurface {
    /// Create a NURBS surface.
    ///
    /// # Panics
    /// Panics if the control net or knot vectors have inconsistent sizes.
    pub fn new(
        control_points: Vec<WeightedPoint>,
        n_u: usize,
        n_v: usize,
        knots_u: Vec<f64>,
        knots_v: Vec<f64>,
        degree_u: usize,
        degree_v: usize,
    ) -> Self {
        assert_eq!(control_points.len(), n_u * n_v);
        assert!(validate_knots(&knots_u, n_u, degree_u));
        assert!(validate_knots(&knots_v, n_v, degree_v));
        Self {
            control_points,
            n_u,
            n_v,
            knots_u,
            knots_v,
            degree_u,
            degree_v,
        }
    }

    fn wcp(&self, u_idx: usize, v_idx: usize) -> &WeightedPoint {
        &self.control_points[v_idx * self.n_u + u_idx]
    }

    /// Rational derivatives `S^(k,l)`, or `None` where the weight vanishes.
    fn derivs(&self, uv: Point2, order: usize) -> Option<[[Vec3; 4]; 4]> {
        let h = tensor_derivs(
            |i, j| self.wcp(i, j).homogeneous(),
            self.n_u,
            self.n_v,
            &self.knots_u,
            &self.knots_v,
            self.degree_u,
            self.degree_v,
            uv,
            order,
        );
        let w00 = h[0][0].w;
        if w00.abs() < 1e-30 || !w00.is_finite() {
            return None;
        }

        let mut skl = [[Vec3::zeros(); 4]; 4];
        for k in 0..=order {
            for l in 0..=(order - k) {
                let mut v = h[k][l].xyz();
                for j in 1..=l {
                    v -= binomial(l, j) * h[0][j].w * skl[k][l - j];
                }
                for i in 1..=k {
                    v -= binomial(k, i) * h[i][0].w * skl[k - i][l];
                    let mut v2 = Vec3::zeros();
                    for j in 1..=l {
                        v2 += binomial(l, j) * h[i][j].w * skl[k - i][l - j];
                    }
                    v -= binomial(k, i) * v2;
                }
                skl[k][l] = v / w00;
            }
        }
        Some(skl)
    }
}

impl Surface for NurbsSurface {
    fn jet(&self, uv: Point2, order: usize) -> Option<SurfaceJet> {
        let order = order.min(MAX_JET_ORDER);
        let skl = self.derivs(uv, order)?;
        Some(SurfaceJet::new(
            Point3::from(skl[0][0]),
            pack_partials(&skl),
            order,
        ))
    }

    fn evaluate(&self, uv: Point2) -> Point3 {
        self.derivs(uv, 0)
            .map(|skl| Point3::from(skl[0][0]))
            .unwrap_or_else(Point3::origin)
    }

    fn domain(&self) -> ((f64, f64), (f64, f64)) {
        (
            (self.knots_u[self.degree_u], self.knots_u[self.n_u]),
            (self.knots_v[self.degree_v], self.knots_v[self.n_v]),
        )
    }

    fn clone_box(&self) -> Box<dyn Surface> {
        Box::new(self.clone())
    }

    fn transform(&self, t: &Transform) -> Box<dyn Surface> {
        let mut out = self.clone();
        for wp in out.control_points.iter_mut() {
            wp.point = t.apply_point(&wp.point);
        }
        Box::new(out)
    }
}

// =============================================================================
// B-spline trim curve
// =============================================================================

/// A non-rational B-spline curve in a surface's parameter plane.
#[derive(Debug, Clone)]
pub struct BSplineCurve2d {
    /// Control points in parameter space.
    pub control_points: Vec<Point2>,
    /// Knot vector. Length = control_points.len() + degree + 1.
    pub knots: Vec<f64>,
    /// Polynomial degree.
    pub degree: usize,
}

impl BSplineCurve2d {
    /// Create a B-spline trim curve.
    ///
    /// # Panics
    /// Panics if the knot vector length doesn't match `n + degree + 1`.
    pub fn new(control_points: Vec<Point2>, knots: Vec<f64>, degree: usize) -> Self {
        assert!(
            validate_knots(&knots, control_points.len(), degree),
            "invalid knot vector: len={} but expected {}",
            knots.len(),
            control_points.len() + degree + 1
        );
        Self {
            control_points,
            knots,
            degree,
        }
    }

    /// Clamped uniform knot vector over `[0, 1]`.
    pub fn clamped_uniform(control_points: Vec<Point2>, degree: usize) -> Self {
        let n = control_points.len();
        let n_internal = n - degree - 1;
        let mut knots = vec![0.0; degree + 1];
        knots.extend((1..=n_internal).map(|i| i as f64 / (n_internal + 1) as f64));
        knots.extend(std::iter::repeat(1.0).take(degree + 1));
        Self::new(control_points, knots, degree)
    }
}

impl Curve2d for BSplineCurve2d {
    fn jet(&self, t: f64) -> CurveJet2 {
        let n = self.control_points.len() - 1;
        let span = find_span(&self.knots, n, self.degree, t);
        let ders = ders_basis_functions(&self.knots, span, self.degree, t, 3);
        let mut out = [Vec2::zeros(); 4];
        for (k, row) in ders.iter().enumerate() {
            for (j, b) in row.iter().enumerate() {
                out[k] += *b * self.control_points[span - self.degree + j].coords;
            }
        }
        CurveJet2 {
            point: Point2::from(out[0]),
            d1: out[1],
            d2: out[2],
            d3: out[3],
        }
    }

    fn domain(&self) -> (f64, f64) {
        (
            self.knots[self.degree],
            self.knots[self.control_points.len()],
        )
    }

    fn spans(&self) -> Vec<(f64, f64)> {
        knot_spans(&self.knots, self.control_points.len(), self.degree)
    }

    fn suggested_segments(&self) -> usize {
        self.spans().len().max(1) * 8
    }

    fn clone_box(&self) -> Box<dyn Curve2d> {
        Box::new(self.clone())
    }
}

// =============================================================================
// Tests
// =============================================================================
