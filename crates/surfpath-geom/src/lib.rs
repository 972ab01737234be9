#![warn(missing_docs)]

//! Surface and trim-curve evaluation services for the surfpath engine.
//!
//! Provides the [`Surface`] trait (position and partial derivatives up to
//! third order at a parameter point) and the [`Curve2d`] trait for trim curves
//! living in a surface's parameter space, with concrete analytic
//! implementations: planes, cylinders, spheres, tori, bilinear patches,
//! lines and circular arcs.

use std::f64::consts::PI;
use surfpath_math::{cross2, solve2, Dir3, Point2, Point3, Transform, Vec2, Vec3};

// =============================================================================
// Surface jets
// =============================================================================

/// Highest derivative order a [`SurfaceJet`] carries.
pub const MAX_JET_ORDER: usize = 3;

/// Position and partial derivatives of a surface at one parameter point.
///
/// Partials are stored in the order
/// `[u, v, uu, uv, vv, uuu, uuv, uvv, vvv]`. Entries above `order` are zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceJet {
    /// Surface point.
    pub point: Point3,
    /// Partial derivatives, first order first.
    pub partials: [Vec3; 9],
    /// Highest order actually evaluated.
    pub order: usize,
}

impl SurfaceJet {
    /// Build a jet from a point and a full set of partials, truncated to `order`.
    pub fn new(point: Point3, partials: [Vec3; 9], order: usize) -> Self {
        let order = order.min(MAX_JET_ORDER);
        let mut partials = partials;
        for p in partials.iter_mut().skip(jet_len(order)) {
            *p = Vec3::zeros();
        }
        Self {
            point,
            partials,
            order,
        }
    }

    /// ∂/∂u.
    pub fn du(&self) -> Vec3 {
        self.partials[0]
    }
    /// ∂/∂v.
    pub fn dv(&self) -> Vec3 {
        self.partials[1]
    }
    /// ∂²/∂u².
    pub fn duu(&self) -> Vec3 {
        self.partials[2]
    }
    /// ∂²/∂u∂v.
    pub fn duv(&self) -> Vec3 {
        self.partials[3]
    }
    /// ∂²/∂v².
    pub fn dvv(&self) -> Vec3 {
        self.partials[4]
    }
    /// ∂³/∂u³.
    pub fn duuu(&self) -> Vec3 {
        self.partials[5]
    }
    /// ∂³/∂u²∂v.
    pub fn duuv(&self) -> Vec3 {
        self.partials[6]
    }
    /// ∂³/∂u∂v².
    pub fn duvv(&self) -> Vec3 {
        self.partials[7]
    }
    /// ∂³/∂v³.
    pub fn dvvv(&self) -> Vec3 {
        self.partials[8]
    }

    /// Unnormalized normal `du × dv`.
    pub fn normal_vec(&self) -> Vec3 {
        self.du().cross(&self.dv())
    }

    /// Unit normal, or `None` at a singular point.
    pub fn unit_normal(&self) -> Option<Dir3> {
        let n = self.normal_vec();
        let len = n.norm();
        if len < 1e-300 || !len.is_finite() {
            None
        } else {
            Some(Dir3::new_unchecked(n / len))
        }
    }
}

/// Number of stored partials for derivatives up to `order`.
pub fn jet_len(order: usize) -> usize {
    match order {
        0 => 0,
        1 => 2,
        2 => 5,
        _ => 9,
    }
}

// =============================================================================
// Surface trait
// =============================================================================

/// A parametric surface in 3D space.
pub trait Surface: Send + Sync + std::fmt::Debug {
    /// Position and partials up to `order` (clamped to 3) at `(u, v)`.
    ///
    /// Returns `None` if the surface cannot be evaluated there.
    fn jet(&self, uv: Point2, order: usize) -> Option<SurfaceJet>;

    /// Evaluate the surface at parameter `(u, v)` to get a 3D point.
    fn evaluate(&self, uv: Point2) -> Point3;

    /// Partial derivative with respect to u at `(u, v)`.
    fn d_du(&self, uv: Point2) -> Vec3 {
        self.jet(uv, 1).map(|j| j.du()).unwrap_or_else(Vec3::zeros)
    }

    /// Partial derivative with respect to v at `(u, v)`.
    fn d_dv(&self, uv: Point2) -> Vec3 {
        self.jet(uv, 1).map(|j| j.dv()).unwrap_or_else(Vec3::zeros)
    }

    /// Surface normal at parameter `(u, v)`.
    fn normal(&self, uv: Point2) -> Dir3 {
        self.jet(uv, 1)
            .and_then(|j| j.unit_normal())
            .unwrap_or_else(|| Dir3::new_normalize(Vec3::z()))
    }

    /// Parameter domain as `((u_min, u_max), (v_min, v_max))`.
    fn domain(&self) -> ((f64, f64), (f64, f64));

    /// Parameter of the surface point closest to `point`.
    ///
    /// The default seeds from a 16x16 grid over the domain and refines with
    /// Gauss-Newton, clamped to the domain.
    fn closest_point(&self, point: &Point3) -> Point2 {
        let ((u_min, u_max), (v_min, v_max)) = self.domain();
        let n = 16;
        let mut best = Point2::new(u_min, v_min);
        let mut best_d = f64::INFINITY;
        for i in 0..=n {
            for j in 0..=n {
                let uv = Point2::new(
                    u_min + (u_max - u_min) * i as f64 / n as f64,
                    v_min + (v_max - v_min) * j as f64 / n as f64,
                );
                let d = (self.evaluate(uv) - point).norm_squared();
                if d < best_d {
                    best_d = d;
                    best = uv;
                }
            }
        }
        project_newton(self, point, best)
    }

    /// Clone this surface into a boxed trait object.
    fn clone_box(&self) -> Box<dyn Surface>;

    /// Apply an affine transform to this surface, returning a new surface.
    fn transform(&self, t: &Transform) -> Box<dyn Surface>;
}

impl Clone for Box<dyn Surface> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Gauss-Newton projection of `point` onto `surface`, starting at `seed`.
pub fn project_newton<S: Surface + ?Sized>(surface: &S, point: &Point3, seed: Point2) -> Point2 {
    let ((u_min, u_max), (v_min, v_max)) = surface.domain();
    let mut uv = seed;

    for _ in 0..20 {
        let Some(jet) = surface.jet(uv, 1) else {
            break;
        };
        let du = jet.du();
        let dv = jet.dv();
        let residual = jet.point - point;

        // Normal equations: (J^T J) * delta = J^T * residual
        let a11 = du.dot(&du);
        let a12 = du.dot(&dv);
        let a22 = dv.dot(&dv);
        let rhs = Vec2::new(du.dot(&residual), dv.dot(&residual));
        let Some(delta) = solve2(a11, a12, a12, a22, rhs) else {
            break;
        };

        uv.x = (uv.x - delta.x).clamp(u_min, u_max);
        uv.y = (uv.y - delta.y).clamp(v_min, v_max);

        if delta.x.abs() < 1e-12 && delta.y.abs() < 1e-12 {
            break;
        }
    }

    uv
}

fn wrap_angle(a: f64) -> f64 {
    let a = a.rem_euclid(2.0 * PI);
    if a.is_finite() {
        a
    } else {
        0.0
    }
}

fn orthogonal_ref(axis: &Dir3) -> Dir3 {
    let arbitrary = if axis.as_ref().x.abs() < 0.9 {
        Vec3::x()
    } else {
        Vec3::y()
    };
    Dir3::new_normalize(arbitrary - arbitrary.dot(axis.as_ref()) * axis.as_ref())
}

// =============================================================================
// Plane
// =============================================================================

/// An infinite plane defined by an origin point and a coordinate frame.
///
/// Parameterization: `P(u, v) = origin + u * x_dir + v * y_dir`
#[derive(Debug, Clone)]
pub struct Plane {
    /// Origin point on the plane.
    pub origin: Point3,
    /// Vector along the u direction (its length is the u speed).
    pub x_dir: Vec3,
    /// Vector along the v direction (its length is the v speed).
    pub y_dir: Vec3,
}

impl Plane {
    /// Create a plane from origin and two spanning vectors.
    ///
    /// The vectors are used as-is, so non-unit or skewed vectors give a
    /// non-isometric parameterization.
    pub fn new(origin: Point3, x_dir: Vec3, y_dir: Vec3) -> Self {
        Self {
            origin,
            x_dir,
            y_dir,
        }
    }

    /// XY plane at the origin.
    pub fn xy() -> Self {
        Self::new(Point3::origin(), Vec3::x(), Vec3::y())
    }

    /// Project a 3D point onto this plane's (u, v) parameter space.
    pub fn project(&self, p: &Point3) -> Point2 {
        let d = p - self.origin;
        let g11 = self.x_dir.dot(&self.x_dir);
        let g12 = self.x_dir.dot(&self.y_dir);
        let g22 = self.y_dir.dot(&self.y_dir);
        let rhs = Vec2::new(d.dot(&self.x_dir), d.dot(&self.y_dir));
        solve2(g11, g12, g12, g22, rhs)
            .map(|x| Point2::new(x.x, x.y))
            .unwrap_or_else(Point2::origin)
    }
}

impl Surface for Plane {
    fn jet(&self, uv: Point2, order: usize) -> Option<SurfaceJet> {
        let mut partials = [Vec3::zeros(); 9];
        partials[0] = self.x_dir;
        partials[1] = self.y_dir;
        Some(SurfaceJet::new(self.evaluate(uv), partials, order))
    }

    fn evaluate(&self, uv: Point2) -> Point3 {
        self.origin + uv.x * self.x_dir + uv.y * self.y_dir
    }

    fn domain(&self) -> ((f64, f64), (f64, f64)) {
        ((-1e10, 1e10), (-1e10, 1e10))
    }

    fn closest_point(&self, point: &Point3) -> Point2 {
        self.project(point)
    }

    fn clone_box(&self) -> Box<dyn Surface> {
        Box::new(self.clone())
    }

    fn transform(&self, t: &Transform) -> Box<dyn Surface> {
        Box::new(Plane::new(
            t.apply_point(&self.origin),
            t.apply_vec(&self.x_dir),
            t.apply_vec(&self.y_dir),
        ))
    }
}

// =============================================================================
// Cylinder
// =============================================================================

/// A cylindrical surface defined by an axis line and radius.
///
/// Parameterization: `P(u, v) = center + radius * (cos(u) * x_dir + sin(u) * y_dir) + v * axis`
///
/// Where `u ∈ [0, 2π)` is the angular parameter and `v` is the height along the axis.
#[derive(Debug, Clone)]
pub struct CylinderSurface {
    /// Center point at the base of the cylinder axis.
    pub center: Point3,
    /// Unit direction along the cylinder axis.
    pub axis: Dir3,
    /// Reference direction for u=0 (perpendicular to axis).
    pub ref_dir: Dir3,
    /// Radius of the cylinder.
    pub radius: f64,
}

impl CylinderSurface {
    /// Create a cylinder with axis along Z, centered at origin.
    pub fn new(radius: f64) -> Self {
        Self {
            center: Point3::origin(),
            axis: Dir3::new_normalize(Vec3::z()),
            ref_dir: Dir3::new_normalize(Vec3::x()),
            radius,
        }
    }

    /// Create a cylinder with a custom center and axis.
    pub fn with_axis(center: Point3, axis: Vec3, radius: f64) -> Self {
        let a = Dir3::new_normalize(axis);
        Self {
            center,
            axis: a,
            ref_dir: orthogonal_ref(&a),
            radius,
        }
    }

    fn y_dir(&self) -> Vec3 {
        self.axis.as_ref().cross(self.ref_dir.as_ref())
    }
}

impl Surface for CylinderSurface {
    fn jet(&self, uv: Point2, order: usize) -> Option<SurfaceJet> {
        let (sin_u, cos_u) = uv.x.sin_cos();
        let e = cos_u * self.ref_dir.as_ref() + sin_u * self.y_dir();
        let f = -sin_u * self.ref_dir.as_ref() + cos_u * self.y_dir();
        let r = self.radius;
        let z = Vec3::zeros();
        let partials = [
            r * f,
            *self.axis.as_ref(),
            -r * e,
            z,
            z,
            -r * f,
            z,
            z,
            z,
        ];
        Some(SurfaceJet::new(self.evaluate(uv), partials, order))
    }

    fn evaluate(&self, uv: Point2) -> Point3 {
        let (sin_u, cos_u) = uv.x.sin_cos();
        self.center
            + self.radius * (cos_u * self.ref_dir.as_ref() + sin_u * self.y_dir())
            + uv.y * self.axis.as_ref()
    }

    fn domain(&self) -> ((f64, f64), (f64, f64)) {
        ((0.0, 2.0 * PI), (-1e10, 1e10))
    }

    fn closest_point(&self, point: &Point3) -> Point2 {
        let axis = self.axis.as_ref();
        let to_point = point - self.center;
        let v = to_point.dot(axis);
        let proj = to_point - v * axis;
        let u = proj.dot(&self.y_dir()).atan2(proj.dot(self.ref_dir.as_ref()));
        Point2::new(wrap_angle(u), v)
    }

    fn clone_box(&self) -> Box<dyn Surface> {
        Box::new(self.clone())
    }

    fn transform(&self, t: &Transform) -> Box<dyn Surface> {
        let new_ref = t.apply_vec(self.ref_dir.as_ref());
        // Uniform scale changes the radius by the length of the mapped ref_dir
        let scale = new_ref.norm();
        Box::new(CylinderSurface {
            center: t.apply_point(&self.center),
            axis: Dir3::new_normalize(t.apply_vec(self.axis.as_ref())),
            ref_dir: Dir3::new_normalize(new_ref),
            radius: self.radius * scale,
        })
    }
}

// =============================================================================
// Sphere
// =============================================================================

/// A spherical surface defined by center and radius.
///
/// Parameterization: `P(u, v) = center + radius * (cos(v) * (cos(u) * x + sin(u) * y) + sin(v) * z)`
///
/// Where `u ∈ [0, 2π)` is longitude and `v ∈ [-π/2, π/2]` is latitude.
#[derive(Debug, Clone)]
pub struct SphereSurface {
    /// Center of the sphere.
    pub center: Point3,
    /// Radius of the sphere.
    pub radius: f64,
    /// Reference direction for u=0 (perpendicular to axis).
    pub ref_dir: Dir3,
    /// Axis direction (north pole).
    pub axis: Dir3,
}

impl SphereSurface {
    /// Create a sphere centered at origin with the given radius.
    pub fn new(radius: f64) -> Self {
        Self::with_center(Point3::origin(), radius)
    }

    /// Create a sphere with a custom center.
    pub fn with_center(center: Point3, radius: f64) -> Self {
        Self {
            center,
            radius,
            ref_dir: Dir3::new_normalize(Vec3::x()),
            axis: Dir3::new_normalize(Vec3::z()),
        }
    }

    fn y_dir(&self) -> Vec3 {
        self.axis.as_ref().cross(self.ref_dir.as_ref())
    }
}

impl Surface for SphereSurface {
    fn jet(&self, uv: Point2, order: usize) -> Option<SurfaceJet> {
        let (sin_u, cos_u) = uv.x.sin_cos();
        let (sin_v, cos_v) = uv.y.sin_cos();
        let e = cos_u * self.ref_dir.as_ref() + sin_u * self.y_dir();
        let f = -sin_u * self.ref_dir.as_ref() + cos_u * self.y_dir();
        let z = *self.axis.as_ref();
        let r = self.radius;
        let partials = [
            r * cos_v * f,
            r * (-sin_v * e + cos_v * z),
            -r * cos_v * e,
            -r * sin_v * f,
            -r * (cos_v * e + sin_v * z),
            -r * cos_v * f,
            r * sin_v * e,
            -r * cos_v * f,
            r * (sin_v * e - cos_v * z),
        ];
        Some(SurfaceJet::new(self.evaluate(uv), partials, order))
    }

    fn evaluate(&self, uv: Point2) -> Point3 {
        let (sin_u, cos_u) = uv.x.sin_cos();
        let (sin_v, cos_v) = uv.y.sin_cos();
        self.center
            + self.radius
                * (cos_v * (cos_u * self.ref_dir.as_ref() + sin_u * self.y_dir())
                    + sin_v * self.axis.as_ref())
    }

    fn domain(&self) -> ((f64, f64), (f64, f64)) {
        ((0.0, 2.0 * PI), (-PI / 2.0, PI / 2.0))
    }

    fn closest_point(&self, point: &Point3) -> Point2 {
        let axis = self.axis.as_ref();
        let to_point = point - self.center;
        let len = to_point.norm();
        if len < 1e-300 {
            return Point2::origin();
        }
        let to_point = to_point / len;
        let z = to_point.dot(axis).clamp(-1.0, 1.0);
        let proj = to_point - z * axis;
        let u = if proj.norm() > 1e-12 {
            wrap_angle(proj.dot(&self.y_dir()).atan2(proj.dot(self.ref_dir.as_ref())))
        } else {
            0.0
        };
        Point2::new(u, z.asin())
    }

    fn clone_box(&self) -> Box<dyn Surface> {
        Box::new(self.clone())
    }

    fn transform(&self, t: &Transform) -> Box<dyn Surface> {
        let new_ref = t.apply_vec(self.ref_dir.as_ref());
        let scale = new_ref.norm();
        Box::new(SphereSurface {
            center: t.apply_point(&self.center),
            radius: self.radius * scale,
            ref_dir: Dir3::new_normalize(new_ref),
            axis: Dir3::new_normalize(t.apply_vec(self.axis.as_ref())),
        })
    }
}

// =============================================================================
// Torus
// =============================================================================

/// A toroidal surface defined by center, axis, and two radii.
///
/// Parameterization:
/// ```text
/// P(u, v) = center + (R + r·cos(v))·(cos(u)·ref_dir + sin(u)·y_dir) + r·sin(v)·axis
/// ```
///
/// Where `R` is the major radius, `r` the minor radius, `u ∈ [0, 2π)` the
/// toroidal angle and `v ∈ [0, 2π)` the poloidal angle.
#[derive(Debug, Clone)]
pub struct TorusSurface {
    /// Center of the torus.
    pub center: Point3,
    /// Unit direction of the torus axis.
    pub axis: Dir3,
    /// Reference direction for u=0 (perpendicular to axis).
    pub ref_dir: Dir3,
    /// Major radius: distance from center to tube center.
    pub major_radius: f64,
    /// Minor radius: radius of the tube.
    pub minor_radius: f64,
}

impl TorusSurface {
    /// Create a torus centered at origin with axis along Z.
    pub fn new(major_radius: f64, minor_radius: f64) -> Self {
        Self {
            center: Point3::origin(),
            axis: Dir3::new_normalize(Vec3::z()),
            ref_dir: Dir3::new_normalize(Vec3::x()),
            major_radius,
            minor_radius,
        }
    }

    fn y_dir(&self) -> Vec3 {
        self.axis.as_ref().cross(self.ref_dir.as_ref())
    }
}

impl Surface for TorusSurface {
    fn jet(&self, uv: Point2, order: usize) -> Option<SurfaceJet> {
        let (sin_u, cos_u) = uv.x.sin_cos();
        let (sin_v, cos_v) = uv.y.sin_cos();
        let e = cos_u * self.ref_dir.as_ref() + sin_u * self.y_dir();
        let f = -sin_u * self.ref_dir.as_ref() + cos_u * self.y_dir();
        let z = *self.axis.as_ref();
        let big = self.major_radius + self.minor_radius * cos_v;
        let r = self.minor_radius;
        let partials = [
            big * f,
            -r * sin_v * e + r * cos_v * z,
            -big * e,
            -r * sin_v * f,
            -r * cos_v * e - r * sin_v * z,
            -big * f,
            r * sin_v * e,
            -r * cos_v * f,
            r * sin_v * e - r * cos_v * z,
        ];
        Some(SurfaceJet::new(self.evaluate(uv), partials, order))
    }

    fn evaluate(&self, uv: Point2) -> Point3 {
        let (sin_u, cos_u) = uv.x.sin_cos();
        let (sin_v, cos_v) = uv.y.sin_cos();
        let tube_center_dir = cos_u * self.ref_dir.as_ref() + sin_u * self.y_dir();
        self.center
            + (self.major_radius + self.minor_radius * cos_v) * tube_center_dir
            + self.minor_radius * sin_v * self.axis.as_ref()
    }

    fn domain(&self) -> ((f64, f64), (f64, f64)) {
        ((0.0, 2.0 * PI), (0.0, 2.0 * PI))
    }

    fn closest_point(&self, point: &Point3) -> Point2 {
        let axis = self.axis.as_ref();
        let to_point = point - self.center;
        let h = to_point.dot(axis);
        let proj = to_point - h * axis;
        let proj_len = proj.norm();
        let u = if proj_len > 1e-12 {
            wrap_angle(proj.dot(&self.y_dir()).atan2(proj.dot(self.ref_dir.as_ref())))
        } else {
            0.0
        };
        let v = wrap_angle(h.atan2(proj_len - self.major_radius));
        Point2::new(u, v)
    }

    fn clone_box(&self) -> Box<dyn Surface> {
        Box::new(self.clone())
    }

    fn transform(&self, t: &Transform) -> Box<dyn Surface> {
        let new_ref = t.apply_vec(self.ref_dir.as_ref());
        let scale = new_ref.norm();
        Box::new(TorusSurface {
            center: t.apply_point(&self.center),
            axis: Dir3::new_normalize(t.apply_vec(self.axis.as_ref())),
            ref_dir: Dir3::new_normalize(new_ref),
            major_radius: self.major_radius * scale,
            minor_radius: self.minor_radius * scale,
        })
    }
}

// =============================================================================
// BilinearSurface
// =============================================================================

/// A bilinear patch defined by four corner points.
///
/// Parameterization:
/// ```text
/// P(u, v) = (1-u)(1-v)*p00 + u*(1-v)*p10 + (1-u)*v*p01 + u*v*p11
/// ```
///
/// A non-planar bilinear patch is a hyperbolic paraboloid, which makes it a
/// convenient negative-curvature test surface.
#[derive(Debug, Clone)]
pub struct BilinearSurface {
    /// Corner at (u=0, v=0).
    pub p00: Point3,
    /// Corner at (u=1, v=0).
    pub p10: Point3,
    /// Corner at (u=0, v=1).
    pub p01: Point3,
    /// Corner at (u=1, v=1).
    pub p11: Point3,
}

impl BilinearSurface {
    /// Create a bilinear surface from four corner points.
    pub fn new(p00: Point3, p10: Point3, p01: Point3, p11: Point3) -> Self {
        Self { p00, p10, p01, p11 }
    }

    /// Check if this bilinear surface is planar (all 4 points coplanar).
    pub fn is_planar(&self) -> bool {
        let e1 = self.p10 - self.p00;
        let e2 = self.p01 - self.p00;
        let n = e1.cross(&e2);
        if n.norm() < 1e-12 {
            return true;
        }
        let d = self.p11 - self.p00;
        (d.dot(&n).abs() / n.norm()) < 1e-10
    }
}

impl Surface for BilinearSurface {
    fn jet(&self, uv: Point2, order: usize) -> Option<SurfaceJet> {
        let (u, v) = (uv.x, uv.y);
        let twist = (self.p11 - self.p01) - (self.p10 - self.p00);
        let mut partials = [Vec3::zeros(); 9];
        partials[0] = (1.0 - v) * (self.p10 - self.p00) + v * (self.p11 - self.p01);
        partials[1] = (1.0 - u) * (self.p01 - self.p00) + u * (self.p11 - self.p10);
        partials[3] = twist;
        Some(SurfaceJet::new(self.evaluate(uv), partials, order))
    }

    fn evaluate(&self, uv: Point2) -> Point3 {
        let (u, v) = (uv.x, uv.y);
        let (u1, v1) = (1.0 - u, 1.0 - v);
        Point3::from(
            u1 * v1 * self.p00.coords
                + u * v1 * self.p10.coords
                + u1 * v * self.p01.coords
                + u * v * self.p11.coords,
        )
    }

    fn domain(&self) -> ((f64, f64), (f64, f64)) {
        ((0.0, 1.0), (0.0, 1.0))
    }

    fn clone_box(&self) -> Box<dyn Surface> {
        Box::new(self.clone())
    }

    fn transform(&self, t: &Transform) -> Box<dyn Surface> {
        Box::new(BilinearSurface {
            p00: t.apply_point(&self.p00),
            p10: t.apply_point(&self.p10),
            p01: t.apply_point(&self.p01),
            p11: t.apply_point(&self.p11),
        })
    }
}

// =============================================================================
// 2D curves (trim curves in parameter space)
// =============================================================================

/// Point and derivatives up to third order of a 2D curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveJet2 {
    /// Curve point.
    pub point: Point2,
    /// First derivative.
    pub d1: Vec2,
    /// Second derivative.
    pub d2: Vec2,
    /// Third derivative.
    pub d3: Vec2,
}

/// An intersection between a straight parameter-space segment and a curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentHit {
    /// Parameter along the segment, `0` at its start and `1` at its end.
    pub s: f64,
    /// Curve parameter.
    pub t: f64,
    /// Intersection point.
    pub point: Point2,
}

/// A 2D parametric curve (trim curves in surface parameter space).
pub trait Curve2d: Send + Sync + std::fmt::Debug {
    /// Point and derivatives at parameter `t`.
    fn jet(&self, t: f64) -> CurveJet2;

    /// Evaluate the curve at parameter `t` to get a 2D point.
    fn evaluate(&self, t: f64) -> Point2 {
        self.jet(t).point
    }

    /// Tangent vector at parameter `t`.
    fn tangent(&self, t: f64) -> Vec2 {
        self.jet(t).d1
    }

    /// Parameter domain `(t_min, t_max)`.
    fn domain(&self) -> (f64, f64);

    /// Polynomial spans of the curve (whole domain for analytic curves).
    fn spans(&self) -> Vec<(f64, f64)> {
        vec![self.domain()]
    }

    /// Suggested number of segments for sampling.
    fn suggested_segments(&self) -> usize {
        32
    }

    /// Clone into a boxed trait object.
    fn clone_box(&self) -> Box<dyn Curve2d>;

    /// Parameter of the curve point closest to `p`.
    fn closest_param(&self, p: &Point2) -> f64 {
        closest_param_sampled(self, p)
    }

    /// Intersections of the segment `a → b` with this curve.
    ///
    /// Hits are returned in order of increasing `s`.
    fn intersect_segment(&self, a: &Point2, b: &Point2, tol: f64) -> Vec<SegmentHit> {
        intersect_segment_sampled(self, a, b, tol)
    }

    /// Sample `n + 1` points evenly in parameter.
    fn sample(&self, n: usize) -> Vec<Point2> {
        let (t0, t1) = self.domain();
        let n = n.max(1);
        (0..=n)
            .map(|i| self.evaluate(t0 + (t1 - t0) * i as f64 / n as f64))
            .collect()
    }
}

impl Clone for Box<dyn Curve2d> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Closest parameter by dense sampling followed by Newton refinement on
/// `C'(t) · (C(t) - p) = 0`.
pub fn closest_param_sampled<C: Curve2d + ?Sized>(curve: &C, p: &Point2) -> f64 {
    let (t0, t1) = curve.domain();
    let n = curve.suggested_segments() * 4;
    let mut best_t = t0;
    let mut best_d = f64::INFINITY;
    for i in 0..=n {
        let t = t0 + (t1 - t0) * i as f64 / n as f64;
        let d = (curve.evaluate(t) - p).norm_squared();
        if d < best_d {
            best_d = d;
            best_t = t;
        }
    }

    let mut t = best_t;
    for _ in 0..20 {
        let j = curve.jet(t);
        let r = j.point - p;
        let f = j.d1.dot(&r);
        let df = j.d2.dot(&r) + j.d1.dot(&j.d1);
        if df.abs() < 1e-300 {
            break;
        }
        let next = (t - f / df).clamp(t0, t1);
        let done = (next - t).abs() < 1e-14 * (1.0 + t.abs());
        t = next;
        if done {
            break;
        }
    }
    t
}

/// Segment/curve intersection by polyline sampling, refined with Newton on
/// `a + s·(b - a) - C(t) = 0`.
pub fn intersect_segment_sampled<C: Curve2d + ?Sized>(
    curve: &C,
    a: &Point2,
    b: &Point2,
    tol: f64,
) -> Vec<SegmentHit> {
    let d = b - a;
    if d.norm() < 1e-300 {
        return Vec::new();
    }
    let (t0, t1) = curve.domain();
    let n = curve.suggested_segments() * 4;
    let mut hits: Vec<SegmentHit> = Vec::new();

    let mut prev_t = t0;
    let mut prev = curve.evaluate(t0);
    for i in 1..=n {
        let t = t0 + (t1 - t0) * i as f64 / n as f64;
        let p = curve.evaluate(t);
        let e = p - prev;
        let denom = cross2(&d, &e);
        if denom.abs() > 1e-300 {
            let w = prev - a;
            let s = cross2(&w, &e) / denom;
            let k = cross2(&w, &d) / denom;
            let slack = 1e-6;
            if (-slack..=1.0 + slack).contains(&s) && (-slack..=1.0 + slack).contains(&k) {
                let mut s = s;
                let mut ct = prev_t + k * (t - prev_t);
                for _ in 0..10 {
                    let j = curve.jet(ct);
                    let f = a + s * d - j.point;
                    // J = [d, -C'(t)]
                    let Some(delta) = solve2(d.x, -j.d1.x, d.y, -j.d1.y, -f) else {
                        break;
                    };
                    s += delta.x;
                    ct = (ct + delta.y).clamp(t0, t1);
                    if delta.norm() < 1e-15 {
                        break;
                    }
                }
                let point = curve.evaluate(ct);
                let s_tol = tol / d.norm();
                let on_segment = (a + s * d - point).norm() < tol.max(1e-9);
                if on_segment && s >= -s_tol && s <= 1.0 + s_tol {
                    let s = s.clamp(0.0, 1.0);
                    let dup = hits.iter().any(|h| (h.point - point).norm() < tol);
                    if !dup {
                        hits.push(SegmentHit { s, t: ct, point });
                    }
                }
            }
        }
        prev_t = t;
        prev = p;
    }

    hits.sort_by(|x, y| x.s.total_cmp(&y.s));
    hits
}

// =============================================================================
// Line2d
// =============================================================================

/// A 2D line segment in parameter space.
#[derive(Debug, Clone)]
pub struct Line2d {
    /// Starting point.
    pub origin: Point2,
    /// Direction.
    pub direction: Vec2,
}

impl Line2d {
    /// Create from two endpoints.
    pub fn from_points(start: Point2, end: Point2) -> Self {
        Self {
            origin: start,
            direction: end - start,
        }
    }
}

impl Curve2d for Line2d {
    fn jet(&self, t: f64) -> CurveJet2 {
        CurveJet2 {
            point: self.origin + t * self.direction,
            d1: self.direction,
            d2: Vec2::zeros(),
            d3: Vec2::zeros(),
        }
    }

    fn domain(&self) -> (f64, f64) {
        (0.0, 1.0)
    }

    fn suggested_segments(&self) -> usize {
        1
    }

    fn clone_box(&self) -> Box<dyn Curve2d> {
        Box::new(self.clone())
    }

    fn closest_param(&self, p: &Point2) -> f64 {
        let len2 = self.direction.norm_squared();
        if len2 < 1e-300 {
            return 0.0;
        }
        ((p - self.origin).dot(&self.direction) / len2).clamp(0.0, 1.0)
    }

    fn intersect_segment(&self, a: &Point2, b: &Point2, tol: f64) -> Vec<SegmentHit> {
        let d = b - a;
        let e = self.direction;
        let denom = cross2(&d, &e);
        if denom.abs() < 1e-300 {
            // Parallel or collinear: no transversal crossing
            return Vec::new();
        }
        let w = self.origin - a;
        let s = cross2(&w, &e) / denom;
        let t = cross2(&w, &d) / denom;
        let s_tol = tol / d.norm().max(1e-300);
        let t_tol = tol / e.norm().max(1e-300);
        if s < -s_tol || s > 1.0 + s_tol || t < -t_tol || t > 1.0 + t_tol {
            return Vec::new();
        }
        let t = t.clamp(0.0, 1.0);
        vec![SegmentHit {
            s: s.clamp(0.0, 1.0),
            t,
            point: self.evaluate(t),
        }]
    }
}

// =============================================================================
// Circle2d
// =============================================================================

/// A 2D circle or circular arc in parameter space.
///
/// Parameterization: `P(t) = center + radius * (cos t, sin t)`, `t ∈ [start, end]`.
#[derive(Debug, Clone)]
pub struct Circle2d {
    /// Center of the circle.
    pub center: Point2,
    /// Radius.
    pub radius: f64,
    /// Start angle.
    pub start: f64,
    /// End angle (greater than `start`).
    pub end: f64,
}

impl Circle2d {
    /// Create a full circle at the given center with the given radius.
    pub fn new(center: Point2, radius: f64) -> Self {
        Self::arc(center, radius, 0.0, 2.0 * PI)
    }

    /// Create an arc from `start` to `end` (radians, `end > start`).
    pub fn arc(center: Point2, radius: f64, start: f64, end: f64) -> Self {
        Self {
            center,
            radius,
            start,
            end,
        }
    }

    fn is_full(&self) -> bool {
        self.end - self.start >= 2.0 * PI - 1e-12
    }

    /// Map an angle into `[start, end]`, or `None` when it falls outside the arc.
    fn angle_param(&self, angle: f64) -> Option<f64> {
        let t = self.start + (angle - self.start).rem_euclid(2.0 * PI);
        if t <= self.end + 1e-12 {
            Some(t.min(self.end))
        } else {
            None
        }
    }
}

impl Curve2d for Circle2d {
    fn jet(&self, t: f64) -> CurveJet2 {
        let (sin_t, cos_t) = t.sin_cos();
        let r = self.radius;
        CurveJet2 {
            point: self.center + r * Vec2::new(cos_t, sin_t),
            d1: r * Vec2::new(-sin_t, cos_t),
            d2: r * Vec2::new(-cos_t, -sin_t),
            d3: r * Vec2::new(sin_t, -cos_t),
        }
    }

    fn domain(&self) -> (f64, f64) {
        (self.start, self.end)
    }

    fn clone_box(&self) -> Box<dyn Curve2d> {
        Box::new(self.clone())
    }

    fn closest_param(&self, p: &Point2) -> f64 {
        let w = p - self.center;
        if w.norm() < 1e-300 {
            return self.start;
        }
        let angle = w.y.atan2(w.x);
        match self.angle_param(angle) {
            Some(t) => t,
            None if self.is_full() => self.start,
            None => {
                // Outside the arc: nearer endpoint wins
                let ds = (self.evaluate(self.start) - p).norm();
                let de = (self.evaluate(self.end) - p).norm();
                if ds <= de {
                    self.start
                } else {
                    self.end
                }
            }
        }
    }

    fn intersect_segment(&self, a: &Point2, b: &Point2, tol: f64) -> Vec<SegmentHit> {
        let d = b - a;
        let f = a - self.center;
        let qa = d.dot(&d);
        if qa < 1e-300 {
            return Vec::new();
        }
        let qb = 2.0 * f.dot(&d);
        let qc = f.dot(&f) - self.radius * self.radius;
        let disc = qb * qb - 4.0 * qa * qc;
        if disc < 0.0 {
            return Vec::new();
        }
        let sq = disc.sqrt();
        let s_tol = tol / qa.sqrt();
        let mut hits = Vec::new();
        for s in [(-qb - sq) / (2.0 * qa), (-qb + sq) / (2.0 * qa)] {
            if s < -s_tol || s > 1.0 + s_tol {
                continue;
            }
            let s = s.clamp(0.0, 1.0);
            let q = a + s * d - self.center;
            let Some(t) = self.angle_param(q.y.atan2(q.x)) else {
                continue;
            };
            let point = self.evaluate(t);
            if hits.iter().any(|h: &SegmentHit| (h.point - point).norm() < tol) {
                continue;
            }
            hits.push(SegmentHit { s, t, point });
        }
        hits
    }
}

// =============================================================================
// Geometry store
// =============================================================================

/// Storage for the geometric entities referenced by a trimmed shell.
#[derive(Debug, Clone, Default)]
pub struct GeometryStore {
    /// Surfaces indexed by position (Face.surface_index refers to these).
    pub surfaces: Vec<Box<dyn Surface>>,
    /// 2D trim curves indexed by position.
    pub curves_2d: Vec<Box<dyn Curve2d>>,
}

impl GeometryStore {
    /// Create an empty geometry store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a surface and return its index.
    pub fn add_surface(&mut self, surface: Box<dyn Surface>) -> usize {
        let idx = self.surfaces.len();
        self.surfaces.push(surface);
        idx
    }

    /// Add a 2D trim curve and return its index.
    pub fn add_curve_2d(&mut self, curve: Box<dyn Curve2d>) -> usize {
        let idx = self.curves_2d.len();
        self.curves_2d.push(curve);
        idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Check every partial in a jet against central differences of the
    /// next-lower order.
    fn check_partials(surface: &dyn Surface, uv: Point2) {
        let h = 1e-5;
        let jet = surface.jet(uv, 3).unwrap();
        let ju = |du: f64| surface.jet(Point2::new(uv.x + du, uv.y), 3).unwrap();
        let jv = |dv: f64| surface.jet(Point2::new(uv.x, uv.y + dv), 3).unwrap();
        let fd_u = |k: usize| (ju(h).partials[k] - ju(-h).partials[k]) / (2.0 * h);
        let fd_v = |k: usize| (jv(h).partials[k] - jv(-h).partials[k]) / (2.0 * h);

        let pu = (surface.evaluate(Point2::new(uv.x + h, uv.y))
            - surface.evaluate(Point2::new(uv.x - h, uv.y)))
            / (2.0 * h);
        assert!((jet.du() - pu).norm() < 1e-5, "du mismatch");
        assert!((jet.duu() - fd_u(0)).norm() < 1e-5, "duu mismatch");
        assert!((jet.duv() - fd_v(0)).norm() < 1e-5, "duv mismatch");
        assert!((jet.dvv() - fd_v(1)).norm() < 1e-5, "dvv mismatch");
        assert!((jet.duuu() - fd_u(2)).norm() < 1e-5, "duuu mismatch");
        assert!((jet.duuv() - fd_v(2)).norm() < 1e-5, "duuv mismatch");
        assert!((jet.duvv() - fd_u(4)).norm() < 1e-5, "duvv mismatch");
        assert!((jet.dvvv() - fd_v(4)).norm() < 1e-5, "dvvv mismatch");
    }

    #[test]
    fn test_analytic_jets_match_finite_differences() {
        let uv = Point2::new(0.7, 0.4);
        check_partials(&SphereSurface::new(3.0), uv);
        check_partials(&TorusSurface::new(10.0, 3.0), uv);
        check_partials(&CylinderSurface::new(2.0), uv);
        check_partials(
            &BilinearSurface::new(
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 1.0),
                Point3::new(0.0, 1.0, 1.0),
                Point3::new(1.0, 1.0, 0.0),
            ),
            Point2::new(0.3, 0.6),
        );
    }

    #[test]
    fn test_jet_truncation() {
        let jet = SphereSurface::new(1.0).jet(Point2::new(0.2, 0.3), 1).unwrap();
        assert_eq!(jet.order, 1);
        assert!(jet.du().norm() > 0.0);
        assert_eq!(jet.duu(), Vec3::zeros());
        assert_eq!(jet.dvvv(), Vec3::zeros());
    }

    #[test]
    fn test_sphere_normal_points_outward() {
        let s = SphereSurface::new(2.0);
        let uv = Point2::new(1.0, 0.5);
        let n = s.normal(uv);
        let radial = (s.evaluate(uv) - s.center).normalize();
        assert!((n.as_ref() - radial).norm() < 1e-12);
    }

    #[test]
    fn test_closest_point_analytic() {
        let s = SphereSurface::new(5.0);
        let uv = Point2::new(2.0, -0.4);
        let p = s.evaluate(uv) * 1.3;
        let back = s.closest_point(&p);
        assert!((back - uv).norm() < 1e-10);

        let t = TorusSurface::new(10.0, 3.0);
        let uv = Point2::new(4.0, 5.0);
        let back = t.closest_point(&t.evaluate(uv));
        assert!((back - uv).norm() < 1e-10);

        let c = CylinderSurface::new(5.0);
        let uv = c.closest_point(&Point3::new(0.0, 5.0, 7.0));
        assert!((uv.x - PI / 2.0).abs() < 1e-10);
        assert!((uv.y - 7.0).abs() < 1e-10);
    }

    #[test]
    fn test_closest_point_newton_fallback() {
        let b = BilinearSurface::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.5),
            Point3::new(0.0, 2.0, 0.5),
            Point3::new(2.0, 2.0, 0.0),
        );
        let uv = Point2::new(0.35, 0.8);
        let back = b.closest_point(&b.evaluate(uv));
        assert!((back - uv).norm() < 1e-8);
    }

    #[test]
    fn test_plane_skewed_projection() {
        let p = Plane::new(
            Point3::new(1.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
        );
        let uv = Point2::new(0.25, 3.0);
        let back = p.project(&p.evaluate(uv));
        assert!((back - uv).norm() < 1e-12);
    }

    #[test]
    fn test_surface_transform() {
        let t = Transform::translation(10.0, 0.0, 0.0);
        let c2 = CylinderSurface::new(5.0).transform(&t);
        let pt = c2.evaluate(Point2::new(0.0, 0.0));
        assert!((pt.x - 15.0).abs() < 1e-10);

        let s2 = SphereSurface::new(5.0).transform(&Transform::uniform_scale(2.0));
        assert!((s2.evaluate(Point2::new(0.0, 0.0)).x - 10.0).abs() < 1e-10);
    }

    #[test]
    fn test_line_intersection() {
        let line = Line2d::from_points(Point2::new(1.0, 0.0), Point2::new(1.0, 1.0));
        let hits = line.intersect_segment(&Point2::new(0.5, 0.5), &Point2::new(1.5, 0.25), 1e-9);
        assert_eq!(hits.len(), 1);
        assert!((hits[0].point.x - 1.0).abs() < 1e-12);
        assert!((hits[0].s - 0.5).abs() < 1e-12);
        assert!((hits[0].t - 0.375).abs() < 1e-12);

        let miss = line.intersect_segment(&Point2::new(0.5, 0.5), &Point2::new(0.9, 0.5), 1e-9);
        assert!(miss.is_empty());
    }

    #[test]
    fn test_circle_intersection_and_closest() {
        let c = Circle2d::new(Point2::new(0.5, 0.5), 0.25);
        let hits = c.intersect_segment(&Point2::new(0.0, 0.5), &Point2::new(1.0, 0.5), 1e-9);
        assert_eq!(hits.len(), 2);
        assert!((hits[0].point.x - 0.25).abs() < 1e-12);
        assert!((hits[1].point.x - 0.75).abs() < 1e-12);

        let t = c.closest_param(&Point2::new(0.5, 2.0));
        assert!((t - PI / 2.0).abs() < 1e-12);

        // A quarter arc does not see the crossing on the far side
        let arc = Circle2d::arc(Point2::new(0.5, 0.5), 0.25, 0.0, PI / 2.0);
        let hits = arc.intersect_segment(&Point2::new(0.0, 0.5), &Point2::new(1.0, 0.5), 1e-9);
        assert_eq!(hits.len(), 1);
        assert!((hits[0].point.x - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_sampled_fallbacks_agree_with_analytic() {
        let c = Circle2d::new(Point2::new(0.0, 0.0), 1.0);
        let a = Point2::new(-2.0, 0.3);
        let b = Point2::new(2.0, 0.3);
        let exact = c.intersect_segment(&a, &b, 1e-9);
        let sampled = intersect_segment_sampled(&c, &a, &b, 1e-9);
        assert_eq!(exact.len(), sampled.len());
        for (e, s) in exact.iter().zip(&sampled) {
            assert!((e.point - s.point).norm() < 1e-9);
        }

        let p = Point2::new(1.5, 1.5);
        let t = closest_param_sampled(&c, &p);
        assert!((t - PI / 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_geometry_store() {
        let mut store = GeometryStore::new();
        assert_eq!(store.add_surface(Box::new(Plane::xy())), 0);
        assert_eq!(
            store.add_curve_2d(Box::new(Line2d::from_points(
                Point2::origin(),
                Point2::new(1.0, 0.0)
            ))),
            0
        );
    }
}
