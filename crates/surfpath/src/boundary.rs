//! Step clipping against a face boundary.
//!
//! A proposed parameter-space step `a → b` is shortened to the point where it
//! leaves the face. On a trimmed face the crossing may land on an edge shared
//! with another face, in which case the clip also reports where the path
//! continues on that face.

use surfpath_geom::Surface;
use surfpath_math::{Point2, Point3, Tolerance};
use surfpath_topo::{FaceId, PointClass, Shell, TrimId};

use crate::curve_on_surface::CurveOnSurface;
use crate::error::{Result, TraceError};

/// Largest accepted gap between a crossing point and its image on the
/// adjacent face before a warning is logged.
const HANDOFF_MISMATCH: f64 = 1e-3;

/// Where a path continues after crossing a shared edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Handoff {
    /// Face on the far side of the edge.
    pub face: FaceId,
    /// Parameter point on `face`.
    pub uv: Point2,
    /// 3D crossing point.
    pub point: Point3,
}

/// Result of clipping one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClipOutcome {
    /// The step stays inside the face.
    Unclipped,
    /// The step was shortened to the boundary, with a continuation when the
    /// boundary is shared with another face.
    Clipped(Option<Handoff>),
}

impl ClipOutcome {
    /// Whether the boundary was reached.
    pub fn is_clipped(&self) -> bool {
        matches!(self, ClipOutcome::Clipped(_))
    }

    /// Continuation on the adjacent face, if any.
    pub fn handoff(&self) -> Option<&Handoff> {
        match self {
            ClipOutcome::Clipped(Some(h)) => Some(h),
            _ => None,
        }
    }
}

// =============================================================================
// Untrimmed rectangle
// =============================================================================

/// Edge crossed first for each corner code; `NONE` when the line through the
/// step misses the rectangle interior.
///
/// Bit `i` of the code is set when corner `i` lies strictly left of the
/// directed step. Corners run `(u0,v0)`, `(u1,v0)`, `(u1,v1)`, `(u0,v1)`; edges
/// are `0: v = v0`, `1: u = u1`, `2: v = v1`, `3: u = u0`.
const EXIT_EDGE: [u8; 16] = [4, 3, 0, 3, 1, 1, 0, 3, 2, 2, 0, 2, 1, 1, 0, 4];
const NONE: u8 = 4;

/// The full parameter rectangle of a surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UntrimmedBoundary {
    /// `(u_min, u_max)`.
    pub u: (f64, f64),
    /// `(v_min, v_max)`.
    pub v: (f64, f64),
}

impl UntrimmedBoundary {
    /// Boundary of the rectangle `[u0,u1] x [v0,v1]`.
    pub fn new(u: (f64, f64), v: (f64, f64)) -> Self {
        Self { u, v }
    }

    /// Boundary of a surface's whole parameter domain.
    pub fn from_surface(surface: &dyn Surface) -> Self {
        let (u, v) = surface.domain();
        Self { u, v }
    }

    /// Whether `p` lies in the closed rectangle.
    pub fn contains(&self, p: &Point2) -> bool {
        p.x >= self.u.0 && p.x <= self.u.1 && p.y >= self.v.0 && p.y <= self.v.1
    }

    fn clamp(&self, p: &Point2) -> Point2 {
        Point2::new(p.x.clamp(self.u.0, self.u.1), p.y.clamp(self.v.0, self.v.1))
    }

    /// Shorten `a → b` to the rectangle, moving `b` onto the crossed edge.
    pub fn clip(&self, a: &Point2, b: &mut Point2) -> ClipOutcome {
        if self.contains(b) {
            return ClipOutcome::Unclipped;
        }

        let corners = [
            Point2::new(self.u.0, self.v.0),
            Point2::new(self.u.1, self.v.0),
            Point2::new(self.u.1, self.v.1),
            Point2::new(self.u.0, self.v.1),
        ];
        let d = *b - a;
        let code = corners.iter().enumerate().fold(0usize, |code, (i, c)| {
            let w = c - a;
            if d.x * w.y - d.y * w.x > 0.0 {
                code | (1 << i)
            } else {
                code
            }
        });

        let edge = EXIT_EDGE[code];
        if edge == NONE {
            *b = self.clamp(b);
            return ClipOutcome::Clipped(None);
        }

        // Crossing coordinate is snapped exactly, the other one clamped
        let (fixed, start, delta) = match edge {
            0 => (self.v.0, a.y, d.y),
            1 => (self.u.1, a.x, d.x),
            2 => (self.v.1, a.y, d.y),
            _ => (self.u.0, a.x, d.x),
        };
        if delta == 0.0 {
            *b = self.clamp(b);
            return ClipOutcome::Clipped(None);
        }
        let t = ((fixed - start) / delta).clamp(0.0, 1.0);
        let hit = a + d * t;
        *b = if edge % 2 == 0 {
            Point2::new(hit.x.clamp(self.u.0, self.u.1), fixed)
        } else {
            Point2::new(fixed, hit.y.clamp(self.v.0, self.v.1))
        };
        ClipOutcome::Clipped(None)
    }
}

// =============================================================================
// Trimmed face
// =============================================================================

/// The trimmed region of one face of a [`Shell`].
#[derive(Debug, Clone, Copy)]
pub struct TrimmedBoundary<'a> {
    /// Shell holding the face.
    pub shell: &'a Shell,
    /// Face being traced.
    pub face: FaceId,
    /// Parameter-space distance under which a point counts as on a trim.
    pub tolerance: f64,
    /// Model-space tolerance for mapping a crossing onto the adjacent face.
    pub inversion_tolerance: f64,
}

impl<'a> TrimmedBoundary<'a> {
    /// Boundary of `face` with the default tolerances.
    pub fn new(shell: &'a Shell, face: FaceId) -> Self {
        let tol = Tolerance::DEFAULT;
        Self {
            shell,
            face,
            tolerance: tol.boundary,
            inversion_tolerance: tol.linear,
        }
    }

    /// Set the inversion tolerance.
    pub fn with_inversion_tolerance(mut self, tolerance: f64) -> Self {
        self.inversion_tolerance = tolerance;
        self
    }

    /// Surface of the traced face.
    pub fn surface(&self) -> &'a dyn Surface {
        self.shell.surface(self.face)
    }

    /// Trim through `a`, preferring the edge with the fewest trims; the first
    /// trim found wins ties.
    fn trim_through(&self, a: &Point2) -> Option<TrimId> {
        let mut best: Option<(TrimId, usize)> = None;
        for trim in self.shell.face_trims(self.face) {
            let curve = self.shell.curve(trim);
            let t = curve.closest_param(a);
            if (curve.evaluate(t) - a).norm() > self.tolerance {
                continue;
            }
            let count = self.shell.edge_trim_count(trim);
            if best.map_or(true, |(_, n)| count < n) {
                best = Some((trim, count));
            }
        }
        best.map(|(trim, _)| trim)
    }

    /// First trim crossed by `a → b`, with its crossing point.
    fn trim_crossing(&self, a: &Point2, b: &Point2) -> Option<(TrimId, Point2)> {
        let mut best: Option<(TrimId, usize, f64, Point2)> = None;
        for hit in self.shell.intersect_trims(self.face, a, b, self.tolerance) {
            let count = self.shell.edge_trim_count(hit.trim);
            let better = match best {
                None => true,
                // Equal counts go to the earliest crossing along the step,
                // not the first trim visited.
                Some((_, n, s, _)) => count < n || (count == n && hit.hit.s < s),
            };
            if better {
                best = Some((hit.trim, count, hit.hit.s, hit.hit.point));
            }
        }
        best.map(|(trim, _, _, point)| (trim, point))
    }

    /// Shorten `a → b` to the trimmed region, moving `b` onto the crossed trim.
    ///
    /// Fails with [`TraceError::TrimmingFailed`] when `b` leaves the face but
    /// no trim accounts for it.
    pub fn clip(&self, a: &Point2, b: &mut Point2) -> Result<ClipOutcome> {
        if self.shell.classify(self.face, b, self.tolerance) == PointClass::Inside {
            return Ok(ClipOutcome::Unclipped);
        }

        let trim = if let Some(trim) = self.trim_through(a) {
            *b = *a;
            Some(trim)
        } else if let Some((trim, point)) = self.trim_crossing(a, b) {
            *b = point;
            Some(trim)
        } else if self.shell.classify(self.face, b, self.tolerance) == PointClass::Boundary {
            // Step ends just short of a trim without crossing it
            self.shell.nearest_trim(self.face, b).map(|(trim, _)| {
                let curve = self.shell.curve(trim);
                *b = curve.evaluate(curve.closest_param(b));
                trim
            })
        } else {
            None
        };

        let Some(trim) = trim else {
            return Err(TraceError::TrimmingFailed { u: b.x, v: b.y });
        };
        if self.shell.edge_trim_count(trim) < 2 {
            return Ok(ClipOutcome::Clipped(None));
        }
        let Some(sibling) = self.shell.sibling_trim(trim) else {
            return Ok(ClipOutcome::Clipped(None));
        };

        let face = self.shell.trims[sibling].face;
        let point = self.surface().evaluate(*b);
        let target = self.shell.surface(face);
        let on_edge = CurveOnSurface::new(self.shell.curve(sibling), target);
        let inversion = on_edge.invert(&point, self.inversion_tolerance);
        let uv = on_edge.uv(inversion.t);

        let gap = (target.evaluate(uv) - point).norm();
        if gap > HANDOFF_MISMATCH {
            log::warn!(
                "handoff point off by {:e} at ({}, {}) on the adjacent face",
                gap,
                uv.x,
                uv.y
            );
        }
        Ok(ClipOutcome::Clipped(Some(Handoff { face, uv, point })))
    }
}

/// Either boundary kind, as seen by the tracer.
#[derive(Debug, Clone, Copy)]
pub enum Boundary<'a> {
    /// Rectangular parameter domain of a single patch.
    Untrimmed(UntrimmedBoundary),
    /// Trimmed face of a shell.
    Trimmed(TrimmedBoundary<'a>),
}

impl Boundary<'_> {
    /// Clip the step `a → b`, moving `b` onto the boundary when it is crossed.
    pub fn clip(&self, a: &Point2, b: &mut Point2) -> Result<ClipOutcome> {
        match self {
            Boundary::Untrimmed(r) => Ok(r.clip(a, b)),
            Boundary::Trimmed(t) => t.clip(a, b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use surfpath_geom::{Circle2d, Line2d, Plane};
    use surfpath_math::Vec3;

    fn unit() -> UntrimmedBoundary {
        UntrimmedBoundary::new((0.0, 1.0), (0.0, 1.0))
    }

    #[test]
    fn test_untrimmed_inside_is_unclipped() {
        let mut b = Point2::new(0.7, 1.0);
        assert_eq!(unit().clip(&Point2::new(0.5, 0.5), &mut b), ClipOutcome::Unclipped);
        assert_eq!(b, Point2::new(0.7, 1.0));
    }

    #[test]
    fn test_untrimmed_each_edge() {
        let a = Point2::new(0.5, 0.5);
        let cases = [
            (Point2::new(1.5, 0.75), Point2::new(1.0, 0.625)),
            (Point2::new(-0.5, 0.25), Point2::new(0.0, 0.375)),
            (Point2::new(0.75, 1.5), Point2::new(0.625, 1.0)),
            (Point2::new(0.25, -0.5), Point2::new(0.375, 0.0)),
        ];
        for (target, expected) in cases {
            let mut b = target;
            let out = unit().clip(&a, &mut b);
            assert!(out.is_clipped());
            assert!(out.handoff().is_none());
            assert_relative_eq!(b.x, expected.x, epsilon = 1e-12);
            assert_relative_eq!(b.y, expected.y, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_untrimmed_snaps_exactly() {
        let a = Point2::new(0.99, 0.3);
        let mut b = Point2::new(1.0 + 1e-9, 0.3 + 1e-9);
        unit().clip(&a, &mut b);
        assert_eq!(b.x, 1.0);
        assert!(unit().contains(&b));
    }

    #[test]
    fn test_untrimmed_corner_exit() {
        let a = Point2::new(0.5, 0.5);
        let mut b = Point2::new(1.5, 1.5);
        unit().clip(&a, &mut b);
        assert_relative_eq!(b.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(b.y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_untrimmed_step_along_edge() {
        // Starting on v = 0 and sliding off the corner
        let a = Point2::new(0.9, 0.0);
        let mut b = Point2::new(1.1, 0.0);
        assert!(unit().clip(&a, &mut b).is_clipped());
        assert_relative_eq!(b.x, 1.0, epsilon = 1e-12);
        assert_eq!(b.y, 0.0);
    }

    fn two_planes() -> (Shell, FaceId, FaceId) {
        let mut shell = Shell::new();
        let (fa, ta) = shell.add_rect_face(Box::new(Plane::xy()), (0.0, 1.0), (0.0, 1.0));
        let mirrored = Plane::new(Point3::new(2.0, 0.0, 0.0), -Vec3::x(), Vec3::y());
        let (fb, tb) = shell.add_rect_face(Box::new(mirrored), (0.0, 1.0), (0.0, 1.0));
        shell.share_edge(ta[1], tb[1]);
        (shell, fa, fb)
    }

    /// Unit square on XY sharing its `u = 1` trim with one plane and,
    /// optionally, its `v = 0` trim with another.
    fn corner_shell(share_bottom: bool) -> (Shell, FaceId, FaceId, [TrimId; 4]) {
        let mut shell = Shell::new();
        let (fa, ta) = shell.add_rect_face(Box::new(Plane::xy()), (0.0, 1.0), (0.0, 1.0));
        let mirrored = Plane::new(Point3::new(2.0, 0.0, 0.0), -Vec3::x(), Vec3::y());
        let (_, tb) = shell.add_rect_face(Box::new(mirrored), (0.0, 1.0), (0.0, 1.0));
        shell.share_edge(ta[1], tb[1]);
        let below = Plane::new(Point3::origin(), Vec3::x(), -Vec3::y());
        let (fc, tc) = shell.add_rect_face(Box::new(below), (0.0, 1.0), (0.0, 1.0));
        if share_bottom {
            shell.share_edge(ta[0], tc[0]);
        }
        (shell, fa, fc, ta)
    }

    #[test]
    fn test_corner_prefers_free_trim() {
        let (shell, fa, _, ta) = corner_shell(false);
        assert_eq!(shell.edge_trim_count(ta[0]), 1);
        assert_eq!(shell.edge_trim_count(ta[1]), 2);

        let boundary = TrimmedBoundary::new(&shell, fa);
        let a = Point2::new(1.0, 0.0);
        assert_eq!(boundary.trim_through(&a), Some(ta[0]));

        let mut b = Point2::new(1.01, 0.005);
        let out = boundary.clip(&a, &mut b).unwrap();
        assert_eq!(out, ClipOutcome::Clipped(None));
        assert_eq!(b, a);
    }

    #[test]
    fn test_corner_equal_counts_first_trim_wins() {
        let (shell, fa, fc, ta) = corner_shell(true);
        assert_eq!(shell.edge_trim_count(ta[0]), 2);
        assert_eq!(shell.edge_trim_count(ta[1]), 2);

        let boundary = TrimmedBoundary::new(&shell, fa);
        let a = Point2::new(1.0, 0.0);
        assert_eq!(boundary.trim_through(&a), Some(ta[0]));

        let mut b = Point2::new(1.01, 0.005);
        let out = boundary.clip(&a, &mut b).unwrap();
        let h = out.handoff().copied().unwrap();
        assert_eq!(h.face, fc);
        assert_relative_eq!(h.uv.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(h.uv.y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_crossing_ties_go_to_earliest_hit() {
        let (mut shell, face) = Shell::from_rect(Box::new(Plane::xy()), (0.0, 1.0), (0.0, 1.0));
        let far_loop = shell.add_inner_loop(face);
        let far = shell.add_trim(far_loop, Box::new(Circle2d::new(Point2::new(0.7, 0.5), 0.1)));
        let near_loop = shell.add_inner_loop(face);
        let near = shell.add_trim(near_loop, Box::new(Circle2d::new(Point2::new(0.3, 0.5), 0.1)));
        assert_eq!(shell.edge_trim_count(far), shell.edge_trim_count(near));

        let boundary = TrimmedBoundary::new(&shell, face);
        let (trim, point) = boundary
            .trim_crossing(&Point2::new(0.1, 0.5), &Point2::new(0.9, 0.5))
            .unwrap();
        assert_eq!(trim, near);
        assert_relative_eq!(point.x, 0.2, epsilon = 1e-9);
        assert_relative_eq!(point.y, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_trimmed_handoff_to_neighbour() {
        let (shell, fa, fb) = two_planes();
        let boundary = TrimmedBoundary::new(&shell, fa);
        let mut b = Point2::new(1.05, 0.42);
        let out = boundary.clip(&Point2::new(0.95, 0.42), &mut b).unwrap();
        assert_relative_eq!(b.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(b.y, 0.42, epsilon = 1e-12);

        let h = out.handoff().copied().unwrap();
        assert_eq!(h.face, fb);
        assert_relative_eq!(h.uv.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(h.uv.y, 0.42, epsilon = 1e-6);
        let there = shell.surface(fb).evaluate(h.uv);
        assert!((there - h.point).norm() < 1e-3);
    }

    #[test]
    fn test_trimmed_free_edge() {
        let (shell, fa, _) = two_planes();
        let boundary = TrimmedBoundary::new(&shell, fa);
        let mut b = Point2::new(-0.05, 0.5);
        let out = boundary.clip(&Point2::new(0.05, 0.5), &mut b).unwrap();
        assert_eq!(out, ClipOutcome::Clipped(None));
        assert_relative_eq!(b.x, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_trimmed_interior_is_unclipped() {
        let (shell, fa, _) = two_planes();
        let boundary = TrimmedBoundary::new(&shell, fa);
        let mut b = Point2::new(0.6, 0.5);
        let out = boundary.clip(&Point2::new(0.5, 0.5), &mut b).unwrap();
        assert_eq!(out, ClipOutcome::Unclipped);
    }

    #[test]
    fn test_trimmed_start_on_boundary_stays_put() {
        let (shell, fa, _) = two_planes();
        let boundary = TrimmedBoundary::new(&shell, fa);
        let a = Point2::new(0.0, 0.5);
        let mut b = Point2::new(-0.01, 0.5);
        assert!(boundary.clip(&a, &mut b).unwrap().is_clipped());
        assert_eq!(b, a);
    }

    #[test]
    fn test_trimmed_hole() {
        let (mut shell, face) = Shell::from_rect(Box::new(Plane::xy()), (0.0, 1.0), (0.0, 1.0));
        let hole = shell.add_inner_loop(face);
        shell.add_trim(hole, Box::new(Circle2d::new(Point2::new(0.5, 0.5), 0.2)));
        let boundary = TrimmedBoundary::new(&shell, face);
        let mut b = Point2::new(0.35, 0.5);
        let out = boundary.clip(&Point2::new(0.25, 0.5), &mut b).unwrap();
        assert_eq!(out, ClipOutcome::Clipped(None));
        assert_relative_eq!(b.x, 0.3, epsilon = 1e-9);
    }

    #[test]
    fn test_trimming_failed_on_open_loop() {
        let mut shell = Shell::new();
        let face = shell.add_face(Box::new(Plane::xy()));
        let outer = shell.faces[face].outer_loop;
        shell.add_trim(
            outer,
            Box::new(Line2d::from_points(Point2::new(0.0, 0.0), Point2::new(1.0, 0.0))),
        );
        let boundary = TrimmedBoundary::new(&shell, face);
        let mut b = Point2::new(0.6, 0.5);
        let r = boundary.clip(&Point2::new(0.5, 0.5), &mut b);
        assert!(matches!(r, Err(TraceError::TrimmingFailed { .. })));
    }
}
