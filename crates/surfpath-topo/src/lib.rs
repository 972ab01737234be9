#![warn(missing_docs)]

//! Trimmed-face topology for surfpath.
//!
//! A [`Shell`] owns a [`GeometryStore`] and the slotmap-keyed entities that
//! bound regions of its surfaces: faces, loops, trims and edges. Each trim is
//! a parameter-space curve on one face; trims that lie on the same model edge
//! share an [`Edge`], which is how a trace finds the face on the other side
//! of a boundary.
//!
//! Trim curves are expected to follow their loop's direction (outer loops
//! counter-clockwise in parameter space), so sampled loops form closed
//! polygons for winding-number tests.

use slotmap::{new_key_type, SlotMap};
use surfpath_geom::{Curve2d, GeometryStore, Line2d, SegmentHit, Surface};
use surfpath_math::Point2;
use thiserror::Error;

new_key_type! {
    /// Handle to a trimmed face.
    pub struct FaceId;
    /// Handle to a boundary loop.
    pub struct LoopId;
    /// Handle to a trim (a loop's curve segment on one face).
    pub struct TrimId;
    /// Handle to a model edge shared by one or more trims.
    pub struct EdgeId;
}

/// Errors raised when a shell is structurally inconsistent.
#[derive(Debug, Error)]
pub enum TopoError {
    /// A face points at a surface index that is not in the geometry store.
    #[error("face {face:?} references missing surface {index}")]
    MissingSurface {
        /// Offending face.
        face: FaceId,
        /// Surface index it refers to.
        index: usize,
    },
    /// A trim points at a curve index that is not in the geometry store.
    #[error("trim {trim:?} references missing curve {index}")]
    MissingCurve {
        /// Offending trim.
        trim: TrimId,
        /// Curve index it refers to.
        index: usize,
    },
    /// A loop without trims.
    #[error("loop {0:?} has no trims")]
    EmptyLoop(LoopId),
}

/// Result type for topology operations.
pub type Result<T> = std::result::Result<T, TopoError>;

/// A bounded region of one surface.
#[derive(Debug, Clone)]
pub struct Face {
    /// Index into [`GeometryStore::surfaces`].
    pub surface_index: usize,
    /// Outer boundary.
    pub outer_loop: LoopId,
    /// Holes.
    pub inner_loops: Vec<LoopId>,
}

/// A closed chain of trims.
#[derive(Debug, Clone)]
pub struct Loop {
    /// Owning face.
    pub face: FaceId,
    /// Trims in loop order.
    pub trims: Vec<TrimId>,
}

/// A parameter-space boundary curve on one face.
#[derive(Debug, Clone)]
pub struct Trim {
    /// Index into [`GeometryStore::curves_2d`].
    pub curve_index: usize,
    /// Model edge this trim lies on.
    pub edge: EdgeId,
    /// Owning loop.
    pub loop_id: LoopId,
    /// Owning face.
    pub face: FaceId,
}

/// A model edge: every trim that runs along it, one per adjacent face use.
#[derive(Debug, Clone, Default)]
pub struct Edge {
    /// Trims sharing this edge.
    pub trims: Vec<TrimId>,
}

/// Where a parameter point lies relative to a face's trimmed region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointClass {
    /// Strictly inside.
    Inside,
    /// Within tolerance of a trim curve.
    Boundary,
    /// Outside the outer loop or inside a hole.
    Outside,
}

/// A crossing between a parameter-space segment and one trim.
#[derive(Debug, Clone, Copy)]
pub struct TrimHit {
    /// Trim that was crossed.
    pub trim: TrimId,
    /// Segment/curve intersection data.
    pub hit: SegmentHit,
}

/// A collection of trimmed faces with shared edges.
#[derive(Debug, Clone, Default)]
pub struct Shell {
    /// Surfaces and trim curves.
    pub geometry: GeometryStore,
    /// Faces.
    pub faces: SlotMap<FaceId, Face>,
    /// Loops.
    pub loops: SlotMap<LoopId, Loop>,
    /// Trims.
    pub trims: SlotMap<TrimId, Trim>,
    /// Edges.
    pub edges: SlotMap<EdgeId, Edge>,
}

impl Shell {
    /// Create an empty shell.
    pub fn new() -> Self {
        Self::default()
    }

    /// A one-face shell bounded by the rectangle `[u0,u1] x [v0,v1]`.
    pub fn from_rect(surface: Box<dyn Surface>, u: (f64, f64), v: (f64, f64)) -> (Self, FaceId) {
        let mut shell = Self::new();
        let (face, _) = shell.add_rect_face(surface, u, v);
        (shell, face)
    }

    /// Add a face whose outer loop is empty; fill it with [`Shell::add_trim`].
    pub fn add_face(&mut self, surface: Box<dyn Surface>) -> FaceId {
        let surface_index = self.geometry.add_surface(surface);
        let face = self.faces.insert(Face {
            surface_index,
            outer_loop: LoopId::default(),
            inner_loops: Vec::new(),
        });
        let outer = self.loops.insert(Loop {
            face,
            trims: Vec::new(),
        });
        self.faces[face].outer_loop = outer;
        face
    }

    /// Add a face bounded by a counter-clockwise parameter rectangle.
    ///
    /// Returns the face and its trims in the order `v = v0`, `u = u1`,
    /// `v = v1`, `u = u0`.
    pub fn add_rect_face(
        &mut self,
        surface: Box<dyn Surface>,
        u: (f64, f64),
        v: (f64, f64),
    ) -> (FaceId, [TrimId; 4]) {
        let face = self.add_face(surface);
        let outer = self.faces[face].outer_loop;
        let corners = [
            Point2::new(u.0, v.0),
            Point2::new(u.1, v.0),
            Point2::new(u.1, v.1),
            Point2::new(u.0, v.1),
        ];
        let mut trims = [TrimId::default(); 4];
        for (i, trim) in trims.iter_mut().enumerate() {
            let line = Line2d::from_points(corners[i], corners[(i + 1) % 4]);
            *trim = self.add_trim(outer, Box::new(line));
        }
        (face, trims)
    }

    /// Add an empty hole loop to `face`.
    pub fn add_inner_loop(&mut self, face: FaceId) -> LoopId {
        let lp = self.loops.insert(Loop {
            face,
            trims: Vec::new(),
        });
        self.faces[face].inner_loops.push(lp);
        lp
    }

    /// Append a trim curve to `loop_id` on a fresh edge of its own.
    pub fn add_trim(&mut self, loop_id: LoopId, curve: Box<dyn Curve2d>) -> TrimId {
        let curve_index = self.geometry.add_curve_2d(curve);
        let face = self.loops[loop_id].face;
        let edge = self.edges.insert(Edge::default());
        let trim = self.trims.insert(Trim {
            curve_index,
            edge,
            loop_id,
            face,
        });
        self.edges[edge].trims.push(trim);
        self.loops[loop_id].trims.push(trim);
        trim
    }

    /// Move `b` onto the edge of `a`, making the two trims siblings.
    pub fn share_edge(&mut self, a: TrimId, b: TrimId) {
        let target = self.trims[a].edge;
        let old = self.trims[b].edge;
        if old == target {
            return;
        }
        if let Some(edge) = self.edges.get_mut(old) {
            edge.trims.retain(|&t| t != b);
            if edge.trims.is_empty() {
                self.edges.remove(old);
            }
        }
        self.trims[b].edge = target;
        self.edges[target].trims.push(b);
    }

    /// Check that every index and loop in the shell is usable.
    pub fn validate(&self) -> Result<()> {
        for (face, f) in &self.faces {
            if f.surface_index >= self.geometry.surfaces.len() {
                return Err(TopoError::MissingSurface {
                    face,
                    index: f.surface_index,
                });
            }
        }
        for (lp, l) in &self.loops {
            if l.trims.is_empty() {
                return Err(TopoError::EmptyLoop(lp));
            }
        }
        for (trim, t) in &self.trims {
            if t.curve_index >= self.geometry.curves_2d.len() {
                return Err(TopoError::MissingCurve {
                    trim,
                    index: t.curve_index,
                });
            }
        }
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Surface carrying `face`.
    pub fn surface(&self, face: FaceId) -> &dyn Surface {
        self.geometry.surfaces[self.faces[face].surface_index].as_ref()
    }

    /// Trim curve of `trim`.
    pub fn curve(&self, trim: TrimId) -> &dyn Curve2d {
        self.geometry.curves_2d[self.trims[trim].curve_index].as_ref()
    }

    /// All loops of `face`, outer loop first.
    pub fn face_loops(&self, face: FaceId) -> impl Iterator<Item = LoopId> + '_ {
        let f = &self.faces[face];
        std::iter::once(f.outer_loop).chain(f.inner_loops.iter().copied())
    }

    /// All trims of `face` across every loop.
    pub fn face_trims(&self, face: FaceId) -> impl Iterator<Item = TrimId> + '_ {
        self.face_loops(face)
            .flat_map(move |lp| self.loops[lp].trims.iter().copied())
    }

    /// Number of trims on the edge under `trim` (1 for a free boundary).
    pub fn edge_trim_count(&self, trim: TrimId) -> usize {
        self.edges
            .get(self.trims[trim].edge)
            .map_or(1, |e| e.trims.len())
    }

    /// The first other trim on the same edge as `trim`.
    pub fn sibling_trim(&self, trim: TrimId) -> Option<TrimId> {
        self.edges
            .get(self.trims[trim].edge)?
            .trims
            .iter()
            .copied()
            .find(|&t| t != trim)
    }

    /// Face on the other side of `trim`, if any.
    pub fn adjacent_face(&self, trim: TrimId) -> Option<FaceId> {
        self.sibling_trim(trim).map(|t| self.trims[t].face)
    }

    /// Sample a loop into a closed polygon (last vertex not repeated).
    pub fn loop_polygon(&self, loop_id: LoopId) -> Vec<Point2> {
        let mut poly = Vec::new();
        for &trim in &self.loops[loop_id].trims {
            let curve = self.curve(trim);
            let pts = curve.sample(curve.suggested_segments() * 4);
            let n = pts.len().saturating_sub(1);
            poly.extend(pts.into_iter().take(n));
        }
        poly
    }

    /// Distance from `uv` to the nearest trim of `face`, with that trim.
    pub fn nearest_trim(&self, face: FaceId, uv: &Point2) -> Option<(TrimId, f64)> {
        self.face_trims(face)
            .map(|trim| {
                let curve = self.curve(trim);
                let t = curve.closest_param(uv);
                (trim, (curve.evaluate(t) - uv).norm())
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Classify `uv` against the trimmed region of `face`.
    pub fn classify(&self, face: FaceId, uv: &Point2, tol: f64) -> PointClass {
        if let Some((_, d)) = self.nearest_trim(face, uv) {
            if d <= tol {
                return PointClass::Boundary;
            }
        }
        let f = &self.faces[face];
        if !point_in_polygon(uv, &self.loop_polygon(f.outer_loop)) {
            return PointClass::Outside;
        }
        for &hole in &f.inner_loops {
            if point_in_polygon(uv, &self.loop_polygon(hole)) {
                return PointClass::Outside;
            }
        }
        PointClass::Inside
    }

    /// Crossings of the segment `a → b` with every trim of `face`.
    pub fn intersect_trims(&self, face: FaceId, a: &Point2, b: &Point2, tol: f64) -> Vec<TrimHit> {
        self.face_trims(face)
            .flat_map(|trim| {
                self.curve(trim)
                    .intersect_segment(a, b, tol)
                    .into_iter()
                    .map(move |hit| TrimHit { trim, hit })
            })
            .collect()
    }
}

/// Point-in-polygon test using the winding number algorithm.
///
/// Works correctly for both convex and concave polygons.
pub fn point_in_polygon(point: &Point2, polygon: &[Point2]) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    let mut winding = 0i32;
    let n = polygon.len();

    for i in 0..n {
        let p1 = polygon[i];
        let p2 = polygon[(i + 1) % n];

        if p1.y <= point.y {
            if p2.y > point.y && is_left(&p1, &p2, point) > 0.0 {
                winding += 1;
            }
        } else if p2.y <= point.y && is_left(&p1, &p2, point) < 0.0 {
            winding -= 1;
        }
    }

    winding != 0
}

/// Positive if `p2` is to the left of the line `p0 → p1`.
#[inline]
fn is_left(p0: &Point2, p1: &Point2, p2: &Point2) -> f64 {
    (p1.x - p0.x) * (p2.y - p0.y) - (p2.x - p0.x) * (p1.y - p0.y)
}
