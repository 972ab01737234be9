//! Path tracing across one surface or a shell of trimmed faces.
//!
//! A trace starts with two opposite branches from the seed point (four with
//! [`Branch::Both`]). Each branch integrates its direction field with RK4 in
//! parameter space until it stalls, loses its direction, runs out of points or
//! reaches the boundary. Boundary crossings onto an adjacent face queue a new
//! segment there; queued segments run breadth-first and share one point
//! budget.

use std::collections::{HashMap, VecDeque};

use rayon::prelude::*;
use surfpath_geom::Surface;
use surfpath_math::{Point2, Point3, Vec2, Vec3};
use surfpath_topo::{FaceId, Shell};

use crate::boundary::{Boundary, ClipOutcome, Handoff, TrimmedBoundary, UntrimmedBoundary};
use crate::error::{Result, TraceError};
use crate::field::PathSpec;
use crate::settings::{Branch, TraceSettings};

/// Relative slack when comparing the parameter domains of a stress pair.
const DOMAIN_SLACK: f64 = 1e-9;

/// What is being traced.
#[derive(Debug, Clone, Copy)]
pub enum TraceTarget<'a> {
    /// A single patch clipped to a parameter rectangle.
    Untrimmed {
        /// Traced surface.
        surface: &'a dyn Surface,
        /// Clipping rectangle.
        domain: UntrimmedBoundary,
    },
    /// A trimmed face; traces may continue onto adjacent faces of the shell.
    Face {
        /// Shell holding the face.
        shell: &'a Shell,
        /// Seed face.
        face: FaceId,
    },
}

impl<'a> TraceTarget<'a> {
    /// A surface clipped to its whole parameter domain.
    pub fn surface(surface: &'a dyn Surface) -> Self {
        TraceTarget::Untrimmed {
            surface,
            domain: UntrimmedBoundary::from_surface(surface),
        }
    }

    /// A surface clipped to `[u0,u1] x [v0,v1]`.
    pub fn rect(surface: &'a dyn Surface, u: (f64, f64), v: (f64, f64)) -> Self {
        TraceTarget::Untrimmed {
            surface,
            domain: UntrimmedBoundary::new(u, v),
        }
    }

    /// A trimmed face of `shell`.
    pub fn face(shell: &'a Shell, face: FaceId) -> Self {
        TraceTarget::Face { shell, face }
    }

    fn seed_face(&self) -> Option<FaceId> {
        match self {
            TraceTarget::Untrimmed { .. } => None,
            TraceTarget::Face { face, .. } => Some(*face),
        }
    }

    fn surface_of(&self, face: Option<FaceId>) -> &'a dyn Surface {
        match *self {
            TraceTarget::Untrimmed { surface, .. } => surface,
            TraceTarget::Face { shell, face: seed } => shell.surface(face.unwrap_or(seed)),
        }
    }

    fn boundary_of(&self, face: Option<FaceId>, tolerance: f64) -> Boundary<'a> {
        match *self {
            TraceTarget::Untrimmed { domain, .. } => Boundary::Untrimmed(domain),
            TraceTarget::Face { shell, face: seed } => Boundary::Trimmed(
                TrimmedBoundary::new(shell, face.unwrap_or(seed))
                    .with_inversion_tolerance(tolerance),
            ),
        }
    }
}

/// How a segment ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The field had no direction anywhere in the RK4 stencil.
    NoDirection,
    /// A step made no geometric progress.
    Stalled,
    /// A boundary with no adjacent face was reached.
    Boundary,
    /// A shared edge was crossed and a segment was queued on the adjacent face.
    Handoff,
    /// A shared edge was crossed at an already recorded breakpoint.
    KnownBreakpoint,
    /// The point budget ran out.
    Budget,
}

/// One face-segment of a traced path.
#[derive(Debug, Clone)]
pub struct Trace {
    /// Face the segment lies on, `None` for untrimmed targets.
    pub face: Option<FaceId>,
    /// Parameter-space polyline.
    pub uv: Vec<Point2>,
    /// 3D polyline.
    pub points: Vec<Point3>,
    /// How the segment ended.
    pub termination: Termination,
    /// Crossing onto an adjacent face, when the segment ended on a shared edge.
    pub handoff: Option<Handoff>,
}

impl Trace {
    /// Number of points.
    pub fn len(&self) -> usize {
        self.uv.len()
    }

    /// Whether the segment has no points.
    pub fn is_empty(&self) -> bool {
        self.uv.is_empty()
    }

    /// Polyline length in model space.
    pub fn length(&self) -> f64 {
        self.points.windows(2).map(|w| (w[1] - w[0]).norm()).sum()
    }
}

/// An independent request for [`Pathfinder::create_many`].
#[derive(Debug, Clone)]
pub struct TraceRequest<'a> {
    /// Field to follow.
    pub spec: &'a PathSpec,
    /// Surface or face to trace on.
    pub target: TraceTarget<'a>,
    /// Seed parameter point.
    pub start: Point2,
    /// Integration settings.
    pub settings: TraceSettings,
}

/// Pending segment.
#[derive(Debug, Clone, Copy)]
struct Task {
    face: Option<FaceId>,
    uv: Point2,
    point: Point3,
    direction: Vec3,
}

/// Recorded crossing points, hashed on a grid with cell size `tolerance`.
#[derive(Debug, Clone)]
struct BreakpointIndex {
    cell: f64,
    cells: HashMap<(i64, i64, i64), Vec<Point3>>,
}

impl BreakpointIndex {
    fn new(tolerance: f64) -> Self {
        Self {
            cell: tolerance,
            cells: HashMap::new(),
        }
    }

    fn key(&self, p: &Point3) -> (i64, i64, i64) {
        (
            (p.x / self.cell).floor() as i64,
            (p.y / self.cell).floor() as i64,
            (p.z / self.cell).floor() as i64,
        )
    }

    /// Whether a recorded point lies within `tolerance` of `p`.
    fn contains(&self, p: &Point3) -> bool {
        let (x, y, z) = self.key(p);
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let near = self
                        .cells
                        .get(&(x + dx, y + dy, z + dz))
                        .is_some_and(|pts| pts.iter().any(|q| (q - p).norm() <= self.cell));
                    if near {
                        return true;
                    }
                }
            }
        }
        false
    }

    fn insert(&mut self, p: Point3) {
        self.cells.entry(self.key(&p)).or_default().push(p);
    }
}

/// Breadth-first tracer for one request.
#[derive(Debug)]
pub struct Pathfinder<'a> {
    spec: &'a PathSpec,
    target: TraceTarget<'a>,
    settings: &'a TraceSettings,
    breakpoints: BreakpointIndex,
    queue: VecDeque<Task>,
    remaining: usize,
}

impl<'a> Pathfinder<'a> {
    /// Trace `spec` on `target` from `start`.
    ///
    /// Returns the segments in discovery order: the seed branches first, then
    /// continuations on adjacent faces in queue order. Segments shorter than
    /// two points are dropped. Fails before tracing on invalid settings or
    /// inputs, and aborts with [`TraceError::TrimmingFailed`] when a face's
    /// trims do not account for a boundary crossing.
    pub fn create(
        spec: &'a PathSpec,
        target: TraceTarget<'a>,
        start: Point2,
        settings: &'a TraceSettings,
    ) -> Result<Vec<Trace>> {
        validate(spec, &target, settings)?;
        let mut finder = Pathfinder {
            spec,
            target,
            settings,
            breakpoints: BreakpointIndex::new(settings.tolerance),
            queue: VecDeque::new(),
            remaining: settings.max_points,
        };
        finder.seed(start);
        finder.run()
    }

    /// Run independent requests in parallel.
    pub fn create_many(requests: &[TraceRequest<'_>]) -> Vec<Result<Vec<Trace>>> {
        requests
            .par_iter()
            .map(|r| Pathfinder::create(r.spec, r.target, r.start, &r.settings))
            .collect()
    }

    fn seed(&mut self, start: Point2) {
        let face = self.target.seed_face();
        let surface = self.target.surface_of(face);
        let point = surface.evaluate(start);
        let branches: &[Branch] = match self.settings.branch {
            Branch::First => &[Branch::First],
            Branch::Second => &[Branch::Second],
            Branch::Both => &[Branch::First, Branch::Second],
        };
        for &branch in branches {
            let Some(d) = self.spec.initial_direction(surface, start, branch) else {
                continue;
            };
            for direction in [d, -d] {
                self.queue.push_back(Task {
                    face,
                    uv: start,
                    point,
                    direction,
                });
            }
        }
    }

    fn run(mut self) -> Result<Vec<Trace>> {
        let mut traces = Vec::new();
        while let Some(task) = self.queue.pop_front() {
            if self.remaining == 0 {
                log::debug!(
                    "point budget exhausted, dropping {} pending segments",
                    self.queue.len() + 1
                );
                break;
            }

            let mut trace = self.find_path(&task)?;
            if trace.len() < 2 {
                log::trace!("discarding degenerate segment at ({}, {})", task.uv.x, task.uv.y);
                continue;
            }
            self.remaining = self.remaining.saturating_sub(trace.len());

            if let Some(h) = trace.handoff {
                if self.breakpoints.contains(&h.point) {
                    log::debug!(
                        "crossing at ({:.6}, {:.6}, {:.6}) already visited",
                        h.point.x,
                        h.point.y,
                        h.point.z
                    );
                    trace.termination = Termination::KnownBreakpoint;
                } else {
                    self.breakpoints.insert(h.point);
                    let n = trace.points.len();
                    let surface = self.target.surface_of(Some(h.face));
                    self.queue.push_back(Task {
                        face: Some(h.face),
                        uv: h.uv,
                        point: surface.evaluate(h.uv),
                        direction: trace.points[n - 1] - trace.points[n - 2],
                    });
                }
            }
            traces.push(trace);
        }
        Ok(traces)
    }

    /// Trace one segment on the task's face.
    fn find_path(&self, task: &Task) -> Result<Trace> {
        let surface = self.target.surface_of(task.face);
        let boundary = self.target.boundary_of(task.face, self.settings.tolerance);
        let tol2 = self.settings.tolerance * self.settings.tolerance;

        log::debug!(
            "segment start at ({}, {}), budget {}",
            task.uv.x,
            task.uv.y,
            self.remaining
        );

        let mut uv = vec![task.uv];
        let mut points = vec![task.point];
        let mut direction = task.direction;
        let mut handoff = None;

        let termination = loop {
            if uv.len() >= self.remaining {
                break Termination::Budget;
            }
            let current = uv[uv.len() - 1];
            let step = self.rk4_step(surface, current, &direction);
            if step == Vec2::zeros() {
                break Termination::NoDirection;
            }

            let mut next = current + step;
            let outcome = boundary.clip(&current, &mut next)?;
            let point = surface.evaluate(next);
            let displacement = point - points[points.len() - 1];
            if displacement.norm_squared() < tol2 {
                break Termination::Stalled;
            }

            uv.push(next);
            points.push(point);
            direction = displacement;

            match outcome {
                ClipOutcome::Unclipped => {}
                ClipOutcome::Clipped(None) => break Termination::Boundary,
                ClipOutcome::Clipped(Some(h)) => {
                    handoff = Some(h);
                    break Termination::Handoff;
                }
            }
        };

        log::debug!("segment finished: {:?} after {} points", termination, uv.len());
        Ok(Trace {
            face: task.face,
            uv,
            points,
            termination,
            handoff,
        })
    }

    /// Classical RK4 in parameter space, every stage signed against `last`.
    fn rk4_step(&self, surface: &dyn Surface, uv: Point2, last: &Vec3) -> Vec2 {
        let h = self.settings.step_size;
        let k = |p: Point2| {
            self.spec
                .direction(surface, p, last, h)
                .unwrap_or_else(Vec2::zeros)
        };
        let k1 = k(uv);
        let k2 = k(uv + k1 * 0.5);
        let k3 = k(uv + k2 * 0.5);
        let k4 = k(uv + k3);
        (k1 + 2.0 * k2 + 2.0 * k3 + k4) / 6.0
    }
}

fn validate(spec: &PathSpec, target: &TraceTarget<'_>, settings: &TraceSettings) -> Result<()> {
    settings.validate()?;
    if let TraceTarget::Face { shell, .. } = target {
        shell.validate()?;
    }
    if let Some((reference, material)) = spec.kind.stress_inputs() {
        material.validate()?;
        if let TraceTarget::Face { shell, .. } = target {
            if shell.faces.len() > 1 {
                return Err(TraceError::UnsupportedMultiPatch);
            }
        }
        let actual = target.surface_of(target.seed_face());
        if !same_domain(reference, actual) {
            return Err(TraceError::DomainMismatch);
        }
    }
    Ok(())
}

fn same_domain(a: &dyn Surface, b: &dyn Surface) -> bool {
    let ((au0, au1), (av0, av1)) = a.domain();
    let ((bu0, bu1), (bv0, bv1)) = b.domain();
    [(au0, bu0), (au1, bu1), (av0, bv0), (av1, bv1)]
        .iter()
        .all(|&(x, y)| (x - y).abs() <= DOMAIN_SLACK * (1.0 + x.abs().max(y.abs())))
}
