#![warn(missing_docs)]

//! Path tracing on parametric surfaces and trimmed shells.
//!
//! Traces follow a direction field across a surface: principal curvature
//! lines, lines of constant normal curvature or geodesic torsion, and
//! principal stress trajectories between a reference and a deformed surface.
//! Paths are integrated with RK4 in parameter space, clipped at face
//! boundaries and continued across shared edges.
//!
//! # Example
//!
//! ```
//! use surfpath::{Pathfinder, PathKind, PathSpec, TraceSettings, TraceTarget};
//! use surfpath_geom::TorusSurface;
//! use surfpath_math::Point2;
//!
//! let torus = TorusSurface::new(3.0, 1.0);
//! let spec = PathSpec::new(PathKind::PrincipalCurvature);
//! let settings = TraceSettings::default();
//! let traces = Pathfinder::create(
//!     &spec,
//!     TraceTarget::rect(&torus, (0.0, 1.0), (0.0, 1.0)),
//!     Point2::new(0.5, 0.5),
//!     &settings,
//! )
//! .unwrap();
//! assert_eq!(traces.len(), 2);
//! ```

pub mod boundary;
pub mod curve_on_surface;
pub mod differential;
pub mod error;
pub mod field;
pub mod pathfinder;
pub mod settings;
pub mod stress;
pub mod tensor;

pub use boundary::{Boundary, ClipOutcome, Handoff, TrimmedBoundary, UntrimmedBoundary};
pub use curve_on_surface::{CurveOnSurface, Inversion, Tessellation};
pub use differential::SurfaceSample;
pub use error::{Result, TraceError};
pub use field::{choose, choose_index, FieldSample, PathKind, PathSpec};
pub use pathfinder::{Pathfinder, Termination, Trace, TraceRequest, TraceTarget};
pub use settings::{Branch, Material, TraceSettings};
pub use stress::StressSample;
pub use tensor::Sym2;
