//! Error types for the tracer.

use surfpath_topo::TopoError;
use thiserror::Error;

/// Errors that can occur while evaluating fields or tracing paths.
///
/// `DegenerateMetric`, `ComplexEigenvalues`, `OutOfRange` and
/// `EvaluationFailed` are local outcomes: the direction-field layer turns them
/// into "no direction" and the current branch ends. `TrimmingFailed` aborts a
/// whole trace. The remaining variants are raised before tracing starts.
#[derive(Error, Debug)]
pub enum TraceError {
    /// The first fundamental form is singular.
    #[error("degenerate metric")]
    DegenerateMetric,

    /// The shape operator has a negative discriminant.
    #[error("complex eigenvalues")]
    ComplexEigenvalues,

    /// The requested curvature, torsion or stress ratio is not attainable here.
    #[error("target value out of range")]
    OutOfRange,

    /// A surface could not be evaluated at the sample point.
    #[error("surface evaluation failed at ({0}, {1})")]
    EvaluationFailed(f64, f64),

    /// No trim passes through a point that classification put on the boundary.
    #[error("trimming failed at ({u}, {v})")]
    TrimmingFailed {
        /// Parameter u of the offending point.
        u: f64,
        /// Parameter v of the offending point.
        v: f64,
    },

    /// Trace settings out of range.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// Material constants out of range.
    #[error("invalid material: {0}")]
    InvalidMaterial(String),

    /// Reference and actual surfaces do not share a parameter domain.
    #[error("reference and actual surface domains differ")]
    DomainMismatch,

    /// Stress paths were requested on a multi-face shell.
    #[error("stress paths support single-face shells only")]
    UnsupportedMultiPatch,

    /// The shell itself is inconsistent.
    #[error(transparent)]
    Topology(#[from] TopoError),
}

/// Result type for tracer operations.
pub type Result<T> = std::result::Result<T, TraceError>;
