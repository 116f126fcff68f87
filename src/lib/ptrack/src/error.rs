//! Construction and start-point error kinds.
//!
//! Numerical degeneracies encountered *during* tracking (a NaN snapshot, an
//! unbounded exit time on every axis, a stalled adaptive step) are not
//! represented here — they terminate the affected pathline with an
//! [`crate::particle::ExitCode`], not a `Result::Err`, so one bad release in
//! an ensemble never aborts the others.

use thiserror::Error;

/// Errors raised while building a [`crate::prism::Prism`], a
/// [`crate::flux::FluxRecord`], a [`crate::domain::Domain`], or while
/// resolving a particle's starting cell.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PtrackError {
    #[error("prism has {0} vertices; at least 3 are required")]
    DegenerateCell(usize),

    #[error("vertex order error: polygon must be given clockwise (signed area {0} <= 0)")]
    CounterClockwisePolygon(f64),

    #[error("bottom elevation ({bot}) must be less than top elevation ({top})")]
    InvalidElevation { top: f64, bot: f64 },

    #[error("porosity {0} is out of range (0, 1]")]
    InvalidPorosity(f64),

    #[error("cell mass-balance error {imbalance:.3e} exceeds tolerance {tolerance:.3e}")]
    MassImbalance { imbalance: f64, tolerance: f64 },

    #[error("pollock solver requires exactly 4 vertices, got {0}")]
    NotRectilinear(usize),

    #[error("waterloo control-point constraint violated: m={m} < 2n={n2}")]
    InsufficientControlPoints { m: usize, n2: usize },

    #[error("well flux is nonzero but no well coordinate was supplied")]
    MissingWellCoordinate,

    #[error("ill-formed connectivity: {0}")]
    InvalidConnectivity(String),

    #[error("particle start point ({x}, {y}, {z}) lies outside every prism in the domain")]
    NoHostCell { x: f64, y: f64, z: f64 },

    #[error(
        "particle start point lies on a shared boundary between {0} candidate cells and could not be disambiguated"
    )]
    AmbiguousStart(usize),

    #[error("unknown prism id {0}")]
    UnknownPrism(i64),
}

pub type PtrackResult<T> = Result<T, PtrackError>;
