//! Semi-analytic particle tracking over an unstructured mesh of polygonal
//! prisms: three interchangeable intra-cell solvers (a uniform-vector
//! fallback, Pollock's rectilinear exponential analytic method, and the
//! Waterloo conformal Taylor-series method), stitched across cells by a
//! tracker that handles cycles, well capture, reverse pass-through, and a
//! parallel centroidal ensemble release.

pub mod config;
pub mod domain;
pub mod error;
pub mod flux;
pub mod integrator;
pub mod particle;
pub mod prism;
pub mod solver_pollock;
pub mod solver_vector;
pub mod solver_waterloo;
pub mod tracker;
pub mod velocity_field;

pub use config::{Config, IntegratorKind, SolverKind};
pub use domain::Domain;
pub use error::{PtrackError, PtrackResult};
pub use flux::{FluxRecord, Well};
pub use particle::{ExitCode, Particle, Pathline};
pub use prism::Prism;
pub use tracker::{resolve_start, track, track_centroidal_ensemble, track_pass_through};
pub use velocity_field::{Direction, Solver};
