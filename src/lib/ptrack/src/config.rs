//! Tunable knobs shared across a [`crate::domain::Domain`] and its
//! [`crate::tracker`] functions.

use serde::{Deserialize, Serialize};

/// Choice of intra-cell [`crate::velocity_field::Solver`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverKind {
    Waterloo,
    Pollock,
    Vector,
}

/// Choice of [`crate::integrator::Integrator`] used for solvers that track
/// by repeated stepping (Waterloo; Pollock and Vector have their own
/// analytic exit and ignore this field).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegratorKind {
    EulerTime,
    EulerSpace,
    RungeKutta,
    RungeKuttaAdaptive,
}

/// Global configuration, threaded immutably into [`crate::domain::Domain`]
/// construction and every [`crate::tracker`] pass.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub solver: SolverKind,
    pub integrator: IntegratorKind,

    /// Base time step [integrator: EulerTime, RungeKutta].
    pub dt: f64,
    /// Target per-step displacement [integrator: EulerSpace, RungeKuttaAdaptive].
    pub ds: f64,
    /// Optional upper bound on the adaptive time step.
    pub dt_max: Option<f64>,

    /// Waterloo control-point count. Constraint: `m >= 2 * n`.
    pub m: usize,
    /// Waterloo Taylor series order.
    pub n: usize,

    /// Porosity used when a mesh adapter does not supply one.
    pub default_porosity: f64,
    /// Boundary-inclusive tolerance for `Prism::contains_xy`.
    pub tol: f64,
    /// Local well-capture radius (Waterloo local coordinates).
    pub well_tol: f64,
    /// Local-extrapolation guard: `local()` must report `r <= rmax` for a
    /// Runge-Kutta trial step to be accepted.
    pub rmax: f64,
    /// Per-cell mass-balance tolerance, relative to gross lateral inflow.
    /// Violation is fatal at `Domain` construction.
    pub mingtzero: f64,

    /// Cross-cell cycle check: how many appended snapshots between each
    /// positional tight-cycle scan.
    pub ncheck: usize,
    /// Rounding precision (in planform units) applied to the last `ncheck`
    /// xy positions before counting distinct values.
    pub prcsn: f64,
    /// Minimum count of distinct rounded positions among the last `ncheck`
    /// snapshots; fewer than this is a tight cycle.
    pub xuniq: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            solver: SolverKind::Waterloo,
            integrator: IntegratorKind::RungeKuttaAdaptive,
            dt: 1.0,
            ds: 1.0,
            dt_max: None,
            m: 80,
            n: 30,
            default_porosity: 0.3,
            tol: 1e-10,
            well_tol: 0.1,
            rmax: 1.5,
            mingtzero: 1e-8,
            ncheck: 100,
            prcsn: 0.01,
            xuniq: 10,
        }
    }
}
