//! Common interface shared by the three intra-cell solvers, and the enum
//! that dispatches between them.

use crate::solver_pollock::PollockSolver;
use crate::solver_vector::VectorSolver;
use crate::solver_waterloo::WaterlooSolver;

/// Which way time runs. Threaded explicitly through every velocity
/// evaluation rather than flipping a sign stored on the field itself, so a
/// `&Domain` can be shared across concurrent trackers without any of them
/// observing another's reversal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    pub fn sign(self) -> f64 {
        match self {
            Direction::Forward => 1.0,
            Direction::Reverse => -1.0,
        }
    }

    pub fn flip(self) -> Direction {
        match self {
            Direction::Forward => Direction::Reverse,
            Direction::Reverse => Direction::Forward,
        }
    }
}

/// A point at which a solver can be evaluated: seepage velocity components,
/// sign-adjusted for tracking direction.
pub trait VelocityField {
    /// `(vx, vy, vz)` at `(x, y, z)`, already scaled by `dir`.
    fn velocity(&self, x: f64, y: f64, z: f64, dir: Direction) -> (f64, f64, f64);

    /// Local-coordinate radius of `(x, y, z)` relative to the cell's
    /// interior, used by an adaptive integrator's extrapolation guard.
    /// `0.0` at the centroid; solvers with no natural local coordinate
    /// (vector, Pollock) report `0.0` everywhere and never reject a step.
    fn local(&self, x: f64, y: f64, z: f64) -> f64 {
        let _ = (x, y, z);
        0.0
    }
}

/// Exit point reached by an analytic intra-cell solver: position, elapsed
/// time from the step start, and which lateral face (if any) was crossed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExitEvent {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub dt: f64,
    pub face: Option<usize>,
}

/// The intra-cell solver chosen for a domain, as static dispatch rather than
/// a trait object: the three variants have different exit-computation
/// signatures and a `match` at the tracker call site is both cheaper and
/// clearer than boxing.
#[derive(Clone, Debug)]
pub enum Solver {
    Vector(VectorSolver),
    Pollock(PollockSolver),
    Waterloo(WaterlooSolver),
}

impl VelocityField for Solver {
    fn velocity(&self, x: f64, y: f64, z: f64, dir: Direction) -> (f64, f64, f64) {
        match self {
            Solver::Vector(s) => s.velocity(x, y, z, dir),
            Solver::Pollock(s) => s.velocity(x, y, z, dir),
            Solver::Waterloo(s) => s.velocity(x, y, z, dir),
        }
    }

    fn local(&self, x: f64, y: f64, z: f64) -> f64 {
        match self {
            Solver::Vector(s) => s.local(x, y, z),
            Solver::Pollock(s) => s.local(x, y, z),
            Solver::Waterloo(s) => s.local(x, y, z),
        }
    }
}

impl Solver {
    pub fn name(&self) -> &'static str {
        match self {
            Solver::Vector(_) => "vector",
            Solver::Pollock(_) => "pollock",
            Solver::Waterloo(_) => "waterloo",
        }
    }
}
