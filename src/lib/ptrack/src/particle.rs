//! Tracked points and the pathlines they trace out.

use serde::{Deserialize, Serialize};

/// A single tracer particle at one instant: lineage, current host cell, and
/// position/time. Mutated only by an [`crate::integrator::Integrator`] step
/// or the tracker's cell-handoff logic.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub lineage_id: u64,
    /// Current host prism id, or -1 before the start cell has been resolved.
    pub cell: i64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub t: f64,
}

impl Particle {
    pub fn new(lineage_id: u64, cell: i64, x: f64, y: f64, z: f64, t: f64) -> Self {
        Particle { lineage_id, cell, x, y, z, t }
    }

    /// `[x, y, z, t]`, mirroring the Go source's `Particle.State()`.
    pub fn state(&self) -> [f64; 4] {
        [self.x, self.y, self.z, self.t]
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite() && self.t.is_finite()
    }

    /// Euclidean distance between two particle positions (time excluded).
    pub fn dist(&self, other: &Particle) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2) + (self.z - other.z).powi(2))
            .sqrt()
    }
}

/// Terminal condition of a pathline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ExitCode {
    ExitedDomain,
    ExitedWell,
    StalledInCell,
    CycleTwoCell,
    CycleTight,
    DryCell,
    BoundaryCell,
    Error(String),
}

/// An ordered sequence of particle snapshots emitted by a single release.
/// Monotonically non-decreasing in `t` while tracking forward, non-increasing
/// while tracking in reverse.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Pathline {
    pub lineage_id: u64,
    pub snapshots: Vec<Particle>,
    pub terminus: ExitCode,
}

impl Pathline {
    pub fn origin(&self) -> Option<&Particle> {
        self.snapshots.first()
    }

    pub fn destination(&self) -> Option<&Particle> {
        self.snapshots.last()
    }

    /// Drops any snapshot containing a NaN component, preserving order.
    pub fn sanitize(&mut self) {
        self.snapshots.retain(|p| p.is_finite());
    }
}
