//! Pollock's (MODPATH) rectilinear exponential analytic solver: velocity
//! varies linearly across each axis of a rectangular cell, which integrates
//! to a closed-form exit time. Ported from the case analysis in the Go
//! source's `PollockMethod.go`.

use crate::error::{PtrackError, PtrackResult};
use crate::flux::{FluxRecord, PollockFaceVelocities};
use crate::particle::Particle;
use crate::prism::Prism;
use crate::velocity_field::{Direction, ExitEvent, VelocityField};

const EPS: f64 = 1e-12;

#[derive(Clone, Copy, Debug, PartialEq)]
enum AxisFace {
    Low,
    High,
}

#[derive(Clone, Debug)]
pub struct PollockSolver {
    v: PollockFaceVelocities,
    xmin: f64,
    ymin: f64,
    dx: f64,
    dy: f64,
    dz: f64,
    bot: f64,
}

impl PollockSolver {
    pub fn from_flux(prism: &Prism, flux: &FluxRecord, porosity: f64) -> PtrackResult<Self> {
        if prism.nfaces() != 4 {
            return Err(PtrackError::NotRectilinear(prism.nfaces()));
        }
        let v = flux.pollock_face_velocities(prism, porosity)?;
        let (xmin, xmax, ymin, ymax) = prism.extents_xy();
        Ok(PollockSolver {
            v,
            xmin,
            ymin,
            dx: xmax - xmin,
            dy: ymax - ymin,
            dz: prism.top - prism.bot,
            bot: prism.bot,
        })
    }

    fn local(&self, x: f64, y: f64, z: f64) -> (f64, f64, f64) {
        (x - self.xmin, y - self.ymin, z - self.bot)
    }

    /// The intra-cell exit point, elapsed time, and crossed face, starting
    /// at `(x, y, z)` and tracking in direction `dir`. A pathline with no
    /// exit on any axis (an interior stagnation/flow-divide point) reports
    /// `dt = f64::INFINITY`, `face = None`.
    pub fn exit(&self, x: f64, y: f64, z: f64, dir: Direction) -> ExitEvent {
        let s = dir.sign();
        let (sx, sy, sz) = self.local(x, y, z);

        let cx = axis_exit(self.v.vx0 * s, self.v.vx1 * s, sx, self.dx);
        let cy = axis_exit(self.v.vy0 * s, self.v.vy1 * s, sy, self.dy);
        let cz = axis_exit(self.v.vz0 * s, self.v.vz1 * s, sz, self.dz);

        let mut best_dt = f64::INFINITY;
        let mut best_axis: Option<(usize, AxisFace)> = None;
        for (axis, c) in [(0usize, cx), (1, cy), (2, cz)] {
            if let Some((t, face)) = c {
                if t < best_dt {
                    best_dt = t;
                    best_axis = Some((axis, face));
                }
            }
        }

        let Some((axis, face)) = best_axis else {
            return ExitEvent { x, y, z, dt: f64::INFINITY, face: None };
        };

        // Nudge just past the face so the particle lands in the neighbor
        // cell rather than exactly on the shared boundary.
        best_dt *= 1.00001;

        let nsx = axis_position(best_dt, self.v.vx0 * s, self.v.vx1 * s, sx, self.dx);
        let nsy = axis_position(best_dt, self.v.vy0 * s, self.v.vy1 * s, sy, self.dy);
        let nsz = axis_position(best_dt, self.v.vz0 * s, self.v.vz1 * s, sz, self.dz);

        let lateral_face = match (axis, face) {
            (0, AxisFace::Low) => Some(0),
            (0, AxisFace::High) => Some(2),
            (1, AxisFace::Low) => Some(3),
            (1, AxisFace::High) => Some(1),
            _ => None,
        };

        ExitEvent {
            x: self.xmin + nsx,
            y: self.ymin + nsy,
            z: self.bot + nsz,
            dt: best_dt,
            face: lateral_face,
        }
    }

    /// Exit point plus intermediate snapshots spaced `dt_step` apart en
    /// route, so a Pollock pathline has the same temporal resolution as an
    /// Euler one; the final entry is always the true exit.
    pub fn track_to_exit(&self, start: &Particle, dir: Direction, dt_step: f64) -> Vec<Particle> {
        let exit = self.exit(start.x, start.y, start.z, dir);
        if !exit.dt.is_finite() {
            return Vec::new();
        }

        let mut out = Vec::new();
        if dt_step > 0.0 {
            let mut elapsed = dt_step;
            while elapsed < exit.dt {
                let (sx, sy, sz) = self.local(start.x, start.y, start.z);
                let s = dir.sign();
                let x = self.xmin
                    + axis_position(elapsed, self.v.vx0 * s, self.v.vx1 * s, sx, self.dx);
                let y = self.ymin
                    + axis_position(elapsed, self.v.vy0 * s, self.v.vy1 * s, sy, self.dy);
                let z =
                    self.bot + axis_position(elapsed, self.v.vz0 * s, self.v.vz1 * s, sz, self.dz);
                out.push(Particle::new(
                    start.lineage_id,
                    start.cell,
                    x,
                    y,
                    z,
                    start.t + s * elapsed,
                ));
                elapsed += dt_step;
            }
        }
        out.push(Particle::new(
            start.lineage_id,
            start.cell,
            exit.x,
            exit.y,
            exit.z,
            start.t + dir.sign() * exit.dt,
        ));
        out
    }
}

impl VelocityField for PollockSolver {
    fn velocity(&self, x: f64, y: f64, z: f64, dir: Direction) -> (f64, f64, f64) {
        let s = dir.sign();
        let (sx, sy, sz) = self.local(x, y, z);
        let ax = (self.v.vx1 - self.v.vx0) / self.dx;
        let ay = (self.v.vy1 - self.v.vy0) / self.dy;
        let az = (self.v.vz1 - self.v.vz0) / self.dz;
        (
            s * (self.v.vx0 + ax * sx),
            s * (self.v.vy0 + ay * sy),
            s * (self.v.vz0 + az * sz),
        )
    }
}

/// Time to exit along one axis given the (already direction-signed) face
/// velocities `v0`/`v1`, the particle's local coordinate `pos` and the
/// axis's cell width `length`. `None` means this axis never drives an exit:
/// the particle is stagnant along it, or sits between a convergent pair of
/// faces (an interior flow divide).
fn axis_exit(v0: f64, v1: f64, pos: f64, length: f64) -> Option<(f64, AxisFace)> {
    if length <= 0.0 {
        return None;
    }
    let a = (v1 - v0) / length;
    let v = v0 + a * pos;

    if a.abs() < EPS {
        if v.abs() < EPS {
            return None;
        }
        return if v > 0.0 {
            Some(((length - pos) / v, AxisFace::High))
        } else {
            Some(((0.0 - pos) / v, AxisFace::Low))
        };
    }

    if v0 >= 0.0 && v1 >= 0.0 {
        if v <= EPS {
            return None;
        }
        return Some(((v1 / v).ln() / a, AxisFace::High));
    }
    if v0 <= 0.0 && v1 <= 0.0 {
        if v >= -EPS {
            return None;
        }
        return Some(((v0 / v).ln() / a, AxisFace::Low));
    }
    if v0 > 0.0 && v1 < 0.0 {
        // Convergent: an interior stagnation point, the flow-divide case.
        return None;
    }
    // v0 < 0.0 && v1 > 0.0: divergent.
    if v.abs() < EPS {
        return None;
    }
    if v > 0.0 {
        Some(((v1 / v).ln() / a, AxisFace::High))
    } else {
        Some(((v0 / v).ln() / a, AxisFace::Low))
    }
}

/// Local-coordinate position along one axis after elapsed time `t`.
fn axis_position(t: f64, v0: f64, v1: f64, pos: f64, length: f64) -> f64 {
    let a = (v1 - v0) / length;
    if a.abs() < EPS {
        return pos + v0 * t;
    }
    let v = v0 + a * pos;
    (v * (a * t).exp() - v0) / a
}
