//! Fixed- and adaptive-step integrators used to advance a particle through
//! a velocity field one step at a time, in the manner of the Go source's
//! `Euler.go` and `RungeKutta.go`. Only the Waterloo solver needs repeated
//! stepping — Pollock and the vector solver have closed-form intra-cell
//! exits and never touch this module.

use crate::config::Config;
use crate::velocity_field::{Direction, VelocityField};

/// The result of one integrator step: new position and the time actually
/// elapsed to reach it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Step {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub dt: f64,
}

pub trait Integrator {
    fn step<V: VelocityField>(
        &mut self,
        field: &V,
        x: f64,
        y: f64,
        z: f64,
        dir: Direction,
    ) -> Step;
}

/// Fixed time step.
#[derive(Clone, Copy, Debug)]
pub struct EulerTime {
    pub dt: f64,
}

impl Integrator for EulerTime {
    fn step<V: VelocityField>(&mut self, field: &V, x: f64, y: f64, z: f64, dir: Direction) -> Step {
        let (vx, vy, vz) = field.velocity(x, y, z, dir);
        Step { x: x + vx * self.dt, y: y + vy * self.dt, z: z + vz * self.dt, dt: self.dt }
    }
}

/// Fixed target displacement: `dt` is derived from the local speed each
/// step so consecutive snapshots are roughly `ds` apart.
#[derive(Clone, Copy, Debug)]
pub struct EulerSpace {
    pub ds: f64,
}

impl Integrator for EulerSpace {
    fn step<V: VelocityField>(&mut self, field: &V, x: f64, y: f64, z: f64, dir: Direction) -> Step {
        let (vx, vy, vz) = field.velocity(x, y, z, dir);
        let speed = (vx * vx + vy * vy + vz * vz).sqrt();
        let dt = if speed > 1e-14 { self.ds / speed } else { 0.0 };
        Step { x: x + vx * dt, y: y + vy * dt, z: z + vz * dt, dt }
    }
}

/// Classical fourth-order Runge-Kutta, fixed time step.
#[derive(Clone, Copy, Debug)]
pub struct RungeKutta {
    pub dt: f64,
}

impl Integrator for RungeKutta {
    fn step<V: VelocityField>(&mut self, field: &V, x: f64, y: f64, z: f64, dir: Direction) -> Step {
        let (nx, ny, nz) = rk4_step(field, x, y, z, self.dt, dir);
        Step { x: nx, y: ny, z: nz, dt: self.dt }
    }
}

fn rk4_step<V: VelocityField>(
    field: &V,
    x: f64,
    y: f64,
    z: f64,
    dt: f64,
    dir: Direction,
) -> (f64, f64, f64) {
    let (k1x, k1y, k1z) = field.velocity(x, y, z, dir);
    let (k2x, k2y, k2z) = field.velocity(
        x + 0.5 * dt * k1x,
        y + 0.5 * dt * k1y,
        z + 0.5 * dt * k1z,
        dir,
    );
    let (k3x, k3y, k3z) = field.velocity(
        x + 0.5 * dt * k2x,
        y + 0.5 * dt * k2y,
        z + 0.5 * dt * k2z,
        dir,
    );
    let (k4x, k4y, k4z) = field.velocity(x + dt * k3x, y + dt * k3y, z + dt * k3z, dir);
    (
        x + dt / 6.0 * (k1x + 2.0 * k2x + 2.0 * k3x + k4x),
        y + dt / 6.0 * (k1y + 2.0 * k2y + 2.0 * k3y + k4y),
        z + dt / 6.0 * (k1z + 2.0 * k2z + 2.0 * k3z + k4z),
    )
}

/// RK4 with a double-evaluation step-halving error estimate: one trial
/// advances by a single step of `dt`, another by two successive steps of
/// `dt/2`; the two are compared, not averaged. A trial whose intermediate
/// points leave the solver's local-coordinate validity radius
/// (`VelocityField::local`) halves `dt` and retries. Otherwise the
/// coarse/fine discrepancy `d` drives a classic local-extrapolation
/// controller, `dt ← 0.9·dt·(ds/d)^0.2`, repeating the step while `d > ds`
/// and doubling `dt` outright when the two trials agree exactly.
#[derive(Clone, Copy, Debug)]
pub struct RungeKuttaAdaptive {
    pub ds: f64,
    pub dt_max: Option<f64>,
    pub rmax: f64,
    dt_hint: f64,
}

impl RungeKuttaAdaptive {
    pub fn new(ds: f64, dt_max: Option<f64>, rmax: f64) -> Self {
        RungeKuttaAdaptive { ds, dt_max, rmax, dt_hint: ds }
    }

    fn clamp_dt(&self, dt: f64) -> f64 {
        match self.dt_max {
            Some(dt_max) => dt.min(dt_max),
            None => dt,
        }
    }
}

const MAX_HALVINGS: usize = 24;

impl Integrator for RungeKuttaAdaptive {
    fn step<V: VelocityField>(&mut self, field: &V, x: f64, y: f64, z: f64, dir: Direction) -> Step {
        let mut dt = self.clamp_dt(self.dt_hint);

        for _ in 0..MAX_HALVINGS {
            let coarse = rk4_step(field, x, y, z, dt, dir);
            let half = 0.5 * dt;
            let mid = rk4_step(field, x, y, z, half, dir);
            let fine = rk4_step(field, mid.0, mid.1, mid.2, half, dir);

            let in_range = field.local(coarse.0, coarse.1, coarse.2) <= self.rmax
                && field.local(mid.0, mid.1, mid.2) <= self.rmax
                && field.local(fine.0, fine.1, fine.2) <= self.rmax;
            if !in_range {
                dt *= 0.5;
                continue;
            }

            let d = ((fine.0 - coarse.0).powi(2)
                + (fine.1 - coarse.1).powi(2)
                + (fine.2 - coarse.2).powi(2))
            .sqrt();

            if d == 0.0 {
                self.dt_hint = self.clamp_dt(dt * 2.0);
                return Step { x: fine.0, y: fine.1, z: fine.2, dt };
            }

            let next_dt = self.clamp_dt(0.9 * dt * (self.ds / d).powf(0.2));
            if d > self.ds {
                dt = next_dt;
                continue;
            }

            self.dt_hint = next_dt;
            return Step { x: fine.0, y: fine.1, z: fine.2, dt };
        }

        // Every retry still failed the validity radius or the displacement
        // target: accept the smallest fine trial rather than stalling.
        let half = 0.5 * dt;
        let mid = rk4_step(field, x, y, z, half, dir);
        let fine = rk4_step(field, mid.0, mid.1, mid.2, half, dir);
        self.dt_hint = dt;
        Step { x: fine.0, y: fine.1, z: fine.2, dt }
    }
}

/// Whichever of the four integrators a [`Config`] selects, as static
/// dispatch rather than a trait object.
#[derive(Clone, Copy, Debug)]
pub enum IntegratorImpl {
    EulerTime(EulerTime),
    EulerSpace(EulerSpace),
    RungeKutta(RungeKutta),
    RungeKuttaAdaptive(RungeKuttaAdaptive),
}

impl IntegratorImpl {
    pub fn from_config(config: &Config) -> Self {
        use crate::config::IntegratorKind;
        match config.integrator {
            IntegratorKind::EulerTime => IntegratorImpl::EulerTime(EulerTime { dt: config.dt }),
            IntegratorKind::EulerSpace => IntegratorImpl::EulerSpace(EulerSpace { ds: config.ds }),
            IntegratorKind::RungeKutta => IntegratorImpl::RungeKutta(RungeKutta { dt: config.dt }),
            IntegratorKind::RungeKuttaAdaptive => IntegratorImpl::RungeKuttaAdaptive(
                RungeKuttaAdaptive::new(config.ds, config.dt_max, config.rmax),
            ),
        }
    }
}

impl Integrator for IntegratorImpl {
    fn step<V: VelocityField>(
        &mut self,
        field: &V,
        x: f64,
        y: f64,
        z: f64,
        dir: Direction,
    ) -> Step {
        match self {
            IntegratorImpl::EulerTime(i) => i.step(field, x, y, z, dir),
            IntegratorImpl::EulerSpace(i) => i.step(field, x, y, z, dir),
            IntegratorImpl::RungeKutta(i) => i.step(field, x, y, z, dir),
            IntegratorImpl::RungeKuttaAdaptive(i) => i.step(field, x, y, z, dir),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Uniform;
    impl VelocityField for Uniform {
        fn velocity(&self, _x: f64, _y: f64, _z: f64, dir: Direction) -> (f64, f64, f64) {
            let s = dir.sign();
            (s * 1.0, 0.0, 0.0)
        }
    }

    #[test]
    fn euler_time_advances_linearly() {
        let mut it = EulerTime { dt: 2.0 };
        let step = it.step(&Uniform, 0.0, 0.0, 0.0, Direction::Forward);
        assert!((step.x - 2.0).abs() < 1e-12);
    }

    #[test]
    fn euler_space_targets_displacement() {
        let mut it = EulerSpace { ds: 0.5 };
        let step = it.step(&Uniform, 0.0, 0.0, 0.0, Direction::Forward);
        assert!((step.x - 0.5).abs() < 1e-9);
    }

    #[test]
    fn rk4_matches_closed_form_for_uniform_flow() {
        let mut it = RungeKutta { dt: 1.0 };
        let step = it.step(&Uniform, 0.0, 0.0, 0.0, Direction::Forward);
        assert!((step.x - 1.0).abs() < 1e-12);
    }

    #[test]
    fn reverse_direction_flips_sign() {
        let mut it = EulerTime { dt: 1.0 };
        let step = it.step(&Uniform, 0.0, 0.0, 0.0, Direction::Reverse);
        assert!(step.x < 0.0);
    }

    #[test]
    fn adaptive_advances_exactly_for_uniform_flow_and_grows_dt() {
        // RK4's coarse and fine trials are exact (and therefore identical)
        // for a field with no curvature, so d == 0 every call and dt_hint
        // doubles rather than settling to a fixed point.
        let mut it = RungeKuttaAdaptive::new(0.5, None, 1.5);
        let step1 = it.step(&Uniform, 0.0, 0.0, 0.0, Direction::Forward);
        assert!((step1.x - step1.dt).abs() < 1e-12);
        let step2 = it.step(&Uniform, step1.x, step1.y, step1.z, Direction::Forward);
        assert!(step2.dt > step1.dt);
    }

    #[test]
    fn adaptive_respects_dt_max() {
        let mut it = RungeKuttaAdaptive::new(0.5, Some(0.2), 1.5);
        let step = it.step(&Uniform, 0.0, 0.0, 0.0, Direction::Forward);
        assert!(step.dt <= 0.2 + 1e-12);
    }

    struct StallingNearCell;
    impl VelocityField for StallingNearCell {
        fn velocity(&self, _x: f64, _y: f64, _z: f64, dir: Direction) -> (f64, f64, f64) {
            (dir.sign(), 0.0, 0.0)
        }

        fn local(&self, x: f64, _y: f64, _z: f64) -> f64 {
            // Exceeds rmax past x = 0.3, forcing every halving attempt to
            // shrink dt until the trial lands inside the validity radius.
            x / 0.3
        }
    }

    #[test]
    fn adaptive_halves_dt_until_inside_the_validity_radius() {
        let mut it = RungeKuttaAdaptive::new(1.0, None, 1.0);
        let step = it.step(&StallingNearCell, 0.0, 0.0, 0.0, Direction::Forward);
        assert!(step.x <= 0.3 + 1e-9);
    }
}
