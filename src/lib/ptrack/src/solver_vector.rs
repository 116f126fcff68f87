//! Uniform-vector fallback solver: a single constant velocity fitted to a
//! cell's face fluxes, with a straight-line geometric exit. The simplest of
//! the three solvers, in the manner of the Go source's `VectorFieldMethod.go`.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

use crate::error::PtrackResult;
use crate::flux::FluxRecord;
use crate::prism::Prism;
use crate::velocity_field::{Direction, ExitEvent, VelocityField};

#[derive(Clone, Debug)]
pub struct VectorSolver {
    vx: f64,
    vy: f64,
    vz: f64,
    vertices: Vec<Complex64>,
    bot: f64,
    top: f64,
}

impl VelocityField for VectorSolver {
    fn velocity(&self, _x: f64, _y: f64, _z: f64, dir: Direction) -> (f64, f64, f64) {
        let s = dir.sign();
        (self.vx * s, self.vy * s, self.vz * s)
    }
}

impl VectorSolver {
    /// Least-squares fit of a single `(vx, vy)` to every lateral face's
    /// outward flux (inflow-positive fluxes negated), plus a vertical
    /// velocity from the bottom/top terms divided by planform area.
    pub fn from_flux(prism: &Prism, flux: &FluxRecord, porosity: f64) -> PtrackResult<Self> {
        let n = prism.nfaces();
        let verts = prism.vertices();
        let mut a = DMatrix::<f64>::zeros(n, 2);
        let mut b = DVector::<f64>::zeros(n);

        for i in 0..n {
            let j = (i + 1) % n;
            let (p0, p1) = (verts[i], verts[j]);
            let edge = p1 - p0;
            let len = (edge.re.powi(2) + edge.im.powi(2)).sqrt();
            // outward normal for a clockwise polygon: rotate the edge vector
            // by -90 degrees.
            let (nx, ny) = if len > 0.0 {
                (edge.im / len, -edge.re / len)
            } else {
                (0.0, 0.0)
            };
            a[(i, 0)] = nx * len;
            a[(i, 1)] = ny * len;
            // outward flux = -inflow
            b[i] = -flux.lateral[i];
        }

        let svd = a.svd(true, true);
        let v = svd
            .solve(&b, 1e-10)
            .unwrap_or_else(|_| DVector::from_element(2, 0.0));

        let area = prism.area();
        let vz = if area > 0.0 {
            (flux.bottom - flux.top) / (2.0 * area)
        } else {
            0.0
        };

        Ok(VectorSolver {
            vx: v[0] / porosity,
            vy: v[1] / porosity,
            vz: vz / porosity,
            vertices: verts.to_vec(),
            bot: prism.bot,
            top: prism.top,
        })
    }

    /// Straight-line intersection of the particle's ray with the cell
    /// boundary, returning the closest positive-time hit.
    pub fn exit(&self, x: f64, y: f64, z: f64, dir: Direction) -> ExitEvent {
        let (vx, vy, vz) = self.velocity(x, y, z, dir);

        let mut best_dt = f64::INFINITY;
        let mut best = ExitEvent { x, y, z, dt: f64::INFINITY, face: None };

        let n = self.vertices.len();
        for i in 0..n {
            let j = (i + 1) % n;
            if let Some((t, ex, ey)) = ray_segment_intersection(x, y, vx, vy, self.vertices[i], self.vertices[j]) {
                if t > 0.0 && t < best_dt {
                    best_dt = t;
                    best = ExitEvent { x: ex, y: ey, z: z + vz * t, dt: t, face: Some(i) };
                }
            }
        }

        if vz > 0.0 {
            let t = (self.top - z) / vz;
            if t > 0.0 && t < best_dt {
                best_dt = t;
                best = ExitEvent { x: x + vx * t, y: y + vy * t, z: self.top, dt: t, face: None };
            }
        } else if vz < 0.0 {
            let t = (self.bot - z) / vz;
            if t > 0.0 && t < best_dt {
                best_dt = t;
                best = ExitEvent { x: x + vx * t, y: y + vy * t, z: self.bot, dt: t, face: None };
            }
        }

        best
    }
}

/// Intersection of the ray `(x, y) + t*(vx, vy)`, `t > 0`, with segment
/// `[a, b]`. Returns `None` if parallel or the hit falls outside `[0, 1]`
/// along the segment.
fn ray_segment_intersection(
    x: f64,
    y: f64,
    vx: f64,
    vy: f64,
    a: Complex64,
    b: Complex64,
) -> Option<(f64, f64, f64)> {
    let (ex, ey) = (b.re - a.re, b.im - a.im);
    let denom = vx * ey - vy * ex;
    if denom.abs() < 1e-14 {
        return None;
    }
    let t = ((a.re - x) * ey - (a.im - y) * ex) / denom;
    let s = ((a.re - x) * vy - (a.im - y) * vx) / denom;
    if !(0.0..=1.0).contains(&s) {
        return None;
    }
    Some((t, x + vx * t, y + vy * t))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> Prism {
        let z = vec![
            Complex64::new(0.0, 0.0),
            Complex64::new(0.0, 1.0),
            Complex64::new(1.0, 1.0),
            Complex64::new(1.0, 0.0),
        ];
        Prism::new(z, 1.0, 0.0, 1.0, 0.0, 1.0).unwrap()
    }

    #[test]
    fn uniform_x_flow_exits_through_right_face() {
        let p = unit_square();
        let f = FluxRecord::new(vec![1.0, 0.0, -1.0, 0.0], 0.0, 0.0);
        let solver = VectorSolver::from_flux(&p, &f, 1.0).unwrap();
        let exit = solver.exit(0.0, 0.5, 0.5, Direction::Forward);
        assert!((exit.x - 1.0).abs() < 1e-8);
        assert_eq!(exit.face, Some(2));
    }

    #[test]
    fn reverse_direction_flips_exit_face() {
        let p = unit_square();
        let f = FluxRecord::new(vec![1.0, 0.0, -1.0, 0.0], 0.0, 0.0);
        let solver = VectorSolver::from_flux(&p, &f, 1.0).unwrap();
        let exit = solver.exit(1.0, 0.5, 0.5, Direction::Reverse);
        assert!((exit.x - 0.0).abs() < 1e-8);
        assert_eq!(exit.face, Some(0));
    }
}
