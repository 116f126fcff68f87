//! Waterloo conformal Taylor-series solver: the depth-averaged complex
//! seepage velocity `w(z) = vx - i*vy` is approximated by a truncated power
//! series fitted by least squares against `m` boundary control points,
//! following the Ramadhan (2015) method implemented in the Go source's
//! `WaterlooMethod.go`. Wells and vertical recharge are carried as known
//! closed-form terms rather than fitted, and only the residual lateral flux
//! drives the fit.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

use crate::error::{PtrackError, PtrackResult};
use crate::flux::{FluxRecord, Well};
use crate::prism::Prism;
use crate::velocity_field::{Direction, VelocityField};

#[derive(Clone, Debug)]
pub struct WaterlooSolver {
    /// Taylor coefficients of the fitted polynomial part of `w(z)`.
    coeffs: Vec<Complex64>,
    z0: Complex64,
    wells: Vec<(Complex64, f64)>,
    recharge_coeff: f64,
    vz0: f64,
    vz1: f64,
    bot: f64,
    dz: f64,
    max_radius: f64,

    // Retained for `perimeter_flux_error`.
    vertices: Vec<Complex64>,
    lateral_flux: Vec<f64>,
    porosity: f64,
    thickness: f64,
}

impl WaterlooSolver {
    pub fn from_flux(
        prism: &Prism,
        flux: &FluxRecord,
        wells: &[Well],
        porosity: f64,
        m: usize,
        n: usize,
    ) -> PtrackResult<Self> {
        if m < 2 * n {
            return Err(PtrackError::InsufficientControlPoints { m, n2: 2 * n });
        }

        let z0 = prism.centroid_xy();
        let thickness = prism.top - prism.bot;
        let area = prism.area();

        let well_terms: Vec<(Complex64, f64)> = wells
            .iter()
            .map(|w| {
                let strength = -w.q / (2.0 * std::f64::consts::PI * thickness * porosity);
                (Complex64::new(w.x, w.y), strength)
            })
            .collect();

        let recharge_coeff = if area > 0.0 {
            (flux.bottom + flux.top) / (2.0 * area * thickness * porosity)
        } else {
            0.0
        };

        let vertices = prism.vertices().to_vec();
        let points = control_points(&vertices, m);

        let mut a = DMatrix::<f64>::zeros(m, 2 * n);
        let mut b = DVector::<f64>::zeros(m);

        for (row, &(p, normal, edge)) in points.iter().enumerate() {
            let known = eval_well_and_recharge(&well_terms, recharge_coeff, z0, p);
            let known_vn = (known * normal).re;

            let edge_len = (vertices[(edge + 1) % vertices.len()] - vertices[edge]).norm();
            let target_per_length = if edge_len > 0.0 {
                -flux.lateral[edge] / (porosity * thickness * edge_len)
            } else {
                0.0
            };
            b[row] = target_per_length - known_vn;

            let dz_local = p - z0;
            let mut zp = Complex64::new(1.0, 0.0);
            for k in 0..n {
                let u = zp * normal;
                a[(row, 2 * k)] = u.re;
                a[(row, 2 * k + 1)] = -u.im;
                zp *= dz_local;
            }
        }

        let svd = a.svd(true, true);
        let x = svd
            .solve(&b, 1e-10)
            .unwrap_or_else(|_| DVector::from_element(2 * n, 0.0));

        let coeffs: Vec<Complex64> = (0..n).map(|k| Complex64::new(x[2 * k], x[2 * k + 1])).collect();

        let max_radius = vertices
            .iter()
            .map(|v| (v - z0).norm())
            .fold(0.0_f64, f64::max)
            .max(1e-12);

        let vz0 = flux.bottom / (porosity * area.max(1e-12));
        let vz1 = -flux.top / (porosity * area.max(1e-12));

        Ok(WaterlooSolver {
            coeffs,
            z0,
            wells: well_terms,
            recharge_coeff,
            vz0,
            vz1,
            bot: prism.bot,
            dz: thickness,
            max_radius,
            vertices,
            lateral_flux: flux.lateral.clone(),
            porosity,
            thickness,
        })
    }

    fn w_poly(&self, z: Complex64) -> Complex64 {
        let dz = z - self.z0;
        let mut w = Complex64::new(0.0, 0.0);
        let mut zp = Complex64::new(1.0, 0.0);
        for c in &self.coeffs {
            w += c * zp;
            zp *= dz;
        }
        w
    }

    fn w_total(&self, z: Complex64) -> Complex64 {
        self.w_poly(z) + eval_well_and_recharge(&self.wells, self.recharge_coeff, self.z0, z)
    }

    /// Average relative error between the fitted field's reconstructed
    /// perimeter flux (sampled at each edge's midpoint) and the flux this
    /// cell was fitted against.
    pub fn perimeter_flux_error(&self) -> f64 {
        let n = self.vertices.len();
        let mut errs = Vec::with_capacity(n);
        for i in 0..n {
            let j = (i + 1) % n;
            let (a, b) = (self.vertices[i], self.vertices[j]);
            let edge = b - a;
            let len = edge.norm();
            if len < 1e-14 {
                continue;
            }
            let normal = Complex64::new(edge.im / len, -edge.re / len);
            let mid = (a + b) * 0.5;
            let w = self.w_total(mid);
            let v_n = (w * normal).re;
            let reconstructed = -v_n * self.porosity * self.thickness * len;
            let target = self.lateral_flux[i];
            let denom = target.abs().max(1e-9);
            errs.push((reconstructed - target).abs() / denom);
        }
        if errs.is_empty() {
            0.0
        } else {
            errs.iter().sum::<f64>() / errs.len() as f64
        }
    }
}

impl VelocityField for WaterlooSolver {
    fn velocity(&self, x: f64, y: f64, z: f64, dir: Direction) -> (f64, f64, f64) {
        let w = self.w_total(Complex64::new(x, y));
        let zl = (z - self.bot) / self.dz.max(1e-12);
        let vz = self.vz0 + (self.vz1 - self.vz0) * zl;
        let s = dir.sign();
        (s * w.re, s * -w.im, s * vz)
    }

    fn local(&self, x: f64, y: f64, z: f64) -> f64 {
        let _ = z;
        (Complex64::new(x, y) - self.z0).norm() / self.max_radius
    }
}

fn eval_well_and_recharge(
    wells: &[(Complex64, f64)],
    recharge_coeff: f64,
    z0: Complex64,
    z: Complex64,
) -> Complex64 {
    let mut w = recharge_coeff * (z - z0).conj();
    for (zw, strength) in wells {
        let d = z - zw;
        if d.norm() > 1e-9 {
            w += strength / d;
        }
    }
    w
}

/// `m` points spaced at equal arc length around the perimeter (midpoints of
/// `m` equal-length segments), each with its edge's outward unit normal and
/// the index of the edge it falls on.
fn control_points(vertices: &[Complex64], m: usize) -> Vec<(Complex64, Complex64, usize)> {
    let n = vertices.len();
    let mut edge_len = vec![0.0; n];
    let mut total = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        edge_len[i] = (vertices[j] - vertices[i]).norm();
        total += edge_len[i];
    }

    let mut pts = Vec::with_capacity(m);
    for k in 0..m {
        let target_s = total * (k as f64 + 0.5) / m as f64;
        let mut acc = 0.0;
        for i in 0..n {
            if acc + edge_len[i] >= target_s || i == n - 1 {
                let local_s = (target_s - acc).clamp(0.0, edge_len[i]);
                let t = if edge_len[i] > 0.0 { local_s / edge_len[i] } else { 0.0 };
                let j = (i + 1) % n;
                let p = vertices[i] + (vertices[j] - vertices[i]) * t;
                let edge = vertices[j] - vertices[i];
                let len = edge_len[i].max(1e-14);
                let normal = Complex64::new(edge.im / len, -edge.re / len);
                pts.push((p, normal, i));
                break;
            }
            acc += edge_len[i];
        }
    }
    pts
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
    fn insufficient_control_points_rejected() {
        let p = unit_square();
        let f = FluxRecord::new(vec![1.0, 0.0, -1.0, 0.0], 0.0, 0.0);
        let err = WaterlooSolver::from_flux(&p, &f, &[], 1.0, 4, 3).unwrap_err();
        assert!(matches!(err, PtrackError::InsufficientControlPoints { .. }));
    }

    #[test]
    fn uniform_flow_fits_near_exactly() {
        let p = unit_square();
        let f = FluxRecord::new(vec![1.0, 0.0, -1.0, 0.0], 0.0, 0.0);
        let solver = WaterlooSolver::from_flux(&p, &f, &[], 1.0, 40, 4).unwrap();
        let (vx, vy, _) = solver.velocity(0.5, 0.5, 0.5, Direction::Forward);
        assert!((vx - 1.0).abs() < 1e-2);
        assert!(vy.abs() < 1e-2);
    }

    #[test]
    fn perimeter_flux_error_is_small_for_uniform_flow() {
        let p = unit_square();
        let f = FluxRecord::new(vec![1.0, 0.0, -1.0, 0.0], 0.0, 0.0);
        let solver = WaterlooSolver::from_flux(&p, &f, &[], 1.0, 40, 4).unwrap();
        assert!(solver.perimeter_flux_error() < 0.05);
    }
}
