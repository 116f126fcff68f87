//! Polygonal-prism cell geometry, in the manner of the Go `maseology/ptrack`
//! package's `Prism`/`PrismSet` types.

use num_complex::Complex64;

use crate::error::{PtrackError, PtrackResult};
use crate::particle::Particle;

/// A right prismatic mesh cell: a clockwise-ordered planform polygon
/// extruded between `bot` and `top`.
#[derive(Clone, Debug)]
pub struct Prism {
    /// Planform vertices, clockwise, not repeating the first vertex.
    vertices: Vec<Complex64>,
    pub top: f64,
    pub bot: f64,
    pub porosity: f64,
    /// Saturated water-table elevation at the start of the current step.
    bn: f64,
    /// Start-time of the current step.
    pub tn: f64,
    area: f64,
}

impl Prism {
    pub fn new(
        vertices: Vec<Complex64>,
        top: f64,
        bot: f64,
        bn: f64,
        tn: f64,
        porosity: f64,
    ) -> PtrackResult<Self> {
        if vertices.len() < 3 {
            return Err(PtrackError::DegenerateCell(vertices.len()));
        }
        if bot >= top {
            return Err(PtrackError::InvalidElevation { top, bot });
        }
        if !(porosity > 0.0 && porosity <= 1.0) {
            return Err(PtrackError::InvalidPorosity(porosity));
        }

        let area = shoelace_area(&vertices);
        if area <= 0.0 {
            return Err(PtrackError::CounterClockwisePolygon(area));
        }

        Ok(Prism {
            vertices,
            top,
            bot,
            porosity,
            bn: bn.clamp(bot, top),
            tn,
            area,
        })
    }

    pub fn vertices(&self) -> &[Complex64] {
        &self.vertices
    }

    pub fn nfaces(&self) -> usize {
        self.vertices.len()
    }

    pub fn area(&self) -> f64 {
        self.area
    }

    /// Saturated thickness at the start of the current step, clamped to
    /// `[bot, top]`.
    pub fn bn(&self) -> f64 {
        self.bn
    }

    /// Update the saturated thickness, re-clamping into `[bot, top]`.
    pub fn set_bn(&mut self, bn: f64) {
        self.bn = bn.clamp(self.bot, self.top);
    }

    /// Collapse the cell's top elevation down to the current water table,
    /// used by callers handling a transient dry-down.
    pub fn reset_top_to_saturated(&mut self) {
        self.top = self.bot + self.bn;
        self.bn = self.bn.clamp(self.bot, self.top);
    }

    /// `(bn - bot) / (top - bot)`.
    pub fn saturation(&self) -> f64 {
        (self.bn - self.bot) / (self.top - self.bot)
    }

    /// Ray-casting point-in-polygon test on the planform, boundary-inclusive
    /// within `tol`.
    pub fn contains_xy(&self, x: f64, y: f64, tol: f64) -> bool {
        let n = self.vertices.len();
        for i in 0..n {
            let j = (i + 1) % n;
            if point_segment_distance(x, y, self.vertices[i], self.vertices[j]) <= tol {
                return true;
            }
        }

        let mut inside = false;
        for i in 0..n {
            let j = (i + 1) % n;
            let (xi, yi) = (self.vertices[i].re, self.vertices[i].im);
            let (xj, yj) = (self.vertices[j].re, self.vertices[j].im);
            if (yi > y) != (yj > y) {
                let x_int = xi + (y - yi) / (yj - yi) * (xj - xi);
                if x < x_int {
                    inside = !inside;
                }
            }
        }
        inside
    }

    pub fn contains(&self, p: &Particle, tol: f64) -> bool {
        self.contains_xy(p.x, p.y, tol) && p.z >= self.bot && p.z <= self.top
    }

    /// Index of the edge closest to `(x, y)`, used to attribute a
    /// boundary-crossing step to the face it crossed.
    pub fn nearest_edge(&self, x: f64, y: f64) -> usize {
        let n = self.vertices.len();
        let mut best = 0;
        let mut best_d = f64::MAX;
        for i in 0..n {
            let j = (i + 1) % n;
            let d = point_segment_distance(x, y, self.vertices[i], self.vertices[j]);
            if d < best_d {
                best_d = d;
                best = i;
            }
        }
        best
    }

    /// Arithmetic mean of the planform vertices; `z` at mid-height.
    pub fn centroid(&self) -> (f64, f64, f64) {
        let n = self.vertices.len() as f64;
        let sum: Complex64 = self.vertices.iter().sum();
        (sum.re / n, sum.im / n, 0.5 * (self.top + self.bot))
    }

    pub fn centroid_xy(&self) -> Complex64 {
        let n = self.vertices.len() as f64;
        self.vertices.iter().sum::<Complex64>() / n
    }

    /// `(xmin, xmax, ymin, ymax)`.
    pub fn extents_xy(&self) -> (f64, f64, f64, f64) {
        let mut xmin = f64::MAX;
        let mut xmax = f64::MIN;
        let mut ymin = f64::MAX;
        let mut ymax = f64::MIN;
        for v in &self.vertices {
            xmin = xmin.min(v.re);
            xmax = xmax.max(v.re);
            ymin = ymin.min(v.im);
            ymax = ymax.max(v.im);
        }
        (xmin, xmax, ymin, ymax)
    }

    /// A particle released at this prism's centroid, time zero.
    pub fn centroid_particle(&self, lineage_id: u64, cell: i64) -> Particle {
        let (x, y, z) = self.centroid();
        Particle::new(lineage_id, cell, x, y, z, 0.0)
    }
}

fn shoelace_area(vertices: &[Complex64]) -> f64 {
    let n = vertices.len();
    let mut sum = 0.0;
    for j in 0..n {
        let jj = (j + 1) % n;
        sum += vertices[j].re * vertices[jj].im - vertices[jj].re * vertices[j].im;
    }
    // Negated: vertices are specified clockwise, so a valid cell yields a
    // positive area only after this sign flip.
    sum / -2.0
}

fn point_segment_distance(x: f64, y: f64, a: Complex64, b: Complex64) -> f64 {
    let (dx, dy) = (b.re - a.re, b.im - a.im);
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        return ((x - a.re).powi(2) + (y - a.im).powi(2)).sqrt();
    }
    let t = (((x - a.re) * dx + (y - a.im) * dy) / len2).clamp(0.0, 1.0);
    let (px, py) = (a.re + t * dx, a.im + t * dy);
    ((x - px).powi(2) + (y - py).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> Prism {
        // clockwise: (0,0) -> (0,1) -> (1,1) -> (1,0)
        let z = vec![
            Complex64::new(0.0, 0.0),
            Complex64::new(0.0, 1.0),
            Complex64::new(1.0, 1.0),
            Complex64::new(1.0, 0.0),
        ];
        Prism::new(z, 1.0, 0.0, 1.0, 0.0, 1.0).unwrap()
    }

    #[test]
    fn area_is_positive_for_clockwise_input() {
        assert!((unit_square().area() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn counter_clockwise_input_is_rejected() {
        let z = vec![
            Complex64::new(0.0, 0.0),
            Complex64::new(1.0, 0.0),
            Complex64::new(1.0, 1.0),
            Complex64::new(0.0, 1.0),
        ];
        let err = Prism::new(z, 1.0, 0.0, 1.0, 0.0, 1.0).unwrap_err();
        assert!(matches!(err, PtrackError::CounterClockwisePolygon(_)));
    }

    #[test]
    fn contains_xy_interior_and_boundary() {
        let p = unit_square();
        assert!(p.contains_xy(0.5, 0.5, 1e-10));
        assert!(p.contains_xy(0.0, 0.5, 1e-9)); // on the left edge
        assert!(!p.contains_xy(1.5, 0.5, 1e-10));
    }

    #[test]
    fn contains_respects_vertical_bounds() {
        let p = unit_square();
        let inside = Particle::new(0, 0, 0.5, 0.5, 0.5, 0.0);
        let below = Particle::new(0, 0, 0.5, 0.5, -0.1, 0.0);
        assert!(p.contains(&inside, 1e-10));
        assert!(!p.contains(&below, 1e-10));
    }

    #[test]
    fn degenerate_cell_rejected() {
        let z = vec![Complex64::new(0.0, 0.0), Complex64::new(1.0, 0.0)];
        assert!(matches!(
            Prism::new(z, 1.0, 0.0, 1.0, 0.0, 1.0),
            Err(PtrackError::DegenerateCell(2))
        ));
    }

    #[test]
    fn saturation_is_fraction_of_thickness() {
        let mut p = unit_square();
        assert!((p.saturation() - 1.0).abs() < 1e-12);
        p.set_bn(0.5);
        assert!((p.saturation() - 0.5).abs() < 1e-12);
    }
}
