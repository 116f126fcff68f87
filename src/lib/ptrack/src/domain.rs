//! The assembled mesh: prisms, their fitted solvers, cell-to-cell
//! connectivity and wells, bundled the way the Go source's `domain.go`
//! bundles a `PrismSet` with its velocity fields.

use std::collections::HashMap;

use crate::config::{Config, SolverKind};
use crate::error::{PtrackError, PtrackResult};
use crate::flux::{FluxRecord, Well};
use crate::prism::Prism;
use crate::solver_pollock::PollockSolver;
use crate::solver_vector::VectorSolver;
use crate::solver_waterloo::WaterlooSolver;
use crate::velocity_field::{Direction, Solver};

pub struct Domain {
    config: Config,
    prisms: HashMap<i64, Prism>,
    solvers: HashMap<i64, Solver>,
    /// `(cell, local lateral face index) -> neighbor cell id`. A face
    /// absent from this map is a domain boundary.
    connectivity: HashMap<(i64, usize), i64>,
    wells: HashMap<i64, Vec<Well>>,
    direction: Direction,
}

impl Domain {
    pub fn build(
        config: Config,
        prisms: Vec<(i64, Prism)>,
        fluxes: HashMap<i64, FluxRecord>,
        wells: HashMap<i64, Vec<Well>>,
        connectivity: HashMap<(i64, usize), i64>,
    ) -> PtrackResult<Self> {
        let mut solvers = HashMap::with_capacity(prisms.len());
        for (id, prism) in &prisms {
            let flux = fluxes.get(id).ok_or_else(|| {
                PtrackError::InvalidConnectivity(format!("cell {id} has no flux record"))
            })?;
            let cell_wells = wells.get(id).cloned().unwrap_or_default();

            // `Well::q > 0` is extraction, which is an outflow; fold it into
            // the inflow-positive recharge term with a flipped sign before
            // checking the cell against its fatal mass-balance gate.
            let well_recharge: f64 = cell_wells.iter().map(|w| -w.q).sum();
            flux.check_mass_balance(well_recharge, config.mingtzero)?;

            let solver = match config.solver {
                SolverKind::Vector => {
                    Solver::Vector(VectorSolver::from_flux(prism, flux, prism.porosity)?)
                }
                SolverKind::Pollock => {
                    Solver::Pollock(PollockSolver::from_flux(prism, flux, prism.porosity)?)
                }
                SolverKind::Waterloo => Solver::Waterloo(WaterlooSolver::from_flux(
                    prism,
                    flux,
                    &cell_wells,
                    prism.porosity,
                    config.m,
                    config.n,
                )?),
            };
            solvers.insert(*id, solver);
        }

        let prisms: HashMap<i64, Prism> = prisms.into_iter().collect();
        Ok(Domain { config, prisms, solvers, connectivity, wells, direction: Direction::Forward })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Flip the domain's tracking direction. Requires `&mut Domain`, which
    /// the borrow checker turns into a hard barrier: no `Tracker` can be
    /// mid-pass holding a shared borrow when this is called.
    pub fn reverse(&mut self) {
        self.direction = self.direction.flip();
    }

    pub fn prism(&self, id: i64) -> Option<&Prism> {
        self.prisms.get(&id)
    }

    pub fn solver(&self, id: i64) -> Option<&Solver> {
        self.solvers.get(&id)
    }

    pub fn wells(&self, id: i64) -> &[Well] {
        self.wells.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn neighbor(&self, id: i64, face: usize) -> Option<i64> {
        self.connectivity.get(&(id, face)).copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.prisms.keys().copied()
    }

    /// Every prism whose planform and vertical extent contains `(x, y, z)`,
    /// boundary-inclusive. More than one id means the point sits on a
    /// shared boundary.
    pub fn particle_to_prism_ids(&self, x: f64, y: f64, z: f64) -> Vec<i64> {
        let tol = self.config.tol;
        self.prisms
            .iter()
            .filter(|(_, p)| p.contains_xy(x, y, tol) && z >= p.bot && z <= p.top)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Global bounding box across every prism: `(xmin, xmax, ymin, ymax,
    /// zmin, zmax)`.
    pub fn extent(&self) -> (f64, f64, f64, f64, f64, f64) {
        let mut xmin = f64::MAX;
        let mut xmax = f64::MIN;
        let mut ymin = f64::MAX;
        let mut ymax = f64::MIN;
        let mut zmin = f64::MAX;
        let mut zmax = f64::MIN;
        for p in self.prisms.values() {
            let (x0, x1, y0, y1) = p.extents_xy();
            xmin = xmin.min(x0);
            xmax = xmax.max(x1);
            ymin = ymin.min(y0);
            ymax = ymax.max(y1);
            zmin = zmin.min(p.bot);
            zmax = zmax.max(p.top);
        }
        (xmin, xmax, ymin, ymax, zmin, zmax)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IntegratorKind;
    use num_complex::Complex64;

    fn unit_square(porosity: f64) -> Prism {
        let z = vec![
            Complex64::new(0.0, 0.0),
            Complex64::new(0.0, 1.0),
            Complex64::new(1.0, 1.0),
            Complex64::new(1.0, 0.0),
        ];
        Prism::new(z, 1.0, 0.0, 1.0, 0.0, porosity).unwrap()
    }

    fn base_config(solver: SolverKind) -> Config {
        Config { solver, integrator: IntegratorKind::EulerTime, ..Config::default() }
    }

    #[test]
    fn build_single_cell_vector_domain() {
        let prism = unit_square(0.3);
        let mut fluxes = HashMap::new();
        fluxes.insert(1, FluxRecord::new(vec![1.0, 0.0, -1.0, 0.0], 0.0, 0.0));
        let domain = Domain::build(
            base_config(SolverKind::Vector),
            vec![(1, prism)],
            fluxes,
            HashMap::new(),
            HashMap::new(),
        )
        .unwrap();
        assert!(domain.solver(1).is_some());
        assert_eq!(domain.particle_to_prism_ids(0.5, 0.5, 0.5), vec![1]);
    }

    #[test]
    fn mass_imbalanced_cell_is_rejected_at_construction() {
        let prism = unit_square(0.3);
        let mut fluxes = HashMap::new();
        fluxes.insert(1, FluxRecord::new(vec![1.0, 0.0, 1.0, 0.0], 0.0, 0.0));
        let domain = Domain::build(
            base_config(SolverKind::Vector),
            vec![(1, prism)],
            fluxes,
            HashMap::new(),
            HashMap::new(),
        );
        assert!(matches!(domain, Err(PtrackError::MassImbalance { .. })));
    }

    #[test]
    fn missing_flux_record_is_an_error() {
        let prism = unit_square(0.3);
        let domain = Domain::build(
            base_config(SolverKind::Vector),
            vec![(1, prism)],
            HashMap::new(),
            HashMap::new(),
            HashMap::new(),
        );
        assert!(matches!(domain, Err(PtrackError::InvalidConnectivity(_))));
    }

    #[test]
    fn reverse_toggles_direction() {
        let prism = unit_square(0.3);
        let mut fluxes = HashMap::new();
        fluxes.insert(1, FluxRecord::new(vec![1.0, 0.0, -1.0, 0.0], 0.0, 0.0));
        let mut domain = Domain::build(
            base_config(SolverKind::Vector),
            vec![(1, prism)],
            fluxes,
            HashMap::new(),
            HashMap::new(),
        )
        .unwrap();
        assert_eq!(domain.direction(), Direction::Forward);
        domain.reverse();
        assert_eq!(domain.direction(), Direction::Reverse);
    }

    #[test]
    fn extent_covers_every_prism() {
        let prism = unit_square(0.3);
        let mut fluxes = HashMap::new();
        fluxes.insert(1, FluxRecord::new(vec![1.0, 0.0, -1.0, 0.0], 0.0, 0.0));
        let domain = Domain::build(
            base_config(SolverKind::Vector),
            vec![(1, prism)],
            fluxes,
            HashMap::new(),
            HashMap::new(),
        )
        .unwrap();
        assert_eq!(domain.extent(), (0.0, 1.0, 0.0, 1.0, 0.0, 1.0));
    }
}
