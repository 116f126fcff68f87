//! Cross-cell tracker behavior: hand-off, cycle detection, and the
//! concurrent centroidal ensemble.

use num_complex::Complex64;
use ptrack::config::{Config, IntegratorKind, SolverKind};
use ptrack::flux::FluxRecord;
use ptrack::particle::ExitCode;
use ptrack::{track, track_centroidal_ensemble, Domain, Prism};
use std::collections::HashMap;

fn square(origin: (f64, f64)) -> Prism {
    let (ox, oy) = origin;
    let z = vec![
        Complex64::new(ox, oy),
        Complex64::new(ox, oy + 1.0),
        Complex64::new(ox + 1.0, oy + 1.0),
        Complex64::new(ox + 1.0, oy),
    ];
    Prism::new(z, 1.0, 0.0, 1.0, 0.0, 0.3).unwrap()
}

#[test]
fn forward_tracking_exits_the_mesh_edge() {
    let prisms = vec![(1, square((0.0, 0.0))), (2, square((1.0, 0.0)))];
    let mut fluxes = HashMap::new();
    fluxes.insert(1, FluxRecord::new(vec![1.0, 0.0, -1.0, 0.0], 0.0, 0.0));
    fluxes.insert(2, FluxRecord::new(vec![1.0, 0.0, -1.0, 0.0], 0.0, 0.0));
    let mut connectivity = HashMap::new();
    connectivity.insert((1, 2), 2);
    connectivity.insert((2, 0), 1);

    let config = Config { solver: SolverKind::Vector, integrator: IntegratorKind::EulerTime, ..Config::default() };
    let domain = Domain::build(config, prisms, fluxes, HashMap::new(), connectivity).unwrap();

    let pathline = track(&domain, 1, 0.1, 0.5, 0.5).unwrap();
    assert_eq!(pathline.terminus, ExitCode::ExitedDomain);
    assert!(pathline.destination().unwrap().x >= 2.0 - 1e-6);
}

#[test]
fn oscillating_flow_between_two_cells_is_a_cycle() {
    let prisms = vec![(1, square((0.0, 0.0))), (2, square((1.0, 0.0)))];
    let mut fluxes = HashMap::new();
    // cell 1 flows +x, cell 2 flows -x: a particle volleys forever.
    fluxes.insert(1, FluxRecord::new(vec![1.0, 0.0, -1.0, 0.0], 0.0, 0.0));
    fluxes.insert(2, FluxRecord::new(vec![-1.0, 0.0, 1.0, 0.0], 0.0, 0.0));
    let mut connectivity = HashMap::new();
    connectivity.insert((1, 2), 2);
    connectivity.insert((2, 0), 1);

    let config = Config { solver: SolverKind::Vector, integrator: IntegratorKind::EulerTime, ..Config::default() };
    let domain = Domain::build(config, prisms, fluxes, HashMap::new(), connectivity).unwrap();

    let pathline = track(&domain, 1, 0.5, 0.5, 0.5).unwrap();
    assert_eq!(pathline.terminus, ExitCode::CycleTwoCell);
    assert!(pathline.snapshots.len() <= 2 * Config::default().ncheck);
}

#[test]
fn centroidal_ensemble_produces_one_pathline_per_cell_even_if_some_stall() {
    let prisms = vec![(1, square((0.0, 0.0))), (2, square((1.0, 0.0)))];
    let mut fluxes = HashMap::new();
    // cell 1: a flow divide (no net exit possible along x), mass-balanced by
    // an equal outflow through the y-faces.
    fluxes.insert(1, FluxRecord::new(vec![1.0, -1.0, 1.0, -1.0], 0.0, 0.0));
    fluxes.insert(2, FluxRecord::new(vec![1.0, 0.0, -1.0, 0.0], 0.0, 0.0));
    let connectivity = HashMap::new();

    let config = Config { solver: SolverKind::Vector, integrator: IntegratorKind::EulerTime, ..Config::default() };
    let domain = Domain::build(config, prisms, fluxes, HashMap::new(), connectivity).unwrap();

    let pathlines = track_centroidal_ensemble(&domain);
    assert_eq!(pathlines.len(), 2);
    // One release stalls (no escape from cell 1's flow divide), the other
    // still exits cleanly -- neither failure aborts the other.
    assert!(pathlines.iter().any(|p| p.terminus == ExitCode::StalledInCell));
}
