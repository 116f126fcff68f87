//! Start-point resolution, intra-cell and cross-cell tracking, reverse
//! pass-through stitching, and the centroidal ensemble pass — the
//! orchestration layer built on top of a [`crate::domain::Domain`], in the
//! manner of the Go source's `particleTracker.go` and `trackCentroid.go`.

use std::collections::{HashMap, HashSet};

use log::{debug, warn};
use rayon::prelude::*;

use crate::domain::Domain;
use crate::error::{PtrackError, PtrackResult};
use crate::integrator::{Integrator, IntegratorImpl};
use crate::particle::{ExitCode, Particle, Pathline};
use crate::prism::Prism;
use crate::velocity_field::{Direction, Solver, VelocityField};

/// Cross-cell hops after which a pathline is declared stalled rather than
/// tracked forever.
const MAX_CELLS: usize = 10_000;
/// Waterloo intra-cell steps after which a segment is declared stalled.
const MAX_STEPS: usize = 5_000;
/// Fraction of the candidate cell's centroid distance used to nudge an
/// ambiguous start point before giving up on it.
const START_NUDGE_FRACTION: f64 = 1e-3;

/// Resolve `(x, y, z)` to its unique host prism: zero candidates is an
/// error. More than one (a shared boundary) is probed by nudging the point
/// a small distance along its local velocity; if the nudge lands in
/// exactly one candidate, that candidate is the start cell, else ambiguous.
pub fn resolve_start(domain: &Domain, lineage_id: u64, x: f64, y: f64, z: f64) -> PtrackResult<Particle> {
    let candidates = domain.particle_to_prism_ids(x, y, z);
    match candidates.len() {
        0 => Err(PtrackError::NoHostCell { x, y, z }),
        1 => Ok(Particle::new(lineage_id, candidates[0], x, y, z, 0.0)),
        n => probe_ambiguous_start(domain, lineage_id, x, y, z, &candidates)
            .ok_or(PtrackError::AmbiguousStart(n)),
    }
}

/// Nudge `(x, y, z)` a small fraction of the centroid distance along the
/// local velocity of its first candidate host, and re-resolve. Returns the
/// disambiguated start particle at the *original* coordinate, not the
/// nudged one -- the nudge only picks the cell.
fn probe_ambiguous_start(
    domain: &Domain,
    lineage_id: u64,
    x: f64,
    y: f64,
    z: f64,
    candidates: &[i64],
) -> Option<Particle> {
    let probe_cell = candidates[0];
    let solver = domain.solver(probe_cell)?;
    let prism = domain.prism(probe_cell)?;
    let (vx, vy, vz) = solver.velocity(x, y, z, domain.direction());
    let speed = (vx * vx + vy * vy + vz * vz).sqrt();
    if speed <= 1e-14 {
        return None;
    }

    let (cx, cy, cz) = prism.centroid();
    let centroid_dist = ((x - cx).powi(2) + (y - cy).powi(2) + (z - cz).powi(2)).sqrt();
    let step = centroid_dist.max(1e-9) * START_NUDGE_FRACTION;
    let (nx, ny, nz) = (x + vx / speed * step, y + vy / speed * step, z + vz / speed * step);

    let nudged = domain.particle_to_prism_ids(nx, ny, nz);
    if nudged.len() == 1 {
        Some(Particle::new(lineage_id, nudged[0], x, y, z, 0.0))
    } else {
        None
    }
}

/// Track a single release from its starting coordinate to whatever
/// terminates it.
pub fn track(domain: &Domain, lineage_id: u64, x: f64, y: f64, z: f64) -> PtrackResult<Pathline> {
    let start = resolve_start(domain, lineage_id, x, y, z)?;
    Ok(track_from_particle(domain, start))
}

/// One cell's worth of intra-cell motion.
struct IntraCellOutcome {
    /// Snapshots after the entry point, in order; the last is either the
    /// cell-boundary exit or the point where `exit_code` fired.
    snapshots: Vec<Particle>,
    last: Particle,
    face: Option<usize>,
    exit_code: Option<ExitCode>,
}

fn well_capture(domain: &Domain, cell: i64, x: f64, y: f64, well_tol: f64) -> bool {
    domain.wells(cell).iter().any(|w| {
        w.is_extracting() && {
            let d = ((x - w.x).powi(2) + (y - w.y).powi(2)).sqrt();
            d <= w.radius.max(well_tol)
        }
    })
}

fn track_intra_cell(domain: &Domain, cell: i64, start: &Particle) -> PtrackResult<IntraCellOutcome> {
    let prism = domain.prism(cell).ok_or(PtrackError::UnknownPrism(cell))?;
    let solver = domain.solver(cell).ok_or(PtrackError::UnknownPrism(cell))?;
    let dir = domain.direction();
    let cfg = domain.config();

    if well_capture(domain, cell, start.x, start.y, cfg.well_tol) {
        return Ok(IntraCellOutcome {
            snapshots: Vec::new(),
            last: *start,
            face: None,
            exit_code: Some(ExitCode::ExitedWell),
        });
    }

    match solver {
        Solver::Vector(s) => {
            let e = s.exit(start.x, start.y, start.z, dir);
            if !e.dt.is_finite() {
                return Ok(IntraCellOutcome {
                    snapshots: Vec::new(),
                    last: *start,
                    face: None,
                    exit_code: Some(ExitCode::StalledInCell),
                });
            }
            let p = Particle::new(start.lineage_id, cell, e.x, e.y, e.z, start.t + dir.sign() * e.dt);
            Ok(IntraCellOutcome { snapshots: vec![p], last: p, face: e.face, exit_code: None })
        }
        Solver::Pollock(s) => {
            let dt_step = cfg.dt.max(1e-9);
            let snaps = s.track_to_exit(start, dir, dt_step);
            if snaps.is_empty() {
                return Ok(IntraCellOutcome {
                    snapshots: Vec::new(),
                    last: *start,
                    face: None,
                    exit_code: Some(ExitCode::StalledInCell),
                });
            }
            let last = *snaps.last().unwrap();
            let e = s.exit(start.x, start.y, start.z, dir);
            Ok(IntraCellOutcome { snapshots: snaps, last, face: e.face, exit_code: None })
        }
        Solver::Waterloo(s) => track_waterloo_intra_cell(domain, prism, s, cell, start, dir),
    }
}

fn track_waterloo_intra_cell(
    domain: &Domain,
    prism: &Prism,
    solver: &crate::solver_waterloo::WaterlooSolver,
    cell: i64,
    start: &Particle,
    dir: Direction,
) -> PtrackResult<IntraCellOutcome> {
    let cfg = domain.config();
    let mut integrator = IntegratorImpl::from_config(cfg);
    let mut current = *start;
    let mut snapshots = Vec::new();

    for _ in 0..MAX_STEPS {
        let step = integrator.step(solver, current.x, current.y, current.z, dir);
        if step.dt <= 0.0 || !step.x.is_finite() || !step.y.is_finite() || !step.z.is_finite() {
            return Ok(IntraCellOutcome {
                snapshots,
                last: current,
                face: None,
                exit_code: Some(ExitCode::StalledInCell),
            });
        }

        let still_inside = prism.contains_xy(step.x, step.y, cfg.tol)
            && step.z >= prism.bot
            && step.z <= prism.top;
        let new_t = current.t + dir.sign() * step.dt;

        if still_inside {
            current = Particle::new(start.lineage_id, cell, step.x, step.y, step.z, new_t);
            snapshots.push(current);
            if well_capture(domain, cell, current.x, current.y, cfg.well_tol) {
                return Ok(IntraCellOutcome { snapshots, last: current, face: None, exit_code: Some(ExitCode::ExitedWell) });
            }
            continue;
        }

        let (ex, ey, ez, edt) = bisect_exit(prism, cfg.tol, &current, step.x, step.y, step.z, step.dt);
        let face = prism.nearest_edge(ex, ey);
        let exit_particle =
            Particle::new(start.lineage_id, cell, ex, ey, ez, current.t + dir.sign() * edt);
        snapshots.push(exit_particle);
        return Ok(IntraCellOutcome { snapshots, last: exit_particle, face: Some(face), exit_code: None });
    }

    Ok(IntraCellOutcome { snapshots, last: current, face: None, exit_code: Some(ExitCode::StalledInCell) })
}

/// Binary search along the straight segment from `inside` (known interior)
/// to `(ox, oy, oz)` (known exterior) for the boundary crossing, mirroring
/// the Go source's perimeter-intersection refinement.
fn bisect_exit(
    prism: &Prism,
    tol: f64,
    inside: &Particle,
    ox: f64,
    oy: f64,
    oz: f64,
    dt: f64,
) -> (f64, f64, f64, f64) {
    let mut lo = 0.0_f64;
    let mut hi = 1.0_f64;
    for _ in 0..40 {
        let mid = 0.5 * (lo + hi);
        let x = inside.x + (ox - inside.x) * mid;
        let y = inside.y + (oy - inside.y) * mid;
        let z = inside.z + (oz - inside.z) * mid;
        let still_inside = prism.contains_xy(x, y, tol) && z >= prism.bot && z <= prism.top;
        if still_inside {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    (
        inside.x + (ox - inside.x) * lo,
        inside.y + (oy - inside.y) * lo,
        inside.z + (oz - inside.z) * lo,
        dt * lo,
    )
}

/// Every `ncheck` appended snapshots, round the last `ncheck` xy positions
/// to `prcsn` and count the distinct values; fewer than `xuniq` means the
/// pathline is oscillating inside a tight spot rather than making progress.
fn positional_tight_cycle(snapshots: &[Particle], ncheck: usize, prcsn: f64, xuniq: usize) -> bool {
    if ncheck == 0 || prcsn <= 0.0 {
        return false;
    }
    let window = &snapshots[snapshots.len().saturating_sub(ncheck)..];
    let mut distinct: HashSet<(i64, i64)> = HashSet::with_capacity(window.len());
    for p in window {
        distinct.insert(((p.x / prcsn).round() as i64, (p.y / prcsn).round() as i64));
    }
    distinct.len() < xuniq
}

/// Outcome of resolving a particle's new host cell after an intra-cell exit.
enum Handoff {
    ExitedDomain,
    BoundaryCell,
    Stalled,
    CycleTwoCell,
    Next(i64),
}

/// Step 4-5 of cross-cell hand-off: check the neighbors of `current_cell`
/// for actual containment of `particle`, falling back to a brute-force
/// domain scan (excluding `current_cell` itself, which trivially still
/// contains a point sitting exactly on its own boundary) if none do, then
/// dispatch on the candidate count.
fn resolve_handoff(
    domain: &Domain,
    current_cell: i64,
    last_cell: Option<i64>,
    face: usize,
    particle: &Particle,
) -> Handoff {
    if let Some(marker_id) = domain.neighbor(current_cell, face) {
        if domain.prism(marker_id).is_none() {
            return Handoff::BoundaryCell;
        }
    }

    let tol = domain.config().tol;
    let nfaces = domain.prism(current_cell).map(Prism::nfaces).unwrap_or(0);

    let mut candidates: Vec<i64> = Vec::new();
    for f in 0..nfaces {
        if let Some(id) = domain.neighbor(current_cell, f) {
            if let Some(p) = domain.prism(id) {
                if p.contains(particle, tol) && !candidates.contains(&id) {
                    candidates.push(id);
                }
            }
        }
    }

    if candidates.is_empty() {
        candidates = domain
            .particle_to_prism_ids(particle.x, particle.y, particle.z)
            .into_iter()
            .filter(|&id| id != current_cell)
            .collect();
    }

    match candidates.len() {
        0 => Handoff::ExitedDomain,
        1 => {
            let only = candidates[0];
            if only == current_cell {
                Handoff::Stalled
            } else if Some(only) == last_cell {
                Handoff::CycleTwoCell
            } else {
                Handoff::Next(only)
            }
        }
        _ => Handoff::Next(pick_by_centroid_line(domain, current_cell, &candidates, particle)),
    }
}

/// 3D point-to-line distance from `particle` to the line through `a` and
/// `b` (infinite extent, not a segment).
fn point_to_line_distance(p: (f64, f64, f64), a: (f64, f64, f64), b: (f64, f64, f64)) -> f64 {
    let d = (b.0 - a.0, b.1 - a.1, b.2 - a.2);
    let ap = (p.0 - a.0, p.1 - a.1, p.2 - a.2);
    let d_len = (d.0 * d.0 + d.1 * d.1 + d.2 * d.2).sqrt();
    if d_len < 1e-14 {
        return (ap.0 * ap.0 + ap.1 * ap.1 + ap.2 * ap.2).sqrt();
    }
    let cross = (
        ap.1 * d.2 - ap.2 * d.1,
        ap.2 * d.0 - ap.0 * d.2,
        ap.0 * d.1 - ap.1 * d.0,
    );
    (cross.0 * cross.0 + cross.1 * cross.1 + cross.2 * cross.2).sqrt() / d_len
}

/// Among several candidate hosts sharing an edge/vertex, pick the one whose
/// centroid-to-centroid line (from the exited cell's centroid to the
/// candidate's) passes closest to the particle's position.
fn pick_by_centroid_line(domain: &Domain, current_cell: i64, candidates: &[i64], particle: &Particle) -> i64 {
    let p = (particle.x, particle.y, particle.z);
    let origin = domain.prism(current_cell).map(Prism::centroid).unwrap_or(p);

    *candidates
        .iter()
        .min_by(|&&a, &&b| {
            let da = domain.prism(a).map(|pr| point_to_line_distance(p, origin, pr.centroid())).unwrap_or(f64::MAX);
            let db = domain.prism(b).map(|pr| point_to_line_distance(p, origin, pr.centroid())).unwrap_or(f64::MAX);
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(&candidates[0])
}

fn track_from_particle(domain: &Domain, start: Particle) -> Pathline {
    let cfg = domain.config();
    let mut snapshots = vec![start];
    let mut visits: HashMap<i64, u32> = HashMap::new();
    visits.insert(start.cell, 1);
    let mut last_cell: Option<i64> = None;
    let mut current = start;
    let mut next_cycle_check = cfg.ncheck;

    for _ in 0..MAX_CELLS {
        let outcome = match track_intra_cell(domain, current.cell, &current) {
            Ok(o) => o,
            Err(e) => {
                warn!("ptrack: cell {} construction error: {e}", current.cell);
                return Pathline { lineage_id: start.lineage_id, snapshots, terminus: ExitCode::Error(e.to_string()) };
            }
        };
        snapshots.extend(outcome.snapshots.iter().copied());

        while snapshots.len() >= next_cycle_check {
            if positional_tight_cycle(&snapshots, cfg.ncheck, cfg.prcsn, cfg.xuniq) {
                warn!("ptrack: lineage {} hit a tight cycle near cell {}", start.lineage_id, current.cell);
                return Pathline { lineage_id: start.lineage_id, snapshots, terminus: ExitCode::CycleTight };
            }
            next_cycle_check += cfg.ncheck;
        }

        if let Some(code) = outcome.exit_code {
            debug!("ptrack: lineage {} terminated in cell {}: {code:?}", start.lineage_id, current.cell);
            return Pathline { lineage_id: start.lineage_id, snapshots, terminus: code };
        }

        let Some(face) = outcome.face else {
            debug!("ptrack: lineage {} exited vertically from cell {}", start.lineage_id, current.cell);
            return Pathline { lineage_id: start.lineage_id, snapshots, terminus: ExitCode::ExitedDomain };
        };

        match resolve_handoff(domain, current.cell, last_cell, face, &outcome.last) {
            Handoff::ExitedDomain => {
                return Pathline { lineage_id: start.lineage_id, snapshots, terminus: ExitCode::ExitedDomain };
            }
            Handoff::BoundaryCell => {
                return Pathline { lineage_id: start.lineage_id, snapshots, terminus: ExitCode::BoundaryCell };
            }
            Handoff::Stalled => {
                return Pathline { lineage_id: start.lineage_id, snapshots, terminus: ExitCode::StalledInCell };
            }
            Handoff::CycleTwoCell => {
                warn!("ptrack: lineage {} hit a two-cell cycle at cell {}", start.lineage_id, current.cell);
                return Pathline { lineage_id: start.lineage_id, snapshots, terminus: ExitCode::CycleTwoCell };
            }
            Handoff::Next(next_id) => {
                last_cell = Some(current.cell);
                current = outcome.last;
                current.cell = next_id;
                *snapshots.last_mut().unwrap() = current;

                let count = visits.entry(next_id).or_insert(0);
                *count += 1;
                if *count > 1 {
                    warn!("ptrack: lineage {} revisited cell {next_id}", start.lineage_id);
                    return Pathline { lineage_id: start.lineage_id, snapshots, terminus: ExitCode::CycleTwoCell };
                }
            }
        }
    }

    warn!("ptrack: lineage {} exceeded {MAX_CELLS} cross-cell hops", start.lineage_id);
    Pathline { lineage_id: start.lineage_id, snapshots, terminus: ExitCode::StalledInCell }
}

/// Track forward, then backward from the same release point, and stitch the
/// two into one continuous pathline running from the reverse terminus
/// through the release point to the forward terminus. Requires `&mut
/// Domain` for the two direction flips, which rules out running this
/// concurrently with any other tracker borrowing the domain.
pub fn track_pass_through(domain: &mut Domain, lineage_id: u64, x: f64, y: f64, z: f64) -> PtrackResult<Pathline> {
    let start = resolve_start(domain, lineage_id, x, y, z)?;

    let forward = track_from_particle(domain, start);
    domain.reverse();
    let reverse = track_from_particle(domain, start);
    domain.reverse();

    let mut combined = reverse.snapshots;
    combined.reverse();
    combined.pop();
    combined.extend(forward.snapshots.iter().copied());

    let mut pathline = Pathline { lineage_id, snapshots: combined, terminus: forward.terminus };
    pathline.sanitize();
    Ok(pathline)
}

/// Release one particle at every prism's centroid and track forward,
/// concurrently across prisms via rayon. `Domain` is held by shared
/// reference for the whole pass, so this can never race a `reverse()`.
pub fn track_centroidal_ensemble(domain: &Domain) -> Vec<Pathline> {
    let ids: Vec<i64> = domain.ids().collect();
    ids.par_iter()
        .filter_map(|&id| {
            let prism = domain.prism(id)?;
            let start = prism.centroid_particle(id as u64, id);
            let mut pathline = track_from_particle(domain, start);
            pathline.sanitize();
            Some(pathline)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, IntegratorKind, SolverKind};
    use crate::flux::FluxRecord;
    use num_complex::Complex64;
    use std::collections::HashMap;

    fn unit_square(id_origin: (f64, f64)) -> Prism {
        let (ox, oy) = id_origin;
        let z = vec![
            Complex64::new(ox, oy),
            Complex64::new(ox, oy + 1.0),
            Complex64::new(ox + 1.0, oy + 1.0),
            Complex64::new(ox + 1.0, oy),
        ];
        Prism::new(z, 1.0, 0.0, 1.0, 0.0, 0.3).unwrap()
    }

    fn two_cell_domain(solver: SolverKind) -> Domain {
        let prisms = vec![(1, unit_square((0.0, 0.0))), (2, unit_square((1.0, 0.0)))];
        let mut fluxes = HashMap::new();
        fluxes.insert(1, FluxRecord::new(vec![1.0, 0.0, -1.0, 0.0], 0.0, 0.0));
        fluxes.insert(2, FluxRecord::new(vec![1.0, 0.0, -1.0, 0.0], 0.0, 0.0));
        let mut connectivity = HashMap::new();
        connectivity.insert((1, 2), 2);
        connectivity.insert((2, 0), 1);

        let config = Config { solver, integrator: IntegratorKind::EulerTime, ..Config::default() };
        Domain::build(config, prisms, fluxes, HashMap::new(), connectivity).unwrap()
    }

    #[test]
    fn particle_crosses_into_neighbor_cell() {
        let domain = two_cell_domain(SolverKind::Vector);
        let pathline = track(&domain, 1, 0.1, 0.5, 0.5).unwrap();
        assert!(pathline.snapshots.iter().any(|p| p.cell == 2));
        assert_eq!(pathline.terminus, ExitCode::ExitedDomain);
    }

    #[test]
    fn unresolvable_start_point_is_an_error() {
        let domain = two_cell_domain(SolverKind::Vector);
        let err = track(&domain, 1, 100.0, 100.0, 0.5).unwrap_err();
        assert!(matches!(err, PtrackError::NoHostCell { .. }));
    }

    #[test]
    fn pollock_pathline_also_crosses_cells() {
        let domain = two_cell_domain(SolverKind::Pollock);
        let pathline = track(&domain, 1, 0.1, 0.5, 0.5).unwrap();
        assert!(pathline.snapshots.iter().any(|p| p.cell == 2));
    }

    #[test]
    fn centroidal_ensemble_covers_every_cell() {
        let domain = two_cell_domain(SolverKind::Vector);
        let pathlines = track_centroidal_ensemble(&domain);
        assert_eq!(pathlines.len(), 2);
    }

    #[test]
    fn pass_through_stitches_reverse_and_forward() {
        let mut domain = two_cell_domain(SolverKind::Vector);
        let pathline = track_pass_through(&mut domain, 1, 0.5, 0.5, 0.5).unwrap();
        assert_eq!(domain.direction(), Direction::Forward);
        assert!(pathline.snapshots.len() >= 2);
    }
}
