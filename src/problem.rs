use std::mem;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use rayon::prelude::*;

use crate::{
    config,
    control::{Method, Stats, ViewControl},
    error::{ErrorKind, Result, ViewError},
    geom::{Enclosure, Surface},
    obstructed::view_obstructed,
    obstruction::{self, Direction, SelfView},
    output,
    poly::PolygonStore,
    result::{PairState, ViewFactors},
    settings::Settings,
    transform::Transformed,
    unobstructed::{view_method, view_unobstructed},
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::SurfaceKind;
    use crate::settings;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    fn square(index: usize, corners: [[f64; 3]; 4]) -> Surface {
        Surface::new(index, corners.iter().map(|c| Point3::new(c[0], c[1], c[2])).collect()).unwrap()
    }

    fn facing_squares() -> Vec<Surface> {
        vec![
            square(0, [[0., 0., 0.], [1., 0., 0.], [1., 1., 0.], [0., 1., 0.]]),
            square(1, [[0., 0., 1.], [0., 1., 1.], [1., 1., 1.], [1., 0., 1.]]),
        ]
    }

    fn problem(surfaces: Vec<Surface>) -> Problem {
        let settings = settings::load_default_config().unwrap();
        Problem::new(Enclosure::new(surfaces).unwrap(), settings).unwrap()
    }

    #[test]
    fn parallel_squares() {
        let vf = problem(facing_squares()).solve().unwrap();
        assert_relative_eq!(vf.f(1, 0), 0.199_824_9, epsilon = 5e-4);
        assert_eq!(vf.state(1, 0), PairState::Unobstructed);
        assert_eq!(vf.stats.n_unobstructed, 1);
    }

    #[test]
    fn squares_facing_away_have_no_view() {
        let mut surfaces = facing_squares();
        surfaces[1] = square(1, [[0., 0., 1.], [1., 0., 1.], [1., 1., 1.], [0., 1., 1.]]);
        let vf = problem(surfaces).solve().unwrap();
        assert_eq!(vf.af(1, 0), 0.0);
        assert_eq!(vf.state(1, 0), PairState::NoView);
        assert_eq!(vf.stats.n_zero, 1);
    }

    #[test]
    fn mask_rows_are_preset() {
        let mut surfaces = facing_squares();
        let mask = square(2, [[0.25, 0.25, 0.], [0.75, 0.25, 0.], [0.75, 0.75, 0.], [0.25, 0.75, 0.]])
            .with_kind(SurfaceKind::Mask, Some(0));
        surfaces.push(mask);
        let vf = problem(surfaces).solve().unwrap();
        assert_relative_eq!(vf.af(2, 0), 0.25, epsilon = 1e-12);
        assert_eq!(vf.af(2, 1), 0.0);
        assert_eq!(vf.state(2, 1), PairState::Preset);
        // the mask hides part of surface 0 from surface 1
        assert_eq!(vf.state(1, 0), PairState::Obstructed);
        assert!(vf.f(1, 0) < 0.199_824_9);
        assert!(vf.f(1, 0) > 0.0);
    }

    #[test]
    fn single_element() {
        let surfaces = vec![
            square(0, [[0., 0., 0.], [1., 0., 0.], [1., 1., 0.], [0., 1., 0.]]),
            square(1, [[0., 0., 1.], [0., 1., 1.], [1., 1., 1.], [1., 0., 1.]]),
            square(2, [[0., 0., 0.], [0., 1., 0.], [0., 1., 1.], [0., 0., 1.]]),
        ];
        let mut settings = settings::load_default_config().unwrap();
        settings.row = Some(2);
        settings.col = Some(0);
        let p = Problem::new(Enclosure::new(surfaces).unwrap(), settings).unwrap();
        let vf = p.solve().unwrap();
        assert_relative_eq!(vf.f(2, 0), 0.200_043_8, epsilon = 5e-4);
        assert_eq!(vf.state(1, 0), PairState::NotClassified);
        assert_eq!(vf.state(2, 1), PairState::NotClassified);
    }

    #[test]
    fn row_outside_enclosure_is_rejected() {
        let mut settings = settings::load_default_config().unwrap();
        settings.row = Some(5);
        assert!(Problem::new(Enclosure::new(facing_squares()).unwrap(), settings).is_err());
    }

    #[test]
    fn crossing_surfaces_stop_the_pass() {
        let surfaces = vec![
            square(0, [[-1., -1., 0.], [1., -1., 0.], [1., 1., 0.], [-1., 1., 0.]]),
            square(1, [[0., -0.5, -1.], [0., 0.5, -1.], [0., 0.5, 1.], [0., -0.5, 1.]]),
        ];
        let err = problem(surfaces).solve().unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err.kind, ErrorKind::SurfacesIntersect { .. }));
    }
}

/// A view factor calculation over the radiating surfaces of an enclosure.
#[derive(Debug, Clone)]
pub struct Problem {
    pub enclosure: Enclosure,
    pub settings: Settings,
    possible: Vec<usize>, // surfaces able to obstruct some view
    masks: Vec<usize>,    // mask and null surfaces
}

/// One solved row: `(column, AF, state)` per pair, and the row's counters.
struct SolvedRow {
    row: usize,
    pairs: Vec<(usize, f64, PairState)>,
    stats: Stats,
}

impl Problem {
    pub fn new(enclosure: Enclosure, settings: Settings) -> Result<Self> {
        let n = enclosure.n_radiating;
        for index in [settings.row, settings.col].into_iter().flatten() {
            if index >= n {
                return Err(ErrorKind::InvalidSurface {
                    index,
                    reason: format!("only {} radiating surfaces", n),
                }
                .into());
            }
        }
        let possible = obstruction::possible_obstructions(&enclosure);
        let masks = enclosure.masks();
        Ok(Self {
            enclosure,
            settings,
            possible,
            masks,
        })
    }

    /// Rows to solve, each with the columns paired with it: the lower
    /// triangle by default, or the selected row or element.
    fn rows(&self) -> Vec<(usize, Vec<usize>)> {
        let n = self.enclosure.n_radiating;
        match (self.settings.row, self.settings.col) {
            (Some(row), Some(col)) => vec![(row, vec![col])],
            (Some(row), None) => vec![(row, (0..n).filter(|&m| m != row).collect())],
            _ => (1..n).map(|row| (row, (0..row).collect())).collect(),
        }
    }

    /// Computes the view factors. Rows are solved in parallel, each worker
    /// owning a polygon store and a control block.
    pub fn solve(&self) -> Result<ViewFactors> {
        let start = Instant::now();
        let rows = self.rows();
        info!(
            "Solving {} rows, {} possible obstructions...",
            rows.len(),
            self.possible.len()
        );

        let pb = ProgressBar::new(rows.len() as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {bar:40.green/blue} {pos:>5}/{len:5} {msg} ETA: {eta_precise}",
        ) {
            pb.set_style(style.progress_chars("█▇▆▅▄▃▂▁"));
        }
        pb.set_message("row".to_string());

        let settings = &self.settings;
        let solved = rows
            .par_iter()
            .map_init(
                || {
                    (
                        PolygonStore::new(settings.eps_dist, settings.eps_area, settings.block_bytes),
                        ViewControl::new(settings),
                    )
                },
                |(store, ctrl), (n, cols)| {
                    let row = self.solve_row(store, ctrl, *n, cols);
                    pb.inc(1);
                    row
                },
            )
            .collect::<Result<Vec<_>>>()?;
        pb.finish();

        let radiating = self.enclosure.radiating();
        let mut vf = ViewFactors::new(
            self.enclosure.areas(),
            radiating.iter().map(|s| s.base).collect(),
        );
        for row in solved {
            for (m, af, state) in row.pairs {
                vf.set(row.row, m, af, state);
            }
            vf.stats += row.stats;
        }

        info!("Time taken: {:.2?}", start.elapsed());
        info!("View factor statistics:\n{}", vf.stats);
        if vf.stats.n_fail_converge > 0 {
            warn!("Some calculations did not converge");
        }
        Ok(vf)
    }

    fn solve_row(&self, store: &mut PolygonStore, ctrl: &mut ViewControl, n: usize, cols: &[usize]) -> Result<SolvedRow> {
        store.reset(self.settings.eps_dist, self.settings.eps_area);
        let candidates = obstruction::orientation_test_n(&self.enclosure, n, &self.possible);
        let mut pairs = Vec::with_capacity(cols.len());
        for &m in cols {
            let (af, state) = self.solve_pair(store, ctrl, &candidates, n, m)?;
            pairs.push((m, af, state));
        }
        Ok(SolvedRow {
            row: n,
            pairs,
            stats: mem::take(&mut ctrl.stats),
        })
    }

    /// `A(n) * F(n, m)` and how it was reached.
    fn solve_pair(
        &self,
        store: &mut PolygonStore,
        ctrl: &mut ViewControl,
        candidates: &[usize],
        n: usize,
        m: usize,
    ) -> Result<(f64, PairState)> {
        let surfaces = &self.enclosure.surfaces;
        let (srf_n, srf_m) = (&surfaces[n], &surfaces[m]);
        ctrl.begin_pair();

        if let Some(af) = preset(srf_n, srf_m) {
            return Ok((af, PairState::Preset));
        }

        let view_n = obstruction::self_view(srf_m, srf_n);
        let view_m = obstruction::self_view(srf_n, srf_m);
        if view_n == SelfView::Partial && view_m == SelfView::Partial {
            obstruction::intersection_test(srf_n, srf_m).inspect_err(|e| error!("{}", e))?;
        }
        let (Some(work_n), Some(work_m)) = (visible_part(srf_n, srf_m, view_n), visible_part(srf_m, srf_n, view_m))
        else {
            ctrl.stats.n_zero += 1;
            debug!("AF({}, {}): no view", n, m);
            return Ok((0.0, PairState::NoView));
        };

        let dist = (work_n.centroid - work_m.centroid).norm();
        if dist < config::SHARED_CENTROID_RATIO * (work_n.rc + work_m.rc) {
            let err = ViewError::from(ErrorKind::SharedCentroid { row: n, col: m });
            error!("{}", err);
            return Err(err);
        }

        let mut remaining = candidates.to_vec();
        obstruction::cone_radius_test(surfaces, &work_n, &work_m, &mut remaining);
        obstruction::box_test(surfaces, &work_n, &work_m, &mut remaining);
        let mut found = obstruction::orientation_test(surfaces, &work_n, &work_m, &remaining);
        obstruction::add_mask_surfaces(surfaces, &self.masks, &work_n, &work_m, &mut found);
        let direction = if found.is_empty() {
            Direction::NToM
        } else {
            obstruction::projection_direction(surfaces, &work_n, &work_m, &mut found, ctrl.prj_reverse)
        };

        let (af, mut state) = if found.is_empty() {
            view_method(&work_n, &work_m, dist, ctrl);
            ctrl.eps_af = work_n.area.min(work_m.area) * ctrl.eps_adap;
            ctrl.stats.n_unobstructed += 1;
            (view_unobstructed(&work_n, &work_m, ctrl), PairState::Unobstructed)
        } else {
            let (srf1, srf2) = match direction {
                Direction::NToM => (&work_n, &work_m),
                Direction::MToN => (&work_m, &work_n),
            };
            let obstructions: Vec<&Surface> = found.iter().map(|c| &surfaces[c.index]).collect();
            let t = Transformed::new(srf1, srf2, &obstructions);
            ctrl.method = Method::Obstructed;
            ctrl.stats.n_obstructed += 1;
            ctrl.stats.n_obstructions += found.len() as u64;
            let af = view_obstructed(store, ctrl, &t).inspect_err(|e| error!("{}", e))?;
            (af, PairState::Obstructed)
        };

        let af = if af < config::AF_FLOOR * srf_n.area.max(srf_m.area) {
            0.0
        } else {
            af
        };
        if ctrl.failed() {
            ctrl.stats.n_fail_converge += 1;
            state = PairState::FailedToConverge;
            warn!("row {}, col {}: did not converge, AF = {:.6e}", n, m, af);
        }
        debug!("AF({}, {}) = {:.6e} by {}", n, m, af, ctrl.method);
        Ok((af, state))
    }

    /// Writes the view factors and the run summary to the output directory.
    pub fn writeup(&self, vf: &ViewFactors) -> anyhow::Result<()> {
        output::writeup(&self.settings, &self.enclosure, vf)
    }
}

/// AF of pairs involving a mask or null surface: its own area against its
/// base, zero against everything else.
fn preset(srf_n: &Surface, srf_m: &Surface) -> Option<f64> {
    let on = |mask: &Surface, base: &Surface| mask.kind.is_mask_or_null() && mask.base == Some(base.index);
    if on(srf_n, srf_m) {
        Some(srf_n.area)
    } else if on(srf_m, srf_n) {
        Some(srf_m.area)
    } else if srf_n.kind.is_mask_or_null() || srf_m.kind.is_mask_or_null() {
        Some(0.0)
    } else {
        None
    }
}

/// The part of `srf` in front of `viewer`.
fn visible_part(srf: &Surface, viewer: &Surface, view: SelfView) -> Option<Surface> {
    match view {
        SelfView::Hidden => None,
        SelfView::Whole => Some(srf.clone()),
        SelfView::Partial => srf.clip_above(&viewer.plane, config::PLANE_TOLERANCE * srf.rc),
    }
}
