use std::fmt;

use ndarray::Array2;
use serde::Serialize;

use crate::control::Stats;


/// Outcome of one surface pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PairState {
    #[default]
    NotClassified,
    Preset,           // mask or null surface
    NoView,           // surfaces face away from each other
    Unobstructed,     // integrated with a clear view
    Obstructed,       // integrated around obstructions
    FailedToConverge, // best estimate kept
}

/// Area-weighted view factors `A(n) * F(n, m)` of the radiating surfaces.
/// Only the lower triangle is stored; `af(n, m)` and `af(m, n)` are equal.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewFactors {
    af: Array2<f64>,
    states: Array2<PairState>,
    pub areas: Vec<f64>,
    pub bases: Vec<Option<usize>>, // base surface of subsurfaces, masks and nulls
    pub stats: Stats,
}

impl ViewFactors {
    pub fn new(areas: Vec<f64>, bases: Vec<Option<usize>>) -> Self {
        let n = areas.len();
        Self {
            af: Array2::zeros((n, n)),
            states: Array2::from_elem((n, n), PairState::default()),
            areas,
            bases,
            stats: Stats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    fn index(n: usize, m: usize) -> [usize; 2] {
        [n.max(m), n.min(m)]
    }

    pub fn set(&mut self, n: usize, m: usize, af: f64, state: PairState) {
        let ix = Self::index(n, m);
        self.af[ix] = af;
        self.states[ix] = state;
    }

    pub fn af(&self, n: usize, m: usize) -> f64 {
        if n == m {
            return 0.0;
        }
        self.af[Self::index(n, m)]
    }

    pub fn state(&self, n: usize, m: usize) -> PairState {
        self.states[Self::index(n, m)]
    }

    /// View factor from surface `n` to surface `m`.
    pub fn f(&self, n: usize, m: usize) -> f64 {
        self.af(n, m) / self.areas[n]
    }

    pub fn f_matrix(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.len(), self.len()), |(n, m)| self.f(n, m))
    }

    /// Sum of `F(n, m)` over the columns not lying on a base surface.
    pub fn row_sums(&self) -> Vec<f64> {
        (0..self.len())
            .map(|n| {
                let sum: f64 = (0..self.len())
                    .filter(|&m| self.bases[m].is_none())
                    .map(|m| self.af(n, m))
                    .sum();
                sum / self.areas[n]
            })
            .collect()
    }

    /// Departure of each row sum from 1, as expected in a closed enclosure.
    pub fn row_sum_errors(&self) -> RowSumErrors {
        let mut errors: Vec<(usize, f64)> = self
            .row_sums()
            .into_iter()
            .map(|sum| (sum - 1.0).abs())
            .enumerate()
            .collect();
        let max = errors.iter().map(|&(_, e)| e).fold(0.0, f64::max);
        let rms = if errors.is_empty() {
            0.0
        } else {
            (errors.iter().map(|&(_, e)| e * e).sum::<f64>() / errors.len() as f64).sqrt()
        };
        errors.retain(|&(_, e)| e > ROW_SUM_REPORT);
        errors.sort_by(|a, b| b.1.total_cmp(&a.1));
        errors.truncate(ROW_SUM_LARGEST);
        RowSumErrors {
            max,
            rms,
            largest: errors,
        }
    }

    pub fn failed_to_converge(&self) -> Vec<(usize, usize)> {
        self.states
            .indexed_iter()
            .filter(|(_, state)| **state == PairState::FailedToConverge)
            .map(|((n, m), _)| (n, m))
            .collect()
    }
}

/// Row sum errors below this are not listed.
const ROW_SUM_REPORT: f64 = 0.5e-6;
const ROW_SUM_LARGEST: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowSumErrors {
    pub max: f64,
    pub rms: f64,
    pub largest: Vec<(usize, f64)>, // (row, |sum - 1|), largest first
}

impl fmt::Display for RowSumErrors {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Max row sum error: {:.3e}", self.max)?;
        write!(f, "RMS row sum error: {:.3e}", self.rms)?;
        if !self.largest.is_empty() {
            write!(f, "\nLargest errors [row, error]:")?;
            for (row, error) in &self.largest {
                write!(f, "\n{:>8} {:.3e}", row, error)?;
            }
        }
        Ok(())
    }
}
