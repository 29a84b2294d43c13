//! Integration parameters and running statistics shared by the view factor kernels.

use std::fmt;
use std::ops::{Add, AddAssign};

use serde::Serialize;

use crate::config::{self, MethodThresholds};
use crate::settings::Settings;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_add_up() {
        let mut a = Stats::default();
        a.n_obstructed = 2;
        a.record_method(Method::Sai, 3);
        let mut b = Stats::default();
        b.n_obstructed = 1;
        b.record_method(Method::Sai, 3);
        b.record_fix(Method::Dli);
        let sum = a + b;
        assert_eq!(sum.n_obstructed, 3);
        assert_eq!(sum.method_counts[Method::Sai.slot()][1], 2);
        assert_eq!(sum.method_counts[Method::Dli.slot()][3], 1);
    }

    #[test]
    fn method_names() {
        assert_eq!(Method::Dai.to_string(), "2AI");
        assert_eq!(Method::Ali.to_string(), "ALI");
        assert_eq!(Method::Obstructed.to_string(), "ADAPT");
    }
}

/// Integration method chosen for a pair of surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Method {
    #[default]
    Dai, // double area integration
    Sai,        // single area integration
    Dli,        // double line integration
    Sli,        // single line integration
    Ali,        // adaptive single line integration
    Obstructed, // adaptive obstructed area integration
}

impl Method {
    pub const UNOBSTRUCTED: [Method; 5] =
        [Method::Dai, Method::Sai, Method::Dli, Method::Sli, Method::Ali];

    /// Row of the method statistics table; the obstructed method has none.
    pub fn slot(self) -> usize {
        match self {
            Method::Dai => 0,
            Method::Sai => 1,
            Method::Dli => 2,
            Method::Sli => 3,
            Method::Ali | Method::Obstructed => 4,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Method::Dai => "2AI",
            Method::Sai => "1AI",
            Method::Dli => "2LI",
            Method::Sli => "1LI",
            Method::Ali => "ALI",
            Method::Obstructed => "ADAPT",
        };
        write!(f, "{}", name)
    }
}

/// Counters accumulated over a pass. Rows are solved independently and
/// their counters summed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stats {
    pub n_zero: u64,                     // pairs with no view
    pub n_unobstructed: u64,             // pairs integrated without obstructions
    pub n_obstructed: u64,               // pairs integrated with obstructions
    pub n_obstructions: u64,             // obstructions summed over obstructed pairs
    pub method_counts: [[u64; 4]; 5],    // [method][2, 3, 4 divisions, fix]
    pub used_v1li_adapt: u64,            // edge points of adaptive line integration
    pub used_v_obs: u64,                 // obstructed elements accepted
    pub wasted_v_obs: u64,               // obstructed elements refined away
    pub tot_vpt: u64,                    // viewpoints evaluated
    pub tot_poly: u64,                   // visible polygons summed over viewpoints
    pub n_fail_converge: u64,            // pairs that did not converge
}

impl Stats {
    /// Counts a pair accepted by `method` with `divisions` Gauss points per edge.
    pub fn record_method(&mut self, method: Method, divisions: usize) {
        let column = divisions
            .clamp(config::MIN_EDGE_DIVISIONS, config::MAX_EDGE_DIVISIONS)
            - config::MIN_EDGE_DIVISIONS;
        self.method_counts[method.slot()][column] += 1;
    }

    /// Counts a pair whose method did not converge and was fixed by adaptive line integration.
    pub fn record_fix(&mut self, method: Method) {
        self.method_counts[method.slot()][3] += 1;
    }
}

impl AddAssign for Stats {
    fn add_assign(&mut self, other: Self) {
        self.n_zero += other.n_zero;
        self.n_unobstructed += other.n_unobstructed;
        self.n_obstructed += other.n_obstructed;
        self.n_obstructions += other.n_obstructions;
        for (row, other_row) in self.method_counts.iter_mut().zip(other.method_counts.iter()) {
            for (a, b) in row.iter_mut().zip(other_row.iter()) {
                *a += b;
            }
        }
        self.used_v1li_adapt += other.used_v1li_adapt;
        self.used_v_obs += other.used_v_obs;
        self.wasted_v_obs += other.wasted_v_obs;
        self.tot_vpt += other.tot_vpt;
        self.tot_poly += other.tot_poly;
        self.n_fail_converge += other.n_fail_converge;
    }
}

impl Add for Stats {
    type Output = Stats;

    fn add(mut self, other: Self) -> Stats {
        self += other;
        self
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{:>8} pairs with no view", self.n_zero)?;
        writeln!(f, "{:>8} unobstructed pairs", self.n_unobstructed)?;
        writeln!(f, "{:>8} obstructed pairs", self.n_obstructed)?;
        if self.n_obstructed > 0 {
            writeln!(
                f,
                "{:>8.2} obstructions per obstructed pair",
                self.n_obstructions as f64 / self.n_obstructed as f64
            )?;
        }
        writeln!(f, "  method   2 div   3 div   4 div    fix")?;
        for method in Method::UNOBSTRUCTED {
            let row = &self.method_counts[method.slot()];
            writeln!(
                f,
                "  {:<6} {:>7} {:>7} {:>7} {:>6}",
                method.to_string(),
                row[0],
                row[1],
                row[2],
                row[3]
            )?;
        }
        writeln!(f, "{:>8} adaptive line integration points", self.used_v1li_adapt)?;
        writeln!(
            f,
            "{:>8} obstructed elements used, {} wasted",
            self.used_v_obs, self.wasted_v_obs
        )?;
        if self.tot_vpt > 0 {
            writeln!(
                f,
                "{:>8} viewpoints, {:.2} polygons per viewpoint",
                self.tot_vpt,
                self.tot_poly as f64 / self.tot_vpt as f64
            )?;
        }
        write!(f, "{:>8} pairs failed to converge", self.n_fail_converge)
    }
}

/// Parameters and per-pair state of the integration kernels.
#[derive(Debug, Clone)]
pub struct ViewControl {
    pub eps_adap: f64,
    pub max_recurs_ali: u32,
    pub max_recursion: u32,
    pub min_recursion: u32,
    pub prj_reverse: bool,
    pub thresholds: MethodThresholds,

    // set for each pair
    pub method: Method,
    pub eps_af: f64,        // absolute convergence of the current pair
    pub rc_ratio: f64,      // larger over smaller radius
    pub rel_sep: f64,       // centroid separation over summed radii
    pub n_edge_div: usize,  // Gauss points per edge that converged
    pub fail_view_ali: bool,
    pub fail_recursion: bool,

    pub stats: Stats,
}

impl ViewControl {
    pub fn new(settings: &Settings) -> Self {
        Self {
            eps_adap: settings.eps_adap,
            max_recurs_ali: settings.max_recurs_ali,
            max_recursion: settings.max_recursion,
            min_recursion: settings.min_recursion,
            prj_reverse: settings.prj_reverse,
            thresholds: MethodThresholds::for_convergence(settings.eps_adap),
            method: Method::default(),
            eps_af: 0.0,
            rc_ratio: 1.0,
            rel_sep: 0.0,
            n_edge_div: 0,
            fail_view_ali: false,
            fail_recursion: false,
            stats: Stats::default(),
        }
    }

    /// Clears the per-pair state.
    pub fn begin_pair(&mut self) {
        self.method = Method::default();
        self.eps_af = 0.0;
        self.rc_ratio = 1.0;
        self.rel_sep = 0.0;
        self.n_edge_div = 0;
        self.fail_view_ali = false;
        self.fail_recursion = false;
    }

    pub fn failed(&self) -> bool {
        self.fail_view_ali || self.fail_recursion
    }
}
