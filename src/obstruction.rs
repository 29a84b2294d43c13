//! Pruning of the surfaces that may block the view between two surfaces.
//!
//! The tests run from cheapest to most expensive, each one shrinking the
//! candidate list: radius cone, bounding box, then plane orientation. Mask
//! surfaces are added last, and the projection direction decides which
//! candidates are kept for integration.

use log::debug;
use nalgebra::Point3;

use crate::config;
use crate::error::{ErrorKind, Result};
use crate::geom::{bounds_of, Enclosure, Plane, Surface};


/// Where a surface lies relative to a plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Front,
    Behind,
    Straddle,
    Coplanar,
}

impl Side {
    /// At least part of the surface is in front of the plane, or in it.
    pub fn faces(self) -> bool {
        self != Side::Behind
    }
}

fn plane_tolerance(srf: &Surface) -> f64 {
    config::PLANE_TOLERANCE * srf.rc
}

pub fn side_of(srf: &Surface, plane: &Plane) -> Side {
    let tol = plane_tolerance(srf);
    let heights = srf.heights_above(plane);
    let front = heights.iter().any(|&h| h > tol);
    let behind = heights.iter().any(|&h| h < -tol);
    match (front, behind) {
        (true, true) => Side::Straddle,
        (true, false) => Side::Front,
        (false, true) => Side::Behind,
        (false, false) => Side::Coplanar,
    }
}

/// How much of a target surface a viewing surface can see, judged by the
/// plane of the viewer alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfView {
    Hidden,  // the target is behind or in the plane of the viewer
    Whole,   // the target is wholly in front of the viewer
    Partial, // the target must be clipped to the front of the viewer
}

pub fn self_view(viewer: &Surface, target: &Surface) -> SelfView {
    match side_of(target, &viewer.plane) {
        Side::Behind | Side::Coplanar => SelfView::Hidden,
        Side::Front => SelfView::Whole,
        Side::Straddle => SelfView::Partial,
    }
}

/// Surfaces able to obstruct any view: those with other surfaces strictly
/// on both sides of their plane.
pub fn possible_obstructions(enclosure: &Enclosure) -> Vec<usize> {
    let surfaces = &enclosure.surfaces;
    let possible: Vec<usize> = surfaces
        .iter()
        .filter(|k| k.kind.can_obstruct())
        .filter(|k| {
            let tol = plane_tolerance(k);
            let mut front = false;
            let mut behind = false;
            for srf in surfaces.iter().filter(|s| s.index != k.index) {
                for h in srf.heights_above(&k.plane) {
                    front |= h > tol;
                    behind |= h < -tol;
                }
            }
            front && behind
        })
        .map(|k| k.index)
        .collect();
    debug!("possible obstructions: {:?}", possible);
    possible
}

/// Drops `n` and the candidates with no vertex strictly in front of surface `n`.
pub fn orientation_test_n(enclosure: &Enclosure, n: usize, possible: &[usize]) -> Vec<usize> {
    let srf_n = &enclosure.surfaces[n];
    possible
        .iter()
        .copied()
        .filter(|&k| k != n)
        .filter(|&k| {
            let srf_k = &enclosure.surfaces[k];
            let tol = plane_tolerance(srf_k);
            srf_k.heights_above(&srf_n.plane).iter().any(|&h| h > tol)
        })
        .collect()
}

/// Fails if an edge of either surface pierces the interior of the other.
/// Called only when each surface straddles the plane of the other.
pub fn intersection_test(srf_n: &Surface, srf_m: &Surface) -> Result<()> {
    if pierces(srf_n, srf_m) || pierces(srf_m, srf_n) {
        return Err(ErrorKind::SurfacesIntersect {
            row: srf_n.index,
            col: srf_m.index,
        }
        .into());
    }
    Ok(())
}

// Does an edge of `a` cross the plane of `b` strictly inside `b`?
fn pierces(a: &Surface, b: &Surface) -> bool {
    let tol = plane_tolerance(b);
    let heights = a.heights_above(&b.plane);
    let n = a.vertices.len();
    (0..n).any(|i| {
        let j = (i + 1) % n;
        let (hi, hj) = (heights[i], heights[j]);
        if !((hi > tol && hj < -tol) || (hi < -tol && hj > tol)) {
            return false;
        }
        let t = hi / (hi - hj);
        let x = a.vertices[i] + (a.vertices[j] - a.vertices[i]) * t;
        strictly_inside(b, &x, tol)
    })
}

fn strictly_inside(srf: &Surface, x: &Point3<f64>, tol: f64) -> bool {
    let v = &srf.vertices;
    let n = v.len();
    (0..n).all(|i| {
        let edge = v[(i + 1) % n] - v[i];
        edge.cross(&(x - v[i])).dot(&srf.plane.normal) > tol * edge.norm()
    })
}

/// Removes candidates outside the convex hull of the spheres enclosing
/// surfaces N and M.
pub fn cone_radius_test(surfaces: &[Surface], srf_n: &Surface, srf_m: &Surface, candidates: &mut Vec<usize>) {
    let axis = srf_m.centroid - srf_n.centroid;
    let growth = srf_m.rc - srf_n.rc;
    candidates.retain(|&k| {
        if k == srf_n.index || k == srf_m.index {
            return false;
        }
        let srf_k = &surfaces[k];
        // gap between K's centre and the sphere interpolated at t; convex in t
        let gap = |t: f64| (srf_k.centroid - (srf_n.centroid + axis * t)).norm() - (srf_n.rc + growth * t);
        let (mut lo, mut hi) = (0.0, 1.0);
        for _ in 0..60 {
            let t1 = lo + (hi - lo) / 3.0;
            let t2 = hi - (hi - lo) / 3.0;
            if gap(t1) < gap(t2) {
                hi = t2;
            } else {
                lo = t1;
            }
        }
        gap(0.5 * (lo + hi)) <= srf_k.rc
    });
}

/// Removes candidates whose bounding box misses the box around N and M.
pub fn box_test(surfaces: &[Surface], srf_n: &Surface, srf_m: &Surface, candidates: &mut Vec<usize>) {
    let corners: Vec<Point3<f64>> = srf_n.vertices.iter().chain(srf_m.vertices.iter()).copied().collect();
    let (lo, hi) = bounds_of(&corners);
    let tol = config::PLANE_TOLERANCE * (srf_n.rc + srf_m.rc);
    candidates.retain(|&k| {
        let (k_lo, k_hi) = surfaces[k].bounds();
        (0..3).all(|axis| k_lo[axis] < hi[axis] - tol && k_hi[axis] > lo[axis] + tol)
    });
}

/// A surface that may block the view between N and M, with the side of its
/// plane each of them is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub index: usize,
    pub n_rel: Side,
    pub m_rel: Side,
}

/// Keeps candidates whose plane separates N and M, or that N or M straddle,
/// and that have a vertex strictly in front of M.
pub fn orientation_test(
    surfaces: &[Surface],
    srf_n: &Surface,
    srf_m: &Surface,
    candidates: &[usize],
) -> Vec<Candidate> {
    candidates
        .iter()
        .filter_map(|&k| {
            let srf_k = &surfaces[k];
            let tol = plane_tolerance(srf_k);
            if !srf_k.heights_above(&srf_m.plane).iter().any(|&h| h > tol) {
                return None;
            }
            let n_rel = side_of(srf_n, &srf_k.plane);
            let m_rel = side_of(srf_m, &srf_k.plane);
            let separated = match (n_rel, m_rel) {
                (Side::Coplanar, _) | (_, Side::Coplanar) => false,
                (Side::Front, Side::Front) | (Side::Behind, Side::Behind) => false,
                _ => true,
            };
            separated.then_some(Candidate { index: k, n_rel, m_rel })
        })
        .collect()
}

/// Adds the mask and null surfaces lying on N or M.
pub fn add_mask_surfaces(
    surfaces: &[Surface],
    masks: &[usize],
    srf_n: &Surface,
    srf_m: &Surface,
    candidates: &mut Vec<Candidate>,
) {
    for &k in masks {
        if k == srf_n.index || k == srf_m.index {
            continue;
        }
        let srf_k = &surfaces[k];
        if srf_k.base == Some(srf_n.index) || srf_k.base == Some(srf_m.index) {
            candidates.push(Candidate {
                index: k,
                n_rel: side_of(srf_n, &srf_k.plane),
                m_rel: side_of(srf_m, &srf_k.plane),
            });
        }
    }
}

/// Direction in which obstructions are projected: from surface 1 onto surface 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    NToM,
    MToN,
}

/// Chooses the projection direction and keeps only the candidates facing
/// surface 2. Surface 2 is preferably the one nearer the obstructions; when
/// the distances are within the guard band, the one faced by fewer candidates
/// becomes surface 1.
pub fn projection_direction(
    surfaces: &[Surface],
    srf_n: &Surface,
    srf_m: &Surface,
    candidates: &mut Vec<Candidate>,
    prj_reverse: bool,
) -> Direction {
    let nearest = |srf: &Surface, faces: &dyn Fn(&Candidate) -> bool| {
        candidates
            .iter()
            .filter(|c| faces(c))
            .map(|c| (surfaces[c.index].centroid - srf.centroid).norm())
            .fold(f64::MAX, f64::min)
    };
    let to_n = nearest(srf_n, &|c| c.n_rel.faces());
    let to_m = nearest(srf_m, &|c| c.m_rel.faces());

    let mut direction = None;
    if (to_n - to_m).abs() > config::PROJECTION_GUARD_BAND * (to_n + to_m) {
        direction = Some(if to_n < to_m { Direction::MToN } else { Direction::NToM });
    }
    let mut direction = direction.unwrap_or_else(|| {
        let facing_n = candidates.iter().filter(|c| c.n_rel.faces()).count();
        let facing_m = candidates.iter().filter(|c| c.m_rel.faces()).count();
        if facing_n > facing_m {
            Direction::NToM
        } else {
            Direction::MToN
        }
    });
    if prj_reverse {
        direction = match direction {
            Direction::NToM => Direction::MToN,
            Direction::MToN => Direction::NToM,
        };
    }

    match direction {
        Direction::NToM => candidates.retain(|c| c.m_rel.faces()),
        Direction::MToN => candidates.retain(|c| c.n_rel.faces()),
    }
    debug!(
        "projection {:?}: nearest {:.4e} to N, {:.4e} to M, keeps {:?}",
        direction,
        to_n,
        to_m,
        candidates.iter().map(|c| c.index).collect::<Vec<_>>()
    );
    direction
}
