use std::fmt;

use geo::Area;
use log::error;
use nalgebra::Point2;

use crate::error::{ErrorKind, Result};
use crate::poly::{PolyId, PolygonStore};

#[cfg(test)]
mod tests {

    use super::*;
    use approx::assert_relative_eq;

    fn pts(coords: &[(f64, f64)]) -> Vec<Point2<f64>> {
        coords.iter().map(|&(x, y)| Point2::new(x, y)).collect()
    }

    fn bounds(store: &PolygonStore, id: PolyId) -> (f64, f64, f64, f64) {
        store.edges(id).fold(
            (f64::MAX, f64::MIN, f64::MAX, f64::MIN),
            |(x0, x1, y0, y1), e| (x0.min(e.x), x1.max(e.x), y0.min(e.y), y1.max(e.y)),
        )
    }

    #[test]
    fn half_overlapping_squares() {
        let mut store = PolygonStore::new(1e-4, 1e-4, 1024);
        let clip = store
            .finalize(&pts(&[(5.0, -5.0), (5.0, 15.0), (15.0, 15.0), (15.0, -5.0)]), 1.0)
            .unwrap()
            .unwrap();
        let subject = store
            .finalize(&pts(&[(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0)]), 1.0)
            .unwrap()
            .unwrap();
        let base = store.top();

        let result = overlap(&mut store, clip, subject, OverlapMode::Both, false).unwrap();
        assert_eq!(result, Overlap::Partial);

        let pieces: Vec<PolyId> = store.iter(store.top(), base).collect();
        assert_eq!(pieces.len(), 2);

        // the inside piece is pushed last
        let inside = pieces[0];
        assert_relative_eq!(store.area(inside), 50.0, epsilon = 1e-9);
        let (x0, x1, y0, y1) = bounds(&store, inside);
        assert_relative_eq!(x0, 5.0);
        assert_relative_eq!(x1, 10.0);
        assert_relative_eq!(y0, 0.0);
        assert_relative_eq!(y1, 10.0);

        let outside = pieces[1];
        assert_relative_eq!(store.area(outside), 50.0, epsilon = 1e-9);
        let (x0, x1, _, _) = bounds(&store, outside);
        assert_relative_eq!(x0, 0.0);
        assert_relative_eq!(x1, 5.0);

        let stats = Stats::new(&store, store.area(subject), store.top(), base);
        assert_eq!(stats.pieces, 2);
        assert_relative_eq!(stats.total_consvtn, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn subject_inside_clip() {
        let mut store = PolygonStore::new(1e-6, 1e-8, 1024);
        let clip = store
            .finalize(&pts(&[(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0)]), 0.5)
            .unwrap()
            .unwrap();
        let subject_vertices = pts(&[(2.0, 2.0), (2.0, 4.0), (4.0, 4.0), (4.0, 2.0)]);
        let subject = store.finalize(&subject_vertices, 0.5).unwrap().unwrap();

        let result = overlap(&mut store, clip, subject, OverlapMode::Inside, false).unwrap();
        assert_eq!(result, Overlap::Inside);
        let inside = store.top().unwrap();
        assert_ne!(inside, subject);
        assert_relative_eq!(store.trns(inside), 0.25);
        let mut out = Vec::new();
        store.export_2d(inside, &mut out);
        assert_eq!(out, subject_vertices);
    }

    #[test]
    fn subject_outside_clip() {
        let mut store = PolygonStore::new(1e-6, 1e-8, 1024);
        let clip = store
            .finalize(&pts(&[(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0)]), 1.0)
            .unwrap()
            .unwrap();
        let subject = store
            .finalize(&pts(&[(3.0, 0.0), (3.0, 1.0), (4.0, 1.0), (4.0, 0.0)]), 1.0)
            .unwrap()
            .unwrap();
        let top = store.top();

        let result = overlap(&mut store, clip, subject, OverlapMode::Inside, false).unwrap();
        assert_eq!(result, Overlap::Outside);
        assert_eq!(store.top(), top);
    }

    #[test]
    fn consumed_subject_moves_to_new_stack() {
        let mut store = PolygonStore::new(1e-6, 1e-8, 1024);
        let shadow = store
            .finalize(&pts(&[(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0)]), 0.0)
            .unwrap()
            .unwrap();
        store.new_stack();
        let piece = store
            .finalize(&pts(&[(3.0, 0.0), (3.0, 1.0), (4.0, 1.0), (4.0, 0.0)]), 1.0)
            .unwrap()
            .unwrap();
        store.new_stack();

        let result = overlap(&mut store, shadow, piece, OverlapMode::Outside, true).unwrap();
        assert_eq!(result, Overlap::Outside);
        assert_eq!(store.top(), Some(piece));
        assert_eq!(store.next(piece), None);
    }

    #[test]
    fn hidden_subject_is_freed() {
        let mut store = PolygonStore::new(1e-6, 1e-8, 1024);
        let shadow = store
            .finalize(&pts(&[(0.0, 0.0), (0.0, 4.0), (4.0, 4.0), (4.0, 0.0)]), 0.0)
            .unwrap()
            .unwrap();
        store.new_stack();
        let piece = store
            .finalize(&pts(&[(1.0, 1.0), (1.0, 2.0), (2.0, 2.0), (2.0, 1.0)]), 1.0)
            .unwrap()
            .unwrap();
        store.new_stack();
        let before = store.usage();

        let result = overlap(&mut store, shadow, piece, OverlapMode::Outside, true).unwrap();
        assert_eq!(result, Overlap::Inside);
        assert_eq!(store.top(), None);

        // the freed records are reused
        store
            .finalize(&pts(&[(1.0, 1.0), (1.0, 2.0), (2.0, 2.0), (2.0, 1.0)]), 1.0)
            .unwrap();
        assert_eq!(store.usage(), before);
    }

    #[test]
    fn consumed_subject_is_measured_by_area() {
        let mut store = PolygonStore::new(1e-6, 1e-8, 1024);
        let shadow = store
            .finalize(&pts(&[(5.0, -5.0), (5.0, 15.0), (15.0, 15.0), (15.0, -5.0)]), 0.0)
            .unwrap()
            .unwrap();
        store.new_stack();
        let piece = store
            .finalize(&pts(&[(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0)]), 1.0)
            .unwrap()
            .unwrap();
        let subject_area = store.area(piece);
        store.new_stack();

        let result = overlap(&mut store, shadow, piece, OverlapMode::Outside, true).unwrap();
        assert_eq!(result, Overlap::Partial);

        let stats = Stats::new(&store, subject_area, store.top(), None);
        assert_eq!(stats.pieces, 1);
        assert_relative_eq!(stats.subject_area, 100.0, epsilon = 1e-9);
        assert_relative_eq!(stats.retained_area, 50.0, epsilon = 1e-9);
        assert_relative_eq!(stats.total_consvtn, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn transfer_merges_close_vertices() {
        let src = pts(&[(0.0, 0.0), (0.0, 1.0), (1e-8, 1.0), (1.0, 1.0), (1.0, 0.0)]);
        let mut dest = Vec::new();
        assert_eq!(transfer_vertices(&mut dest, &src, 1e-6), 4);
        assert_relative_eq!(dest[1].x, 0.5e-8);
    }

    #[test]
    fn transfer_merges_first_with_last() {
        let src = pts(&[(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0), (1e-8, 0.0)]);
        let mut dest = Vec::new();
        assert_eq!(transfer_vertices(&mut dest, &src, 1e-6), 4);
        assert_relative_eq!(dest[0].x, 0.5e-8);
        assert_relative_eq!(dest[3].x, 1.0);
    }

    #[test]
    fn limit_to_window() {
        let mut triangle = pts(&[(-1.0, -1.0), (3.0, 1.0), (-1.0, 3.0)]);
        let n = limit_polygon(&mut triangle, 1.0, 0.0, 1.0, 0.0);
        assert!(n >= 3);
        for p in &triangle {
            assert!(p.x > -1e-12 && p.x < 1.0 + 1e-12);
            assert!(p.y > -1e-12 && p.y < 1.0 + 1e-12);
        }
        let area: f64 = (0..n)
            .map(|i| {
                let (p, q) = (triangle[i], triangle[(i + 1) % n]);
                p.x * q.y - q.x * p.y
            })
            .sum::<f64>()
            .abs()
            * 0.5;
        assert_relative_eq!(area, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn limit_collapses_outside_window() {
        let mut square = pts(&[(2.0, 2.0), (2.0, 3.0), (3.0, 3.0), (3.0, 2.0)]);
        assert_eq!(limit_polygon(&mut square, 1.0, 0.0, 1.0, 0.0), 0);
    }
}

/// Which parts of the subject polygon an overlap computation keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapMode {
    Inside,
    Both,
    Outside,
}

impl OverlapMode {
    fn keeps_inside(self) -> bool {
        self != OverlapMode::Outside
    }

    fn keeps_outside(self) -> bool {
        self != OverlapMode::Inside
    }
}

/// How the subject lies relative to the clip polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlap {
    Outside,
    Inside,
    Partial,
}

/// Clips `subject` by the convex polygon `clip`.
///
/// Pieces requested by `mode` are pushed onto the active stack: outside pieces
/// as each edge of the clip polygon splits them off, and the inside piece, with
/// transparency `subject * clip`, last. A subject found entirely outside has
/// any outside pieces withdrawn and is pushed whole instead (moved there when
/// `consume` is set, copied otherwise). With `consume` set, a subject that was
/// not moved is released before returning.
pub fn overlap(
    store: &mut PolygonStore,
    clip: PolyId,
    subject: PolyId,
    mode: OverlapMode,
    consume: bool,
) -> Result<Overlap> {
    let eps_area = store.eps_area;
    let eps_dist = store.eps_dist;
    let initial_top = store.top();
    let clip_edges: Vec<_> = store.edges(clip).collect();

    let mut temp = Vec::new();
    let mut left = Vec::new();
    let mut right = Vec::new();
    let mut sides = Vec::new();
    let mut split = false;
    let mut n_temp = store.export_2d(subject, &mut temp);

    let mut outside = false;
    for edge in clip_edges.iter() {
        sides.clear();
        let mut all_left = true;
        let mut all_right = true;
        for v in temp.iter() {
            let dot = edge.side(v);
            if dot > eps_area {
                sides.push(1);
                all_right = false;
            } else if dot < -eps_area {
                sides.push(-1);
                all_left = false;
            } else {
                sides.push(0);
            }
        }
        if all_right {
            continue;
        }
        if all_left {
            outside = true;
            break;
        }

        left.clear();
        right.clear();
        let mut jm1 = n_temp - 1;
        for j in 0..n_temp {
            if sides[jm1] * sides[j] < 0 {
                let (p, q) = (temp[jm1], temp[j]);
                let a = p.y - q.y;
                let b = q.x - p.x;
                let c = q.y * p.x - p.y * q.x;
                let w = b * edge.a - a * edge.b;
                let scale = (a.abs() + b.abs()) * (edge.a.abs() + edge.b.abs());
                if w == 0.0 || w.abs() < f64::EPSILON * scale {
                    error!(
                        "homogeneous intersection weight {:e} for edge ({}, {}) -> ({}, {})",
                        w, p.x, p.y, q.x, q.y
                    );
                    return Err(ErrorKind::ZeroHomogeneousWeight { w }.into());
                }
                let cross = Point2::new(
                    (c * edge.b - b * edge.c) / w,
                    (a * edge.c - c * edge.a) / w,
                );
                left.push(cross);
                right.push(cross);
            }
            if sides[j] >= 0 {
                left.push(temp[j]);
            }
            if sides[j] <= 0 {
                right.push(temp[j]);
            }
            jm1 = j;
        }

        n_temp = transfer_vertices(&mut temp, &left, eps_dist);
        if n_temp > 2 {
            split = true;
            if mode.keeps_outside() {
                store.finalize(&temp, store.trns(subject))?;
            }
        }

        n_temp = transfer_vertices(&mut temp, &right, eps_dist);
        // two rather than three lets degenerate subjects through when eps_area is zero
        if n_temp < 2 {
            outside = true;
            break;
        }
    }

    let mut consumed = false;
    let mut result = if split { Overlap::Partial } else { Overlap::Inside };

    if !outside && mode.keeps_inside() {
        let trns = store.trns(subject) * store.trns(clip);
        if store.finalize(&temp, trns)?.is_none() {
            outside = true;
        }
    }

    if outside {
        result = Overlap::Outside;
        if mode.keeps_outside() {
            // withdraw the outside pieces split off so far
            if let Some(top) = store.top().filter(|&top| Some(top) != initial_top) {
                store.free_polygons(top, initial_top);
            }
            store.set_top(initial_top);
            if consume {
                store.push(subject);
                consumed = true;
            } else {
                store.copy_polygon(subject)?;
            }
        }
    }

    if consume && !consumed {
        let next = store.next(subject);
        store.free_polygons(subject, next);
    }

    Ok(result)
}

/// Copies `src` into `dest`, merging each vertex that lies within `eps_dist`
/// of its predecessor into the predecessor by averaging. The first vertex is
/// averaged with the last when they are close. Returns the surviving count.
pub fn transfer_vertices(dest: &mut Vec<Point2<f64>>, src: &[Point2<f64>], eps_dist: f64) -> usize {
    dest.clear();
    let mut n_src = src.len();
    if n_src == 0 {
        return 0;
    }
    let mut jm1 = n_src - 1;
    let mut j = 0;
    while j < n_src {
        let (p, prior) = (src[j], src[jm1]);
        if (p.x - prior.x).abs() > eps_dist || (p.y - prior.y).abs() > eps_dist {
            dest.push(p);
        } else if let Some(last) = dest.last_mut() {
            *last = Point2::new(0.5 * (last.x + p.x), 0.5 * (last.y + p.y));
        } else {
            dest.push(Point2::new(0.5 * (prior.x + p.x), 0.5 * (prior.y + p.y)));
            // the last vertex has been absorbed
            n_src -= 1;
        }
        jm1 = j;
        j += 1;
    }
    dest.len()
}

/// Clips a polygon in place to the window `[min_x, max_x] x [min_y, max_y]`,
/// one side at a time. Returns 0 if a pass leaves fewer than 3 vertices, else
/// the number of vertices left in `vertices`.
pub fn limit_polygon(
    vertices: &mut Vec<Point2<f64>>,
    max_x: f64,
    min_x: f64,
    max_y: f64,
    min_y: f64,
) -> usize {
    let mut temp = Vec::with_capacity(vertices.len() + 4);
    let passes = [(0, max_x, true), (0, min_x, false), (1, max_y, true), (1, min_y, false)];
    for (axis, bound, upper) in passes {
        clip_to_bound(vertices, &mut temp, axis, bound, upper);
        std::mem::swap(vertices, &mut temp);
        if vertices.len() < 3 {
            vertices.clear();
            return 0;
        }
    }
    vertices.len()
}

/// Keeps the part of `src` on the inner side of the line `coord[axis] = bound`.
fn clip_to_bound(src: &[Point2<f64>], dst: &mut Vec<Point2<f64>>, axis: usize, bound: f64, upper: bool) {
    dst.clear();
    let beyond = |v: f64| if upper { v - bound } else { bound - v };
    let other = 1 - axis;
    let n = src.len();
    for i in 0..n {
        let (p, q) = (src[i], src[(i + 1) % n]);
        let (sp, sq) = (beyond(p[axis]), beyond(q[axis]));
        let crossing = || {
            let mut cut = p;
            cut[axis] = bound;
            cut[other] = p[other] + (bound - p[axis]) * (q[other] - p[other]) / (q[axis] - p[axis]);
            cut
        };
        if sp < 0.0 {
            dst.push(p);
            if sq > 0.0 {
                dst.push(crossing());
            }
        } else if sp > 0.0 {
            if sq < 0.0 {
                dst.push(crossing());
            }
        } else {
            dst.push(p);
        }
    }
}

/// Area bookkeeping for one overlap computation.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Stats {
    pub subject_area: f64,  // area of the subject polygon
    pub retained_area: f64, // total area of the pieces left on the stack
    pub pieces: usize,      // number of pieces left on the stack
    pub total_consvtn: f64, // ratio of retained to subject area
}

impl Stats {
    /// Measures the run of polygons from `first` up to `last` against a
    /// subject of `subject_area`. The subject may already be consumed.
    pub fn new(store: &PolygonStore, subject_area: f64, first: Option<PolyId>, last: Option<PolyId>) -> Self {
        let (retained_area, pieces) = store
            .iter(first, last)
            .fold((0.0, 0), |(area, count), id| {
                (area + store.to_geo(id).unsigned_area(), count + 1)
            });
        let total_consvtn = if subject_area == 0.0 {
            0.0 // Avoid division by zero
        } else {
            retained_area / subject_area
        };
        Self {
            subject_area,
            retained_area,
            pieces,
            total_consvtn,
        }
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Subject Area: {}\nRetained Area: {}\nPieces: {}\nConservation (Retained/Subject): {}",
            self.subject_area, self.retained_area, self.pieces, self.total_consvtn
        )
    }
}
