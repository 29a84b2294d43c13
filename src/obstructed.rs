//! View factors between surfaces with obstructions in between.
//!
//! Surface 1 is split into triangles and parallelograms. From each Gauss
//! viewpoint the shadows of the obstructions are projected onto surface 2 and
//! cut away from it with the polygon clipper; the view factor to what is left
//! is integrated exactly. Elements are subdivided into four until the coarse
//! and fine estimates agree.

use log::{debug, log_enabled, Level};
use nalgebra::{Point2, Point3, Vector3};

use crate::clip::{limit_polygon, overlap, OverlapMode, Stats};
use crate::config;
use crate::control::ViewControl;
use crate::error::Result;
use crate::geom::{bounds_of, Plane, Shape, Surface};
use crate::poly::{PolyId, PolygonStore};
use crate::quadrature::{area_points, point_polygon_factor};
use crate::transform::Transformed;


/// A triangle or parallelogram of surface 1.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub vertices: Vec<Point3<f64>>,
    pub shape: Shape,
}

impl Element {
    pub fn area(&self) -> f64 {
        let v = &self.vertices;
        match self.shape {
            Shape::Triangle => 0.5 * (v[1] - v[0]).cross(&(v[2] - v[0])).norm(),
            _ => (v[1] - v[0]).cross(&(v[3] - v[0])).norm(),
        }
    }

    /// The four similar elements joining the vertices and edge midpoints.
    pub fn children(&self) -> Vec<Element> {
        let v = &self.vertices;
        let mid = |a: usize, b: usize| Point3::from((v[a].coords + v[b].coords) * 0.5);
        match self.shape {
            Shape::Triangle => {
                let (m01, m12, m20) = (mid(0, 1), mid(1, 2), mid(2, 0));
                vec![
                    triangle(v[0], m01, m20),
                    triangle(m01, v[1], m12),
                    triangle(m20, m12, v[2]),
                    triangle(m01, m12, m20),
                ]
            }
            _ => {
                let (m01, m12, m23, m30) = (mid(0, 1), mid(1, 2), mid(2, 3), mid(3, 0));
                let c = mid(0, 2);
                vec![
                    parallelogram(v[0], m01, c, m30),
                    parallelogram(m01, v[1], m12, c),
                    parallelogram(c, m12, v[2], m23),
                    parallelogram(m30, c, m23, v[3]),
                ]
            }
        }
    }
}

fn triangle(a: Point3<f64>, b: Point3<f64>, c: Point3<f64>) -> Element {
    Element {
        vertices: vec![a, b, c],
        shape: Shape::Triangle,
    }
}

fn parallelogram(a: Point3<f64>, b: Point3<f64>, c: Point3<f64>, d: Point3<f64>) -> Element {
    Element {
        vertices: vec![a, b, c, d],
        shape: Shape::Parallelogram,
    }
}

/// Splits a surface into triangles and parallelograms.
pub fn subsurfaces(srf: &Surface) -> Vec<Element> {
    let v = &srf.vertices;
    match srf.shape {
        Shape::Triangle => vec![triangle(v[0], v[1], v[2])],
        Shape::Parallelogram => vec![parallelogram(v[0], v[1], v[2], v[3])],
        Shape::General => v[1..]
            .windows(2)
            .map(|pair| triangle(v[0], pair[0], pair[1]))
            .collect(),
    }
}

/// `A1 * F12` between the transformed surfaces, in the original units.
pub fn view_obstructed(store: &mut PolygonStore, ctrl: &mut ViewControl, t: &Transformed) -> Result<f64> {
    ctrl.fail_recursion = false;
    let mut calc = 0.0;
    let mut view = ObstructedView::new(store, ctrl, t);
    for element in subsurfaces(&t.srf1) {
        view.ctrl.eps_af = element.area().min(t.srf2.area) * view.ctrl.eps_adap;
        let coarse = view.estimate(&element)?;
        calc += view.refine(&element, coarse, 0)?;
    }
    debug!(
        "obstructed view {} to {}: {:.6e}",
        t.srf1.index,
        t.srf2.index,
        calc * t.scale * t.scale
    );
    Ok(calc * t.scale * t.scale)
}

struct ObstructedView<'a> {
    store: &'a mut PolygonStore,
    ctrl: &'a mut ViewControl,
    t: &'a Transformed,
    target: Vec<Point2<f64>>, // surface 2, clockwise
    window: (f64, f64, f64, f64), // max x, min x, max y, min y of surface 2
}

impl<'a> ObstructedView<'a> {
    fn new(store: &'a mut PolygonStore, ctrl: &'a mut ViewControl, t: &'a Transformed) -> Self {
        // counter-clockwise seen from +z, reversed for the clipper
        let target: Vec<Point2<f64>> = t.srf2.vertices.iter().rev().map(|v| Point2::new(v.x, v.y)).collect();
        let (lo, hi) = bounds_of(&t.srf2.vertices);
        Self {
            store,
            ctrl,
            t,
            target,
            window: (hi.x, lo.x, hi.y, lo.y),
        }
    }

    fn refine(&mut self, element: &Element, coarse: f64, level: u32) -> Result<f64> {
        let children = element.children();
        let fine: Vec<f64> = children
            .iter()
            .map(|child| self.estimate(child))
            .collect::<Result<_>>()?;
        let total: f64 = fine.iter().sum();
        let converged = (total - coarse).abs() <= self.ctrl.eps_af;

        if (converged && level >= self.ctrl.min_recursion) || level >= self.ctrl.max_recursion {
            if !converged {
                self.ctrl.fail_recursion = true;
            }
            self.ctrl.stats.used_v_obs += children.len() as u64;
            return Ok(total);
        }
        self.ctrl.stats.wasted_v_obs += children.len() as u64;
        let mut sum = 0.0;
        for (child, coarse) in children.iter().zip(fine) {
            sum += self.refine(child, coarse, level + 1)?;
        }
        Ok(sum)
    }

    /// Gauss estimate of the element's share of `A1 * F12`.
    fn estimate(&mut self, element: &Element) -> Result<f64> {
        let mut af = 0.0;
        for (p, w) in area_points(&element.vertices, element.shape, config::OBSTRUCTED_DIVISIONS) {
            if self.t.view_masks.iter().any(|mask| contains(mask, &p)) {
                continue;
            }
            let f = self.visible_factor(&p)?;
            if f > 0.0 {
                self.ctrl.stats.tot_vpt += 1;
            }
            af += w * f;
        }
        Ok(af)
    }

    /// View factor from the viewpoint `p` to the unshadowed part of surface 2.
    fn visible_factor(&mut self, p: &Point3<f64>) -> Result<f64> {
        if p.z <= self.store.eps_dist {
            return Ok(0.0);
        }
        let store = &mut *self.store;
        store.new_stack();
        let mut visible = match store.finalize(&self.target, 1.0)? {
            Some(id) => Some(id),
            None => return Ok(0.0),
        };
        let target_area = visible.map_or(0.0, |id| store.area(id));
        let mut shadows: Option<PolyId> = None;

        let (max_x, min_x, max_y, min_y) = self.window;
        // only the parts of obstructions below the viewpoint cast shadows
        let ceiling = Plane::new(-Vector3::z(), &Point3::new(0.0, 0.0, p.z * (1.0 - config::PLANE_TOLERANCE)));
        let mut outline = Vec::new();
        for obstruction in &self.t.obstructions {
            let Some(below) = obstruction.clip_above(&ceiling, 0.0) else {
                continue;
            };
            outline.clear();
            outline.extend(below.vertices.iter().map(|q| {
                let s = p.z / (p.z - q.z);
                Point2::new(p.x + (q.x - p.x) * s, p.y + (q.y - p.y) * s)
            }));
            if signed_area(&outline) > 0.0 {
                outline.reverse();
            }
            if limit_polygon(&mut outline, max_x, min_x, max_y, min_y) == 0 {
                continue;
            }

            store.set_top(shadows);
            let Some(shadow) = store.finalize(&outline, 0.0)? else {
                continue;
            };
            shadows = store.top();

            store.new_stack();
            let pieces: Vec<PolyId> = store.iter(visible, None).collect();
            for piece in pieces {
                overlap(store, shadow, piece, OverlapMode::Outside, true)?;
            }
            visible = store.top();
            if visible.is_none() {
                break;
            }
        }

        if log_enabled!(Level::Debug) {
            let stats = Stats::new(store, target_area, visible, None);
            if stats.total_consvtn > 1.0 + config::PLANE_TOLERANCE {
                debug!("viewpoint {:?}: unshadowed area exceeds surface 2\n{}", p, stats);
            }
        }

        let normal = self.t.srf1.plane.normal;
        let mut f = 0.0;
        let mut vertices = Vec::new();
        for piece in store.iter(visible, None) {
            vertices.clear();
            store.export_3d(piece, &mut vertices);
            f += store.trns(piece) * point_polygon_factor(p, &normal, &vertices);
            self.ctrl.stats.tot_poly += 1;
        }

        if let Some(first) = visible {
            store.free_polygons(first, None);
        }
        if let Some(first) = shadows {
            store.free_polygons(first, None);
        }
        store.new_stack();
        Ok(f)
    }
}

fn signed_area(outline: &[Point2<f64>]) -> f64 {
    let n = outline.len();
    0.5 * (0..n)
        .map(|i| {
            let (a, b) = (outline[i], outline[(i + 1) % n]);
            a.x * b.y - b.x * a.y
        })
        .sum::<f64>()
}

// Is `p`, in the plane of `srf`, inside it?
fn contains(srf: &Surface, p: &Point3<f64>) -> bool {
    let v = &srf.vertices;
    let n = v.len();
    (0..n).all(|i| (v[(i + 1) % n] - v[i]).cross(&(p - v[i])).dot(&srf.plane.normal) >= 0.0)
}
