//! Convex polygons in homogeneous form, kept on a singly linked stack.
//!
//! Every polygon owns a chain of vertex/edge records. Records of released
//! polygons go onto free lists and are handed out again before the arenas grow.

use std::fmt;

use geo_types::{Coord, LineString, Polygon as GeoPolygon};
use nalgebra::{Point2, Point3};

use crate::arena::Arena;
use crate::error::Result;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square(x0: f64, y0: f64, side: f64) -> Vec<Point2<f64>> {
        // clockwise with y up
        vec![
            Point2::new(x0, y0),
            Point2::new(x0, y0 + side),
            Point2::new(x0 + side, y0 + side),
            Point2::new(x0 + side, y0),
        ]
    }

    #[test]
    fn finalize_then_export() {
        let mut store = PolygonStore::new(1e-6, 1e-8, 1024);
        let input = square(1.0, 2.0, 3.0);
        let id = store.finalize(&input, 0.5).unwrap().unwrap();
        assert_relative_eq!(store.area(id), 9.0);
        assert_eq!(store.trns(id), 0.5);
        assert_eq!(store.top(), Some(id));

        let mut out = Vec::new();
        assert_eq!(store.export_2d(id, &mut out), 4);
        assert_eq!(out, input);

        let mut out3 = Vec::new();
        assert_eq!(store.export_3d(id, &mut out3), 4);
        assert!(out3.iter().all(|p| p.z == 0.0));
    }

    #[test]
    fn edges_put_interior_on_the_right() {
        let mut store = PolygonStore::new(1e-6, 1e-8, 1024);
        let id = store.finalize(&square(0.0, 0.0, 1.0), 1.0).unwrap().unwrap();
        let centre = Point2::new(0.5, 0.5);
        for edge in store.edges(id) {
            assert!(edge.side(&centre) < 0.0);
        }
    }

    #[test]
    fn counter_clockwise_is_rejected() {
        let mut store = PolygonStore::new(1e-6, 1e-8, 1024);
        let mut ccw = square(0.0, 0.0, 1.0);
        ccw.reverse();
        assert!(store.finalize(&ccw, 1.0).unwrap().is_none());
        assert_eq!(store.top(), None);
    }

    #[test]
    fn collinear_triangle_is_rejected() {
        let mut store = PolygonStore::new(1e-6, 1e-8, 1024);
        store.finalize(&square(5.0, 5.0, 1.0), 1.0).unwrap();
        let top = store.top();
        let line = [
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(2.0, 2.0),
        ];
        assert!(store.finalize(&line, 1.0).unwrap().is_none());
        assert_eq!(store.top(), top);
    }

    #[test]
    fn free_lists_bound_the_arena() {
        let mut store = PolygonStore::new(1e-6, 1e-8, 512);
        for _ in 0..1000 {
            let id = store.finalize(&square(0.0, 0.0, 1.0), 1.0).unwrap().unwrap();
            let next = store.next(id);
            store.free_polygons(id, next);
            store.new_stack();
            let line = [
                Point2::new(0.0, 0.0),
                Point2::new(1.0, 0.0),
                Point2::new(2.0, 0.0),
            ];
            store.finalize(&line, 1.0).unwrap();
        }
        let usage = store.usage();
        assert_eq!(usage.polygons, 1);
        assert_eq!(usage.edges, 4);
    }

    #[test]
    fn free_a_run_of_the_stack() {
        let mut store = PolygonStore::new(1e-6, 1e-8, 512);
        let bottom = store.finalize(&square(0.0, 0.0, 1.0), 1.0).unwrap();
        store.finalize(&square(2.0, 0.0, 1.0), 1.0).unwrap();
        let top = store.finalize(&square(4.0, 0.0, 1.0), 1.0).unwrap().unwrap();

        store.free_polygons(top, bottom);
        store.set_top(bottom);
        assert_eq!(store.iter(store.top(), None).count(), 1);

        // recycled records come back before the arena grows
        let before = store.usage();
        store.finalize(&square(6.0, 0.0, 1.0), 1.0).unwrap();
        store.finalize(&square(8.0, 0.0, 1.0), 1.0).unwrap();
        assert_eq!(store.usage(), before);
    }

    #[test]
    fn reset_keeps_blocks() {
        let mut store = PolygonStore::new(1e-6, 1e-8, 512);
        for i in 0..50 {
            store.finalize(&square(2.0 * i as f64, 0.0, 1.0), 1.0).unwrap();
        }
        let blocks = store.usage().blocks;
        store.reset(1e-5, 1e-7);
        assert_eq!(store.top(), None);
        assert_eq!(store.usage().polygons, 0);
        assert_eq!(store.usage().blocks, blocks);
        assert_eq!(store.eps_dist, 1e-5);

        store.finalize(&square(0.0, 0.0, 1.0), 1.0).unwrap();
        assert_eq!(store.usage().blocks, blocks);
    }

    #[test]
    fn new_stack_abandons() {
        let mut store = PolygonStore::new(1e-6, 1e-8, 512);
        let old = store.finalize(&square(0.0, 0.0, 1.0), 1.0).unwrap();
        store.new_stack();
        assert_eq!(store.top(), None);
        let copy = store.copy_polygon(old.unwrap()).unwrap();
        assert_eq!(store.top(), Some(copy));
        assert_relative_eq!(store.area(copy), 1.0);
        assert_eq!(store.to_geo(copy).exterior().0.len(), 5);
    }
}

/// Handle to a polygon record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PolyId(u32);

/// Handle to a vertex/edge record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeId(u32);

/// A vertex and the homogeneous coefficients of the edge arriving at it.
/// A point is left of the edge when `a*x + b*y + c > 0`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VertexEdge {
    pub x: f64,
    pub y: f64,
    pub a: f64,
    pub b: f64,
    pub c: f64,
    next: Option<EdgeId>, // None ends the chain; the wrap to the first edge is implicit
}

impl VertexEdge {
    /// Signed distance-like value of `p` from this edge's line; positive is left.
    pub fn side(&self, p: &Point2<f64>) -> f64 {
        self.a * p.x + self.b * p.y + self.c
    }

    pub fn point(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct PolygonRecord {
    first: Option<EdgeId>,
    area: f64,
    trns: f64,            // transparency, 0 opaque to 1 clear
    next: Option<PolyId>, // next polygon on whichever stack or free list holds this one
}

/// Record counts handed out by the arenas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub polygons: usize,
    pub edges: usize,
    pub blocks: usize,
}

/// Polygon and vertex/edge records, their free lists, and the active stack.
pub struct PolygonStore {
    polys: Arena<PolygonRecord>,
    edges: Arena<VertexEdge>,
    free_polys: Option<PolyId>,
    free_edges: Option<EdgeId>,
    top: Option<PolyId>,
    pub eps_dist: f64, // vertices closer than this are merged
    pub eps_area: f64, // polygons smaller than this are discarded
}

impl fmt::Debug for PolygonStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolygonStore")
            .field("usage", &self.usage())
            .field("top", &self.top)
            .field("eps_dist", &self.eps_dist)
            .field("eps_area", &self.eps_area)
            .finish()
    }
}

impl PolygonStore {
    pub fn new(eps_dist: f64, eps_area: f64, block_bytes: usize) -> Self {
        Self {
            polys: Arena::new("polygons", block_bytes),
            edges: Arena::new("vertex/edges", block_bytes),
            free_polys: None,
            free_edges: None,
            top: None,
            eps_dist,
            eps_area,
        }
    }

    /// Starts a new processing session, keeping the arena blocks for reuse.
    pub fn reset(&mut self, eps_dist: f64, eps_area: f64) {
        self.polys.clear();
        self.edges.clear();
        self.free_polys = None;
        self.free_edges = None;
        self.top = None;
        self.eps_dist = eps_dist;
        self.eps_area = eps_area;
    }

    /// Frees all polygon memory. Every handle becomes invalid.
    pub fn release(&mut self) {
        self.polys.release();
        self.edges.release();
        self.free_polys = None;
        self.free_edges = None;
        self.top = None;
    }

    pub fn usage(&self) -> Usage {
        Usage {
            polygons: self.polys.len(),
            edges: self.edges.len(),
            blocks: self.polys.block_count() + self.edges.block_count(),
        }
    }

    /// A cleared polygon record, recycled if possible.
    pub fn acquire_polygon(&mut self) -> Result<PolyId> {
        match self.free_polys {
            Some(id) => {
                let record = self.polys.get_mut(id.0 as usize);
                self.free_polys = record.next;
                *record = PolygonRecord::default();
                Ok(id)
            }
            None => Ok(PolyId(self.polys.alloc(PolygonRecord::default())? as u32)),
        }
    }

    /// A vertex/edge record, recycled if possible. Its contents are stale.
    pub fn acquire_edge(&mut self) -> Result<EdgeId> {
        match self.free_edges {
            Some(id) => {
                self.free_edges = self.edges.get(id.0 as usize).next;
                Ok(id)
            }
            None => Ok(EdgeId(self.edges.alloc(VertexEdge::default())? as u32)),
        }
    }

    /// Builds a polygon from clockwise vertices (first not repeated) and pushes
    /// it onto the active stack. Returns `None`, releasing the records, if its
    /// area is below `eps_area`.
    pub fn finalize(&mut self, vertices: &[Point2<f64>], trns: f64) -> Result<Option<PolyId>> {
        let id = self.acquire_polygon()?;
        let mut area = 0.0;
        let mut prev: Option<EdgeId> = None;

        let n = vertices.len();
        for j in 0..n {
            let jm1 = (j + n - 1) % n;
            let (v, vm1) = (vertices[j], vertices[jm1]);
            let edge = VertexEdge {
                x: v.x,
                y: v.y,
                a: vm1.y - v.y,
                b: v.x - vm1.x,
                c: v.y * vm1.x - v.x * vm1.y,
                next: None,
            };
            area -= edge.c;

            let eid = self.acquire_edge()?;
            *self.edges.get_mut(eid.0 as usize) = edge;
            match prev {
                Some(p) => self.edges.get_mut(p.0 as usize).next = Some(eid),
                None => self.polys.get_mut(id.0 as usize).first = Some(eid),
            }
            prev = Some(eid);
        }

        let record = self.polys.get_mut(id.0 as usize);
        record.area = 0.5 * area;
        record.trns = trns;

        if record.area < self.eps_area || record.first.is_none() {
            self.free_polygons(id, None);
            return Ok(None);
        }
        self.push(id);
        Ok(Some(id))
    }

    /// Returns the polygons from `first` up to, but not including, `last` to
    /// the free lists along with their vertex/edge records.
    pub fn free_polygons(&mut self, first: PolyId, last: Option<PolyId>) {
        let mut pp = first;
        loop {
            let record = *self.polys.get(pp.0 as usize);
            if let Some(head) = record.first {
                let mut tail = head;
                while let Some(next) = self.edges.get(tail.0 as usize).next {
                    tail = next;
                }
                self.edges.get_mut(tail.0 as usize).next = self.free_edges;
                self.free_edges = Some(head);
                self.polys.get_mut(pp.0 as usize).first = None;
            }
            match record.next {
                Some(next) if record.next != last => pp = next,
                _ => break,
            }
        }
        self.polys.get_mut(pp.0 as usize).next = self.free_polys;
        self.free_polys = Some(first);
    }

    /// Empties the active stack without freeing it. Keep the old top to
    /// revisit or free those polygons.
    pub fn new_stack(&mut self) {
        self.top = None;
    }

    pub fn top(&self) -> Option<PolyId> {
        self.top
    }

    /// Makes `top` the head of the active stack.
    pub fn set_top(&mut self, top: Option<PolyId>) {
        self.top = top;
    }

    /// Links `id` onto the head of the active stack.
    pub fn push(&mut self, id: PolyId) {
        self.polys.get_mut(id.0 as usize).next = self.top;
        self.top = Some(id);
    }

    /// Pushes a copy of `id` onto the active stack.
    pub fn copy_polygon(&mut self, id: PolyId) -> Result<PolyId> {
        let source = *self.polys.get(id.0 as usize);
        let copy = self.acquire_polygon()?;
        let mut prev: Option<EdgeId> = None;
        let mut cursor = source.first;
        while let Some(eid) = cursor {
            let edge = *self.edges.get(eid.0 as usize);
            let new = self.acquire_edge()?;
            *self.edges.get_mut(new.0 as usize) = VertexEdge { next: None, ..edge };
            match prev {
                Some(p) => self.edges.get_mut(p.0 as usize).next = Some(new),
                None => self.polys.get_mut(copy.0 as usize).first = Some(new),
            }
            prev = Some(new);
            cursor = edge.next;
        }
        let record = self.polys.get_mut(copy.0 as usize);
        record.area = source.area;
        record.trns = source.trns;
        self.push(copy);
        Ok(copy)
    }

    pub fn area(&self, id: PolyId) -> f64 {
        self.polys.get(id.0 as usize).area
    }

    pub fn trns(&self, id: PolyId) -> f64 {
        self.polys.get(id.0 as usize).trns
    }

    pub fn next(&self, id: PolyId) -> Option<PolyId> {
        self.polys.get(id.0 as usize).next
    }

    /// Walks a run of linked polygons from `first` up to, not including, `last`.
    pub fn iter(&self, first: Option<PolyId>, last: Option<PolyId>) -> StackIter<'_> {
        StackIter {
            store: self,
            cursor: first,
            last,
        }
    }

    /// The vertex/edge records of a polygon in order.
    pub fn edges(&self, id: PolyId) -> EdgeIter<'_> {
        EdgeIter {
            store: self,
            cursor: self.polys.get(id.0 as usize).first,
        }
    }

    /// Writes the vertices of `id` into `out`, returning their count.
    pub fn export_2d(&self, id: PolyId, out: &mut Vec<Point2<f64>>) -> usize {
        out.clear();
        out.extend(self.edges(id).map(|edge| edge.point()));
        out.len()
    }

    /// As [`export_2d`](Self::export_2d) with a zero third coordinate.
    pub fn export_3d(&self, id: PolyId, out: &mut Vec<Point3<f64>>) -> usize {
        out.clear();
        out.extend(self.edges(id).map(|edge| Point3::new(edge.x, edge.y, 0.0)));
        out.len()
    }

    /// The polygon as a closed `geo` polygon, for area bookkeeping.
    pub fn to_geo(&self, id: PolyId) -> GeoPolygon<f64> {
        let coords: Vec<Coord<f64>> = self
            .edges(id)
            .map(|edge| Coord {
                x: edge.x,
                y: edge.y,
            })
            .collect();
        GeoPolygon::new(LineString::from(coords), vec![])
    }
}

pub struct StackIter<'a> {
    store: &'a PolygonStore,
    cursor: Option<PolyId>,
    last: Option<PolyId>,
}

impl Iterator for StackIter<'_> {
    type Item = PolyId;

    fn next(&mut self) -> Option<PolyId> {
        let id = self.cursor?;
        if self.cursor == self.last {
            return None;
        }
        self.cursor = self.store.next(id);
        Some(id)
    }
}

pub struct EdgeIter<'a> {
    store: &'a PolygonStore,
    cursor: Option<EdgeId>,
}

impl Iterator for EdgeIter<'_> {
    type Item = VertexEdge;

    fn next(&mut self) -> Option<VertexEdge> {
        let edge = *self.store.edges.get(self.cursor?.0 as usize);
        self.cursor = edge.next;
        Some(edge)
    }
}
