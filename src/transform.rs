//! Coordinates for obstructed integration: surface 2 in the plane z = 0,
//! facing +z, centred on the origin, with lengths in units of its radius.

use nalgebra::{Isometry3, Point3, Vector3};

use crate::config;
use crate::geom::{Plane, Surface};


/// Surfaces of one obstructed pair in the frame of surface 2.
#[derive(Debug, Clone)]
pub struct Transformed {
    pub srf1: Surface,
    pub srf2: Surface,
    pub obstructions: Vec<Surface>, // cast shadows onto surface 2
    pub view_masks: Vec<Surface>,   // lie on surface 1 and hide viewpoints
    pub scale: f64,                 // radius of surface 2 in the original frame
}

impl Transformed {
    pub fn new(srf1: &Surface, srf2: &Surface, obstructions: &[&Surface]) -> Self {
        let normal = srf2.plane.normal;
        let iso = Isometry3::look_at_rh(
            &srf2.centroid,
            &(srf2.centroid - normal),
            &least_aligned_axis(&normal),
        );
        let scale = srf2.rc;
        let map = |srf: &Surface| transform_surface(srf, &iso, scale);

        let srf1_t = map(srf1);
        let srf2_t = map(srf2);
        let floor = Plane::new(Vector3::z(), &Point3::origin());
        let tol = config::PLANE_TOLERANCE;

        let mut shadows = Vec::new();
        let mut view_masks = Vec::new();
        for srf in obstructions.iter().map(|&s| map(s)) {
            let heights = srf.heights_above(&srf1_t.plane);
            if heights.iter().all(|h| h.abs() <= tol * srf.rc.max(1.0)) {
                view_masks.push(srf);
                continue;
            }
            let cut = srf
                .clip_above(&floor, tol)
                .and_then(|s| s.clip_above(&srf1_t.plane, tol));
            if let Some(s) = cut {
                shadows.push(s);
            }
        }

        Self {
            srf1: srf1_t,
            srf2: srf2_t,
            obstructions: shadows,
            view_masks,
            scale,
        }
    }
}

fn least_aligned_axis(normal: &Vector3<f64>) -> Vector3<f64> {
    let a = normal.abs();
    if a.x <= a.y && a.x <= a.z {
        Vector3::x()
    } else if a.y <= a.z {
        Vector3::y()
    } else {
        Vector3::z()
    }
}

fn transform_surface(srf: &Surface, iso: &Isometry3<f64>, scale: f64) -> Surface {
    let vertices: Vec<Point3<f64>> = srf
        .vertices
        .iter()
        .map(|v| Point3::from(iso.transform_point(v).coords / scale))
        .collect();
    let normal = iso.transform_vector(&srf.plane.normal);
    let plane = Plane::new(normal, &vertices[0]);
    let area = srf.area / (scale * scale);
    let centroid = Point3::from(iso.transform_point(&srf.centroid).coords / scale);
    Surface {
        index: srf.index,
        kind: srf.kind,
        base: srf.base,
        vertices,
        shape: srf.shape,
        area,
        rc: srf.rc / scale,
        plane,
        centroid,
    }
}
