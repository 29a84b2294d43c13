use std::path::Path;

use log::{debug, info};
use nalgebra::{Point3, Vector3};

use crate::config;
use crate::error::{ErrorKind, Result};

#[cfg(test)]
mod tests {

    use super::*;
    use approx::assert_relative_eq;

    fn unit_square(z: f64) -> Vec<Point3<f64>> {
        vec![
            Point3::new(0.0, 0.0, z),
            Point3::new(1.0, 0.0, z),
            Point3::new(1.0, 1.0, z),
            Point3::new(0.0, 1.0, z),
        ]
    }

    #[test]
    fn square_properties() {
        let srf = Surface::new(0, unit_square(2.0)).unwrap();
        assert_eq!(srf.shape, Shape::Parallelogram);
        assert_relative_eq!(srf.area, 1.0);
        assert_relative_eq!(srf.centroid, Point3::new(0.5, 0.5, 2.0));
        assert_relative_eq!(srf.rc, 0.5_f64.sqrt());
        assert_relative_eq!(srf.plane.normal, Vector3::z());
        assert_relative_eq!(srf.plane.offset, -2.0);
        assert_relative_eq!(srf.plane.height(&Point3::new(3.0, 3.0, 5.0)), 3.0);
    }

    #[test]
    fn triangle_and_general_shapes() {
        let tri = Surface::new(
            0,
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(3.0, 0.0, 0.0),
                Point3::new(0.0, 3.0, 0.0),
            ],
        )
        .unwrap();
        assert_eq!(tri.shape, Shape::Triangle);
        assert_relative_eq!(tri.area, 4.5);
        assert_relative_eq!(tri.centroid, Point3::new(1.0, 1.0, 0.0));

        let kite = Surface::new(
            1,
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(2.0, 0.0, 0.0),
                Point3::new(3.0, 3.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
        )
        .unwrap();
        assert_eq!(kite.shape, Shape::General);
    }

    #[test]
    fn degenerate_surface_is_rejected() {
        let err = Surface::new(
            7,
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 1.0),
                Point3::new(2.0, 2.0, 2.0),
            ],
        )
        .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::InvalidSurface { index: 7, .. }));
    }

    #[test]
    fn kind_from_model_name() {
        assert_eq!(SurfaceKind::from_name("wall"), (SurfaceKind::Regular, None));
        assert_eq!(SurfaceKind::from_name("mask@2"), (SurfaceKind::Mask, Some(2)));
        assert_eq!(SurfaceKind::from_name("subs_door@0"), (SurfaceKind::Subsurface, Some(0)));
        assert_eq!(SurfaceKind::from_name("obso_beam"), (SurfaceKind::ObstructionOnly, None));
    }

    #[test]
    fn cube_volume() {
        let enclosure = Enclosure::from_file("./data/cube.obj").unwrap();
        assert_eq!(enclosure.surfaces.len(), 6);
        assert_eq!(enclosure.n_radiating, 6);
        assert_relative_eq!(enclosure.volume(), 1.0, epsilon = 1e-6);
        for srf in &enclosure.surfaces {
            // every face looks at the cube centre
            assert!(srf.plane.height(&Point3::new(0.5, 0.5, 0.5)) > 0.0);
        }
    }

    #[test]
    fn clip_square_at_half_height() {
        let wall = Surface::new(
            0,
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(0.0, 1.0, 1.0),
                Point3::new(0.0, 0.0, 1.0),
            ],
        )
        .unwrap();
        let plane = Plane::new(Vector3::z(), &Point3::new(0.0, 0.0, 0.5));
        let upper = wall.clip_above(&plane, 1e-9).unwrap();
        assert_eq!(upper.vertices.len(), 4);
        assert_relative_eq!(upper.area, 0.5);
        assert_relative_eq!(upper.centroid, Point3::new(0.0, 0.5, 0.75));
        assert_eq!(upper.plane, wall.plane);

        let below = Plane::new(-Vector3::z(), &Point3::new(0.0, 0.0, -1.0));
        assert!(wall.clip_above(&below, 1e-9).is_none());
    }

    #[test]
    fn obstruction_only_must_follow_radiating() {
        let obso = Surface::new(0, unit_square(0.5))
            .unwrap()
            .with_kind(SurfaceKind::ObstructionOnly, None);
        let wall = Surface::new(1, unit_square(1.0)).unwrap();
        assert!(Enclosure::new(vec![obso, wall]).is_err());
    }
}

/// The role a surface plays in the enclosure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    Regular,
    Subsurface,      // lies on its base surface
    Mask,            // masks part of its base surface
    Null,            // like a mask, removed from the final results
    ObstructionOnly, // blocks views but does not radiate
}

impl SurfaceKind {
    /// Reads the kind and optional base surface index from a model name such
    /// as `mask@3`. Unrecognised prefixes are regular surfaces.
    pub fn from_name(name: &str) -> (Self, Option<usize>) {
        let (stem, base) = match name.split_once('@') {
            Some((stem, base)) => (stem, base.trim().parse().ok()),
            None => (name, None),
        };
        let stem = stem.to_ascii_lowercase();
        let kind = if stem.starts_with("subs") {
            SurfaceKind::Subsurface
        } else if stem.starts_with("mask") {
            SurfaceKind::Mask
        } else if stem.starts_with("nuls") {
            SurfaceKind::Null
        } else if stem.starts_with("obso") {
            SurfaceKind::ObstructionOnly
        } else {
            SurfaceKind::Regular
        };
        (kind, base)
    }

    pub fn is_mask_or_null(self) -> bool {
        matches!(self, SurfaceKind::Mask | SurfaceKind::Null)
    }

    /// Whether the surface can block views by its geometry.
    pub fn can_obstruct(self) -> bool {
        matches!(self, SurfaceKind::Regular | SurfaceKind::ObstructionOnly)
    }

    pub fn radiates(self) -> bool {
        self != SurfaceKind::ObstructionOnly
    }
}

/// Shape tag used to choose integration rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Triangle,
    Parallelogram,
    General,
}

impl Shape {
    /// Triangles and parallelograms have exact quadrature maps.
    pub fn is_simple(self) -> bool {
        self != Shape::General
    }
}

/// Represents a plane, defined by a unit normal and an offset value,
/// such that `normal . p + offset = 0` for points `p` on the plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vector3<f64>,
    pub offset: f64,
}

impl Plane {
    pub fn new(normal: Vector3<f64>, point: &Point3<f64>) -> Self {
        Self {
            normal,
            offset: -normal.dot(&point.coords),
        }
    }

    /// Signed distance of `p` above the plane, positive on the normal side.
    pub fn height(&self, p: &Point3<f64>) -> f64 {
        self.normal.dot(&p.coords) + self.offset
    }
}

/// A planar convex polygon with 3 or 4 vertices (5 after one clip),
/// listed counter-clockwise when seen from its front.
#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    pub index: usize,               // position in the enclosure
    pub kind: SurfaceKind,          // role in the enclosure
    pub base: Option<usize>,        // base surface of a subsurface, mask, or null surface
    pub vertices: Vec<Point3<f64>>, // vertices, first not repeated
    pub shape: Shape,               // triangle, parallelogram, or other
    pub area: f64,                  // area of the polygon
    pub rc: f64,                    // radius of the sphere about the centroid enclosing the surface
    pub plane: Plane,               // plane with the outward normal
    pub centroid: Point3<f64>,      // area-weighted centroid
}

impl Surface {
    pub fn new(index: usize, vertices: Vec<Point3<f64>>) -> Result<Self> {
        if !(3..=4).contains(&vertices.len()) {
            return Err(ErrorKind::InvalidSurface {
                index,
                reason: format!("{} vertices, expected 3 or 4", vertices.len()),
            }
            .into());
        }
        let normal = newell_normal(&vertices);
        let length = normal.norm();
        if !(length > 0.0) {
            return Err(ErrorKind::InvalidSurface {
                index,
                reason: "zero area".to_string(),
            }
            .into());
        }
        let normal = normal / length;
        let plane = Plane::new(normal, &vertices[0]);

        let flatness = vertices
            .iter()
            .map(|v| plane.height(v).abs())
            .fold(0.0, f64::max);
        if flatness > config::PLANE_TOLERANCE * length.sqrt() {
            return Err(ErrorKind::InvalidSurface {
                index,
                reason: format!("vertices not coplanar (off by {:e})", flatness),
            }
            .into());
        }

        Surface::from_parts(index, SurfaceKind::Regular, None, plane, vertices).ok_or_else(|| {
            ErrorKind::InvalidSurface {
                index,
                reason: "zero area".to_string(),
            }
            .into()
        })
    }

    /// Builds a surface on a known plane, computing its area, centroid,
    /// radius and shape. Returns `None` if the polygon has no area.
    pub fn from_parts(
        index: usize,
        kind: SurfaceKind,
        base: Option<usize>,
        plane: Plane,
        vertices: Vec<Point3<f64>>,
    ) -> Option<Self> {
        if vertices.len() < 3 {
            return None;
        }
        let (area, centroid) = area_centroid(&vertices, &plane.normal);
        if !(area > 0.0) {
            return None;
        }
        let rc = vertices
            .iter()
            .map(|v| (v - centroid).norm())
            .fold(0.0, f64::max);
        let shape = shape_of(&vertices, rc);
        Some(Self {
            index,
            kind,
            base,
            vertices,
            shape,
            area,
            rc,
            plane,
            centroid,
        })
    }

    pub fn with_kind(mut self, kind: SurfaceKind, base: Option<usize>) -> Self {
        self.kind = kind;
        self.base = base;
        self
    }

    /// Heights of this surface's vertices above the plane of `other`.
    pub fn heights_above(&self, other: &Plane) -> Vec<f64> {
        self.vertices.iter().map(|v| other.height(v)).collect()
    }

    /// The part of the surface on or above `plane`, or `None` if nothing of
    /// it remains. Heights within `tol` of the plane count as on it.
    pub fn clip_above(&self, plane: &Plane, tol: f64) -> Option<Surface> {
        let heights: Vec<f64> = self
            .heights_above(plane)
            .into_iter()
            .map(|h| if h.abs() <= tol { 0.0 } else { h })
            .collect();
        let n = self.vertices.len();
        let mut clipped = Vec::with_capacity(n + 1);
        for i in 0..n {
            let j = (i + 1) % n;
            let (hi, hj) = (heights[i], heights[j]);
            if hi >= 0.0 {
                clipped.push(self.vertices[i]);
            }
            if (hi > 0.0 && hj < 0.0) || (hi < 0.0 && hj > 0.0) {
                let t = hi / (hi - hj);
                clipped.push(self.vertices[i] + (self.vertices[j] - self.vertices[i]) * t);
            }
        }
        Surface::from_parts(self.index, self.kind, self.base, self.plane, clipped)
    }

    /// Axis-aligned bounding box as (min, max) corners.
    pub fn bounds(&self) -> (Point3<f64>, Point3<f64>) {
        bounds_of(&self.vertices)
    }
}

/// Newell's method: twice the vector area of a polygon.
pub fn newell_normal(vertices: &[Point3<f64>]) -> Vector3<f64> {
    let n = vertices.len();
    (0..n).fold(Vector3::zeros(), |acc, i| {
        acc + vertices[i].coords.cross(&vertices[(i + 1) % n].coords)
    })
}

/// Area and centroid of a convex polygon by fanning from its first vertex.
pub fn area_centroid(vertices: &[Point3<f64>], normal: &Vector3<f64>) -> (f64, Point3<f64>) {
    let v0 = vertices[0];
    let mut area = 0.0;
    let mut moment = Vector3::zeros();
    for pair in vertices[1..].windows(2) {
        let (v1, v2) = (pair[0], pair[1]);
        let a = 0.5 * (v1 - v0).cross(&(v2 - v0)).dot(normal);
        area += a;
        moment += a * (v0.coords + v1.coords + v2.coords) / 3.0;
    }
    if area > 0.0 {
        (area, Point3::from(moment / area))
    } else {
        (area, v0)
    }
}

fn shape_of(vertices: &[Point3<f64>], rc: f64) -> Shape {
    match vertices.len() {
        3 => Shape::Triangle,
        4 => {
            let gap = (vertices[0] - vertices[1]) - (vertices[3] - vertices[2]);
            if gap.norm() < config::PARALLELOGRAM_TOLERANCE * rc {
                Shape::Parallelogram
            } else {
                Shape::General
            }
        }
        _ => Shape::General,
    }
}

pub fn bounds_of(points: &[Point3<f64>]) -> (Point3<f64>, Point3<f64>) {
    points.iter().fold(
        (
            Point3::new(f64::MAX, f64::MAX, f64::MAX),
            Point3::new(f64::MIN, f64::MIN, f64::MIN),
        ),
        |(lo, hi), p| (lo.inf(p), hi.sup(p)),
    )
}

/// Represents the surfaces of one view factor problem. Radiating surfaces
/// come first, followed by obstruction-only surfaces.
#[derive(Debug, Clone, PartialEq)]
pub struct Enclosure {
    pub surfaces: Vec<Surface>,
    pub n_radiating: usize, // surfaces that exchange radiation, masks and nulls included
}

impl Enclosure {
    pub fn new(surfaces: Vec<Surface>) -> Result<Self> {
        let n_radiating = surfaces.iter().take_while(|s| s.kind.radiates()).count();
        if surfaces[n_radiating..].iter().any(|s| s.kind.radiates()) {
            return Err(ErrorKind::InvalidEnclosure(
                "obstruction-only surfaces must follow all radiating surfaces".to_string(),
            )
            .into());
        }
        for (i, srf) in surfaces.iter().enumerate() {
            if srf.index != i {
                return Err(ErrorKind::InvalidSurface {
                    index: srf.index,
                    reason: format!("found at position {}", i),
                }
                .into());
            }
            let needs_base = matches!(
                srf.kind,
                SurfaceKind::Subsurface | SurfaceKind::Mask | SurfaceKind::Null
            );
            match srf.base {
                Some(base) if base >= n_radiating || base == i => {
                    return Err(ErrorKind::InvalidSurface {
                        index: i,
                        reason: format!("invalid base surface {}", base),
                    }
                    .into())
                }
                None if needs_base => {
                    return Err(ErrorKind::InvalidSurface {
                        index: i,
                        reason: "missing base surface".to_string(),
                    }
                    .into())
                }
                _ => {}
            }
        }
        Ok(Self {
            surfaces,
            n_radiating,
        })
    }

    /// Loads a Wavefront OBJ file: every face is a surface, and the name of
    /// the object holding it selects its kind.
    pub fn from_file(filename: impl AsRef<Path>) -> Result<Self> {
        let filename = filename.as_ref();
        let (models, _) = tobj::load_obj(filename, &tobj::LoadOptions::default()).map_err(
            |err| ErrorKind::InvalidEnclosure(format!("{}: {}", filename.display(), err)),
        )?;

        let mut surfaces = Vec::new();
        for m in models.iter() {
            let (kind, base) = SurfaceKind::from_name(&m.name);
            let mesh = &m.mesh;
            let position = |i: u32| {
                let i = i as usize;
                Point3::new(
                    mesh.positions[3 * i] as f64,
                    mesh.positions[3 * i + 1] as f64,
                    mesh.positions[3 * i + 2] as f64,
                )
            };

            // an empty arity list means every face is a triangle
            let arities: Vec<usize> = if mesh.face_arities.is_empty() {
                vec![3; mesh.indices.len() / 3]
            } else {
                mesh.face_arities.iter().map(|&a| a as usize).collect()
            };

            let mut next_face = 0;
            for arity in arities {
                let end = next_face + arity;
                let vertices = mesh.indices[next_face..end]
                    .iter()
                    .map(|&i| position(i))
                    .collect();
                let srf = Surface::new(surfaces.len(), vertices)?.with_kind(kind, base);
                debug!(
                    "surface {} ({}): {:?}, area {:.4e}, rc {:.4e}",
                    srf.index, m.name, srf.shape, srf.area, srf.rc
                );
                surfaces.push(srf);
                next_face = end;
            }
        }
        info!("loaded {} surfaces from {}", surfaces.len(), filename.display());

        Enclosure::new(surfaces)
    }

    pub fn radiating(&self) -> &[Surface] {
        &self.surfaces[..self.n_radiating]
    }

    pub fn areas(&self) -> Vec<f64> {
        self.radiating().iter().map(|s| s.area).collect()
    }

    /// Mask and null surfaces, highest index first.
    pub fn masks(&self) -> Vec<usize> {
        self.radiating()
            .iter()
            .rev()
            .filter(|s| s.kind.is_mask_or_null())
            .map(|s| s.index)
            .collect()
    }

    /// Volume enclosed by the surfaces. Positive when the normals face inward.
    pub fn volume(&self) -> f64 {
        let prism = |a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>| {
            a.coords.dot(&b.coords.cross(&c.coords))
        };
        let six_volume: f64 = self
            .surfaces
            .iter()
            .filter(|s| s.kind != SurfaceKind::Subsurface)
            .map(|s| {
                let v = &s.vertices;
                let mut sum = prism(&v[0], &v[1], &v[2]);
                if v.len() == 4 {
                    sum += prism(&v[2], &v[3], &v[0]);
                }
                sum
            })
            .sum();
        six_volume / -6.0
    }
}
