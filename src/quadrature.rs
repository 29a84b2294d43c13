//! Gauss-Legendre rules and the unobstructed view factor kernels.
//!
//! Every kernel returns `A1 * F12`, the view factor times the area of the
//! first surface, which is symmetric in the two surfaces. Contour kernels
//! use Stokes' theorem so only the polygon edges are sampled.

use std::f64::consts::PI;

use nalgebra::{Point3, Vector3};

use crate::geom::{Shape, Surface};

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // exact value for coaxial parallel unit squares one unit apart
    const PARALLEL_UNIT: f64 = 0.199_824_9;

    fn square(z: f64, facing_up: bool) -> Surface {
        let mut v = vec![
            Point3::new(0.0, 0.0, z),
            Point3::new(1.0, 0.0, z),
            Point3::new(1.0, 1.0, z),
            Point3::new(0.0, 1.0, z),
        ];
        if !facing_up {
            v.reverse();
        }
        Surface::new(0, v).unwrap()
    }

    #[test]
    fn gauss_rules_are_exact() {
        for n in 1..=6 {
            let rule = gauss_points(n);
            assert_eq!(rule.len(), n);
            let sum: f64 = rule.iter().map(|(_, w)| w).sum();
            assert_relative_eq!(sum, 1.0, epsilon = 1e-12);
            // exact for polynomials of degree 2n - 1
            let p = (2 * n - 1) as i32;
            let integral: f64 = rule.iter().map(|(x, w)| w * x.powi(p)).sum();
            assert_relative_eq!(integral, 1.0 / (p + 1) as f64, epsilon = 1e-12);
        }
    }

    #[test]
    fn area_weights_sum_to_area() {
        let tri = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(0.0, 3.0, 0.0),
        ];
        let pts = area_points(&tri, Shape::Triangle, 3);
        assert_relative_eq!(pts.iter().map(|(_, w)| w).sum::<f64>(), 3.0, epsilon = 1e-12);
        // centroid
        let cx: f64 = pts.iter().map(|(p, w)| p.x * w).sum::<f64>() / 3.0;
        assert_relative_eq!(cx, 2.0 / 3.0, epsilon = 1e-12);

        let kite = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(3.0, 3.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let pts = area_points(&kite, Shape::General, 2);
        assert_relative_eq!(pts.iter().map(|(_, w)| w).sum::<f64>(), 4.5, epsilon = 1e-12);
    }

    #[test]
    fn point_to_square_from_below_a_corner() {
        let target = square(1.0, false);
        let f = point_polygon_factor(&Point3::origin(), &Vector3::z(), &target.vertices);
        let expected = (0.5_f64.sqrt() * (0.5_f64.sqrt()).atan()) / PI;
        assert_relative_eq!(f, expected, epsilon = 1e-10);
    }

    #[test]
    fn log_integral_matches_quadrature() {
        let p = Point3::new(0.3, 0.7, 0.4);
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(2.0, 0.0, 0.0);
        let exact = line_log_integral(&p, &a, &b);
        let numeric: f64 = (0..20000)
            .map(|i| {
                let x = 2.0 * (i as f64 + 0.5) / 20000.0;
                (Point3::new(x, 0.0, 0.0) - p).norm().ln() * 2.0 / 20000.0
            })
            .sum();
        assert_relative_eq!(exact, numeric, epsilon = 1e-6);
    }

    #[test]
    fn kernels_agree_for_parallel_squares() {
        let lower = square(0.0, true);
        let upper = square(1.0, false);
        assert_relative_eq!(view_2ai(&lower, &upper, 4), PARALLEL_UNIT, epsilon = 2e-3);
        assert_relative_eq!(view_1ai(&lower, &upper, 4), PARALLEL_UNIT, epsilon = 1e-3);
        assert_relative_eq!(view_2li(&lower, &upper, 4), PARALLEL_UNIT, epsilon = 1e-3);
        assert_relative_eq!(view_1li(&lower, &upper, 4), PARALLEL_UNIT, epsilon = 1e-4);
        let ali = view_ali(&lower, &upper, 1e-7, 12);
        assert!(ali.converged);
        assert_relative_eq!(ali.af, PARALLEL_UNIT, epsilon = 1e-5);
    }
}

// Gauss-Legendre abscissae and weights on [-1, 1], non-negative abscissae only.
const GAUSS_1: [(f64, f64); 1] = [(0.0, 2.0)];
const GAUSS_2: [(f64, f64); 1] = [(0.577_350_269_189_625_8, 1.0)];
const GAUSS_3: [(f64, f64); 2] = [
    (0.0, 0.888_888_888_888_888_9),
    (0.774_596_669_241_483_4, 0.555_555_555_555_555_6),
];
const GAUSS_4: [(f64, f64); 2] = [
    (0.339_981_043_584_856_3, 0.652_145_154_862_546_1),
    (0.861_136_311_594_052_6, 0.347_854_845_137_453_9),
];
const GAUSS_5: [(f64, f64); 3] = [
    (0.0, 0.568_888_888_888_888_9),
    (0.538_469_310_105_683_1, 0.478_628_670_499_366_5),
    (0.906_179_845_938_664_0, 0.236_926_885_056_189_1),
];
const GAUSS_6: [(f64, f64); 3] = [
    (0.238_619_186_083_196_9, 0.467_913_934_572_691_0),
    (0.661_209_386_466_264_5, 0.360_761_573_048_138_6),
    (0.932_469_514_203_152_0, 0.171_324_492_379_170_4),
];

/// Gauss-Legendre rule with `n` points (1 to 6, clamped) on [0, 1].
/// Weights sum to 1.
pub fn gauss_points(n: usize) -> Vec<(f64, f64)> {
    let half: &[(f64, f64)] = match n.clamp(1, 6) {
        1 => &GAUSS_1,
        2 => &GAUSS_2,
        3 => &GAUSS_3,
        4 => &GAUSS_4,
        5 => &GAUSS_5,
        _ => &GAUSS_6,
    };
    let mut rule = Vec::with_capacity(n);
    for &(x, w) in half.iter().rev() {
        if x > 0.0 {
            rule.push((0.5 - 0.5 * x, 0.5 * w));
        }
    }
    for &(x, w) in half {
        rule.push((0.5 + 0.5 * x, 0.5 * w));
    }
    rule
}

/// Gauss points along the segment `a`-`b`; weights sum to its length.
pub fn edge_points(a: &Point3<f64>, b: &Point3<f64>, n: usize) -> Vec<(Point3<f64>, f64)> {
    let d = b - a;
    let length = d.norm();
    gauss_points(n)
        .into_iter()
        .map(|(t, w)| (a + d * t, w * length))
        .collect()
}

/// Gauss points over a convex polygon with `n` points per direction; weights
/// sum to its area. Polygons other than triangles and parallelograms are
/// fanned into triangles.
pub fn area_points(vertices: &[Point3<f64>], shape: Shape, n: usize) -> Vec<(Point3<f64>, f64)> {
    let rule = gauss_points(n);
    let mut points = Vec::new();
    match shape {
        Shape::Parallelogram => {
            let (v0, e1, e3) = (vertices[0], vertices[1] - vertices[0], vertices[3] - vertices[0]);
            let area = e1.cross(&e3).norm();
            for &(s, ws) in &rule {
                for &(t, wt) in &rule {
                    points.push((v0 + e1 * s + e3 * t, area * ws * wt));
                }
            }
        }
        Shape::Triangle => triangle_points(&vertices[0], &vertices[1], &vertices[2], &rule, &mut points),
        Shape::General => {
            for pair in vertices[1..].windows(2) {
                triangle_points(&vertices[0], &pair[0], &pair[1], &rule, &mut points);
            }
        }
    }
    points
}

// The unit square collapsed onto the triangle at v0: p = v0 + s (v1 - v0) + s t (v2 - v1).
fn triangle_points(
    v0: &Point3<f64>,
    v1: &Point3<f64>,
    v2: &Point3<f64>,
    rule: &[(f64, f64)],
    out: &mut Vec<(Point3<f64>, f64)>,
) {
    let (e1, e2) = (v1 - v0, v2 - v1);
    let twice_area = e1.cross(&e2).norm();
    for &(s, ws) in rule {
        for &(t, wt) in rule {
            out.push((v0 + e1 * s + e2 * (s * t), twice_area * s * ws * wt));
        }
    }
}

/// View factor from a differential area at `p` with unit normal `normal` to
/// the polygon, which must lie wholly on the front side of `p`.
pub fn point_polygon_factor(p: &Point3<f64>, normal: &Vector3<f64>, polygon: &[Point3<f64>]) -> f64 {
    let n = polygon.len();
    let mut sum = 0.0;
    for i in 0..n {
        let r1 = polygon[i] - p;
        let r2 = polygon[(i + 1) % n] - p;
        let cross = r1.cross(&r2);
        let length = cross.norm();
        if length <= f64::EPSILON * r1.norm() * r2.norm() {
            continue;
        }
        let angle = length.atan2(r1.dot(&r2));
        sum += angle * normal.dot(&cross) / length;
    }
    (sum / (2.0 * PI)).abs()
}

// Antiderivative of ln sqrt(u^2 + h^2) in u.
fn log_antiderivative(u: f64, h: f64) -> f64 {
    let r2 = u * u + h * h;
    let log_term = if r2 > 0.0 { 0.5 * u * r2.ln() } else { 0.0 };
    let atan_term = if h > 0.0 { h * (u / h).atan() } else { 0.0 };
    log_term - u + atan_term
}

/// Exact integral of `ln |q - p|` for `q` running along the segment `a`-`b`.
pub fn line_log_integral(p: &Point3<f64>, a: &Point3<f64>, b: &Point3<f64>) -> f64 {
    let d = b - a;
    let length = d.norm();
    if length == 0.0 {
        return 0.0;
    }
    let e = d / length;
    let ap = p - a;
    let t0 = ap.dot(&e);
    let h = (ap.norm_squared() - t0 * t0).max(0.0).sqrt();
    log_antiderivative(length - t0, h) - log_antiderivative(-t0, h)
}

/// Double area integration.
pub fn view_2ai(srf1: &Surface, srf2: &Surface, n: usize) -> f64 {
    let pts1 = area_points(&srf1.vertices, srf1.shape, n);
    let pts2 = area_points(&srf2.vertices, srf2.shape, n);
    let (n1, n2) = (srf1.plane.normal, srf2.plane.normal);
    let mut sum = 0.0;
    for (p1, w1) in &pts1 {
        for (p2, w2) in &pts2 {
            let r = p2 - p1;
            let r2 = r.norm_squared();
            if r2 == 0.0 {
                continue;
            }
            let cos_prod = n1.dot(&r) * -n2.dot(&r) / r2;
            sum += w1 * w2 * cos_prod / r2;
        }
    }
    sum / PI
}

/// Single area integration over `srf1` with the exact point-to-polygon factor to `srf2`.
pub fn view_1ai(srf1: &Surface, srf2: &Surface, n: usize) -> f64 {
    area_points(&srf1.vertices, srf1.shape, n)
        .iter()
        .map(|(p, w)| w * point_polygon_factor(p, &srf1.plane.normal, &srf2.vertices))
        .sum()
}

fn edges(vertices: &[Point3<f64>]) -> impl Iterator<Item = (Point3<f64>, Point3<f64>)> + '_ {
    let n = vertices.len();
    (0..n).map(move |i| (vertices[i], vertices[(i + 1) % n]))
}

fn unit(a: &Point3<f64>, b: &Point3<f64>) -> Vector3<f64> {
    (b - a).normalize()
}

/// Double line integration of `ln r` around both contours. Never picked by
/// `view_method`; kept as a reference kernel for the other methods.
pub fn view_2li(srf1: &Surface, srf2: &Surface, n: usize) -> f64 {
    let tiny = 1e-12 * (srf1.rc + srf2.rc);
    let mut sum = 0.0;
    for (a1, b1) in edges(&srf1.vertices) {
        let e1 = unit(&a1, &b1);
        let pts1 = edge_points(&a1, &b1, n);
        for (a2, b2) in edges(&srf2.vertices) {
            let dot = e1.dot(&unit(&a2, &b2));
            if dot.abs() < 1e-12 {
                continue;
            }
            let pts2 = edge_points(&a2, &b2, n);
            let mut edge_sum = 0.0;
            for (p1, w1) in &pts1 {
                for (p2, w2) in &pts2 {
                    let r = (p2 - p1).norm();
                    if r > tiny {
                        edge_sum += w1 * w2 * r.ln();
                    }
                }
            }
            sum += dot * edge_sum;
        }
    }
    (sum / (2.0 * PI)).abs()
}

// Inner contour integral for a point on an edge of srf1 with direction e1.
fn contour_integrand(p: &Point3<f64>, e1: &Vector3<f64>, srf2: &Surface) -> f64 {
    edges(&srf2.vertices)
        .map(|(a2, b2)| {
            let dot = e1.dot(&unit(&a2, &b2));
            if dot.abs() < 1e-12 {
                0.0
            } else {
                dot * line_log_integral(p, &a2, &b2)
            }
        })
        .sum()
}

/// Single line integration: Gauss points on the edges of `srf1`, exact
/// integration along the edges of `srf2`.
pub fn view_1li(srf1: &Surface, srf2: &Surface, n: usize) -> f64 {
    let mut sum = 0.0;
    for (a1, b1) in edges(&srf1.vertices) {
        let e1 = unit(&a1, &b1);
        for (p, w) in edge_points(&a1, &b1, n) {
            sum += w * contour_integrand(&p, &e1, srf2);
        }
    }
    (sum / (2.0 * PI)).abs()
}

/// Outcome of adaptive line integration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adaptive {
    pub af: f64,
    pub converged: bool,
    pub evaluations: u64,
}

struct Simpson<'a> {
    srf2: &'a Surface,
    a: Point3<f64>,
    e: Vector3<f64>,
    max_depth: u32,
    converged: bool,
    evaluations: u64,
}

impl Simpson<'_> {
    fn eval(&mut self, s: f64) -> f64 {
        self.evaluations += 1;
        contour_integrand(&(self.a + self.e * s), &self.e, self.srf2)
    }

    #[allow(clippy::too_many_arguments)]
    fn step(&mut self, s0: f64, s1: f64, f0: f64, fm: f64, f1: f64, whole: f64, tol: f64, depth: u32) -> f64 {
        let sm = 0.5 * (s0 + s1);
        let (sl, sr) = (0.5 * (s0 + sm), 0.5 * (sm + s1));
        let (fl, fr) = (self.eval(sl), self.eval(sr));
        let h = (s1 - s0) / 12.0;
        let left = h * (f0 + 4.0 * fl + fm);
        let right = h * (fm + 4.0 * fr + f1);
        let delta = left + right - whole;
        if delta.abs() <= 15.0 * tol {
            return left + right + delta / 15.0;
        }
        if depth >= self.max_depth {
            self.converged = false;
            return left + right;
        }
        self.step(s0, sm, f0, fl, fm, left, 0.5 * tol, depth + 1)
            + self.step(sm, s1, fm, fr, f1, right, 0.5 * tol, depth + 1)
    }
}

/// Adaptive single line integration: Simpson's rule refined along each edge
/// of `srf1` until the view factor changes by less than `eps_af`, or
/// `max_depth` halvings are reached.
pub fn view_ali(srf1: &Surface, srf2: &Surface, eps_af: f64, max_depth: u32) -> Adaptive {
    let n_edges = srf1.vertices.len() as f64;
    let tol = eps_af * 2.0 * PI / n_edges;
    let mut sum = 0.0;
    let mut converged = true;
    let mut evaluations = 0;
    for (a1, b1) in edges(&srf1.vertices) {
        let length = (b1 - a1).norm();
        let mut simpson = Simpson {
            srf2,
            a: a1,
            e: unit(&a1, &b1),
            max_depth,
            converged: true,
            evaluations: 0,
        };
        let (f0, fm, f1) = (simpson.eval(0.0), simpson.eval(0.5 * length), simpson.eval(length));
        let whole = length / 6.0 * (f0 + 4.0 * fm + f1);
        sum += simpson.step(0.0, length, f0, fm, f1, whole, tol, 1);
        converged &= simpson.converged;
        evaluations += simpson.evaluations;
    }
    Adaptive {
        af: (sum / (2.0 * PI)).abs(),
        converged,
        evaluations,
    }
}
