//! Method selection and convergence control for pairs with a clear view.

use log::debug;

use crate::config;
use crate::control::{Method, ViewControl};
use crate::geom::Surface;
use crate::quadrature::{view_1ai, view_1li, view_2ai, view_2li, view_ali};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    fn rect(index: usize, corners: [[f64; 3]; 4]) -> Surface {
        Surface::new(index, corners.iter().map(|c| Point3::new(c[0], c[1], c[2])).collect()).unwrap()
    }

    fn control(eps_adap: f64, max_recurs_ali: u32) -> ViewControl {
        let mut settings = settings::load_default_config().unwrap();
        settings.eps_adap = eps_adap;
        settings.max_recurs_ali = max_recurs_ali;
        ViewControl::new(&settings)
    }

    fn floor() -> Surface {
        rect(0, [[0., 0., 0.], [1., 0., 0.], [1., 1., 0.], [0., 1., 0.]])
    }

    fn wall() -> Surface {
        // x = 0, facing +x, sharing an edge with the floor
        rect(1, [[0., 0., 0.], [0., 1., 0.], [0., 1., 1.], [0., 0., 1.]])
    }

    fn distance(a: &Surface, b: &Surface) -> f64 {
        (a.centroid - b.centroid).norm()
    }

    #[test]
    fn distant_squares_use_double_area() {
        let mut ctrl = control(1e-4, 12);
        let lower = floor();
        let upper = rect(1, [[0., 0., 5.], [0., 1., 5.], [1., 1., 5.], [1., 0., 5.]]);
        view_method(&lower, &upper, distance(&lower, &upper), &mut ctrl);
        assert_eq!(ctrl.method, Method::Dai);
        assert_relative_eq!(ctrl.rc_ratio, 1.0);
    }

    #[test]
    fn small_distant_surface_uses_single_area() {
        let mut ctrl = control(1e-4, 12);
        let big = rect(0, [[0., 0., 0.], [10., 0., 0.], [10., 10., 0.], [0., 10., 0.]]);
        let small = rect(1, [[5., 5., 8.], [5., 6., 8.], [6., 6., 8.], [6., 5., 8.]]);
        view_method(&big, &small, distance(&big, &small), &mut ctrl);
        assert_eq!(ctrl.method, Method::Sai);
        assert!(ctrl.rc_ratio > 4.0);
    }

    #[test]
    fn adjoining_squares_use_single_line() {
        let mut ctrl = control(1e-4, 12);
        let (a, b) = (floor(), wall());
        view_method(&a, &b, distance(&a, &b), &mut ctrl);
        assert_eq!(ctrl.method, Method::Sli);
        ctrl.eps_af = a.area.min(b.area) * ctrl.eps_adap;
        let af = view_unobstructed(&a, &b, &mut ctrl);
        assert_relative_eq!(af, 0.200_043_8, epsilon = 5e-4);
        assert!(!ctrl.fail_view_ali);
    }

    #[test]
    fn tight_convergence_fails_without_crashing() {
        let mut ctrl = control(1e-12, 2);
        let (a, b) = (floor(), wall());
        view_method(&a, &b, distance(&a, &b), &mut ctrl);
        assert_eq!(ctrl.method, Method::Ali);
        ctrl.eps_af = a.area.min(b.area) * ctrl.eps_adap;
        let af = view_unobstructed(&a, &b, &mut ctrl);
        assert!(af.is_finite());
        assert!(ctrl.fail_view_ali);
        assert!(ctrl.failed());
    }

    #[test]
    fn fixed_method_converges_or_is_fixed() {
        let mut ctrl = control(1e-4, 12);
        let lower = floor();
        let upper = rect(1, [[0., 0., 1.], [0., 1., 1.], [1., 1., 1.], [1., 0., 1.]]);
        view_method(&lower, &upper, distance(&lower, &upper), &mut ctrl);
        ctrl.eps_af = lower.area.min(upper.area) * ctrl.eps_adap;
        let af = view_unobstructed(&lower, &upper, &mut ctrl);
        assert_relative_eq!(af, 0.199_824_9, epsilon = 2e-4);
        let counted: u64 = ctrl.stats.method_counts.iter().flatten().sum();
        assert_eq!(counted, 1);
    }
}

fn ordered<'a>(srf_n: &'a Surface, srf_m: &'a Surface) -> (&'a Surface, &'a Surface) {
    if srf_n.rc >= srf_m.rc {
        (srf_m, srf_n)
    } else {
        (srf_n, srf_m)
    }
}

/// Chooses the integration method from the radius ratio and the relative
/// separation of the two surfaces. Surface 1 is the smaller one.
pub fn view_method(srf_n: &Surface, srf_m: &Surface, dist: f64, ctrl: &mut ViewControl) {
    let (srf1, srf2) = ordered(srf_n, srf_m);
    let th = ctrl.thresholds;
    ctrl.rc_ratio = srf2.rc / srf1.rc;
    ctrl.rel_sep = dist / (srf1.rc + srf2.rc);

    let mut method = None;
    if ctrl.rc_ratio > config::RC_RATIO_SAI {
        if srf1.shape.is_simple() {
            // height of the small surface above the plane of the large one
            let rel_dot = srf2.plane.height(&srf1.centroid);
            let far = rel_dot > 2.0 * srf1.rc;
            if ctrl.rc_ratio > config::RC_RATIO_SAI_FAR && (ctrl.rel_sep > th.sai10 || far) {
                method = Some(Method::Sai);
            } else if ctrl.rel_sep > th.sai4 || far {
                method = Some(Method::Sai);
            }
        }
        if method.is_none() && ctrl.rel_sep > th.sli4 {
            method = Some(Method::Sli);
        }
    }
    if method.is_none() && ctrl.rel_sep > th.dai1 && srf1.shape.is_simple() && srf2.shape.is_simple() {
        method = Some(Method::Dai);
    }
    if method.is_none() && ctrl.rel_sep > th.sli1 {
        method = Some(Method::Sli);
    }
    if method == Some(Method::Sli) && ctrl.eps_adap < config::EPS_SLI_TO_ALI {
        method = Some(Method::Ali);
    }
    ctrl.method = method.unwrap_or(Method::Ali);
    debug!(
        "rc ratio {:.3}, relative separation {:.2}, method {}",
        ctrl.rc_ratio, ctrl.rel_sep, ctrl.method
    );
}

fn fixed(method: Method, srf1: &Surface, srf2: &Surface, n: usize) -> f64 {
    match method {
        Method::Dai => view_2ai(srf1, srf2, n),
        Method::Sai => view_1ai(srf1, srf2, n),
        Method::Dli => view_2li(srf1, srf2, n),
        _ => view_1li(srf1, srf2, n),
    }
}

fn adaptive(srf1: &Surface, srf2: &Surface, ctrl: &mut ViewControl) -> f64 {
    let result = view_ali(srf1, srf2, ctrl.eps_af, ctrl.max_recurs_ali);
    ctrl.stats.used_v1li_adapt += result.evaluations;
    if !result.converged {
        ctrl.fail_view_ali = true;
    }
    result.af
}

/// `A1 * F12` by the method chosen in [`view_method`]. Fixed-order methods
/// add Gauss points per edge until successive estimates agree within
/// `ctrl.eps_af`; failing that, adaptive line integration takes over.
pub fn view_unobstructed(srf_n: &Surface, srf_m: &Surface, ctrl: &mut ViewControl) -> f64 {
    let (srf1, srf2) = ordered(srf_n, srf_m);
    ctrl.fail_view_ali = false;
    let method = ctrl.method;

    if method == Method::Ali {
        ctrl.n_edge_div = config::MIN_EDGE_DIVISIONS;
        ctrl.stats.record_method(method, config::MIN_EDGE_DIVISIONS);
        return adaptive(srf1, srf2, ctrl);
    }

    let mut previous = fixed(method, srf1, srf2, config::MIN_EDGE_DIVISIONS - 1);
    for n in config::MIN_EDGE_DIVISIONS..=config::MAX_EDGE_DIVISIONS {
        let current = fixed(method, srf1, srf2, n);
        if (current - previous).abs() < ctrl.eps_af {
            ctrl.n_edge_div = n;
            ctrl.stats.record_method(method, n);
            return current;
        }
        previous = current;
    }

    debug!("{} did not converge, using adaptive line integration", method);
    ctrl.stats.record_fix(method);
    adaptive(srf1, srf2, ctrl)
}
