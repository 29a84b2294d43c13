//! Calibrated constants of the view factor core. The values are empirically
//! tuned and have no closed-form derivation.


/// Default arena block size in bytes.
pub const BLOCK_BYTES: usize = 4096;
/// Allocation alignment in bytes; record sizes are rounded up to a multiple of this.
pub const ALIGNMENT: usize = 8;

/// Default minimum distance between distinct polygon vertices.
pub const EPS_DIST: f64 = 1e-6;
/// Default minimum area of a retained polygon.
pub const EPS_AREA: f64 = 1e-8;

/// Default convergence for adaptive integration.
pub const EPS_ADAP: f64 = 1e-4;
/// Default maximum recursion depth of adaptive line integration.
pub const MAX_RECURS_ALI: u32 = 12;
/// Default maximum recursion depth of obstructed view factor subdivision.
pub const MAX_RECURSION: u32 = 8;

/// Fraction of the sum of obstruction distances within which the projection
/// direction is not decided by distance.
pub const PROJECTION_GUARD_BAND: f64 = 0.002;
/// View factors smaller than this times the larger area are set to zero.
pub const AF_FLOOR: f64 = 1e-8;
/// Centroid separation, as a fraction of the summed radii, below which two
/// surfaces are taken to share a centroid.
pub const SHARED_CENTROID_RATIO: f64 = 1e-5;
/// Relative tolerance for classifying vertices against a plane.
pub const PLANE_TOLERANCE: f64 = 1e-5;
/// Relative tolerance for recognising a parallelogram.
pub const PARALLELOGRAM_TOLERANCE: f64 = 1e-5;

/// Lowest and highest number of Gauss points per edge or direction for the
/// fixed-order unobstructed methods.
pub const MIN_EDGE_DIVISIONS: usize = 2;
pub const MAX_EDGE_DIVISIONS: usize = 4;
/// Gauss points per direction on each element of obstructed integration.
pub const OBSTRUCTED_DIVISIONS: usize = 2;

/// Radius ratio above which single integration over the smaller surface is preferred.
pub const RC_RATIO_SAI: f64 = 4.0;
/// Radius ratio above which the looser separation threshold applies.
pub const RC_RATIO_SAI_FAR: f64 = 10.0;
/// Convergence below which single line integration is replaced by the adaptive method.
pub const EPS_SLI_TO_ALI: f64 = 0.5e-6;

/// Separation thresholds (distance / sum of radii) for one convergence band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MethodThresholds {
    pub sli4: f64,  // SLI if radius ratio > 4 and separation above this
    pub sai4: f64,  // SAI if radius ratio > 4 and separation above this
    pub sai10: f64, // SAI if radius ratio > 10 and separation above this
    pub dai1: f64,  // DAI if separation above this
    pub sli1: f64,  // SLI if separation above this
}

impl MethodThresholds {
    /// Thresholds for a requested convergence. Tighter convergence pushes
    /// the choice toward the line integral methods.
    pub fn for_convergence(eps_adap: f64) -> Self {
        let (sli4, sai4, sai10, dai1, sli1) = if eps_adap < 0.99e-7 {
            (0.7, 1.5, 1.8, 3.0, 3.0)
        } else if eps_adap < 0.99e-6 {
            (0.5, 1.2, 1.2, 2.3, 2.2)
        } else if eps_adap < 0.99e-5 {
            (0.45, 1.1, 1.0, 1.7, 1.5)
        } else if eps_adap < 0.99e-4 {
            (0.4, 1.0, 0.8, 1.3, 0.9)
        } else {
            (0.3, 0.9, 0.6, 1.0, 0.6)
        };
        Self {
            sli4,
            sai4,
            sai10,
            dai1,
            sli1,
        }
    }
}
