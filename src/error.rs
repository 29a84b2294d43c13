use std::fmt;
use std::panic::Location;

use thiserror::Error;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_points_at_caller() {
        let err = ViewError::from(ErrorKind::SharedCentroid { row: 3, col: 1 });
        assert!(err.location.file().ends_with("error.rs"));
        assert_eq!(err.severity(), Severity::Fatal);
        assert!(err.to_string().contains("row 3, col 1"));
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Note < Severity::Warning);
        assert!(Severity::Error < Severity::Fatal);
    }
}

/// How serious a reported condition is. Anything at or above `Fatal`
/// terminates the pass once it reaches the top-level driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Note,
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head = match self {
            Severity::Note => "note",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        };
        write!(f, "{}", head)
    }
}

/// Invariant violations raised by the view factor core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ErrorKind {
    #[error("requested {requested} bytes in '{name}', larger than block capacity of {capacity} bytes")]
    OversizedRequest {
        name: &'static str,
        requested: usize,
        capacity: usize,
    },

    #[error("out of memory allocating block for '{name}'")]
    OutOfMemory { name: &'static str },

    #[error("arena '{name}' used after release")]
    Released { name: &'static str },

    #[error("would divide by a near-zero homogeneous weight (w = {w:e})")]
    ZeroHomogeneousWeight { w: f64 },

    #[error("surfaces have same centroids: row {row}, col {col}")]
    SharedCentroid { row: usize, col: usize },

    #[error("surfaces intersect: row {row}, col {col}")]
    SurfacesIntersect { row: usize, col: usize },

    #[error("invalid surface {index}: {reason}")]
    InvalidSurface { index: usize, reason: String },

    #[error("invalid enclosure: {0}")]
    InvalidEnclosure(String),
}

impl ErrorKind {
    pub fn severity(&self) -> Severity {
        match self {
            ErrorKind::InvalidSurface { .. } | ErrorKind::InvalidEnclosure(_) => Severity::Error,
            _ => Severity::Fatal,
        }
    }
}

/// An error with the source location it was raised from.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("*** {severity} *** {kind} [{file}:{line}]", severity = .kind.severity(), file = .location.file(), line = .location.line())]
pub struct ViewError {
    pub kind: ErrorKind,
    pub location: &'static Location<'static>,
}

impl ViewError {
    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() >= Severity::Fatal
    }
}

impl From<ErrorKind> for ViewError {
    #[track_caller]
    fn from(kind: ErrorKind) -> Self {
        Self {
            kind,
            location: Location::caller(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ViewError>;
