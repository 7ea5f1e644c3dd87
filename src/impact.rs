use crate::model::{FirError, FirResult};

/// Index of the first sample whose absolute value strictly exceeds
/// `threshold`, or `None` if the signal never gets there.
pub fn find_impact(samples: &[f64], threshold: f64) -> Option<usize> {
    samples.iter().position(|s| s.abs() > threshold)
}

/// [`find_impact`], with "not found" surfaced as an error.
pub fn require_impact(samples: &[f64], threshold: f64) -> FirResult<usize> {
    find_impact(samples, threshold).ok_or(FirError::ImpactNotFound { threshold })
}
