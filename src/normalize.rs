use crate::model::{FirError, FirResult};
use crate::signal::Signal;

/// Largest absolute sample value, 0.0 for an empty slice.
pub fn peak(samples: &[f64]) -> f64 {
    samples.iter().fold(0.0f64, |acc, s| acc.max(s.abs()))
}

/// Peak level in dBFS; `-inf` for silence.
pub fn peak_dbfs(samples: &[f64]) -> f64 {
    20.0 * peak(samples).log10()
}

/// Rescale so the peak absolute amplitude equals `ceiling`.
///
/// Silent (or empty) input fails with [`FirError::DegenerateSignal`].
pub fn normalize(signal: &Signal, ceiling: f64) -> FirResult<Signal> {
    let peak = peak(signal.samples());
    if peak == 0.0 {
        return Err(FirError::DegenerateSignal);
    }
    let scale = ceiling / peak;
    Ok(signal.with_samples(signal.samples().iter().map(|s| s * scale).collect()))
}

/// Multiply every sample by `gain`. Headroom is applied through this after
/// normalizing.
pub fn apply_gain(signal: &Signal, gain: f64) -> Signal {
    signal.with_samples(signal.samples().iter().map(|s| s * gain).collect())
}
