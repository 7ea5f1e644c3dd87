use crate::model::{FirError, FirResult};

/// Mono sample buffer with a fixed sample rate.
///
/// Construction validates the rate and rejects NaN/Inf samples, so every
/// `Signal` handed between stages holds finite data.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    samples: Vec<f64>,
    sample_rate: u32,
}

impl Signal {
    pub fn new(samples: Vec<f64>, sample_rate: u32) -> FirResult<Self> {
        if sample_rate == 0 {
            return Err(FirError::InvalidSampleRate);
        }
        if let Some(index) = samples.iter().position(|s| !s.is_finite()) {
            return Err(FirError::NonFiniteSample { index });
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    pub fn silence(len: usize, sample_rate: u32) -> FirResult<Self> {
        Self::new(vec![0.0; len], sample_rate)
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f64> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Same rate, new samples. Used by stages that only ever produce
    /// finite output from finite input.
    pub(crate) fn with_samples(&self, samples: Vec<f64>) -> Self {
        debug_assert!(samples.iter().all(|s| s.is_finite()));
        Self {
            samples,
            sample_rate: self.sample_rate,
        }
    }
}

/// Number of samples covering `ms` milliseconds at `sample_rate`, rounded
/// to the nearest sample.
pub fn ms_to_samples(sample_rate: u32, ms: f64) -> usize {
    (sample_rate as f64 * ms / 1000.0).round() as usize
}

/// A fixed-length filter kernel cut from an impulse recording.
#[derive(Debug, Clone, PartialEq)]
pub struct FirKernel {
    signal: Signal,
    pre_impact_samples: usize,
    total_samples: usize,
}

impl FirKernel {
    pub(crate) fn new(signal: Signal, pre_impact_samples: usize) -> Self {
        let total_samples = signal.len();
        debug_assert!(pre_impact_samples < total_samples);
        Self {
            signal,
            pre_impact_samples,
            total_samples,
        }
    }

    pub fn signal(&self) -> &Signal {
        &self.signal
    }

    pub fn into_signal(self) -> Signal {
        self.signal
    }

    pub fn samples(&self) -> &[f64] {
        self.signal.samples()
    }

    pub fn sample_rate(&self) -> u32 {
        self.signal.sample_rate()
    }

    /// Lead-in length; also the impact position inside the kernel.
    pub fn pre_impact_samples(&self) -> usize {
        self.pre_impact_samples
    }

    pub fn total_samples(&self) -> usize {
        self.total_samples
    }

    pub fn impact_index(&self) -> usize {
        self.pre_impact_samples
    }
}

impl AsRef<Signal> for FirKernel {
    fn as_ref(&self) -> &Signal {
        &self.signal
    }
}

impl AsRef<Signal> for Signal {
    fn as_ref(&self) -> &Signal {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_rate() {
        assert!(matches!(
            Signal::new(vec![0.0], 0),
            Err(FirError::InvalidSampleRate)
        ));
    }

    #[test]
    fn rejects_non_finite_samples() {
        match Signal::new(vec![0.0, 0.5, f64::NAN], 48000) {
            Err(FirError::NonFiniteSample { index }) => assert_eq!(index, 2),
            other => panic!("unexpected {:?}", other),
        }
        assert!(Signal::new(vec![f64::INFINITY], 48000).is_err());
    }

    #[test]
    fn ms_conversion_rounds() {
        assert_eq!(ms_to_samples(44100, 20.0), 882);
        assert_eq!(ms_to_samples(44100, 150.0), 6615);
        // 48000 * 0.01 ms = 0.48 -> 0, 0.011 ms -> 0.528 -> 1
        assert_eq!(ms_to_samples(48000, 0.01), 0);
        assert_eq!(ms_to_samples(48000, 0.011), 1);
    }

    #[test]
    fn duration_from_rate() {
        let sig = Signal::silence(22050, 44100).unwrap();
        assert!((sig.duration_secs() - 0.5).abs() < 1e-12);
    }
}
