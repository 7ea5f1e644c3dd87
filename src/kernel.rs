use log::{debug, trace};

use crate::impact::{find_impact, require_impact};
use crate::model::{FirError, FirResult, KernelParams};
use crate::normalize::{apply_gain, normalize};
use crate::signal::{ms_to_samples, FirKernel, Signal};

/// Cut a fixed-length kernel out of a raw impulse recording.
///
/// The recording is normalized and scaled by `params.headroom`, given
/// `pre_impact_ms` of leading silence, then windowed so the detected impact
/// lands exactly `pre_impact_samples` into a buffer of
/// `round(rate * total_ms / 1000)` samples. Recordings shorter than the
/// window are zero-padded, longer ones truncated.
pub fn extract_kernel(raw: &Signal, params: &KernelParams) -> FirResult<FirKernel> {
    params.validate()?;
    let rate = raw.sample_rate();

    let scaled = apply_gain(&normalize(raw, 1.0)?, params.headroom);
    let unpadded_impact = find_impact(scaled.samples(), params.threshold);

    let lead_in = ms_to_samples(rate, params.pre_impact_ms);
    let total = ms_to_samples(rate, params.total_ms);
    if total <= lead_in {
        return Err(FirError::InvalidParams(format!(
            "{} ms at {} Hz leaves no room after a {} sample lead-in",
            params.total_ms, rate, lead_in
        )));
    }
    let tail = total - lead_in;

    let mut padded = Vec::with_capacity(lead_in + scaled.len() + tail);
    padded.resize(lead_in, 0.0);
    padded.extend_from_slice(scaled.samples());

    // Padding moved everything; scan again rather than trusting the old index.
    let impact = require_impact(&padded, params.threshold)?;
    debug_assert_eq!(Some(impact), unpadded_impact.map(|i| i + lead_in));
    trace!(
        "Impact at {} of padded recording ({} lead-in samples)",
        impact,
        lead_in
    );

    if impact < lead_in {
        return Err(FirError::InsufficientLeadIn { impact, lead_in });
    }
    padded.drain(..impact - lead_in);

    padded.resize(padded.len() + tail, 0.0);
    padded.truncate(total);

    debug!(
        "Kernel: {} samples at {} Hz, impact at {}",
        padded.len(),
        rate,
        lead_in
    );
    Ok(FirKernel::new(raw.with_samples(padded), lead_in))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording(len: usize, impact: usize, rate: u32) -> Signal {
        // Low-level noise floor, a hit at `impact`, then a decaying tail.
        let mut samples: Vec<f64> = (0..len)
            .map(|i| 0.01 * ((i as f64) * 0.37).sin())
            .collect();
        for (k, s) in samples[impact..].iter_mut().enumerate() {
            *s += 0.8 * (-(k as f64) / 200.0).exp() * ((k as f64) * 0.2).cos();
        }
        Signal::new(samples, rate).unwrap()
    }

    #[test]
    fn two_second_recording_at_44k1() {
        let raw = recording(88200, 8820, 44100);
        let kernel = extract_kernel(&raw, &KernelParams::default()).unwrap();
        assert_eq!(kernel.total_samples(), 6615);
        assert_eq!(kernel.samples().len(), 6615);
        assert_eq!(kernel.pre_impact_samples(), 882);
        assert_eq!(kernel.sample_rate(), 44100);
        assert_eq!(find_impact(kernel.samples(), 0.5), Some(882));
    }

    #[test]
    fn short_recording_is_padded_to_length() {
        // Ends 10 samples after the hit.
        let raw = recording(110, 100, 48000);
        let kernel = extract_kernel(&raw, &KernelParams::default()).unwrap();
        assert_eq!(kernel.samples().len(), 7200);
        assert_eq!(find_impact(kernel.samples(), 0.5), Some(960));
        assert!(kernel.samples()[1000..].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn impact_at_first_sample_gets_full_lead_in() {
        let mut samples = vec![0.0; 4000];
        samples[0] = 1.0;
        samples[1] = -0.3;
        let raw = Signal::new(samples, 8000).unwrap();
        let kernel = extract_kernel(&raw, &KernelParams::default()).unwrap();
        assert_eq!(kernel.samples().len(), 1200);
        assert!(kernel.samples()[..160].iter().all(|s| *s == 0.0));
        assert!((kernel.samples()[160] - 0.9).abs() < 1e-12);
        assert!((kernel.samples()[161] + 0.27).abs() < 1e-12);
    }

    #[test]
    fn length_is_independent_of_recording_length() {
        let params = KernelParams {
            pre_impact_ms: 5.0,
            total_ms: 42.5,
            ..KernelParams::default()
        };
        let expected = ms_to_samples(44100, 42.5);
        for len in [300usize, 1874, 20_000, 200_000] {
            let raw = recording(len, 250, 44100);
            let kernel = extract_kernel(&raw, &params).unwrap();
            assert_eq!(kernel.samples().len(), expected, "len {}", len);
        }
    }

    #[test]
    fn headroom_scales_peak() {
        let raw = recording(4000, 1000, 44100);
        let params = KernelParams {
            headroom: 0.5,
            threshold: 0.25,
            ..KernelParams::default()
        };
        let kernel = extract_kernel(&raw, &params).unwrap();
        let peak = crate::normalize::peak(kernel.samples());
        assert!((peak - 0.5).abs() < 1e-12);
    }

    #[test]
    fn silent_recording_is_degenerate() {
        let raw = Signal::silence(1000, 44100).unwrap();
        assert!(matches!(
            extract_kernel(&raw, &KernelParams::default()),
            Err(FirError::DegenerateSignal)
        ));
    }

    #[test]
    fn unreachable_threshold_reports_missing_impact() {
        let raw = recording(4000, 1000, 44100);
        // After normalizing with 0.9 headroom nothing can exceed 0.95.
        let params = KernelParams {
            threshold: 0.95,
            ..KernelParams::default()
        };
        assert!(matches!(
            extract_kernel(&raw, &params),
            Err(FirError::ImpactNotFound { .. })
        ));
    }

    #[test]
    fn rejects_bad_params() {
        let raw = recording(4000, 1000, 44100);
        let params = KernelParams {
            pre_impact_ms: 200.0,
            total_ms: 150.0,
            ..KernelParams::default()
        };
        assert!(matches!(
            extract_kernel(&raw, &params),
            Err(FirError::InvalidParams(_))
        ));
    }
}
