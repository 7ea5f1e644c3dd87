use realfft::RealFftPlanner;

use crate::model::{FirError, FirResult};
use crate::signal::Signal;

/// Upper edge of the band shown for kernels by default.
pub const DEFAULT_MAX_HZ: f64 = 5000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectrumBin {
    pub freq_hz: f64,
    /// Relative to the strongest one-sided bin, band limit or not.
    pub magnitude: f64,
}

/// One-sided magnitude spectrum of `signal`, bins up to `max_hz`.
///
/// Magnitudes are `|X[k]| / n`, then scaled so the largest of the `n / 2`
/// one-sided bins is 1.0.
pub fn magnitude_spectrum(signal: &Signal, max_hz: f64) -> FirResult<Vec<SpectrumBin>> {
    let n = signal.len();
    if n < 2 {
        return Err(FirError::EmptySignal);
    }

    let mut planner = RealFftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    let mut input = fft.make_input_vec();
    input.copy_from_slice(signal.samples());
    let mut output = fft.make_output_vec();
    fft.process(&mut input, &mut output)?;

    let one_sided = &output[..n / 2];
    let mags: Vec<f64> = one_sided.iter().map(|c| c.norm() / n as f64).collect();
    let max = mags.iter().cloned().fold(0.0, f64::max);
    if max == 0.0 {
        return Err(FirError::DegenerateSignal);
    }

    let bin_hz = signal.sample_rate() as f64 / n as f64;
    Ok(mags
        .into_iter()
        .enumerate()
        .map(|(k, m)| SpectrumBin {
            freq_hz: k as f64 * bin_hz,
            magnitude: m / max,
        })
        .take_while(|bin| bin.freq_hz <= max_hz)
        .collect())
}

/// `freq_hz,magnitude` lines with a header row.
pub fn spectrum_csv(bins: &[SpectrumBin]) -> String {
    let mut out = String::from("freq_hz,magnitude\n");
    for bin in bins {
        out.push_str(&format!("{:.3},{:.6e}\n", bin.freq_hz, bin.magnitude));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_peaks_at_its_frequency() {
        let rate = 8000;
        let n = 800;
        let samples: Vec<f64> = (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * 1000.0 * i as f64 / rate as f64).sin())
            .collect();
        let sig = Signal::new(samples, rate).unwrap();
        let bins = magnitude_spectrum(&sig, DEFAULT_MAX_HZ).unwrap();
        // n/2 bins at 10 Hz spacing, all under 5 kHz
        assert_eq!(bins.len(), 400);
        let top = bins
            .iter()
            .max_by(|a, b| a.magnitude.partial_cmp(&b.magnitude).unwrap())
            .unwrap();
        assert!((top.freq_hz - 1000.0).abs() < 1e-9);
        assert!((top.magnitude - 1.0).abs() < 1e-12);
    }

    #[test]
    fn band_is_clipped() {
        let mut samples = vec![0.0; 4410];
        samples[0] = 1.0;
        let sig = Signal::new(samples, 44100).unwrap();
        let bins = magnitude_spectrum(&sig, 5000.0).unwrap();
        assert!(bins.last().unwrap().freq_hz <= 5000.0);
        assert_eq!(bins.len(), 501);
        // Flat for a unit impulse
        assert!(bins.iter().all(|b| (b.magnitude - 1.0).abs() < 1e-12));
    }

    #[test]
    fn silent_kernel_is_degenerate() {
        let sig = Signal::silence(64, 44100).unwrap();
        assert!(matches!(
            magnitude_spectrum(&sig, 5000.0),
            Err(FirError::DegenerateSignal)
        ));
    }

    #[test]
    fn csv_has_header_and_rows() {
        let csv = spectrum_csv(&[
            SpectrumBin {
                freq_hz: 0.0,
                magnitude: 1.0,
            },
            SpectrumBin {
                freq_hz: 10.0,
                magnitude: 0.5,
            },
        ]);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "freq_hz,magnitude");
        assert_eq!(lines[1], "0.000,1.000000e0");
        assert_eq!(lines[2], "10.000,5.000000e-1");
    }
}
