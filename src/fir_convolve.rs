// Linear convolution of a signal with an FIR kernel.
// Two interchangeable backends sit behind `Convolver`: a streaming direct-form
// FIR for short kernels and an overlap-add FFT engine for everything else.

use std::str::FromStr;
use std::sync::Arc;

use log::debug;
use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};

use crate::model::{FilterParams, FirError, FirResult};
use crate::normalize::{apply_gain, normalize};
use crate::signal::Signal;

/// Operands at or below this length go through the direct backend.
pub const DIRECT_MAX_TAPS: usize = 64;

/// Computes `y[n] = sum_k h[k] * x[n - k]` over the full output range,
/// `x.len() + h.len() - 1` samples. Both operands must be non-empty.
pub trait Convolver {
    fn convolve(&self, x: &[f64], h: &[f64]) -> FirResult<Vec<f64>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Pick by operand size.
    Auto,
    Direct,
    Fft,
}

impl Strategy {
    fn resolve(self, x_len: usize, h_len: usize) -> Strategy {
        match self {
            Strategy::Auto if x_len.min(h_len) <= DIRECT_MAX_TAPS => Strategy::Direct,
            Strategy::Auto => Strategy::Fft,
            other => other,
        }
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Strategy::Auto),
            "direct" => Ok(Strategy::Direct),
            "fft" => Ok(Strategy::Fft),
            _ => Err(format!("Invalid strategy '{}'; must be auto, direct, or fft", s)),
        }
    }
}

/// Convolve `input` with `kernel`, keeping the input's sample rate.
pub fn convolve(input: &Signal, kernel: &Signal, strategy: Strategy) -> FirResult<Signal> {
    if input.sample_rate() != kernel.sample_rate() {
        return Err(FirError::RateMismatch {
            input: input.sample_rate(),
            kernel: kernel.sample_rate(),
        });
    }
    let (x, h) = (input.samples(), kernel.samples());
    let samples = match strategy.resolve(x.len(), h.len()) {
        Strategy::Direct => {
            debug!("Direct convolution: {} x {} taps", x.len(), h.len());
            DirectConvolver.convolve(x, h)?
        }
        _ => {
            debug!("FFT convolution: {} x {} taps", x.len(), h.len());
            FftConvolver.convolve(x, h)?
        }
    };
    Ok(input.with_samples(samples))
}

/// Run `input` through `kernel` with the gain staging used for filtered
/// output: both operands normalized to full scale, the result normalized
/// again and scaled by `params.headroom`.
pub fn filter_signal(input: &Signal, kernel: &Signal, params: &FilterParams) -> FirResult<Signal> {
    params.validate()?;
    if input.sample_rate() != kernel.sample_rate() {
        return Err(FirError::RateMismatch {
            input: input.sample_rate(),
            kernel: kernel.sample_rate(),
        });
    }
    let x = normalize(input, 1.0)?;
    let h = normalize(kernel, 1.0)?;
    let y = convolve(&x, &h, params.strategy)?;
    Ok(apply_gain(&normalize(&y, 1.0)?, params.headroom))
}

fn check_operands(x: &[f64], h: &[f64]) -> FirResult<()> {
    if x.is_empty() || h.is_empty() {
        return Err(FirError::EmptySignal);
    }
    Ok(())
}

/// Direct-form FIR over a circular delay line, one sample in, one out.
pub struct FirConvolve {
    taps: Vec<f64>,
    state: Vec<f64>,
    write_idx: usize,
}

impl FirConvolve {
    pub fn new(taps: &[f64]) -> Self {
        assert!(!taps.is_empty(), "FIR must have at least one tap.");
        FirConvolve {
            taps: taps.to_vec(),
            state: vec![0.0; taps.len()],
            write_idx: 0,
        }
    }

    #[inline]
    pub fn process_sample(&mut self, x: f64) -> f64 {
        self.state[self.write_idx] = x;
        let acc = self.convolve_current();
        self.advance();
        acc
    }

    pub fn reset(&mut self) {
        self.state.iter_mut().for_each(|s| *s = 0.0);
        self.write_idx = 0;
    }

    pub fn len(&self) -> usize {
        self.taps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }

    // state[write_idx] holds x[n]; walking backwards from there gives
    // x[n-1], x[n-2], ... wrapping once at the start of the buffer.
    #[inline(always)]
    fn convolve_current(&self) -> f64 {
        let w = self.write_idx;
        let (recent, older) = self.state.split_at(w + 1);
        let (near_taps, far_taps) = self.taps.split_at(w + 1);
        let near: f64 = near_taps
            .iter()
            .zip(recent.iter().rev())
            .map(|(h, x)| h * x)
            .sum();
        let far: f64 = far_taps
            .iter()
            .zip(older.iter().rev())
            .map(|(h, x)| h * x)
            .sum();
        near + far
    }

    #[inline(always)]
    fn advance(&mut self) {
        self.write_idx += 1;
        if self.write_idx == self.state.len() {
            self.write_idx = 0;
        }
    }
}

/// O(N*M) backend. Streams the input, then `M - 1` zeros to flush the tail.
pub struct DirectConvolver;

impl Convolver for DirectConvolver {
    fn convolve(&self, x: &[f64], h: &[f64]) -> FirResult<Vec<f64>> {
        check_operands(x, h)?;
        let mut fir = FirConvolve::new(h);
        let flush = std::iter::repeat(0.0).take(h.len() - 1);
        Ok(x.iter()
            .copied()
            .chain(flush)
            .map(|s| fir.process_sample(s))
            .collect())
    }
}

/// Overlap-add backend built on real FFTs.
pub struct FftConvolver;

impl FftConvolver {
    /// FFT length used for a kernel of `taps` samples.
    pub fn fft_size(taps: usize) -> usize {
        (2 * taps).next_power_of_two().max(2)
    }
}

impl Convolver for FftConvolver {
    fn convolve(&self, x: &[f64], h: &[f64]) -> FirResult<Vec<f64>> {
        check_operands(x, h)?;
        // Commutative; block over the longer operand.
        let (x, h) = if h.len() > x.len() { (h, x) } else { (x, h) };

        let fft_size = Self::fft_size(h.len());
        let block = fft_size - h.len() + 1;
        let mut planner = RealFftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(fft_size);
        let inverse = planner.plan_fft_inverse(fft_size);

        let kernel_spectrum = spectrum_of(&forward, h)?;
        let mut time = forward.make_input_vec();
        let mut freq = forward.make_output_vec();
        let scale = 1.0 / fft_size as f64;

        let out_len = x.len() + h.len() - 1;
        let mut out = vec![0.0; out_len];

        for (chunk_idx, chunk) in x.chunks(block).enumerate() {
            time[..chunk.len()].copy_from_slice(chunk);
            time[chunk.len()..].iter_mut().for_each(|s| *s = 0.0);
            forward.process(&mut time, &mut freq)?;

            for (bin, k) in freq.iter_mut().zip(kernel_spectrum.iter()) {
                *bin *= *k;
            }
            clear_edge_imaginary(&mut freq);
            inverse.process(&mut freq, &mut time)?;

            let offset = chunk_idx * block;
            let produced = (chunk.len() + h.len() - 1).min(out_len - offset);
            for (o, t) in out[offset..offset + produced].iter_mut().zip(&time) {
                *o += t * scale;
            }
        }
        Ok(out)
    }
}

fn spectrum_of(
    forward: &Arc<dyn RealToComplex<f64>>,
    taps: &[f64],
) -> FirResult<Vec<Complex<f64>>> {
    let mut time = forward.make_input_vec();
    time[..taps.len()].copy_from_slice(taps);
    let mut freq = forward.make_output_vec();
    forward.process(&mut time, &mut freq)?;
    Ok(freq)
}

// The inverse real FFT requires purely real DC and Nyquist bins; rounding in
// the complex product can leave a tiny imaginary residue there.
fn clear_edge_imaginary(freq: &mut [Complex<f64>]) {
    if let Some(first) = freq.first_mut() {
        first.im = 0.0;
    }
    if let Some(last) = freq.last_mut() {
        last.im = 0.0;
    }
}
