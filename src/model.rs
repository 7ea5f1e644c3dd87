/*
 Copyright (c) 2024 the ir2fir authors

 This file is part of ir2fir

 ir2fir is free software: you can redistribute it and/or modify it
 under the terms of the GNU General Public License as published by the
 Free Software Foundation, either version 3 of the License, or
 (at your option) any later version.

 ir2fir is distributed in the hope that it will be useful, but
 WITHOUT ANY WARRANTY; without even the implied warranty of
 MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 GNU General Public License for more details.
 You should have received a copy of the GNU General Public License
 along with ir2fir. If not, see <https://www.gnu.org/licenses/>.
*/

use core::fmt;
use std::io;
use std::process::{ExitCode, Termination};

use log::error;

use crate::fir_convolve::Strategy;

/// Everything the signal core and the WAV adapter can fail with.
#[derive(Debug)]
pub enum FirError {
    /// Peak amplitude is zero, nothing to scale against.
    DegenerateSignal,
    /// No sample rises above the detection threshold.
    ImpactNotFound { threshold: f64 },
    /// Impact sits closer to the start than the requested lead-in.
    /// Padding makes this unreachable; seeing it means a logic defect.
    InsufficientLeadIn { impact: usize, lead_in: usize },
    RateMismatch { input: u32, kernel: u32 },
    EmptySignal,
    InvalidSampleRate,
    NonFiniteSample { index: usize },
    InvalidParams(String),
    Cancelled,
    Io(io::Error),
    Wav(hound::Error),
    Fft(realfft::FftError),
}

impl fmt::Display for FirError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FirError::DegenerateSignal => {
                f.write_str("Signal is silent (peak amplitude 0); cannot normalize")
            }
            FirError::ImpactNotFound { threshold } => write!(
                f,
                "No sample exceeds the impact threshold {}; recording has no usable impulse",
                threshold
            ),
            FirError::InsufficientLeadIn { impact, lead_in } => write!(
                f,
                "Impact at sample {} leaves less than {} samples of lead-in",
                impact, lead_in
            ),
            FirError::RateMismatch { input, kernel } => write!(
                f,
                "Sample rate mismatch: input is {} Hz, kernel is {} Hz",
                input, kernel
            ),
            FirError::EmptySignal => f.write_str("Signal has no samples"),
            FirError::InvalidSampleRate => f.write_str("Sample rate must be positive"),
            FirError::NonFiniteSample { index } => {
                write!(f, "Sample {} is NaN or infinite", index)
            }
            FirError::InvalidParams(msg) => write!(f, "Invalid parameters: {}", msg),
            FirError::Cancelled => f.write_str("Cancelled"),
            FirError::Io(e) => write!(f, "I/O error: {}", e),
            FirError::Wav(e) => write!(f, "WAV error: {}", e),
            FirError::Fft(e) => write!(f, "FFT error: {}", e),
        }
    }
}

impl std::error::Error for FirError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FirError::Io(e) => Some(e),
            FirError::Wav(e) => Some(e),
            FirError::Fft(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for FirError {
    fn from(error: io::Error) -> Self {
        FirError::Io(error)
    }
}

impl From<hound::Error> for FirError {
    fn from(error: hound::Error) -> Self {
        match error {
            hound::Error::IoError(e) => FirError::Io(e),
            other => FirError::Wav(other),
        }
    }
}

impl From<realfft::FftError> for FirError {
    fn from(error: realfft::FftError) -> Self {
        FirError::Fft(error)
    }
}

pub type FirResult<T> = Result<T, FirError>;

/// Settings for turning one impulse recording into a kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelParams {
    /// Lead-in kept ahead of the detected impact.
    pub pre_impact_ms: f64,
    /// Full kernel duration, lead-in included.
    pub total_ms: f64,
    /// Absolute amplitude the impact must strictly exceed.
    pub threshold: f64,
    /// Gain applied after normalizing the recording.
    pub headroom: f64,
}

impl Default for KernelParams {
    fn default() -> Self {
        Self {
            pre_impact_ms: 20.0,
            total_ms: 150.0,
            threshold: 0.5,
            headroom: 0.9,
        }
    }
}

impl KernelParams {
    pub fn validate(&self) -> FirResult<()> {
        if !self.pre_impact_ms.is_finite() || self.pre_impact_ms <= 0.0 {
            return Err(FirError::InvalidParams(format!(
                "pre-impact duration must be a positive number of ms, got {}",
                self.pre_impact_ms
            )));
        }
        if !self.total_ms.is_finite() || self.total_ms <= self.pre_impact_ms {
            return Err(FirError::InvalidParams(format!(
                "total duration ({} ms) must exceed the pre-impact duration ({} ms)",
                self.total_ms, self.pre_impact_ms
            )));
        }
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(FirError::InvalidParams(format!(
                "threshold must be a non-negative number, got {}",
                self.threshold
            )));
        }
        validate_headroom(self.headroom)
    }
}

/// Settings for running one sample through one kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterParams {
    pub headroom: f64,
    pub strategy: Strategy,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            headroom: 0.9,
            strategy: Strategy::Auto,
        }
    }
}

impl FilterParams {
    pub fn validate(&self) -> FirResult<()> {
        validate_headroom(self.headroom)
    }
}

fn validate_headroom(headroom: f64) -> FirResult<()> {
    if !headroom.is_finite() || headroom <= 0.0 || headroom > 1.0 {
        return Err(FirError::InvalidParams(format!(
            "headroom must be in (0, 1], got {}",
            headroom
        )));
    }
    Ok(())
}

#[derive(Debug)]
pub enum MyError {
    Message(String),
}

impl std::fmt::Display for MyError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MyError::Message(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for MyError {}

pub type MyResult<T> = Result<T, MyError>;

pub struct TermResult(pub MyResult<()>);

impl Termination for TermResult {
    fn report(self) -> ExitCode {
        match self.0 {
            Ok(_) => ExitCode::SUCCESS,
            Err(err) => {
                error!("{}", err);
                ExitCode::FAILURE
            }
        }
    }
}

// Convert boxed dynamic errors into MyError
impl From<Box<dyn std::error::Error>> for MyError {
    fn from(err: Box<dyn std::error::Error>) -> Self {
        MyError::Message(err.to_string())
    }
}

impl From<FirError> for MyError {
    fn from(err: FirError) -> Self {
        MyError::Message(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_kernel_params_are_valid() {
        let params = KernelParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.pre_impact_ms, 20.0);
        assert_eq!(params.total_ms, 150.0);
    }

    #[test]
    fn total_must_exceed_lead_in() {
        let params = KernelParams {
            pre_impact_ms: 30.0,
            total_ms: 30.0,
            ..KernelParams::default()
        };
        assert!(matches!(params.validate(), Err(FirError::InvalidParams(_))));
    }

    #[test]
    fn headroom_out_of_range_is_rejected() {
        let params = FilterParams {
            headroom: 1.5,
            ..FilterParams::default()
        };
        assert!(params.validate().is_err());
        let params = KernelParams {
            headroom: 0.0,
            ..KernelParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn hound_io_errors_become_io() {
        let err: FirError =
            hound::Error::IoError(io::Error::new(io::ErrorKind::NotFound, "gone")).into();
        assert!(matches!(err, FirError::Io(_)));
    }
}
