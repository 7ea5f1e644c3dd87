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

//! Uncompressed PCM WAV in and out, always mono on the inside.

use std::fs;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::{debug, warn};

use crate::dither::{Dither, DitherType};
use crate::model::{FirError, FirResult};
use crate::signal::Signal;

/// How multi-channel frames collapse to one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Downmix {
    /// Add the channels. Can exceed full scale; every stage normalizes anyway.
    Sum,
    Average,
}

impl FromStr for Downmix {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sum" => Ok(Downmix::Sum),
            "avg" | "average" => Ok(Downmix::Average),
            _ => Err(format!("Invalid downmix '{}'; must be sum or avg", s)),
        }
    }
}

/// On-disk sample format for written files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Float32,
    Int16,
    Int24,
}

impl OutputFormat {
    pub fn bits(self) -> u16 {
        match self {
            OutputFormat::Float32 => 32,
            OutputFormat::Int16 => 16,
            OutputFormat::Int24 => 24,
        }
    }

    fn spec(self, sample_rate: u32) -> WavSpec {
        WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: self.bits(),
            sample_format: match self {
                OutputFormat::Float32 => SampleFormat::Float,
                _ => SampleFormat::Int,
            },
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "f32" | "32" | "float" => Ok(OutputFormat::Float32),
            "i16" | "16" => Ok(OutputFormat::Int16),
            "i24" | "24" => Ok(OutputFormat::Int24),
            _ => Err(format!("Invalid output format '{}'; must be f32, i16, or i24", s)),
        }
    }
}

/// Decode a WAV file into a mono signal.
pub fn read_wav<P: AsRef<Path>>(path: P, downmix: Downmix) -> FirResult<Signal> {
    let reader = WavReader::open(path.as_ref())?;
    debug!("Reading {}", path.as_ref().display());
    decode(reader, downmix)
}

fn decode<R: Read>(reader: WavReader<BufReader<R>>, downmix: Downmix) -> FirResult<Signal> {
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(FirError::Wav(hound::Error::Unsupported));
    }

    let interleaved: Vec<f64> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map(f64::from))
            .collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            let full_scale = (1u64 << (spec.bits_per_sample - 1)) as f64;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f64 / full_scale))
                .collect::<Result<_, _>>()?
        }
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        debug!("Downmixing {} channels ({:?})", channels, downmix);
        interleaved
            .chunks_exact(channels)
            .map(|frame| {
                let sum: f64 = frame.iter().sum();
                match downmix {
                    Downmix::Sum => sum,
                    Downmix::Average => sum / channels as f64,
                }
            })
            .collect()
    };

    Signal::new(samples, spec.sample_rate)
}

/// Encode `signal` as a mono WAV file, creating parent directories as needed.
///
/// Integer formats are dithered with `dither` and clamped to full scale.
pub fn write_wav<P: AsRef<Path>>(
    path: P,
    signal: &Signal,
    format: OutputFormat,
    dither: DitherType,
) -> FirResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut writer = WavWriter::create(path, format.spec(signal.sample_rate()))?;
    match format {
        OutputFormat::Float32 => {
            for &s in signal.samples() {
                writer.write_sample(s as f32)?;
            }
        }
        OutputFormat::Int16 | OutputFormat::Int24 => {
            let mut quantizer = Quantizer::new(format.bits(), dither);
            for &s in signal.samples() {
                let q = quantizer.quantize(s);
                if format == OutputFormat::Int16 {
                    writer.write_sample(q as i16)?;
                } else {
                    writer.write_sample(q)?;
                }
            }
            if quantizer.clips > 0 {
                warn!(
                    "{}: {} samples clipped while quantizing",
                    path.display(),
                    quantizer.clips
                );
            }
        }
    }
    writer.finalize()?;
    Ok(())
}

struct Quantizer {
    scale_factor: f64,
    peak_level: i32,
    dither: Dither,
    clips: usize,
}

impl Quantizer {
    fn new(bits: u16, dither_type: DitherType) -> Self {
        let scale_factor = 2.0f64.powi(bits as i32 - 1);
        Self {
            scale_factor,
            peak_level: scale_factor as i32,
            dither: Dither::new(dither_type),
            clips: 0,
        }
    }

    fn quantize(&mut self, sample: f64) -> i32 {
        let mut q = sample * self.scale_factor;
        self.dither.process_samp(&mut q);
        let value = q.round() as i64;
        let (min, max) = (-(self.peak_level as i64), self.peak_level as i64 - 1);
        if value < min || value > max {
            self.clips += 1;
        }
        value.clamp(min, max) as i32
    }
}
