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

use std::fs;
use std::path::PathBuf;

use log::{debug, info};

use crate::audio_file::{read_wav, write_wav, Downmix, OutputFormat};
use crate::dither::DitherType;
use crate::fir_convolve::filter_signal;
use crate::kernel::extract_kernel;
use crate::model::{FilterParams, FirResult, KernelParams};
use crate::spectrum::{magnitude_spectrum, spectrum_csv};

/// File-format choices shared by every job in a batch.
#[derive(Debug, Clone, Copy)]
pub struct WavOptions {
    pub format: OutputFormat,
    pub dither: DitherType,
    pub downmix: Downmix,
}

impl Default for WavOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Float32,
            dither: DitherType::Tpdf,
            downmix: Downmix::Sum,
        }
    }
}

/// One impulse recording in, one kernel file out.
#[derive(Debug, Clone)]
pub struct KernelJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub params: KernelParams,
    /// Band limit for the spectrum CSV written next to the kernel, if wanted.
    pub spectrum_max_hz: Option<f64>,
    pub wav: WavOptions,
}

/// One (sample, kernel) pair in, one filtered file out.
#[derive(Debug, Clone)]
pub struct FilterJob {
    pub sample: PathBuf,
    pub kernel: PathBuf,
    pub output: PathBuf,
    pub params: FilterParams,
    pub wav: WavOptions,
}

/// What a finished job produced.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutput {
    pub path: PathBuf,
    pub samples: usize,
    pub sample_rate: u32,
}

/// A unit of batch work: self-contained, safe to run on any worker.
pub trait BatchJob {
    fn label(&self) -> String;
    fn run(&self) -> FirResult<JobOutput>;
}

impl BatchJob for KernelJob {
    fn label(&self) -> String {
        file_label(&self.input)
    }

    fn run(&self) -> FirResult<JobOutput> {
        info!("Reading impulse response {}", self.input.display());
        let raw = read_wav(&self.input, self.wav.downmix)?;
        let kernel = extract_kernel(&raw, &self.params)?;

        info!("Writing FIR kernel to {}", self.output.display());
        write_wav(&self.output, kernel.signal(), self.wav.format, self.wav.dither)?;

        if let Some(max_hz) = self.spectrum_max_hz {
            let csv_path = self.output.with_extension("csv");
            let bins = magnitude_spectrum(kernel.signal(), max_hz)?;
            debug!("Writing {} spectrum bins to {}", bins.len(), csv_path.display());
            fs::write(&csv_path, spectrum_csv(&bins))?;
        }

        Ok(JobOutput {
            path: self.output.clone(),
            samples: kernel.total_samples(),
            sample_rate: kernel.sample_rate(),
        })
    }
}

impl BatchJob for FilterJob {
    fn label(&self) -> String {
        format!("{} * {}", file_label(&self.sample), file_label(&self.kernel))
    }

    fn run(&self) -> FirResult<JobOutput> {
        info!("Reading sample {}", self.sample.display());
        let input = read_wav(&self.sample, self.wav.downmix)?;
        debug!("Reading kernel {}", self.kernel.display());
        let kernel = read_wav(&self.kernel, self.wav.downmix)?;

        let filtered = filter_signal(&input, &kernel, &self.params)?;

        info!("Writing filtered sample to {}", self.output.display());
        write_wav(&self.output, &filtered, self.wav.format, self.wav.dither)?;

        Ok(JobOutput {
            path: self.output.clone(),
            samples: filtered.len(),
            sample_rate: filtered.sample_rate(),
        })
    }
}

fn file_label(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
