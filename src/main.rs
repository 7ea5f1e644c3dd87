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

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use ir2fir::batch::{self, JobReport, OnError};
use ir2fir::spectrum::DEFAULT_MAX_HZ;
use ir2fir::{
    BatchJob, ColorLogger, Downmix, DitherType, FilterParams, KernelParams, OutputFormat,
    Strategy, TermResult, WavOptions,
};
use log::{info, trace, warn};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::thread::available_parallelism;
use std::time::Instant;

static CANCEL_FLAG: AtomicBool = AtomicBool::new(false);

#[derive(Parser)]
#[command(
    name = "ir2fir",
    version,
    about = "Build FIR kernels from impulse responses and filter samples through them"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    shared: SharedArgs,
}

#[derive(Subcommand)]
enum Command {
    /// Extract one FIR kernel per impulse-response recording
    Kernel(KernelArgs),
    /// Convolve every sample with every kernel
    Filter(FilterArgs),
}

#[derive(Args)]
struct SharedArgs {
    /// Output sample format for written files: f32, i16, or i24
    #[arg(long = "format", default_value = "f32", global = true)]
    format: OutputFormat,

    /// Dither for integer output: T (TPDF), R (rectangular), X (none)
    #[arg(short = 'd', long = "dither", default_value = "t", global = true)]
    dither: DitherType,

    /// How multi-channel input collapses to mono: sum or avg
    #[arg(long = "downmix", default_value = "sum", global = true)]
    downmix: Downmix,

    /// Recurse into directories when the supplied input paths include folders
    #[arg(short = 'R', long = "recurse", global = true)]
    recurse: bool,

    /// Skip remaining jobs after the first failure
    #[arg(long = "fail-fast", global = true)]
    fail_fast: bool,

    /// Print diagnostic messages
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,

    /// Quiet mode: suppress all log output
    #[arg(short = 'q', long = "quiet", global = true)]
    quiet: bool,
}

#[derive(Args)]
struct KernelArgs {
    /// Impulse-response recordings (files or folders)
    #[arg(name = "IRS", required = true)]
    impulses: Vec<PathBuf>,

    /// Output root; kernels land in <OUT>/FIR_filters/<TOTAL>_ms
    #[arg(short = 'o', long = "out", default_value = ".")]
    out: PathBuf,

    /// Lead-in kept ahead of the impact, in ms
    #[arg(long = "pre-ms", default_value_t = 20.0)]
    pre_ms: f64,

    /// Kernel length including the lead-in, in ms
    #[arg(long = "total-ms", default_value_t = 150.0)]
    total_ms: f64,

    /// Normalized amplitude the impact must exceed
    #[arg(long = "threshold", default_value_t = 0.5)]
    threshold: f64,

    /// Peak level of the written kernel, in (0, 1]
    #[arg(long = "headroom", default_value_t = 0.9)]
    headroom: f64,

    /// Also write a magnitude spectrum CSV next to each kernel
    #[arg(long = "spectrum")]
    spectrum: bool,

    /// Upper frequency bound of the spectrum CSV, in Hz
    #[arg(long = "max-hz", default_value_t = DEFAULT_MAX_HZ)]
    max_hz: f64,
}

#[derive(Args)]
struct FilterArgs {
    /// Samples to filter (files or folders)
    #[arg(short = 's', long = "samples", required = true, num_args = 1..)]
    samples: Vec<PathBuf>,

    /// Kernels to apply [default: <OUT>/FIR_filters/<TOTAL>_ms]
    #[arg(short = 'k', long = "kernels", num_args = 1..)]
    kernels: Vec<PathBuf>,

    /// Output root; results land in <OUT>/filtered_samples/<TOTAL>_ms
    #[arg(short = 'o', long = "out", default_value = ".")]
    out: PathBuf,

    /// Kernel length the kernels were built with, in ms
    #[arg(long = "total-ms", default_value_t = 150.0)]
    total_ms: f64,

    /// Peak level of the filtered output, in (0, 1]
    #[arg(long = "headroom", default_value_t = 0.9)]
    headroom: f64,

    /// Convolution backend: auto, direct, or fft
    #[arg(long = "strategy", default_value = "auto")]
    strategy: Strategy,
}

fn main() -> TermResult {
    match run() {
        Ok(()) => TermResult(Ok(())),
        Err(e) => TermResult(Err(e.into())),
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let logger = ColorLogger::new(cli.shared.quiet, cli.shared.verbose);
    let max_level = logger.max_level();
    let multi = MultiProgress::new();
    LogWrapper::new(multi.clone(), logger).try_init()?;
    log::set_max_level(max_level);

    let avail_par = available_parallelism().map(|n| n.get()).unwrap_or(1);
    let thread_count = (avail_par / 2).max(1);

    // build_global can only be called once; a second call is harmless.
    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(thread_count)
        .build_global()
    {
        warn!(
            "Rayon pool initialization error ({} threads). Details: {:?}",
            thread_count, e
        );
    } else {
        trace!("Configured Rayon pool with {} threads", thread_count);
    }

    let wav = WavOptions {
        format: cli.shared.format,
        dither: cli.shared.dither,
        downmix: cli.shared.downmix,
    };
    let on_error = if cli.shared.fail_fast {
        OnError::Cancel
    } else {
        OnError::Continue
    };

    let wall_start = Instant::now();
    let reports = match &cli.command {
        Command::Kernel(args) => run_kernels(args, &cli.shared, wav, on_error, &multi)?,
        Command::Filter(args) => run_filters(args, &cli.shared, wav, on_error, &multi)?,
    };

    let failed = reports.iter().filter(|r| !r.is_ok()).count();
    let total_secs = wall_start.elapsed().as_secs();
    let h = total_secs / 3600;
    let m = (total_secs % 3600) / 60;
    let s = total_secs % 60;
    info!(
        "Processed {} jobs ({} failed) in {:02}:{:02}:{:02}",
        reports.len(),
        failed,
        h,
        m,
        s
    );

    if failed > 0 {
        return Err(format!("{} of {} jobs failed", failed, reports.len()).into());
    }
    Ok(())
}

fn run_kernels(
    args: &KernelArgs,
    shared: &SharedArgs,
    wav: WavOptions,
    on_error: OnError,
    multi: &MultiProgress,
) -> Result<Vec<JobReport>, Box<dyn Error>> {
    let params = KernelParams {
        pre_impact_ms: args.pre_ms,
        total_ms: args.total_ms,
        threshold: args.threshold,
        headroom: args.headroom,
    };
    params.validate()?;

    let impulses = batch::find_wav_files(&args.impulses, shared.recurse)?;
    if impulses.is_empty() {
        return Err("No WAV impulse responses found".into());
    }
    let spectrum_max_hz = args.spectrum.then_some(args.max_hz);
    let jobs = batch::plan_kernel_jobs(&impulses, &args.out, params, spectrum_max_hz, wav)?;
    info!(
        "Extracting {} kernels into {}",
        jobs.len(),
        batch::kernel_dir(&args.out, args.total_ms).display()
    );
    run_with_progress(&jobs, "[Kernels]", on_error, multi)
}

fn run_filters(
    args: &FilterArgs,
    shared: &SharedArgs,
    wav: WavOptions,
    on_error: OnError,
    multi: &MultiProgress,
) -> Result<Vec<JobReport>, Box<dyn Error>> {
    let params = FilterParams {
        headroom: args.headroom,
        strategy: args.strategy,
    };
    params.validate()?;

    let kernel_inputs = if args.kernels.is_empty() {
        let dir = batch::kernel_dir(&args.out, args.total_ms);
        require_kernel_dir(&dir, args.total_ms)?;
        vec![dir]
    } else {
        args.kernels.clone()
    };

    let samples = batch::find_wav_files(&args.samples, shared.recurse)?;
    let kernels = batch::find_wav_files(&kernel_inputs, shared.recurse)?;
    if samples.is_empty() {
        return Err("No WAV samples found".into());
    }
    if kernels.is_empty() {
        return Err("No WAV kernels found".into());
    }

    let jobs = batch::plan_filter_jobs(&samples, &kernels, &args.out, args.total_ms, params, wav)?;
    info!(
        "Filtering {} samples through {} kernels ({} jobs)",
        samples.len(),
        kernels.len(),
        jobs.len()
    );
    run_with_progress(&jobs, "[Filtering]", on_error, multi)
}

fn require_kernel_dir(dir: &Path, total_ms: f64) -> Result<(), Box<dyn Error>> {
    if dir.is_dir() {
        return Ok(());
    }
    Err(format!(
        "Kernel folder {} does not exist; run `ir2fir kernel --total-ms {}` first or pass --kernels",
        dir.display(),
        batch::format_ms(total_ms)
    )
    .into())
}

fn run_with_progress<J: BatchJob + Sync>(
    jobs: &[J],
    prefix: &str,
    on_error: OnError,
    multi: &MultiProgress,
) -> Result<Vec<JobReport>, Box<dyn Error>> {
    let style = ProgressStyle::with_template("{prefix} {bar:20.cyan/blue} {pos}/{len} {msg}")?;
    let pg = multi
        .add(ProgressBar::new(jobs.len() as u64))
        .with_style(style)
        .with_prefix(prefix.bold().to_string());

    let reports = batch::run_jobs(jobs, &CANCEL_FLAG, on_error, |report| {
        if let Err(e) = &report.result {
            warn!("{}: {}", report.label, e);
        }
        pg.set_message(report.label.clone());
        pg.inc(1);
    });
    pg.finish_and_clear();
    Ok(reports)
}
