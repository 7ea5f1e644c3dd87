use std::error::Error;
use std::io;
use std::path::PathBuf;
use std::thread::available_parallelism;
use std::time::Instant;

use clap::Parser;
use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;
use ir2fir::normalize::peak_dbfs;
use ir2fir::{find_impact, find_wav_files, normalize, read_wav, ColorLogger, Downmix, TermResult};
use log::{debug, info, warn};
use rayon::iter::{IntoParallelIterator, ParallelIterator};

#[derive(Parser, Debug)]
#[command(
    name = "ir_probe",
    about = "Report sample rate, peak level (dBFS) and impact time of WAV recordings",
    version
)]
struct Cli {
    /// One or more WAV files or folders
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Recurse into directories when the supplied input paths include folders
    #[arg(short = 'R', long = "recurse")]
    recurse: bool,

    /// Normalized amplitude the impact must exceed
    #[arg(short = 't', long = "threshold", default_value_t = 0.5)]
    threshold: f64,

    /// How multi-channel input collapses to mono: sum or avg
    #[arg(long = "downmix", default_value = "sum")]
    downmix: Downmix,

    /// Print diagnostic messages
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Quiet mode: suppress all log output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

fn main() -> TermResult {
    match run() {
        Ok(()) => TermResult(Ok(())),
        Err(e) => TermResult(Err(e.into())),
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let logger = ColorLogger::new(cli.quiet, cli.verbose);
    let max_level = logger.max_level();
    let multi = MultiProgress::new();
    LogWrapper::new(multi.clone(), logger).try_init()?;
    log::set_max_level(max_level);

    let avail_par = available_parallelism().map(|n| n.get()).unwrap_or(1);
    let thread_count = (avail_par / 2).max(1);
    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(thread_count)
        .build_global()
    {
        warn!(
            "Rayon pool initialization error ({} threads). Details: {:?}",
            thread_count, e
        );
    }

    let paths = find_wav_files(&cli.files, cli.recurse)?;
    let wall_start = Instant::now();

    // Short-circuit on first error.
    paths
        .clone()
        .into_par_iter()
        .try_for_each(|path| probe_file(path, cli.threshold, cli.downmix))
        .map_err(|e| -> Box<dyn Error> { Box::new(io::Error::new(io::ErrorKind::Other, e)) })?;

    let total_secs = wall_start.elapsed().as_secs();
    let h = total_secs / 3600;
    let m = (total_secs % 3600) / 60;
    let s = total_secs % 60;
    info!(
        "Analyzed {} inputs in {:02}:{:02}:{:02}",
        paths.len(),
        h,
        m,
        s
    );

    Ok(())
}

fn probe_file(path: PathBuf, threshold: f64, downmix: Downmix) -> Result<(), String> {
    let file_name = match path.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => return Err(format!("Invalid file path: {}", path.display())),
    };

    let signal =
        read_wav(&path, downmix).map_err(|e| format!("Error reading {}: {}", file_name, e))?;
    let peak = peak_dbfs(signal.samples());
    debug!("{}: {} samples decoded", file_name, signal.len());

    let impact = normalize(&signal, 1.0)
        .ok()
        .and_then(|normalized| find_impact(normalized.samples(), threshold));
    let impact_text = match impact {
        Some(index) => format!(
            "{:.2} ms (sample {})",
            index as f64 * 1000.0 / signal.sample_rate() as f64,
            index
        ),
        None => format!("none above {}", threshold),
    };

    info!(
        "{}: {} Hz, {:.3} s, peak level = {:.2} dBFS, impact at {}",
        file_name,
        signal.sample_rate(),
        signal.duration_secs(),
        peak,
        impact_text
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_flags_parse() {
        let cli = Cli::try_parse_from(["ir_probe", "-v", "a.wav"]).unwrap();
        assert!(cli.verbose && !cli.quiet);
        assert_eq!(ColorLogger::new(cli.quiet, cli.verbose).max_level(), log::LevelFilter::Trace);

        let cli = Cli::try_parse_from(["ir_probe", "--quiet", "a.wav", "b.wav"]).unwrap();
        assert!(cli.quiet);
        assert_eq!(cli.files.len(), 2);
        assert_eq!(ColorLogger::new(cli.quiet, cli.verbose).max_level(), log::LevelFilter::Off);
    }
}
