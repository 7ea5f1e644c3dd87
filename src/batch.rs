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

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use log::{trace, warn};
use rayon::prelude::*;

use crate::conversion_context::{BatchJob, FilterJob, JobOutput, KernelJob, WavOptions};
use crate::model::{FilterParams, FirError, FirResult, KernelParams};

pub const KERNEL_DIR: &str = "FIR_filters";
pub const FILTERED_DIR: &str = "filtered_samples";

/// Outcome of one job; a failure here never touches the other jobs.
#[derive(Debug)]
pub struct JobReport {
    pub label: String,
    pub result: FirResult<JobOutput>,
}

impl JobReport {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Whether to keep going after a job fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnError {
    Continue,
    /// Raise the cancel flag so jobs that have not started are skipped.
    Cancel,
}

/// `150.0` -> `"150"`, `150.5` -> `"150.5"`.
pub fn format_ms(ms: f64) -> String {
    format!("{}", ms)
}

/// `<root>/FIR_filters/<total>_ms`
pub fn kernel_dir(root: &Path, total_ms: f64) -> PathBuf {
    root.join(KERNEL_DIR).join(format!("{}_ms", format_ms(total_ms)))
}

/// `<root>/FIR_filters/<total>_ms/<ir file name>`
pub fn kernel_output_path(root: &Path, total_ms: f64, impulse: &Path) -> PathBuf {
    kernel_dir(root, total_ms).join(wav_file_name(impulse))
}

/// `<root>/filtered_samples/<total>_ms/<sample file name>/<kernel file name>`
pub fn filtered_output_path(root: &Path, total_ms: f64, sample: &Path, kernel: &Path) -> PathBuf {
    root.join(FILTERED_DIR)
        .join(format!("{}_ms", format_ms(total_ms)))
        .join(wav_file_name(sample))
        .join(wav_file_name(kernel))
}

fn wav_file_name(path: &Path) -> PathBuf {
    path.file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("output.wav"))
}

pub fn is_wav(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("wav"))
        .unwrap_or(false)
}

/// Expand files and folders into a sorted, de-duplicated list of WAV files.
/// Folders are descended into only when `recurse` is set; non-WAV entries
/// found inside folders are ignored, explicitly named ones are warned about.
pub fn find_wav_files(inputs: &[PathBuf], recurse: bool) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for input in inputs {
        if input.is_dir() {
            collect_dir(input, recurse, &mut found)?;
        } else if is_wav(input) {
            if !input.exists() {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("Input file not found: {}", input.display()),
                ));
            }
            found.push(input.clone());
        } else {
            warn!("Skipping non-WAV input \"{}\"", input.display());
        }
    }
    found.sort();
    found.dedup();
    Ok(found)
}

fn collect_dir(dir: &Path, recurse: bool, found: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            if recurse {
                collect_dir(&path, recurse, found)?;
            }
        } else if is_wav(&path) {
            found.push(path);
        }
    }
    Ok(())
}

/// Fails when two inputs would be written to the same file, e.g. same-named
/// recordings picked up from different folders.
fn ensure_unique_outputs<'a, I>(outputs: I) -> FirResult<()>
where
    I: IntoIterator<Item = (&'a Path, String)>,
{
    let mut seen: HashMap<&Path, String> = HashMap::new();
    for (output, source) in outputs {
        if let Some(first) = seen.get(output) {
            return Err(FirError::InvalidParams(format!(
                "{} and {} would both be written to {}; rename one of them",
                first,
                source,
                output.display()
            )));
        }
        seen.insert(output, source);
    }
    Ok(())
}

pub fn plan_kernel_jobs(
    impulses: &[PathBuf],
    out_root: &Path,
    params: KernelParams,
    spectrum_max_hz: Option<f64>,
    wav: WavOptions,
) -> FirResult<Vec<KernelJob>> {
    let jobs: Vec<KernelJob> = impulses
        .iter()
        .map(|input| KernelJob {
            input: input.clone(),
            output: kernel_output_path(out_root, params.total_ms, input),
            params,
            spectrum_max_hz,
            wav,
        })
        .collect();
    ensure_unique_outputs(
        jobs.iter()
            .map(|j| (j.output.as_path(), j.input.display().to_string())),
    )?;
    Ok(jobs)
}

/// Every sample paired with every kernel.
pub fn plan_filter_jobs(
    samples: &[PathBuf],
    kernels: &[PathBuf],
    out_root: &Path,
    total_ms: f64,
    params: FilterParams,
    wav: WavOptions,
) -> FirResult<Vec<FilterJob>> {
    let jobs: Vec<FilterJob> = samples
        .iter()
        .flat_map(|sample| {
            kernels.iter().map(move |kernel| FilterJob {
                sample: sample.clone(),
                kernel: kernel.clone(),
                output: filtered_output_path(out_root, total_ms, sample, kernel),
                params,
                wav,
            })
        })
        .collect();
    ensure_unique_outputs(jobs.iter().map(|j| {
        let pair = format!("{} * {}", j.sample.display(), j.kernel.display());
        (j.output.as_path(), pair)
    }))?;
    Ok(jobs)
}

/// Run independent jobs on the rayon pool.
///
/// `cancel` is checked before each job starts; jobs skipped that way report
/// [`FirError::Cancelled`]. `on_done` sees every report as it completes.
/// Reports come back in job order.
pub fn run_jobs<J, F>(
    jobs: &[J],
    cancel: &AtomicBool,
    on_error: OnError,
    on_done: F,
) -> Vec<JobReport>
where
    J: BatchJob + Sync,
    F: Fn(&JobReport) + Sync,
{
    jobs.par_iter()
        .map(|job| {
            let label = job.label();
            let result = if cancel.load(Ordering::Relaxed) {
                trace!("Skipping {} (cancelled)", label);
                Err(FirError::Cancelled)
            } else {
                job.run()
            };
            if result.is_err() && on_error == OnError::Cancel {
                cancel.store(true, Ordering::Relaxed);
            }
            let report = JobReport { label, result };
            on_done(&report);
            report
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct FakeJob {
        name: &'static str,
        fail: bool,
    }

    impl BatchJob for FakeJob {
        fn label(&self) -> String {
            self.name.to_string()
        }

        fn run(&self) -> FirResult<JobOutput> {
            if self.fail {
                Err(FirError::DegenerateSignal)
            } else {
                Ok(JobOutput {
                    path: PathBuf::from(self.name),
                    samples: 1,
                    sample_rate: 44100,
                })
            }
        }
    }

    fn fakes() -> Vec<FakeJob> {
        vec![
            FakeJob { name: "a", fail: false },
            FakeJob { name: "b", fail: true },
            FakeJob { name: "c", fail: false },
        ]
    }

    #[test]
    fn failures_are_reported_per_job() {
        let cancel = AtomicBool::new(false);
        let seen = AtomicUsize::new(0);
        let reports = run_jobs(&fakes(), &cancel, OnError::Continue, |_| {
            seen.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(seen.load(Ordering::Relaxed), 3);
        let labels: Vec<&str> = reports.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, ["a", "b", "c"]);
        assert!(reports[0].is_ok());
        assert!(matches!(reports[1].result, Err(FirError::DegenerateSignal)));
        assert!(reports[2].is_ok());
        assert!(!cancel.load(Ordering::Relaxed));
    }

    #[test]
    fn cancelled_batch_skips_everything() {
        let cancel = AtomicBool::new(true);
        let reports = run_jobs(&fakes(), &cancel, OnError::Continue, |_| {});
        assert!(reports
            .iter()
            .all(|r| matches!(r.result, Err(FirError::Cancelled))));
    }

    #[test]
    fn fail_fast_raises_cancel_flag() {
        let cancel = AtomicBool::new(false);
        let _ = run_jobs(&fakes(), &cancel, OnError::Cancel, |_| {});
        assert!(cancel.load(Ordering::Relaxed));
    }

    #[test]
    fn output_paths_follow_layout() {
        let root = Path::new("/tmp/out");
        assert_eq!(format_ms(150.0), "150");
        assert_eq!(format_ms(150.5), "150.5");
        assert_eq!(
            kernel_output_path(root, 150.0, Path::new("irs/cab.wav")),
            PathBuf::from("/tmp/out/FIR_filters/150_ms/cab.wav")
        );
        assert_eq!(
            filtered_output_path(root, 150.0, Path::new("s/riff.wav"), Path::new("k/cab.wav")),
            PathBuf::from("/tmp/out/filtered_samples/150_ms/riff.wav/cab.wav")
        );
    }

    #[test]
    fn filter_plan_is_cross_product() {
        let samples = vec![PathBuf::from("a.wav"), PathBuf::from("b.wav")];
        let kernels = vec![
            PathBuf::from("k1.wav"),
            PathBuf::from("k2.wav"),
            PathBuf::from("k3.wav"),
        ];
        let jobs = plan_filter_jobs(
            &samples,
            &kernels,
            Path::new("out"),
            150.0,
            FilterParams::default(),
            WavOptions::default(),
        )
        .unwrap();
        assert_eq!(jobs.len(), 6);
        assert_eq!(jobs[4].sample, PathBuf::from("b.wav"));
        assert_eq!(jobs[4].kernel, PathBuf::from("k2.wav"));
    }

    #[test]
    fn same_named_recordings_are_rejected() {
        let impulses = vec![PathBuf::from("irs/a/room.wav"), PathBuf::from("irs/b/room.wav")];
        let err = plan_kernel_jobs(
            &impulses,
            Path::new("out"),
            KernelParams::default(),
            None,
            WavOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, FirError::InvalidParams(_)));
        assert!(err.to_string().contains("room.wav"));

        let distinct = vec![PathBuf::from("irs/a/room.wav"), PathBuf::from("irs/b/hall.wav")];
        let jobs = plan_kernel_jobs(
            &distinct,
            Path::new("out"),
            KernelParams::default(),
            None,
            WavOptions::default(),
        )
        .unwrap();
        assert_ne!(jobs[0].output, jobs[1].output);
    }

    #[test]
    fn same_named_kernels_are_rejected() {
        let samples = vec![PathBuf::from("riff.wav")];
        let kernels = vec![PathBuf::from("k/a/cab.wav"), PathBuf::from("k/b/cab.wav")];
        let planned = plan_filter_jobs(
            &samples,
            &kernels,
            Path::new("out"),
            150.0,
            FilterParams::default(),
            WavOptions::default(),
        );
        let err = planned.unwrap_err();
        assert!(matches!(err, FirError::InvalidParams(_)));
        assert!(err.to_string().contains("k/b/cab.wav"));
    }

    #[test]
    fn discovers_only_wav_files() {
        let dir = std::env::temp_dir().join(format!("ir2fir-batch-{}", std::process::id()));
        let nested = dir.join("sub");
        fs::create_dir_all(&nested).unwrap();
        for name in ["b.wav", "a.WAV", "notes.txt"] {
            fs::write(dir.join(name), b"").unwrap();
        }
        fs::write(nested.join("c.wav"), b"").unwrap();

        let flat = find_wav_files(&[dir.clone()], false).unwrap();
        assert_eq!(flat, vec![dir.join("a.WAV"), dir.join("b.wav")]);

        let deep = find_wav_files(&[dir.clone(), dir.join("b.wav")], true).unwrap();
        assert_eq!(deep.len(), 3);
        assert!(deep.contains(&nested.join("c.wav")));
    }

    #[test]
    fn missing_named_file_is_an_error() {
        let missing = PathBuf::from("/definitely/not/here.wav");
        assert!(find_wav_files(&[missing], false).is_err());
    }
}
