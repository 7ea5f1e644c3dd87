//! Build FIR kernels from impulse-response recordings and filter audio
//! through them.
//!
//! The signal core ([`normalize`], [`impact`], [`kernel`], [`fir_convolve`])
//! works on in-memory [`Signal`]s only. [`audio_file`] moves signals to and
//! from WAV, [`batch`] runs many jobs on the rayon pool.

pub mod audio_file;
pub mod batch;
pub mod color_logger;
pub mod conversion_context;
pub mod dither;
pub mod fir_convolve;
pub mod impact;
pub mod kernel;
pub mod model;
pub mod normalize;
pub mod signal;
pub mod spectrum;

pub use audio_file::{read_wav, write_wav, Downmix, OutputFormat};
pub use batch::{find_wav_files, run_jobs, JobReport, OnError};
pub use color_logger::ColorLogger;
pub use conversion_context::{BatchJob, FilterJob, JobOutput, KernelJob, WavOptions};
pub use dither::DitherType;
pub use fir_convolve::{convolve, filter_signal, Convolver, DirectConvolver, FftConvolver, Strategy};
pub use impact::{find_impact, require_impact};
pub use kernel::extract_kernel;
pub use model::{FilterParams, FirError, FirResult, KernelParams, MyError, MyResult, TermResult};
pub use normalize::{apply_gain, normalize, peak};
pub use signal::{FirKernel, Signal};
pub use spectrum::{magnitude_spectrum, SpectrumBin};
