use std::io::{self, Write};

use colored::{ColoredString, Colorize};
use log::{Level, LevelFilter, Metadata, Record};

/// Stderr logger with colored level tags. Debug and trace lines carry the
/// emitting module so worker output stays traceable in parallel batches.
#[derive(Clone)]
pub struct ColorLogger {
    max_level: LevelFilter,
}

impl ColorLogger {
    pub fn new(quiet: bool, verbose: bool) -> Self {
        let max_level = if quiet {
            LevelFilter::Off
        } else if verbose {
            LevelFilter::Trace
        } else {
            LevelFilter::Info
        };
        Self { max_level }
    }

    pub fn max_level(&self) -> LevelFilter {
        self.max_level
    }

    fn tag(level: Level) -> ColoredString {
        match level {
            Level::Error => "[ERROR]".red().bold(),
            Level::Warn => "[WARN]".yellow().bold(),
            Level::Info => "[INFO]".blue(),
            Level::Debug => "[DEBUG]".cyan(),
            Level::Trace => "[TRACE]".dimmed(),
        }
    }
}

impl log::Log for ColorLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let tag = Self::tag(record.level());
        match record.level() {
            Level::Error => eprintln!("{} {}", tag, format!("{}", record.args()).red().bold()),
            Level::Warn => eprintln!("{} {}", tag, format!("{}", record.args()).yellow()),
            Level::Info => eprintln!("{} {}", tag, record.args()),
            Level::Debug | Level::Trace => eprintln!(
                "{} {} {}",
                tag,
                record.target().dimmed(),
                record.args()
            ),
        }
        self.flush();
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}
