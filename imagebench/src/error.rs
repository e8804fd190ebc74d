//! Error types of the benchmark library.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while planning or recording a benchmark.
///
/// Failures of individual requests are never represented here. They are converted into
/// [`OutcomeRecord`](crate::record::OutcomeRecord)s by the executor.
#[derive(Debug, Error)]
pub enum Error {
    /// The root input directory does not exist. This aborts the whole run.
    #[error("input directory `{}` not found", .0.display())]
    InputDirMissing(PathBuf),

    /// A random sample larger than the pool of available inputs was requested.
    #[error("cannot sample {requested} inputs, only {available} available")]
    InsufficientSample {
        /// The configured sample size.
        requested: usize,
        /// The number of inputs found across all folders.
        available: usize,
    },

    /// A phase that cycles over its inputs found no inputs at all.
    #[error("no inputs available to cycle over")]
    EmptyPool,

    /// An I/O error while scanning inputs or writing tables.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An error writing a CSV table.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type for planning and reporting operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
