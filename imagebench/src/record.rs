//! The data model shared by all benchmark phases.
//!
//! A [`WorkItem`] names one input file and the location its processed result is written to. The
//! dispatcher wraps it into a [`Job`], and every job yields exactly one [`OutcomeRecord`].

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Serialize, Serializer};

/// The benchmark phase which produced a record.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestCategory {
    /// One request at a time, per folder.
    Sequential,
    /// Batches with monotonically increasing concurrency, per folder.
    Concurrent,
    /// A random sample across all folders, dispatched at once.
    Random,
    /// A fixed number of requests cycling over a bounded pool.
    Stress,
}

impl TestCategory {
    /// Returns the lowercase label used in file names and tables.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Concurrent => "concurrent",
            Self::Random => "random",
            Self::Stress => "stress",
        }
    }
}

impl fmt::Display for TestCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of benchmark work.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WorkItem {
    /// Path of the input image.
    pub source: PathBuf,
    /// The grouping key, which is the name of the source folder.
    pub group: String,
    /// File name of the input, used to identify the item in records.
    pub file_name: String,
    /// Where the processed result is written.
    pub destination: PathBuf,
}

impl WorkItem {
    /// Returns a copy of this item that writes its result to `destination` instead.
    pub fn with_destination(&self, destination: PathBuf) -> Self {
        Self {
            destination,
            ..self.clone()
        }
    }
}

/// A [`WorkItem`] together with the labels stamped onto its [`OutcomeRecord`].
#[derive(Clone, Debug)]
pub struct Job {
    /// The work to perform.
    pub item: WorkItem,
    /// The phase submitting this job.
    pub category: TestCategory,
    /// The concurrency level in effect when the job was submitted, if it should be recorded.
    pub concurrency: Option<usize>,
}

impl Job {
    /// Creates a job without a concurrency label.
    pub fn new(item: WorkItem, category: TestCategory) -> Self {
        Self {
            item,
            category,
            concurrency: None,
        }
    }

    /// Labels the job with the concurrency level of its batch.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }
}

/// Outcome of a single request.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The endpoint answered with a success status and the result was stored.
    Success,
    /// The request, the response or storing the result failed.
    Error,
}

/// Pixel dimensions of an input image.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Resolution {
    /// Width and height in pixels.
    Known {
        /// Width in pixels.
        width: u32,
        /// Height in pixels.
        height: u32,
    },
    /// The input could not be decoded far enough to read its dimensions.
    #[default]
    Unknown,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known { width, height } => write!(f, "{width}x{height}"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

impl Serialize for Resolution {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The result of executing one [`Job`].
///
/// Records are created once by the executor and never mutated afterwards. Field order matches the
/// column order of the persisted tables.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OutcomeRecord {
    /// The phase which produced this record.
    pub category: TestCategory,
    /// The grouping key of the input.
    pub folder: String,
    /// File name of the input.
    pub filename: String,
    /// Size of the input in bytes.
    pub file_size: u64,
    /// Dimensions of the input.
    pub resolution: Resolution,
    /// Whether the request succeeded.
    pub status: Status,
    /// Seconds from sending the request until the response was read or the failure observed.
    pub processing_time: f64,
    /// Concurrency level of the submitting batch, when recorded.
    pub concurrency: Option<usize>,
    /// Description of the failure for [`Status::Error`].
    pub error: Option<String>,
}

impl OutcomeRecord {
    /// Creates a successful record.
    pub fn success(job: &Job, file_size: u64, resolution: Resolution, elapsed: Duration) -> Self {
        Self {
            category: job.category,
            folder: job.item.group.clone(),
            filename: job.item.file_name.clone(),
            file_size,
            resolution,
            status: Status::Success,
            processing_time: elapsed.as_secs_f64(),
            concurrency: job.concurrency,
            error: None,
        }
    }

    /// Creates a failed record carrying the error description.
    pub fn failure(
        job: &Job,
        file_size: u64,
        resolution: Resolution,
        elapsed: Duration,
        error: impl fmt::Display,
    ) -> Self {
        Self {
            status: Status::Error,
            error: Some(error.to_string()),
            ..Self::success(job, file_size, resolution, elapsed)
        }
    }

    /// Returns `true` if the request succeeded.
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}
