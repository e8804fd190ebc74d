//! Aggregation of [`OutcomeRecord`]s into [`RunSummary`]s, and persistence of both as CSV.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytesize::ByteSize;
use serde::Serialize;
use yansi::Paint;

use crate::error::Result;
use crate::record::{OutcomeRecord, TestCategory};
use crate::workload::BatchOutcome;

/// Label of the summary spanning all records.
pub const OVERALL: &str = "All";

/// The key records are partitioned by.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GroupBy {
    /// The source folder of the input.
    Folder,
    /// The phase which produced the record.
    Category,
    /// The recorded concurrency level. Records without one are only part of the overall summary.
    Concurrency,
}

#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
enum Key {
    Name(String),
    Level(usize),
}

impl GroupBy {
    fn key(self, record: &OutcomeRecord) -> Option<Key> {
        match self {
            Self::Folder => Some(Key::Name(record.folder.clone())),
            Self::Category => Some(Key::Name(record.category.to_string())),
            Self::Concurrency => record.concurrency.map(Key::Level),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Level(level) => write!(f, "{level}w"),
        }
    }
}

/// Statistics over a set of records.
///
/// Latency statistics only consider successful records and are `None` if there are none. The
/// average input size considers all records.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunSummary {
    /// The grouping key, or [`OVERALL`].
    pub group: String,
    /// Number of records.
    pub total_images: usize,
    /// Number of successful records.
    pub successful: usize,
    /// Number of failed records.
    pub failed: usize,
    /// Share of successful records in percent.
    pub success_rate: f64,
    /// Mean processing time in seconds.
    pub avg_time: Option<f64>,
    /// Shortest processing time in seconds.
    pub min_time: Option<f64>,
    /// Longest processing time in seconds.
    pub max_time: Option<f64>,
    /// Median processing time in seconds.
    pub median_time: Option<f64>,
    /// Mean input size in MiB.
    pub avg_size_mb: f64,
}

impl RunSummary {
    /// Computes the summary of the given records.
    pub fn from_records<'a>(
        group: impl Into<String>,
        records: impl IntoIterator<Item = &'a OutcomeRecord>,
    ) -> Self {
        let mut total_images = 0;
        let mut total_bytes = 0;
        let mut times = Vec::new();

        for record in records {
            total_images += 1;
            total_bytes += record.file_size;
            if record.is_success() {
                times.push(record.processing_time);
            }
        }

        let successful = times.len();
        times.sort_by(f64::total_cmp);

        let mean = |sum: f64, count: usize| {
            if count == 0 {
                0.0
            } else {
                sum / count as f64
            }
        };

        Self {
            group: group.into(),
            total_images,
            successful,
            failed: total_images - successful,
            success_rate: mean(successful as f64 * 100.0, total_images),
            avg_time: (successful > 0).then(|| mean(times.iter().sum(), successful)),
            min_time: times.first().copied(),
            max_time: times.last().copied(),
            median_time: median(&times),
            avg_size_mb: mean(total_bytes as f64, total_images) / ByteSize::mib(1).as_u64() as f64,
        }
    }
}

/// The median of sorted values, averaging the two middle values for an even count.
fn median(sorted: &[f64]) -> Option<f64> {
    let mid = sorted.len() / 2;
    match sorted.len() {
        0 => None,
        len if len % 2 == 1 => Some(sorted[mid]),
        _ => Some((sorted[mid - 1] + sorted[mid]) / 2.0),
    }
}

/// Summarizes all records, followed by one summary per distinct key in sorted order.
pub fn summarize(records: &[OutcomeRecord], group_by: GroupBy) -> Vec<RunSummary> {
    let mut groups: BTreeMap<Key, Vec<&OutcomeRecord>> = BTreeMap::new();
    for record in records {
        if let Some(key) = group_by.key(record) {
            groups.entry(key).or_default().push(record);
        }
    }

    let mut summaries = Vec::with_capacity(groups.len() + 1);
    summaries.push(RunSummary::from_records(OVERALL, records));
    for (key, records) in groups {
        summaries.push(RunSummary::from_records(key.to_string(), records));
    }
    summaries
}

/// Writes result and summary tables into the summary directory.
///
/// `all_results.csv` is appended to and flushed after every phase, so the records of completed
/// phases survive a later crash.
pub struct Reporter {
    dir: PathBuf,
    all_results: csv::Writer<File>,
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

impl Reporter {
    /// Creates the summary directory and starts a fresh `all_results.csv`.
    pub fn create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let all_results = csv::Writer::from_path(dir.join("all_results.csv"))?;

        Ok(Self {
            dir: dir.to_owned(),
            all_results,
        })
    }

    /// Returns the summary directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persists the records of a completed phase.
    pub fn record_phase(&mut self, category: TestCategory, records: &[OutcomeRecord]) -> Result<()> {
        self.write_table(&format!("{category}_results.csv"), records)?;

        for record in records {
            self.all_results.serialize(record)?;
        }
        self.all_results.flush()?;

        Ok(())
    }

    /// Persists the records of a single batch of a per-folder phase.
    pub fn record_batch(&self, category: TestCategory, batch: &BatchOutcome) -> Result<()> {
        let group = batch.group.as_deref().unwrap_or(OVERALL);
        let name = format!(
            "{category}_{group}_b{}_w{}.csv",
            batch.index, batch.concurrency
        );
        self.write_table(&name, &batch.records)
    }

    /// Writes rows into a new table with the given file name.
    pub fn write_table<T: Serialize>(&self, name: &str, rows: &[T]) -> Result<()> {
        let mut writer = csv::Writer::from_path(self.dir.join(name))?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Prints summaries in human-readable form.
pub fn print_summaries(title: &str, summaries: &[RunSummary]) {
    println!();
    println!("{}", format!("## {title}").bold());

    for summary in summaries {
        println!();
        println!("{} {}", "###".bold(), summary.group.bold().blue());
        print!("  {} images", summary.total_images.bold());
        print!(
            ", {} successful ({:.2}%)",
            summary.successful.green(),
            summary.success_rate
        );
        if summary.failed > 0 {
            print!(", {}", format!("{} FAILED", summary.failed).bold().red());
        }
        println!();

        match (
            summary.avg_time,
            summary.min_time,
            summary.max_time,
            summary.median_time,
        ) {
            (Some(avg), Some(min), Some(max), Some(median)) => println!(
                "  avg: {:.2?}; min/max: {:.2?} / {:.2?}; median: {:.2?}",
                Duration::from_secs_f64(avg).bold(),
                Duration::from_secs_f64(min),
                Duration::from_secs_f64(max),
                Duration::from_secs_f64(median),
            ),
            _ => println!("  avg: n/a"),
        }

        let avg_size = summary.avg_size_mb * ByteSize::mib(1).as_u64() as f64;
        println!("  avg size: {:.2}", ByteSize::b(avg_size as u64));
    }
}
