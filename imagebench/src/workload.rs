//! Workload generators which turn the input [`Inventory`] into batches for the [`Dispatcher`].
//!
//! Four strategies are supported:
//!
//! - *Sequential*: every folder in order, one request at a time. This is the latency baseline.
//! - *Increasing concurrency*: every folder in consecutive batches. The first batch runs two
//!   requests concurrently, every following batch one more, until the ceiling is reached.
//! - *Random sample*: a fixed number of inputs drawn from all folders, dispatched at once.
//! - *Stress*: a bounded pool of inputs repeated until an exact number of requests was sent.
//!
//! Folders are always visited in lexicographic order, which makes plans reproducible.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::dispatch::{Batch, Dispatcher};
use crate::error::{Error, Result};
use crate::record::{Job, OutcomeRecord, TestCategory, WorkItem};

/// File extensions accepted as inputs.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Extension of the processed results.
const OUTPUT_EXTENSION: &str = "png";

/// All inputs available to the benchmark, grouped by folder.
#[derive(Clone, Debug, Default)]
pub struct Inventory {
    groups: BTreeMap<String, Vec<WorkItem>>,
}

impl Inventory {
    /// Scans the input tree and derives the output location of every input.
    ///
    /// If `folders` is empty, every subdirectory of `input_dir` is a group. Missing folders are
    /// skipped with a warning. Only a missing `input_dir` is an error.
    pub fn scan(
        input_dir: &Path,
        output_dir: &Path,
        folders: &[String],
        per_folder: Option<usize>,
    ) -> Result<Self> {
        if !input_dir.is_dir() {
            return Err(Error::InputDirMissing(input_dir.to_owned()));
        }

        let folders = if folders.is_empty() {
            subdirectories(input_dir)?
        } else {
            folders.to_vec()
        };

        let mut groups = BTreeMap::new();
        for folder in folders {
            let folder_path = input_dir.join(&folder);
            if !folder_path.is_dir() {
                tracing::warn!(path = %folder_path.display(), "folder not found, skipping");
                continue;
            }

            let mut files = image_files(&folder_path)?;
            if let Some(limit) = per_folder {
                files.truncate(limit);
            }
            if files.is_empty() {
                tracing::warn!(path = %folder_path.display(), "no images found, skipping");
                continue;
            }

            let outputs = output_names(&files);
            let items = files
                .into_iter()
                .zip(outputs)
                .map(|(file_name, output)| {
                    work_item(input_dir, output_dir, &folder, file_name, &output)
                })
                .collect();
            groups.insert(folder, items);
        }

        Ok(Self { groups })
    }

    /// Creates an inventory from already enumerated groups.
    pub fn from_groups(groups: impl IntoIterator<Item = (String, Vec<WorkItem>)>) -> Self {
        let groups = groups
            .into_iter()
            .filter(|(_, items)| !items.is_empty())
            .collect();
        Self { groups }
    }

    /// Iterates the groups in lexicographic order.
    pub fn groups(&self) -> impl Iterator<Item = (&str, &[WorkItem])> {
        self.groups
            .iter()
            .map(|(name, items)| (name.as_str(), items.as_slice()))
    }

    /// Iterates all items, group by group.
    pub fn items(&self) -> impl Iterator<Item = &WorkItem> {
        self.groups.values().flatten()
    }

    /// Returns the total number of items.
    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Returns `true` if no inputs were found.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

fn subdirectories(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir()
            && let Some(name) = entry.file_name().to_str()
        {
            names.push(name.to_owned());
        }
    }
    names.sort();
    Ok(names)
}

fn image_files(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        let is_image = Path::new(&name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)));
        if is_image {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Derives a distinct result file name for every input of one folder.
///
/// Results are named after the input stem. Inputs sharing a stem, like `img0.jpg` and
/// `img0.png`, keep their full name instead (`img0.jpg.png`), and any remaining clash gets a
/// numeric suffix. Names are compared case-insensitively.
fn output_names(file_names: &[String]) -> Vec<String> {
    let stem = |name: &str| {
        Path::new(name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    };

    let mut stems: HashMap<String, usize> = HashMap::new();
    for name in file_names {
        *stems.entry(stem(name).to_lowercase()).or_default() += 1;
    }

    let mut taken = HashSet::new();
    file_names
        .iter()
        .map(|name| {
            let stem = stem(name);
            let base = if stems[&stem.to_lowercase()] > 1 {
                name.clone()
            } else {
                stem
            };

            let mut output = format!("{base}.{OUTPUT_EXTENSION}");
            let mut suffix = 0;
            while !taken.insert(output.to_lowercase()) {
                suffix += 1;
                output = format!("{base}-{suffix}.{OUTPUT_EXTENSION}");
            }
            output
        })
        .collect()
}

fn work_item(
    input_dir: &Path,
    output_dir: &Path,
    folder: &str,
    file_name: String,
    output: &str,
) -> WorkItem {
    let destination = output_dir.join(folder).join(output);
    WorkItem {
        source: input_dir.join(folder).join(&file_name),
        group: folder.to_owned(),
        file_name,
        destination,
    }
}

/// A benchmark phase.
#[derive(Clone, Debug)]
pub enum Workload {
    /// Every folder in order, one request at a time.
    Sequential,
    /// Every folder in batches of growing concurrency.
    IncreasingConcurrency {
        /// Maximum concurrency of a batch.
        ceiling: usize,
        /// Pause between two batches.
        batch_pause: Duration,
    },
    /// A random sample across all folders, dispatched at once.
    RandomSample {
        /// Number of inputs to draw without replacement.
        sample_size: usize,
        /// Seed of the sampling RNG.
        seed: u64,
    },
    /// A bounded pool of inputs repeated until `total_requests` were sent.
    Stress {
        /// Exact number of requests.
        total_requests: usize,
        /// Maximum number of concurrent requests.
        concurrency: usize,
        /// Fixed delay between consecutive submissions.
        submit_delay: Duration,
        /// Number of inputs in the pool, all inputs if `None`.
        pool_size: Option<usize>,
    },
}

/// The records of one dispatched [`Batch`].
#[derive(Clone, Debug)]
pub struct BatchOutcome {
    /// The grouping key of the batch, if planned per folder.
    pub group: Option<String>,
    /// Position of the batch among the batches of its group.
    pub index: usize,
    /// Concurrency bound of the batch.
    pub concurrency: usize,
    /// One record per job, in completion order.
    pub records: Vec<OutcomeRecord>,
}

impl Workload {
    /// The category stamped onto all records of this workload.
    pub fn category(&self) -> TestCategory {
        match self {
            Self::Sequential => TestCategory::Sequential,
            Self::IncreasingConcurrency { .. } => TestCategory::Concurrent,
            Self::RandomSample { .. } => TestCategory::Random,
            Self::Stress { .. } => TestCategory::Stress,
        }
    }

    /// Plans the batches of this workload over the given inventory.
    pub fn plan(&self, inventory: &Inventory) -> Result<Vec<Batch>> {
        let category = self.category();
        let batches = match *self {
            Self::Sequential => inventory
                .groups()
                .map(|(group, items)| Batch {
                    group: Some(group.to_owned()),
                    index: 0,
                    concurrency: 1,
                    submit_delay: Duration::ZERO,
                    jobs: items
                        .iter()
                        .map(|item| Job::new(item.clone(), category))
                        .collect(),
                })
                .collect(),
            Self::IncreasingConcurrency { ceiling, .. } => inventory
                .groups()
                .flat_map(|(group, items)| {
                    concurrency_schedule(items.len(), ceiling)
                        .into_iter()
                        .enumerate()
                        .map(move |(index, (concurrency, range))| Batch {
                            group: Some(group.to_owned()),
                            index,
                            concurrency,
                            submit_delay: Duration::ZERO,
                            jobs: items[range]
                                .iter()
                                .map(|item| {
                                    Job::new(item.clone(), category).with_concurrency(concurrency)
                                })
                                .collect(),
                        })
                })
                .collect(),
            Self::RandomSample { sample_size, seed } => {
                let pool: Vec<_> = inventory.items().cloned().collect();
                let mut rng = SmallRng::seed_from_u64(seed);
                let sample = sample(&pool, sample_size, &mut rng)?;
                vec![Batch {
                    group: None,
                    index: 0,
                    concurrency: sample_size,
                    submit_delay: Duration::ZERO,
                    jobs: sample
                        .into_iter()
                        .map(|item| Job::new(item, category))
                        .collect(),
                }]
            }
            Self::Stress {
                total_requests,
                concurrency,
                submit_delay,
                pool_size,
            } => {
                let pool: Vec<_> = inventory
                    .items()
                    .take(pool_size.unwrap_or(usize::MAX))
                    .cloned()
                    .collect();
                let items = cycle(&pool, total_requests)?;
                vec![Batch {
                    group: None,
                    index: 0,
                    concurrency,
                    submit_delay,
                    jobs: items
                        .into_iter()
                        .map(|item| Job::new(item, category))
                        .collect(),
                }]
            }
        };

        Ok(batches)
    }

    /// Plans and runs this workload, one batch after another.
    ///
    /// A batch starts only once every request of the previous batch has finished.
    pub async fn run(
        &self,
        inventory: &Inventory,
        dispatcher: &Dispatcher,
    ) -> Result<Vec<BatchOutcome>> {
        let batches = self.plan(inventory)?;
        let pause = match self {
            Self::IncreasingConcurrency { batch_pause, .. } => *batch_pause,
            _ => Duration::ZERO,
        };

        let mut outcomes = Vec::with_capacity(batches.len());
        for (position, batch) in batches.into_iter().enumerate() {
            if position > 0 && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }

            tracing::info!(
                category = %self.category(),
                group = batch.group.as_deref().unwrap_or("all"),
                concurrency = batch.concurrency,
                jobs = batch.jobs.len(),
                "dispatching batch"
            );

            let group = batch.group.clone();
            let index = batch.index;
            let concurrency = batch.concurrency;
            let records = dispatcher.run_batch(batch).await;

            outcomes.push(BatchOutcome {
                group,
                index,
                concurrency,
                records,
            });
        }

        Ok(outcomes)
    }
}

/// Splits `len` items into consecutive batches of growing concurrency.
///
/// Batch `i` runs with concurrency `min(2 + i, ceiling)` and holds that many items, except for
/// the last batch which holds the remainder. A ceiling of zero is treated as one.
pub fn concurrency_schedule(len: usize, ceiling: usize) -> Vec<(usize, Range<usize>)> {
    let ceiling = ceiling.max(1);
    let mut schedule = Vec::new();
    let mut start = 0;

    while start < len {
        let concurrency = (2 + schedule.len()).min(ceiling);
        let end = (start + concurrency).min(len);
        schedule.push((concurrency, start..end));
        start = end;
    }

    schedule
}

/// Draws `size` items uniformly at random without replacement.
///
/// Fails with [`Error::InsufficientSample`] instead of returning fewer items than requested.
pub fn sample<R>(pool: &[WorkItem], size: usize, rng: &mut R) -> Result<Vec<WorkItem>>
where
    R: Rng + ?Sized,
{
    if size > pool.len() {
        return Err(Error::InsufficientSample {
            requested: size,
            available: pool.len(),
        });
    }

    let indices = rand::seq::index::sample(rng, pool.len(), size);
    Ok(indices.into_iter().map(|i| pool[i].clone()).collect())
}

/// Repeats `pool` until exactly `total` items were produced, stopping mid-cycle if needed.
///
/// Every repetition writes its result to a distinct path, suffixed with its sequence number.
pub fn cycle(pool: &[WorkItem], total: usize) -> Result<Vec<WorkItem>> {
    if total == 0 {
        return Ok(Vec::new());
    }
    if pool.is_empty() {
        return Err(Error::EmptyPool);
    }

    let items = pool
        .iter()
        .cycle()
        .take(total)
        .enumerate()
        .map(|(sequence, item)| item.with_destination(sequenced(&item.destination, sequence)))
        .collect();

    Ok(items)
}

fn sequenced(destination: &Path, sequence: usize) -> PathBuf {
    let stem = destination
        .file_stem()
        .map(|stem| stem.to_string_lossy())
        .unwrap_or_default();
    destination.with_file_name(format!("{stem}-{sequence}.{OUTPUT_EXTENSION}"))
}
