//! Runs batches of jobs with a bounded number of requests in flight.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::{Semaphore, mpsc};

use crate::executor::SharedExecutor;
use crate::record::{Job, OutcomeRecord, Resolution};

/// A set of jobs dispatched together.
#[derive(Clone, Debug)]
pub struct Batch {
    /// The grouping key shared by all jobs, if the batch was planned per folder.
    pub group: Option<String>,
    /// Position of this batch among the batches of its group.
    pub index: usize,
    /// Maximum number of jobs in flight.
    pub concurrency: usize,
    /// Fixed delay between two consecutive submissions.
    pub submit_delay: Duration,
    /// The jobs to run.
    pub jobs: Vec<Job>,
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let group = self.group.as_deref().unwrap_or("all");
        write!(f, "{group}-{}w", self.concurrency)
    }
}

/// Runs jobs on the executor, bounding the number of concurrent requests.
///
/// Every job runs in its own task, so a failing job never affects its siblings. Results are
/// collected over a channel in completion order.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    executor: SharedExecutor,
}

impl Dispatcher {
    /// Creates a dispatcher running jobs on the given executor.
    pub fn new(executor: SharedExecutor) -> Self {
        Self { executor }
    }

    /// Runs all jobs with at most `concurrency` in flight and returns one record per job.
    ///
    /// A concurrency of `0` is treated as `1`.
    pub async fn run(&self, jobs: Vec<Job>, concurrency: usize) -> Vec<OutcomeRecord> {
        self.run_paced(jobs, concurrency, Duration::ZERO, None).await
    }

    /// Runs a planned batch, honoring its submission delay.
    pub async fn run_batch(&self, batch: Batch) -> Vec<OutcomeRecord> {
        let label = batch.to_string();
        self.run_paced(batch.jobs, batch.concurrency, batch.submit_delay, Some(label))
            .await
    }

    async fn run_paced(
        &self,
        jobs: Vec<Job>,
        concurrency: usize,
        submit_delay: Duration,
        label: Option<String>,
    ) -> Vec<OutcomeRecord> {
        let total = jobs.len();
        // More permits than jobs are never used, and the semaphore rejects huge counts.
        let concurrency = concurrency.clamp(1, total.max(1));
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let bar = progress_bar(total, label);

        let mut tasks = Vec::with_capacity(total);
        for (index, job) in jobs.into_iter().enumerate() {
            if index > 0 && !submit_delay.is_zero() {
                tokio::time::sleep(submit_delay).await;
            }

            // Acquiring before spawning keeps submission order for a concurrency of one.
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .expect("dispatch semaphore is never closed");

            let executor = Arc::clone(&self.executor);
            let tx = tx.clone();
            let bar = bar.clone();
            let submitted = Instant::now();
            let task_job = job.clone();
            let handle = tokio::spawn(async move {
                let execution = AssertUnwindSafe(executor.execute(&task_job)).catch_unwind();
                let record = match execution.await {
                    Ok(record) => record,
                    Err(payload) => {
                        let error = format!("worker crashed: {}", panic_message(&*payload));
                        tracing::error!(file = %task_job.item.file_name, "{error}");
                        OutcomeRecord::failure(
                            &task_job,
                            0,
                            Resolution::Unknown,
                            submitted.elapsed(),
                            error,
                        )
                    }
                };
                bar.inc(1);
                // The receiver outlives all tasks.
                tx.send(record).ok();
                drop(permit);
            });
            tasks.push((job, submitted, handle));
        }
        drop(tx);

        let mut records = Vec::with_capacity(total);
        while let Some(record) = rx.recv().await {
            records.push(record);
        }

        // Every sender is gone, so all tasks have finished. Panics are caught inside the tasks, so
        // only tasks that were cancelled by the runtime remain to be accounted for.
        let (pending, handles): (Vec<_>, Vec<_>) = tasks
            .into_iter()
            .map(|(job, submitted, handle)| ((job, submitted), handle))
            .unzip();
        let finished = futures::future::join_all(handles).await;

        for ((job, submitted), result) in pending.into_iter().zip(finished) {
            if let Err(err) = result {
                tracing::error!(file = %job.item.file_name, "worker crashed: {err}");
                // Measured up to the join, the task never reported back.
                bar.inc(1);
                records.push(OutcomeRecord::failure(
                    &job,
                    0,
                    Resolution::Unknown,
                    submitted.elapsed(),
                    format!("worker crashed: {err}"),
                ));
            }
        }

        bar.finish_and_clear();
        records
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

fn progress_bar(total: usize, label: Option<String>) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::with_template("{msg} {wide_bar} {pos}/{len} {elapsed}") {
        bar.set_style(style);
    }
    if let Some(label) = label {
        bar.set_message(label);
    }
    bar
}
