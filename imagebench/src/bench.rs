//! Runs all configured workload phases against the endpoint and reports the results.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use yansi::Paint;

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::executor::{HttpRemote, SharedExecutor};
use crate::record::{OutcomeRecord, TestCategory};
use crate::report::{self, GroupBy, Reporter, RunSummary};
use crate::workload::{Inventory, Workload};

/// Everything a benchmark run produced.
#[derive(Debug)]
pub struct RunReport {
    /// All records, phase by phase, each phase in completion order.
    pub records: Vec<OutcomeRecord>,
    /// Overall summary followed by one summary per folder.
    pub by_folder: Vec<RunSummary>,
    /// Overall summary followed by one summary per phase.
    pub by_category: Vec<RunSummary>,
    /// Summaries of the increasing-concurrency phase per concurrency level.
    pub by_concurrency: Vec<RunSummary>,
    /// Wall-clock duration of the whole run.
    pub duration: Duration,
}

/// Runs the benchmark against the configured HTTP endpoint.
pub async fn run(config: Config) -> Result<RunReport> {
    let remote = HttpRemote::builder(&config.endpoint)
        .request_timeout(config.request_timeout)
        .connect_timeout(config.connect_timeout)
        .rotation(config.rotation)
        .build()
        .context("failed to create HTTP client")?;

    run_with_executor(&config, Arc::new(remote)).await
}

/// Runs the benchmark with the given executor.
///
/// Phases run one after another. A phase that cannot be planned is logged and skipped; only a
/// missing input directory or a failure to persist results aborts the run.
pub async fn run_with_executor(config: &Config, executor: SharedExecutor) -> Result<RunReport> {
    let start = Instant::now();

    let inventory = Inventory::scan(
        &config.input_dir,
        &config.output_dir,
        &config.folders,
        config.images_per_folder,
    )?;
    tracing::info!(
        groups = inventory.groups().count(),
        images = inventory.len(),
        "found inputs"
    );

    let dispatcher = Dispatcher::new(executor);
    let mut reporter =
        Reporter::create(&config.summary_dir).context("failed to create summary directory")?;

    let mut records = Vec::new();
    let mut concurrent_records = Vec::new();

    for workload in workloads(config) {
        let category = workload.category();
        println!();
        println!("{} {}", "## Running".bold(), category.bold().blue());

        let outcomes = match workload.run(&inventory, &dispatcher).await {
            Ok(outcomes) => outcomes,
            Err(err) => {
                tracing::error!("skipping {category} test: {err}");
                continue;
            }
        };

        if category == TestCategory::Concurrent {
            for batch in &outcomes {
                reporter.record_batch(category, batch)?;
            }
        }

        let phase: Vec<_> = outcomes.into_iter().flat_map(|b| b.records).collect();
        reporter
            .record_phase(category, &phase)
            .with_context(|| format!("failed to write {category} results"))?;

        let failed = phase.iter().filter(|r| !r.is_success()).count();
        tracing::info!(%category, requests = phase.len(), failed, "phase completed");

        if category == TestCategory::Concurrent {
            concurrent_records.extend(phase.iter().cloned());
        }
        records.extend(phase);
    }

    let by_folder = report::summarize(&records, GroupBy::Folder);
    let by_category = report::summarize(&records, GroupBy::Category);
    let by_concurrency = report::summarize(&concurrent_records, GroupBy::Concurrency);

    reporter.write_table("summary.csv", &by_folder)?;
    reporter.write_table("summary_by_test.csv", &by_category)?;
    if !concurrent_records.is_empty() {
        reporter.write_table("summary_by_concurrency.csv", &by_concurrency)?;
    }

    report::print_summaries("LOAD TEST SUMMARY", &by_folder);
    report::print_summaries("BY TEST", &by_category[1..]);
    if !concurrent_records.is_empty() {
        report::print_summaries("BY CONCURRENCY", &by_concurrency[1..]);
    }

    let duration = start.elapsed();
    println!();
    println!(
        "Total testing duration: {:.2?} ({:.2} minutes)",
        duration.bold(),
        duration.as_secs_f64() / 60.0
    );
    println!(
        "Results and summaries saved to {}",
        reporter.dir().display().blue()
    );

    Ok(RunReport {
        records,
        by_folder,
        by_category,
        by_concurrency,
        duration,
    })
}

/// The enabled phases, in the order they run.
pub fn workloads(config: &Config) -> Vec<Workload> {
    let mut workloads = Vec::new();

    if config.sequential.enabled {
        workloads.push(Workload::Sequential);
    }
    if config.concurrent.enabled {
        workloads.push(Workload::IncreasingConcurrency {
            ceiling: config.concurrent.ceiling,
            batch_pause: config.concurrent.batch_pause,
        });
    }
    if config.random.enabled {
        workloads.push(Workload::RandomSample {
            sample_size: config.random.sample_size,
            seed: config.random.seed.unwrap_or_else(rand::random),
        });
    }
    if config.stress.enabled {
        workloads.push(Workload::Stress {
            total_requests: config.stress.total_requests,
            concurrency: config.stress.concurrency,
            submit_delay: config.stress.submit_delay,
            pool_size: config.stress.pool_size,
        });
    }

    workloads
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_in_order() {
        let config = Config::default();
        let categories: Vec<_> = workloads(&config).iter().map(|w| w.category()).collect();
        assert_eq!(
            categories,
            [
                TestCategory::Sequential,
                TestCategory::Concurrent,
                TestCategory::Random,
                TestCategory::Stress
            ]
        );
    }

    #[test]
    fn disabled_phases_are_skipped() {
        let mut config = Config::default();
        config.sequential.enabled = false;
        config.stress.enabled = false;
        config.random.seed = Some(3);

        let workloads = workloads(&config);
        assert_eq!(workloads.len(), 2);
        assert!(matches!(
            workloads[1],
            Workload::RandomSample {
                sample_size: 5,
                seed: 3
            }
        ));
    }
}
