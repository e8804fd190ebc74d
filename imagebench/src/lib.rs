//! A load-testing harness for image-processing HTTP endpoints.
//!
//! The harness uploads every image of an input tree to the endpoint using four different
//! [`Workload`]s:
//!
//! - *sequential*: one request at a time, giving a latency baseline free of contention,
//! - *increasing concurrency*: batches of growing size, isolating the effect of concurrency,
//! - *random sample*: a handful of random images dispatched at once,
//! - *stress*: a fixed number of requests cycling over a pool of images.
//!
//! Every request yields an [`OutcomeRecord`](record::OutcomeRecord). Records are persisted as CSV
//! and aggregated into per-folder and overall [`RunSummary`](report::RunSummary)s.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod bench;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod observability;
pub mod record;
pub mod report;
pub mod workload;

pub use crate::bench::run;
pub use crate::workload::Workload;
