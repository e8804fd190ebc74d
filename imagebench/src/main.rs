//! Benchmarks an image-processing endpoint with sequential, concurrent, random and stress
//! workloads. See the [`imagebench`] library for details.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

use std::path::PathBuf;

use anyhow::Result;
use argh::FromArgs;

use imagebench::config::Config;
use imagebench::observability;

/// Load tester for image-processing endpoints
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args: Args = argh::from_env();
    let config = Config::load(args.config.as_deref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("bench-rt")
        .enable_all()
        .worker_threads(config.runtime.worker_threads.max(1))
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::init_tracing(&config);
    tracing::debug!(?config);

    runtime.block_on(imagebench::run(config))?;

    Ok(())
}
