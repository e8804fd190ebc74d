//! Configuration for the benchmark harness.
//!
//! Configuration is loaded once at startup and passed into the driver, which hands each component
//! the part it needs. Values are merged from the following sources (highest precedence first):
//!
//! 1. Environment variables (prefixed with `IB__`)
//! 2. YAML configuration file (specified via `-c` or `--config` flag)
//! 3. Defaults
//!
//! # Environment Variables
//!
//! Environment variables use `IB__` as a prefix and double underscores (`__`) to denote nested
//! configuration structures. For example:
//!
//! - `IB__ENDPOINT=http://localhost:8501/upload/` sets the target endpoint
//! - `IB__CONCURRENT__CEILING=4` caps the increasing-concurrency phase at 4 requests
//! - `IB__STRESS__ENABLED=false` skips the stress phase
//!
//! # YAML Configuration File
//!
//! The above configuration in YAML format would look like this:
//!
//! ```yaml
//! endpoint: http://localhost:8501/upload/
//!
//! concurrent:
//!   ceiling: 4
//!
//! stress:
//!   enabled: false
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "IB__";

/// Main configuration struct for the harness.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// URL of the image-processing endpoint.
    ///
    /// Every request is a multipart `POST` to this URL carrying the image in the `file` field.
    ///
    /// # Default
    ///
    /// `http://localhost:8501/upload/`
    pub endpoint: String,

    /// Root of the input tree, with one subfolder per grouping.
    ///
    /// The run aborts if this directory does not exist.
    pub input_dir: PathBuf,

    /// Root of the output tree, mirroring the input folders.
    pub output_dir: PathBuf,

    /// Directory receiving the result and summary tables.
    pub summary_dir: PathBuf,

    /// Subfolders of [`input_dir`](Self::input_dir) to benchmark.
    ///
    /// When empty, every subdirectory of the input directory is used.
    ///
    /// # Default
    ///
    /// `["w512", "w1080", "w1920", "w2560", "w3840"]`
    pub folders: Vec<String>,

    /// Maximum number of images taken from each folder, in file name order.
    pub images_per_folder: Option<usize>,

    /// Upper bound for a single request, from connecting until the body has been read.
    ///
    /// # Default
    ///
    /// `120s`
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Upper bound for establishing a connection to the endpoint.
    ///
    /// # Default
    ///
    /// `10s`
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Rotation hint passed to the endpoint as the `rotation` query parameter.
    pub rotation: Option<i32>,

    /// Configuration of the sequential phase.
    pub sequential: Sequential,

    /// Configuration of the increasing-concurrency phase.
    pub concurrent: Concurrent,

    /// Configuration of the random-sample phase.
    pub random: Random,

    /// Configuration of the fixed-count stress phase.
    pub stress: Stress,

    /// Runtime configuration.
    pub runtime: Runtime,

    /// Logging configuration.
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8501/upload/".into(),
            input_dir: PathBuf::from("test_images"),
            output_dir: PathBuf::from("output"),
            summary_dir: PathBuf::from("summary"),
            folders: ["w512", "w1080", "w1920", "w2560", "w3840"]
                .map(String::from)
                .to_vec(),
            images_per_folder: None,
            request_timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(10),
            rotation: None,
            sequential: Sequential::default(),
            concurrent: Concurrent::default(),
            random: Random::default(),
            stress: Stress::default(),
            runtime: Runtime::default(),
            logging: Logging::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the provided arguments.
    ///
    /// Configuration is merged in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. YAML configuration file (if provided)
    /// 3. Environment variables (prefixed with `IB__`)
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML file cannot be read or parsed, or if environment variables
    /// contain invalid values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }
}

/// Sequential phase: one request at a time, folder by folder.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Sequential {
    /// Whether the phase runs.
    pub enabled: bool,
}

impl Default for Sequential {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Increasing-concurrency phase.
///
/// Each folder is split into consecutive batches. The first batch runs two requests concurrently,
/// every following batch one more, up to [`ceiling`](Self::ceiling).
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Concurrent {
    /// Whether the phase runs.
    pub enabled: bool,

    /// Maximum number of concurrent requests in a batch.
    ///
    /// # Default
    ///
    /// `10`
    pub ceiling: usize,

    /// Pause between two batches to let the endpoint settle.
    ///
    /// # Default
    ///
    /// `1s`
    #[serde(with = "humantime_serde")]
    pub batch_pause: Duration,
}

impl Default for Concurrent {
    fn default() -> Self {
        Self {
            enabled: true,
            ceiling: 10,
            batch_pause: Duration::from_secs(1),
        }
    }
}

/// Random-sample phase.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Random {
    /// Whether the phase runs.
    pub enabled: bool,

    /// Number of inputs drawn without replacement. They are dispatched all at once.
    ///
    /// # Default
    ///
    /// `5`
    pub sample_size: usize,

    /// Seed for the sampling RNG. A random seed is chosen when unset.
    pub seed: Option<u64>,
}

impl Default for Random {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_size: 5,
            seed: None,
        }
    }
}

/// Fixed-count stress phase.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Stress {
    /// Whether the phase runs.
    pub enabled: bool,

    /// Exact number of requests sent.
    ///
    /// # Default
    ///
    /// `500`
    pub total_requests: usize,

    /// Maximum number of concurrent requests.
    ///
    /// # Default
    ///
    /// `10`
    pub concurrency: usize,

    /// Fixed delay between two consecutive submissions.
    ///
    /// # Default
    ///
    /// `10ms`
    #[serde(with = "humantime_serde")]
    pub submit_delay: Duration,

    /// Number of inputs to cycle over, in enumeration order. All inputs when unset.
    pub pool_size: Option<usize>,
}

impl Default for Stress {
    fn default() -> Self {
        Self {
            enabled: true,
            total_requests: 500,
            concurrency: 10,
            submit_delay: Duration::from_millis(10),
            pool_size: None,
        }
    }
}

/// Runtime configuration.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Runtime {
    /// Number of worker threads of the async runtime.
    ///
    /// # Default
    ///
    /// The number of available CPU cores.
    pub worker_threads: usize,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            worker_threads: std::thread::available_parallelism().map_or(1, |n| n.get()),
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Chooses [`LogFormat::Pretty`] for a TTY, otherwise [`LogFormat::Simplified`].
    Auto,
    /// Multi-line pretty printing with colors and source locations.
    Pretty,
    /// Compact plain text output.
    Simplified,
    /// JSON lines.
    Json,
}

/// Logging configuration.
///
/// Logs are always written to stderr, leaving stdout to the final report.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Minimum log level to output.
    ///
    /// The `RUST_LOG` environment variable provides more granular control per module if needed.
    ///
    /// # Default
    ///
    /// `INFO`
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format.
    ///
    /// # Default
    ///
    /// `auto`
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

mod display_fromstr {
    use std::borrow::Cow;
    use std::fmt::Display;
    use std::str::FromStr;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: FromStr,
        <T as FromStr>::Err: Display,
    {
        let s = <Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_match_benchmark_layout() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load(None).unwrap();

            assert_eq!(config.input_dir, Path::new("test_images"));
            assert_eq!(config.folders.len(), 5);
            assert_eq!(config.concurrent.ceiling, 10);
            assert_eq!(config.random.sample_size, 5);
            assert_eq!(config.stress.total_requests, 500);
            assert_eq!(config.request_timeout, Duration::from_secs(120));
            assert_eq!(config.logging.level, LevelFilter::INFO);

            Ok(())
        });
    }

    #[test]
    fn configurable_via_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("IB__ENDPOINT", "http://127.0.0.1:9999/upload/");
            jail.set_env("IB__CONCURRENT__CEILING", "4");
            jail.set_env("IB__RANDOM__SEED", "42");
            jail.set_env("IB__STRESS__SUBMIT_DELAY", "25ms");
            jail.set_env("IB__LOGGING__LEVEL", "debug");

            let config = Config::load(None).unwrap();

            assert_eq!(config.endpoint, "http://127.0.0.1:9999/upload/");
            assert_eq!(config.concurrent.ceiling, 4);
            assert_eq!(config.random.seed, Some(42));
            assert_eq!(config.stress.submit_delay, Duration::from_millis(25));
            assert_eq!(config.logging.level, LevelFilter::DEBUG);

            Ok(())
        });
    }

    #[test]
    fn configurable_via_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            input_dir: /data/images
            folders: [small, large]
            request_timeout: 30s
            rotation: 90
            stress:
                enabled: false
                total_requests: 12
            logging:
                format: json
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|_jail| {
            let config = Config::load(Some(tempfile.path())).unwrap();

            assert_eq!(config.input_dir, Path::new("/data/images"));
            assert_eq!(config.folders, ["small", "large"]);
            assert_eq!(config.request_timeout, Duration::from_secs(30));
            assert_eq!(config.rotation, Some(90));
            assert!(!config.stress.enabled);
            assert_eq!(config.stress.total_requests, 12);
            assert_eq!(config.stress.concurrency, 10);
            assert_eq!(config.logging.format, LogFormat::Json);

            Ok(())
        });
    }
}
