//! Logging setup based on `tracing`.

use std::env;
use std::io::IsTerminal;

use tracing::level_filters::LevelFilter;
use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, prelude::*};

use crate::config::{Config, LogFormat};

/// Installs the global tracing subscriber, writing to stderr.
pub fn init_tracing(config: &Config) {
    let (level, env_filter) = parse_rust_log(config.logging.level);

    let format = match config.logging.format {
        LogFormat::Auto if std::io::stderr().is_terminal() => LogFormat::Pretty,
        LogFormat::Auto => LogFormat::Simplified,
        format => format,
    };

    tracing_subscriber::registry()
        .with(fmt_layer(format, std::io::stderr).with_filter(level))
        .with(env_filter)
        .init();
}

/// Builds the formatting layer for the given output format.
fn fmt_layer<S, W>(format: LogFormat, writer: W) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_target(true);
    match format {
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Simplified => layer.compact().with_ansi(false).boxed(),
        LogFormat::Pretty | LogFormat::Auto => layer.pretty().boxed(),
    }
}

/// Resolves the effective level and per-module filter.
///
/// `RUST_LOG` is first parsed as a simple level, which overrides the configured one. Otherwise it
/// is used literally if the user knows which overrides they want to run.
pub fn parse_rust_log(configured: LevelFilter) -> (LevelFilter, EnvFilter) {
    let level = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(value) => match value.parse::<Level>() {
            Ok(level) => LevelFilter::from(level),
            Err(_) => return (LevelFilter::TRACE, EnvFilter::new(value)),
        },
        Err(_) => configured,
    };

    // This is the maximum verbosity that will be logged, we filter this down to `level`.
    let env_filter = EnvFilter::new(
        "INFO,\
        hyper=WARN,\
        reqwest=WARN,\
        imagebench=TRACE,\
        ",
    );

    (level, env_filter)
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn render(format: LogFormat) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber =
            tracing_subscriber::registry().with(fmt_layer(format, move || writer.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(file = "img0.jpg", "completed");
        });

        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn simplified_is_one_plain_line() {
        let output = render(LogFormat::Simplified);
        assert_eq!(output.lines().count(), 1);
        assert!(output.contains("completed"));
        assert!(!output.contains('\x1b'));
    }

    #[test]
    fn pretty_spans_multiple_lines() {
        let output = render(LogFormat::Pretty);
        assert!(output.contains("completed"));
        assert!(output.lines().filter(|line| !line.trim().is_empty()).count() > 1);
    }

    #[test]
    fn json_is_structured() {
        let output = render(LogFormat::Json);
        assert!(output.trim_start().starts_with('{'));
        assert!(output.contains("\"file\":\"img0.jpg\""));
    }
}
