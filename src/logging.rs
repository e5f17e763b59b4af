//! Tracing subscriber setup for the binaries.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::ClientConfig;

/// Keeps the file writer alive; logs are flushed when it is dropped.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level. Calling this twice is harmless (the second call is a no-op).
pub fn init(config: &ClientConfig) -> LoggingGuard {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    };

    let mut layers = Vec::new();

    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);
    if config.log_json {
        layers.push(console.json().with_filter(filter()).boxed());
    } else {
        layers.push(console.with_filter(filter()).boxed());
    }

    let mut file_guard = None;
    if let Some(dir) = &config.log_dir {
        let appender = rolling::daily(dir, "apitest.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        file_guard = Some(guard);
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .json()
                .with_filter(filter())
                .boxed(),
        );
    }

    let _ = Registry::default().with(layers).try_init();

    LoggingGuard {
        _file_guard: file_guard,
    }
}

/// Shortened token for log lines; never log the full credential.
pub fn token_preview(token: &str) -> String {
    if token.len() > 12 && token.is_char_boundary(4) && token.is_char_boundary(token.len() - 4) {
        format!("{}…{}", &token[..4], &token[token.len() - 4..])
    } else {
        "****".to_string()
    }
}
