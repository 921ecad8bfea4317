use anyhow::{Context, Result};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::config::LoggingConfig;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber. `RUST_LOG` overrides `config.level`.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = build_fmt_layer(config)?;

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .try_init()
        .context("global tracing subscriber already installed")?;

    tracing::info!(level = %config.level, format = %config.format, "Logging initialized");
    Ok(())
}

fn build_fmt_layer(config: &LoggingConfig) -> Result<BoxedLayer> {
    let writer = match &config.file_path {
        Some(file_path) => Some(
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file_path)
                .with_context(|| format!("opening log file {}", file_path))?,
        ),
        None => None,
    };

    let layer: BoxedLayer = match (config.format.as_str(), writer) {
        ("json", Some(file)) => fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_thread_ids(true)
            .with_writer(file)
            .boxed(),
        ("json", None) => fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_thread_ids(true)
            .boxed(),
        (_, Some(file)) => fmt::layer()
            .with_span_events(FmtSpan::CLOSE)
            .with_thread_ids(true)
            .with_ansi(false)
            .with_writer(file)
            .boxed(),
        (_, None) => fmt::layer()
            .with_span_events(FmtSpan::CLOSE)
            .with_thread_ids(true)
            .boxed(),
    };

    Ok(layer)
}

#[macro_export]
macro_rules! log_error {
    ($err:expr, $msg:literal) => {
        tracing::error!(error = %$err, $msg);
    };
    ($err:expr, $msg:literal, $($field:tt)*) => {
        tracing::error!(error = %$err, $($field)*, $msg);
    };
}

#[macro_export]
macro_rules! log_warn {
    ($msg:literal) => {
        tracing::warn!($msg);
    };
    ($msg:literal, $($field:tt)*) => {
        tracing::warn!($($field)*, $msg);
    };
}

#[macro_export]
macro_rules! log_info {
    ($msg:literal) => {
        tracing::info!($msg);
    };
    ($msg:literal, $($field:tt)*) => {
        tracing::info!($($field)*, $msg);
    };
}

#[macro_export]
macro_rules! log_debug {
    ($msg:literal) => {
        tracing::debug!($msg);
    };
    ($msg:literal, $($field:tt)*) => {
        tracing::debug!($($field)*, $msg);
    };
}
