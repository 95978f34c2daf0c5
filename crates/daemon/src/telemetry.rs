//! Logging and optional OpenTelemetry export
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: filter directives (default: batchflow=info)
//! - `BATCHFLOW_LOG_FORMAT`: pretty | json
//! - `BATCHFLOW_LOG_FILE`: additionally append plain logs to this file
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (e.g., http://localhost:4317),
//!   only with the `telemetry` feature
//! - `OTEL_SERVICE_NAME`: Service name (default: batchflow)

use anyhow::{Context, Result};
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

use crate::config::{expand_path, LogArgs, LogFormat};

const DEFAULT_FILTER: &str = "batchflow=info";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Keeps log writers alive; flushes on drop
pub struct TelemetryGuard {
    _file: Option<WorkerGuard>,
    #[cfg(feature = "telemetry")]
    tracer_provider: Option<opentelemetry_sdk::trace::TracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        #[cfg(feature = "telemetry")]
        {
            if let Some(provider) = self.tracer_provider.take() {
                if let Err(e) = provider.shutdown() {
                    eprintln!("OpenTelemetry shutdown failed: {e}");
                }
            }
        }
    }
}

/// Where console output goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Console {
    Stdout,
    /// Child runs keep stdout for their result
    Stderr,
}

/// Install the global subscriber
pub fn init(args: &LogArgs, console: Console) -> Result<TelemetryGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .context("Failed to create env filter")?;

    let mut layers: Vec<BoxedLayer> = vec![console_layer(args.log_format, console)];

    let file_guard = match &args.log_file {
        Some(raw) => {
            let (layer, guard) = file_layer(&expand_path(raw))?;
            layers.push(layer);
            Some(guard)
        }
        None => None,
    };

    #[cfg(feature = "telemetry")]
    let tracer_provider = match otel_layer()? {
        Some((layer, provider)) => {
            layers.push(layer);
            Some(provider)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    #[cfg(not(feature = "telemetry"))]
    {
        if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
            tracing::warn!("OpenTelemetry endpoint set but feature 'telemetry' not enabled");
        }
    }

    Ok(TelemetryGuard {
        _file: file_guard,
        #[cfg(feature = "telemetry")]
        tracer_provider,
    })
}

fn console_layer(format: LogFormat, console: Console) -> BoxedLayer {
    match (format, console) {
        // Production: JSON structured logging
        (LogFormat::Json, Console::Stdout) => fmt::layer().json().boxed(),
        (LogFormat::Json, Console::Stderr) => fmt::layer().json().with_writer(io::stderr).boxed(),
        // Development: Pretty formatting with colors
        (LogFormat::Pretty, Console::Stdout) => fmt::layer().pretty().boxed(),
        (LogFormat::Pretty, Console::Stderr) => {
            fmt::layer().pretty().with_writer(io::stderr).boxed()
        }
    }
}

fn file_layer(path: &Path) -> Result<(BoxedLayer, WorkerGuard)> {
    let directory = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .with_context(|| format!("log file path has no file name: {}", path.display()))?;
    std::fs::create_dir_all(directory)
        .with_context(|| format!("cannot create log directory {}", directory.display()))?;

    let appender = tracing_appender::rolling::never(directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer = fmt::layer().with_ansi(false).with_writer(writer).boxed();
    Ok((layer, guard))
}

#[cfg(feature = "telemetry")]
fn otel_layer() -> Result<Option<(BoxedLayer, opentelemetry_sdk::trace::TracerProvider)>> {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::{runtime, trace::TracerProvider, Resource};

    // Check if OpenTelemetry is configured
    let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") else {
        return Ok(None);
    };
    let service_name =
        std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "batchflow".to_string());

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&endpoint)
        .build()
        .context("Failed to build OTLP exporter")?;

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_resource(Resource::new(vec![KeyValue::new(
            "service.name",
            service_name.clone(),
        )]))
        .build();

    let tracer = provider.tracer(service_name);
    let layer = tracing_opentelemetry::layer().with_tracer(tracer).boxed();
    Ok(Some((layer, provider)))
}
