//! Sets up the `tracing` subscriber of the signer node.
//!
//! Events go to stdout, filtered by `RUST_LOG`. When an OTLP collector is configured, spans are
//! also exported to it so that a round can be followed across the nodes of the signing group.

use std::env;

use opentelemetry::{trace::TracerProvider, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{trace::SdkTracerProvider, Resource};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

/// Collector endpoint spans are exported to.
pub const OTLP_URL_ENVVAR: &str = "TSS_BRIDGE_OTLP_URL";

/// Label telling apart nodes that share a binary name, e.g. `signer-2`.
pub const SVC_LABEL_ENVVAR: &str = "TSS_BRIDGE_SVC_LABEL";

/// Set to `1` to print the source file of every event.
pub const LOG_FILE_ENVVAR: &str = "LOG_FILE";

/// Set to `1` to print the source line of every event.
pub const LOG_LINE_NUM_ENVVAR: &str = "LOG_LINE_NUM";

/// Why logging could not be set up.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The span exporter for the configured collector could not be built.
    #[error("otlp exporter for {url}: {reason}")]
    Exporter {
        /// The configured collector.
        url: String,
        /// What the exporter builder reported.
        reason: String,
    },
}

/// How the node reports.
#[derive(Debug, Clone, Default)]
pub struct LoggerConfig {
    whoami: String,
    otel_url: Option<String>,
    with_file: bool,
    with_line_number: bool,
}

impl LoggerConfig {
    /// Stdout only, under the name `whoami`.
    pub fn new(whoami: impl Into<String>) -> Self {
        Self {
            whoami: whoami.into(),
            ..Default::default()
        }
    }

    /// Reads the service label, the collector and the source location switches from the
    /// environment. The name becomes `base%label` when a label is set.
    pub fn from_env(base: &str) -> Self {
        let whoami = match env::var(SVC_LABEL_ENVVAR) {
            Ok(label) if !label.is_empty() => format!("{base}%{label}"),
            _ => base.to_owned(),
        };

        Self {
            whoami,
            otel_url: env::var(OTLP_URL_ENVVAR).ok().filter(|url| !url.is_empty()),
            with_file: flag(LOG_FILE_ENVVAR),
            with_line_number: flag(LOG_LINE_NUM_ENVVAR),
        }
    }

    /// Exports spans to the collector at `url`.
    pub fn with_otlp_url(mut self, url: impl Into<String>) -> Self {
        self.otel_url = Some(url.into());
        self
    }

    /// Name of the node in events and exported spans.
    pub fn whoami(&self) -> &str {
        &self.whoami
    }
}

fn flag(var: &str) -> bool {
    env::var(var).is_ok_and(|v| v == "1")
}

/// Installs the global subscriber.
///
/// Fails only if the span exporter cannot be built. A second call in the same process keeps the
/// first subscriber, which lets every test call this.
pub fn init(config: LoggerConfig) -> Result<(), LoggingError> {
    let stdout = fmt::layer()
        .compact()
        .with_file(config.with_file)
        .with_line_number(config.with_line_number)
        .with_filter(EnvFilter::from_default_env());

    let otel = match &config.otel_url {
        Some(url) => Some(otel_layer(&config.whoami, url)?),
        None => None,
    };

    let installed = tracing_subscriber::registry()
        .with(otel)
        .with(stdout)
        .try_init()
        .is_ok();

    if installed {
        info!(whoami = %config.whoami, otlp = ?config.otel_url, "logging started");
    }

    Ok(())
}

fn otel_layer(
    whoami: &str,
    url: &str,
) -> Result<impl Layer<Registry> + Send + Sync, LoggingError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(url)
        .build()
        .map_err(|e| LoggingError::Exporter {
            url: url.to_owned(),
            reason: e.to_string(),
        })?;

    let provider = SdkTracerProvider::builder()
        .with_resource(
            Resource::builder()
                .with_attribute(KeyValue::new("service.name", whoami.to_owned()))
                .build(),
        )
        .with_batch_exporter(exporter)
        .build();

    Ok(tracing_opentelemetry::layer().with_tracer(provider.tracer("tss-bridge")))
}
