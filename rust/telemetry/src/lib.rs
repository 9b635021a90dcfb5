//! Tracing initialization for the Log Service and Coordinator binaries.
//!
//! Mirrors the source system's stdout-plus-OTLP layering: a global
//! `EnvFilter` gates everything, a pretty stdout layer always runs, and an
//! OTLP span exporter is added only when `tracing.endpoint` is configured.
//! `RUST_LOG` overrides the computed default filter entirely, same as the
//! rest of the stack.

use opentelemetry::KeyValue;
use opentelemetry_sdk::trace::SdkTracerProvider;
use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer, Registry};

/// `tracing.*` section of the process config (see §6: `tracing.endpoint`,
/// `tracing.service_name`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracingConfig {
    #[serde(default = "TracingConfig::default_service_name")]
    pub service_name: String,
    /// OTLP collector endpoint. Unset means stdout-only tracing, which is
    /// what local development and most tests run with.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl TracingConfig {
    fn default_service_name() -> String {
        "chroma".to_string()
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: Self::default_service_name(),
            endpoint: None,
        }
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn default_filter() -> String {
    "info,chroma_log=trace,chroma_log_service=trace,chroma_sysdb=trace,chroma_coordinator=trace,chroma_leader=trace"
        .to_string()
}

fn stdout_layer() -> BoxedLayer {
    fmt::layer().pretty().with_target(false).boxed()
}

fn otlp_layer(service_name: &str, endpoint: &str) -> BoxedLayer {
    tracing::info!(service_name, endpoint, "registering OTLP span exporter");
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .expect("failed to build OTLP span exporter");
    let provider = SdkTracerProvider::builder()
        .with_resource(
            opentelemetry_sdk::Resource::builder()
                .with_attributes(vec![KeyValue::new("service.name", service_name.to_string())])
                .build(),
        )
        .with_batch_exporter(exporter)
        .build();
    let tracer = opentelemetry::trace::TracerProvider::tracer(&provider, "chroma");
    opentelemetry::global::set_tracer_provider(provider);
    tracing_opentelemetry::layer().with_tracer(tracer).boxed()
}

/// Installs the global `tracing` subscriber for the process. Idempotent
/// enough for tests (a second call simply fails to set the global default
/// and is ignored) but normally called exactly once, at the top of `main`.
pub fn init_tracing(config: &TracingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter()));
    let mut layers: Vec<BoxedLayer> = vec![stdout_layer()];
    if let Some(endpoint) = &config.endpoint {
        layers.push(otlp_layer(&config.service_name, endpoint));
    }
    let subscriber = Registry::default().with(filter).with(layers);
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("global tracing subscriber already set, skipping");
    }
    install_panic_hook();
}

fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let payload = panic_info.payload();
        let payload = payload
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| payload.downcast_ref::<String>().map(|s| s.as_str()));
        tracing::error!(
            panic.payload = payload,
            panic.location = panic_info.location().map(|l| l.to_string()),
            "a panic occurred"
        );
        previous(panic_info);
    }));
}
