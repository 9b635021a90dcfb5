//! The Log Service process: an ordered, durable, per-collection
//! write-ahead log with compactor-driven truncation, exposed over gRPC.

pub mod config;
pub mod maintenance;
pub mod server;

use chroma_config::{registry::Registry, Configurable};

use crate::config::RootConfig;

const CONFIG_PATH_ENV_VAR: &str = "CONFIG_PATH";

pub async fn log_service_entrypoint() {
    let config = match std::env::var(CONFIG_PATH_ENV_VAR) {
        Ok(path) => RootConfig::load_from_path(&path),
        Err(_) => RootConfig::load(),
    };
    let config = config.log_service;
    chroma_telemetry::init_tracing(&config.tracing);

    let registry = Registry::new();
    let service = match server::LogGrpcService::try_from_config(&config, &registry).await {
        Ok(service) => service,
        Err(err) => panic!("failed to construct log service: {err}"),
    };
    service.run().await;
}
