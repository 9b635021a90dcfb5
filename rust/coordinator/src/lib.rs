//! The SysDB coordinator process: the authoritative catalog of tenants,
//! databases, collections, and segments, exposed over gRPC, plus the
//! background worker that drains the catalog's change notification outbox.

pub mod config;
pub mod notification_sink;
pub mod server;

use chroma_config::{registry::Registry, Configurable};

use crate::config::RootConfig;
use crate::server::CoordinatorProcess;

const CONFIG_PATH_ENV_VAR: &str = "CONFIG_PATH";

pub async fn coordinator_entrypoint() {
    let config = match std::env::var(CONFIG_PATH_ENV_VAR) {
        Ok(path) => RootConfig::load_from_path(&path),
        Err(_) => RootConfig::load(),
    };
    let config = config.coordinator;
    chroma_telemetry::init_tracing(&config.tracing);

    let registry = Registry::new();
    let process = match CoordinatorProcess::try_from_config(&config, &registry).await {
        Ok(process) => process,
        Err(err) => panic!("failed to construct coordinator: {err}"),
    };
    process.run().await;
}
