use figment::providers::{Env, Format, Yaml};
use serde::Deserialize;

use chroma_config::assignment::AssignmentPolicyConfig;
use chroma_sysdb::CatalogConfig;
use chroma_telemetry::TracingConfig;

const DEFAULT_CONFIG_PATH: &str = "./coordinator_config.yaml";

/// Tuning for the `NotificationProcessor`'s background loop (§4.4): how
/// often it sweeps for notifications a trigger wakeup missed, and how long
/// it waits between retries of a sink that reported itself unavailable.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "NotificationConfig::default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "NotificationConfig::default_retry_interval_secs")]
    pub retry_interval_secs: u64,
}

impl NotificationConfig {
    fn default_sweep_interval_secs() -> u64 {
        5
    }

    fn default_retry_interval_secs() -> u64 {
        2
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: Self::default_sweep_interval_secs(),
            retry_interval_secs: Self::default_retry_interval_secs(),
        }
    }
}

/// The `coordinator.*` section of the process config.
#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
    #[serde(default = "CoordinatorConfig::default_port")]
    pub port: u16,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub assignment: AssignmentPolicyConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub tracing: TracingConfig,
}

impl CoordinatorConfig {
    fn default_port() -> u16 {
        50051
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            port: Self::default_port(),
            catalog: CatalogConfig::default(),
            assignment: AssignmentPolicyConfig::default(),
            notification: NotificationConfig::default(),
            tracing: TracingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RootConfig {
    pub coordinator: CoordinatorConfig,
}

impl RootConfig {
    pub fn load() -> Self {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    pub fn load_from_path(path: &str) -> Self {
        let mut f = figment::Figment::from(
            Env::prefixed("CHROMA_").map(|k| k.as_str().replace("__", ".").into()),
        );
        if std::path::Path::new(path).exists() {
            f = figment::Figment::from(Yaml::file(path)).merge(f);
        }
        match f.extract() {
            Ok(config) => config,
            Err(err) => panic!("error loading coordinator config: {err}"),
        }
    }
}
