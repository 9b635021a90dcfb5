use figment::providers::{Env, Format, Yaml};
use serde::Deserialize;

use chroma_leader::LeaderElectionConfig;
use chroma_log::LogConfig;
use chroma_sysdb::CatalogConfig;
use chroma_telemetry::TracingConfig;

const DEFAULT_CONFIG_PATH: &str = "./log_service_config.yaml";

/// The `log_service.*` section of the process config.
#[derive(Debug, Clone, Deserialize)]
pub struct LogServiceConfig {
    #[serde(default = "LogServiceConfig::default_port")]
    pub port: u16,
    #[serde(default)]
    pub log: LogConfig,
    /// Connection used only to write through `Collection::log_position`
    /// after a compaction offset advances (see the open question on log
    /// offset convergence). Left unset to run the Log Service without a
    /// catalog at all, e.g. in isolated tests of the wire API.
    pub catalog: Option<CatalogConfig>,
    pub leader: LeaderElectionConfig,
    #[serde(default = "LogServiceConfig::default_purge_tick_interval_secs")]
    pub purge_tick_interval_secs: u64,
    #[serde(default = "LogServiceConfig::default_metrics_tick_interval_secs")]
    pub metrics_tick_interval_secs: u64,
    #[serde(default)]
    pub tracing: TracingConfig,
}

impl LogServiceConfig {
    fn default_port() -> u16 {
        50052
    }

    fn default_purge_tick_interval_secs() -> u64 {
        60
    }

    fn default_metrics_tick_interval_secs() -> u64 {
        30
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RootConfig {
    pub log_service: LogServiceConfig,
}

impl RootConfig {
    pub fn load() -> Self {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Merges, in increasing priority: built-in field defaults, the YAML
    /// file at `path` (if it exists), then `CHROMA_`-prefixed environment
    /// variables with `__` standing in for the `.` nesting separator figment
    /// itself can't parse out of `VAR=value` pairs.
    pub fn load_from_path(path: &str) -> Self {
        let mut f = figment::Figment::from(
            Env::prefixed("CHROMA_").map(|k| k.as_str().replace("__", ".").into()),
        );
        if std::path::Path::new(path).exists() {
            f = figment::Figment::from(Yaml::file(path)).merge(f);
        }
        match f.extract() {
            Ok(config) => config,
            Err(err) => panic!("error loading log service config: {err}"),
        }
    }
}
