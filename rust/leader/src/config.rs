use serde::Deserialize;

/// Configuration for the distributed lease that gates the Purger and
/// Metrics maintenance loops. Defaults mirror the durations in §4.7: a
/// ~15s lease TTL, ~10s renewal cadence, ~2s retry on contention.
#[derive(Deserialize, Clone, Debug)]
pub struct LeaderElectionConfig {
    pub lease_name: String,
    #[serde(default = "LeaderElectionConfig::default_lease_duration_secs")]
    pub lease_duration_secs: u64,
    #[serde(default = "LeaderElectionConfig::default_renew_interval_secs")]
    pub renew_interval_secs: u64,
    #[serde(default = "LeaderElectionConfig::default_retry_interval_secs")]
    pub retry_interval_secs: u64,
    #[serde(default)]
    pub provider: LeaseProviderConfig,
}

impl LeaderElectionConfig {
    fn default_lease_duration_secs() -> u64 {
        15
    }

    fn default_renew_interval_secs() -> u64 {
        10
    }

    fn default_retry_interval_secs() -> u64 {
        2
    }
}

#[derive(Deserialize, Clone, Debug)]
pub enum LeaseProviderConfig {
    /// A single-replica stand-in that always considers itself the leader.
    /// Used for local development and tests where there is only ever one
    /// process running the maintenance loops.
    #[serde(alias = "single_process")]
    SingleProcess,
    /// Backed by a `coordination.k8s.io/v1` `Lease` object.
    #[serde(alias = "kubernetes")]
    Kubernetes(KubeLeaseConfig),
}

impl Default for LeaseProviderConfig {
    fn default() -> Self {
        LeaseProviderConfig::SingleProcess
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct KubeLeaseConfig {
    pub namespace: String,
    pub pod_name: String,
}
