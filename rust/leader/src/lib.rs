pub mod config;
pub mod in_process;
pub mod kube_lease;

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use config::{LeaderElectionConfig, LeaseProviderConfig};
pub use in_process::InProcessLeaseManager;
pub use kube_lease::KubeLeaseManager;

#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("lease held by another replica")]
    HeldByOther,
    #[error("lease backend error: {0}")]
    Backend(String),
}

/// A capability for acquiring and renewing a named, time-bounded lease.
///
/// This is the abstraction the maintenance loops (§4.7) depend on; they
/// never talk to Kubernetes (or whatever lease primitive backs a given
/// deployment) directly. `acquire` blocks until the lease is held by this
/// replica or a non-retryable error occurs -- callers that want a
/// non-blocking check should race it against a cancellation signal.
#[async_trait]
pub trait LeaseManager: Send + Sync + Debug {
    async fn acquire(
        &self,
        name: &str,
        ttl: Duration,
    ) -> Result<Box<dyn LeaseHolder>, LeaseError>;
}

/// A held lease. `renew` must be called more often than the lease's TTL or
/// another replica may be granted leadership; `is_leader` reflects the
/// locally cached state as of the last successful `acquire`/`renew` call,
/// not a live check.
#[async_trait]
pub trait LeaseHolder: Send + Sync + Debug {
    async fn renew(&mut self) -> Result<(), LeaseError>;
    fn is_leader(&self) -> bool;
}
