use std::time::Duration;

use async_trait::async_trait;

use crate::{LeaseError, LeaseHolder, LeaseManager};

/// A `LeaseManager` for single-replica deployments (local development,
/// integration tests): the only process that asks always wins, and never
/// has to renew against anything.
#[derive(Debug, Default, Clone)]
pub struct InProcessLeaseManager;

impl InProcessLeaseManager {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LeaseManager for InProcessLeaseManager {
    async fn acquire(
        &self,
        _name: &str,
        _ttl: Duration,
    ) -> Result<Box<dyn LeaseHolder>, LeaseError> {
        Ok(Box::new(InProcessLeaseHolder))
    }
}

#[derive(Debug)]
struct InProcessLeaseHolder;

#[async_trait]
impl LeaseHolder for InProcessLeaseHolder {
    async fn renew(&mut self) -> Result<(), LeaseError> {
        Ok(())
    }

    fn is_leader(&self) -> bool {
        true
    }
}
