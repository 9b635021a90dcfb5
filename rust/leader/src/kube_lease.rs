use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta};
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::Client;

use crate::config::KubeLeaseConfig;
use crate::{LeaseError, LeaseHolder, LeaseManager};

/// A `LeaseManager` backed by a `coordination.k8s.io/v1` `Lease` object,
/// following the same acquire/renew/release protocol the Kubernetes
/// scheduler and controller-manager use for their own leader election.
///
/// Unlike `chroma-memberlist`'s custom-resource watcher, this never
/// maintains a live watch: each `acquire`/`renew` is a single read-then-
/// conditionally-patch round trip, which is all leader election needs.
#[derive(Debug, Clone)]
pub struct KubeLeaseManager {
    leases: Api<Lease>,
    pod_name: String,
    retry_interval: Duration,
}

impl KubeLeaseManager {
    pub async fn new(
        config: KubeLeaseConfig,
        retry_interval: Duration,
    ) -> Result<Self, LeaseError> {
        let client = Client::try_default()
            .await
            .map_err(|e| LeaseError::Backend(e.to_string()))?;
        Ok(Self {
            leases: Api::namespaced(client, &config.namespace),
            pod_name: config.pod_name,
            retry_interval,
        })
    }

    async fn try_claim(&self, name: &str, ttl: Duration) -> Result<bool, LeaseError> {
        let now = MicroTime(chrono::Utc::now());
        match self
            .leases
            .get(name)
            .await
            .map_err(|e| LeaseError::Backend(e.to_string()))
        {
            Ok(existing) => {
                let spec = existing.spec.unwrap_or_default();
                let expired = spec
                    .renew_time
                    .as_ref()
                    .map(|t| {
                        chrono::Utc::now() - t.0 > chrono::Duration::from_std(ttl).unwrap_or_default()
                    })
                    .unwrap_or(true);
                let held_by_us = spec.holder_identity.as_deref() == Some(self.pod_name.as_str());
                if !held_by_us && !expired {
                    return Ok(false);
                }
                let patch = serde_json::json!({
                    "spec": {
                        "holderIdentity": self.pod_name,
                        "leaseDurationSeconds": ttl.as_secs() as i32,
                        "renewTime": now,
                        "acquireTime": if held_by_us { spec.acquire_time } else { Some(now.clone()) },
                    }
                });
                self.leases
                    .patch(name, &PatchParams::apply("chroma-log-service"), &Patch::Merge(patch))
                    .await
                    .map_err(|e| LeaseError::Backend(e.to_string()))?;
                Ok(true)
            }
            Err(_) => {
                let lease = Lease {
                    metadata: ObjectMeta {
                        name: Some(name.to_string()),
                        ..Default::default()
                    },
                    spec: Some(LeaseSpec {
                        holder_identity: Some(self.pod_name.clone()),
                        lease_duration_seconds: Some(ttl.as_secs() as i32),
                        acquire_time: Some(now.clone()),
                        renew_time: Some(now),
                        ..Default::default()
                    }),
                };
                self.leases
                    .create(&PostParams::default(), &lease)
                    .await
                    .map_err(|e| LeaseError::Backend(e.to_string()))?;
                Ok(true)
            }
        }
    }
}

#[async_trait]
impl LeaseManager for KubeLeaseManager {
    async fn acquire(
        &self,
        name: &str,
        ttl: Duration,
    ) -> Result<Box<dyn LeaseHolder>, LeaseError> {
        loop {
            if self.try_claim(name, ttl).await? {
                return Ok(Box::new(KubeLeaseHolder {
                    manager: self.clone(),
                    name: name.to_string(),
                    ttl,
                    is_leader: true,
                }));
            }
            tokio::time::sleep(self.retry_interval).await;
        }
    }
}

#[derive(Debug)]
struct KubeLeaseHolder {
    manager: KubeLeaseManager,
    name: String,
    ttl: Duration,
    is_leader: bool,
}

#[async_trait]
impl LeaseHolder for KubeLeaseHolder {
    async fn renew(&mut self) -> Result<(), LeaseError> {
        self.is_leader = self.manager.try_claim(&self.name, self.ttl).await?;
        if !self.is_leader {
            return Err(LeaseError::HeldByOther);
        }
        Ok(())
    }

    fn is_leader(&self) -> bool {
        self.is_leader
    }
}
