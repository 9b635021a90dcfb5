use std::fmt::Debug;

use async_trait::async_trait;
use chroma_error::ChromaError;
use chroma_types::CollectionUuid;

use super::config::AssignmentPolicyConfig;
use crate::registry::Registry;
use crate::Configurable;

/// Maps a collection to the log partition that owns its writes.
///
/// Unlike the rendezvous-hashing policies used elsewhere in Chroma to shard
/// work across a changing set of worker replicas, the log partition for a
/// collection never moves: once a collection is created its partition tag is
/// fixed for the lifetime of the collection, so assignment here does not take
/// a member list.
pub trait AssignmentPolicy: Send + Sync + Debug {
    fn assign(&self, collection_id: CollectionUuid) -> String;
}

/// Assigns `persistent://{tenant_ns}/{topic_ns}/{collection_id}` as the
/// partition tag, mirroring the embeddings queue topic naming scheme.
#[derive(Clone, Debug)]
pub struct TopicNamespaceAssignmentPolicy {
    tenant_ns: String,
    topic_ns: String,
}

impl TopicNamespaceAssignmentPolicy {
    pub fn new(tenant_ns: String, topic_ns: String) -> Self {
        Self {
            tenant_ns,
            topic_ns,
        }
    }
}

#[async_trait]
impl Configurable<AssignmentPolicyConfig> for TopicNamespaceAssignmentPolicy {
    async fn try_from_config(
        config: &AssignmentPolicyConfig,
        _registry: &Registry,
    ) -> Result<Self, Box<dyn ChromaError>> {
        let AssignmentPolicyConfig::TopicNamespace(config) = config;
        Ok(TopicNamespaceAssignmentPolicy::new(
            config.tenant_ns.clone(),
            config.topic_ns.clone(),
        ))
    }
}

impl AssignmentPolicy for TopicNamespaceAssignmentPolicy {
    fn assign(&self, collection_id: CollectionUuid) -> String {
        format!(
            "persistent://{}/{}/{}",
            self.tenant_ns, self.topic_ns, collection_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_assign_is_deterministic() {
        let policy = TopicNamespaceAssignmentPolicy::new("t".to_string(), "log".to_string());
        let id = CollectionUuid(Uuid::nil());
        assert_eq!(policy.assign(id), policy.assign(id));
        assert_eq!(
            policy.assign(id),
            format!("persistent://t/log/{}", Uuid::nil())
        );
    }

    #[test]
    fn test_assign_distinguishes_collections() {
        let policy = TopicNamespaceAssignmentPolicy::new("t".to_string(), "log".to_string());
        let a = CollectionUuid(Uuid::new_v4());
        let b = CollectionUuid(Uuid::new_v4());
        assert_ne!(policy.assign(a), policy.assign(b));
    }
}
