use serde::Deserialize;

#[derive(Deserialize, Clone, Debug)]
/// Configuration for the collection-to-log-partition assignment policy.
/// # Options
/// - TopicNamespace: deterministic `persistent://{tenant_ns}/{topic_ns}/{collection_id}`
///   partition naming, with no member list and no rebalancing.
pub enum AssignmentPolicyConfig {
    TopicNamespace(TopicNamespaceAssignmentPolicyConfig),
}

#[derive(Deserialize, Clone, Debug)]
pub struct TopicNamespaceAssignmentPolicyConfig {
    pub tenant_ns: String,
    pub topic_ns: String,
}

impl Default for AssignmentPolicyConfig {
    fn default() -> Self {
        AssignmentPolicyConfig::TopicNamespace(TopicNamespaceAssignmentPolicyConfig {
            tenant_ns: "default".to_string(),
            topic_ns: "log".to_string(),
        })
    }
}
