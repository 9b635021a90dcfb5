pub mod config;
pub mod policy;

pub use config::AssignmentPolicyConfig;
pub use policy::{AssignmentPolicy, TopicNamespaceAssignmentPolicy};

use crate::Configurable;
use crate::registry::Registry;
use chroma_error::ChromaError;

pub async fn from_config(
    config: &AssignmentPolicyConfig,
    registry: &Registry,
) -> Result<Box<dyn AssignmentPolicy>, Box<dyn ChromaError>> {
    match config {
        AssignmentPolicyConfig::TopicNamespace(_) => Ok(Box::new(
            TopicNamespaceAssignmentPolicy::try_from_config(config, registry).await?,
        )),
    }
}
