use async_trait::async_trait;

use chroma_sysdb::NotificationSink;
use chroma_types::{CatalogError, Notification};

/// The default `NotificationSink`: logs every delivered notification and
/// always succeeds. Stands in for a real subscriber (e.g. the compactor's
/// own queue) until one is wired in; since delivery is at-least-once
/// regardless of sink, swapping this out later changes nothing about the
/// processor's retry or ordering guarantees.
#[derive(Debug, Default)]
pub struct LoggingNotificationSink;

#[async_trait]
impl NotificationSink for LoggingNotificationSink {
    async fn deliver(&self, notification: &Notification) -> Result<(), CatalogError> {
        tracing::info!(
            notification_id = notification.id,
            collection_id = %notification.collection_id,
            notification_type = %notification.r#type,
            "delivering catalog change notification"
        );
        Ok(())
    }
}
