use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use chroma_types::{CatalogError, Notification};

use crate::catalog::Catalog;

/// Where delivered notifications go. The compactor's subscription path and
/// any other catalog-change listener implement this; delivery is
/// at-least-once, so implementations must tolerate duplicates.
#[async_trait]
pub trait NotificationSink: Send + Sync + std::fmt::Debug {
    async fn deliver(&self, notification: &Notification) -> Result<(), CatalogError>;
}

/// Wakes the processor immediately after a mutation enqueues a notification,
/// instead of waiting for the next sweep tick. The reply fires once the
/// notification has been handed to the sink (or the processor has given up
/// retrying for this wakeup and will pick it up on the next sweep).
pub struct TriggerMessage {
    pub reply: oneshot::Sender<()>,
}

/// Drains pending notifications and delivers them to a `NotificationSink`,
/// in per-collection FIFO order, at least once.
///
/// Two wakeup sources feed the same loop: an immediate trigger sent by
/// `MetaTable` right after a commit, and a periodic sweep that catches
/// anything a crashed or delayed trigger missed. Delivery failures are
/// retried indefinitely with a fixed backoff -- a notification is not
/// dropped just because the sink was briefly unavailable.
pub struct NotificationProcessor {
    catalog: Arc<dyn Catalog>,
    sink: Arc<dyn NotificationSink>,
    triggers: mpsc::Receiver<TriggerMessage>,
    sweep_interval: Duration,
    retry_interval: Duration,
}

impl NotificationProcessor {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        sink: Arc<dyn NotificationSink>,
        sweep_interval: Duration,
        retry_interval: Duration,
    ) -> (Self, mpsc::Sender<TriggerMessage>) {
        let (tx, rx) = mpsc::channel(128);
        (
            Self {
                catalog,
                sink,
                triggers: rx,
                sweep_interval,
                retry_interval,
            },
            tx,
        )
    }

    /// Runs until the trigger channel's sender side is dropped. Intended to
    /// be spawned as a background task for the lifetime of the process.
    pub async fn run(mut self) {
        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                trigger = self.triggers.recv() => {
                    match trigger {
                        Some(trigger) => {
                            self.drain_pending().await;
                            let _ = trigger.reply.send(());
                        }
                        None => {
                            debug!("notification trigger channel closed, shutting down processor");
                            return;
                        }
                    }
                }
                _ = sweep.tick() => {
                    self.drain_pending().await;
                }
            }
        }
    }

    async fn drain_pending(&self) {
        let pending = self.catalog.list_pending_notifications().await;
        if pending.is_empty() {
            return;
        }

        // Group by collection to preserve per-collection FIFO order while
        // letting independent collections make progress even if one of
        // them is stuck retrying.
        let mut by_collection: std::collections::BTreeMap<_, Vec<Notification>> =
            std::collections::BTreeMap::new();
        for notification in pending {
            by_collection
                .entry(notification.collection_id)
                .or_default()
                .push(notification);
        }

        for (_, mut notifications) in by_collection {
            notifications.sort_by_key(|n| n.id);
            for notification in notifications {
                self.deliver_with_retry(&notification).await;
            }
        }
    }

    async fn deliver_with_retry(&self, notification: &Notification) {
        loop {
            match self.sink.deliver(notification).await {
                Ok(()) => {
                    if let Err(err) = self.catalog.mark_notification_sent(notification.id).await {
                        warn!(
                            notification_id = notification.id,
                            error = %err,
                            "delivered notification but failed to mark it sent; it will be redelivered"
                        );
                    }
                    return;
                }
                Err(CatalogError::Unavailable(msg)) => {
                    warn!(
                        notification_id = notification.id,
                        error = %msg,
                        "notification sink unavailable, retrying"
                    );
                    tokio::time::sleep(self.retry_interval).await;
                }
                Err(err) => {
                    error!(
                        notification_id = notification.id,
                        error = %err,
                        "notification delivery failed with a non-retryable error, dropping"
                    );
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_catalog::InMemoryCatalog;
    use crate::segment_validation::ExclusiveScopePerCollection;
    use crate::options::CreateCollectionSpec;
    use chroma_types::{CollectionUuid, DEFAULT_DATABASE, DEFAULT_TENANT};
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct RecordingSink {
        delivered: Mutex<Vec<Notification>>,
        fail_until: Mutex<usize>,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn deliver(&self, notification: &Notification) -> Result<(), CatalogError> {
            let mut fail_until = self.fail_until.lock();
            if *fail_until > 0 {
                *fail_until -= 1;
                return Err(CatalogError::Unavailable("sink down".into()));
            }
            self.delivered.lock().push(notification.clone());
            Ok(())
        }
    }

    async fn seeded_catalog() -> Arc<InMemoryCatalog> {
        let catalog = Arc::new(InMemoryCatalog::new(Arc::new(ExclusiveScopePerCollection)));
        catalog
            .create_collection(
                CreateCollectionSpec {
                    collection_id: CollectionUuid::new(),
                    name: "x".to_string(),
                    tenant: DEFAULT_TENANT.to_string(),
                    database: DEFAULT_DATABASE.to_string(),
                    dimension: None,
                    metadata: None,
                    configuration: Vec::new(),
                    get_or_create: false,
                },
                "topic".into(),
            )
            .await
            .unwrap();
        catalog
    }

    #[tokio::test]
    async fn sweep_delivers_pending_notification_and_marks_it_sent() {
        let catalog = seeded_catalog().await;
        let sink = Arc::new(RecordingSink::default());
        let (processor, _tx) = NotificationProcessor::new(
            catalog.clone(),
            sink.clone(),
            Duration::from_millis(10),
            Duration::from_millis(5),
        );
        let handle = tokio::spawn(processor.run());

        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if !sink.delivered.lock().is_empty() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("sweep should deliver the pending notification");

        assert!(catalog.list_pending_notifications().await.is_empty());
        handle.abort();
    }

    #[tokio::test]
    async fn trigger_message_delivers_without_waiting_for_sweep() {
        let catalog = seeded_catalog().await;
        let sink = Arc::new(RecordingSink::default());
        let (processor, tx) = NotificationProcessor::new(
            catalog.clone(),
            sink.clone(),
            Duration::from_secs(3600),
            Duration::from_millis(5),
        );
        tokio::spawn(processor.run());

        let (reply, rx) = oneshot::channel();
        tx.send(TriggerMessage { reply }).await.unwrap();
        tokio::time::timeout(Duration::from_millis(500), rx)
            .await
            .expect("trigger reply should arrive promptly")
            .unwrap();
        assert_eq!(sink.delivered.lock().len(), 1);
    }

    #[tokio::test]
    async fn retries_indefinitely_on_unavailable_until_delivered() {
        let catalog = seeded_catalog().await;
        let sink = Arc::new(RecordingSink::default());
        *sink.fail_until.lock() = 3;
        let (processor, tx) = NotificationProcessor::new(
            catalog.clone(),
            sink.clone(),
            Duration::from_secs(3600),
            Duration::from_millis(2),
        );
        tokio::spawn(processor.run());

        let (reply, rx) = oneshot::channel();
        tx.send(TriggerMessage { reply }).await.unwrap();
        tokio::time::timeout(Duration::from_millis(500), rx)
            .await
            .expect("trigger reply should arrive once retries succeed")
            .unwrap();
        assert_eq!(sink.delivered.lock().len(), 1);
        assert!(catalog.list_pending_notifications().await.is_empty());
    }
}
