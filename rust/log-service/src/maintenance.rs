use std::time::Duration;

use chroma_leader::{LeaderElectionConfig, LeaseHolder, LeaseManager};
use chroma_log::LogService;
use tracing::{error, info, warn};

/// The Purger and Metrics background loops (§4.7). Both are gated by the
/// same distributed lease: only the replica currently holding it runs the
/// periodic work, so a multi-replica deployment never has two processes
/// racing to purge the same collection's log.
pub struct MaintenanceLoops {
    log_service: LogService,
    lease_manager: Box<dyn LeaseManager>,
    lease_config: LeaderElectionConfig,
    purge_tick_interval: Duration,
    metrics_tick_interval: Duration,
    backlog_lag: opentelemetry::metrics::Histogram<u64>,
}

impl MaintenanceLoops {
    pub fn new(
        log_service: LogService,
        lease_manager: Box<dyn LeaseManager>,
        lease_config: LeaderElectionConfig,
        purge_tick_interval: Duration,
        metrics_tick_interval: Duration,
    ) -> Self {
        let backlog_lag = opentelemetry::global::meter("chroma.log_service.maintenance")
            .u64_histogram("collection_backlog_lag")
            .with_description("enumeration_offset - compaction_offset for a collection with unread log entries")
            .build();
        Self {
            log_service,
            lease_manager,
            lease_config,
            purge_tick_interval,
            metrics_tick_interval,
            backlog_lag,
        }
    }

    /// Runs until cancelled. Acquires the lease once up front and keeps
    /// renewing it; if renewal ever fails (the lease was lost to another
    /// replica, or the backend is unreachable), it re-enters acquisition
    /// and the loops simply stop firing until leadership is regained.
    pub async fn run(mut self) {
        let mut holder = self.acquire().await;
        let mut renew_tick = tokio::time::interval(Duration::from_secs(
            self.lease_config.renew_interval_secs,
        ));
        let mut purge_tick = tokio::time::interval(self.purge_tick_interval);
        let mut metrics_tick = tokio::time::interval(self.metrics_tick_interval);
        renew_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        purge_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        metrics_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = renew_tick.tick() => {
                    if let Err(err) = holder.renew().await {
                        warn!(error = %err, "failed to renew maintenance lease, re-acquiring");
                        holder = self.acquire().await;
                    }
                }
                _ = purge_tick.tick() => {
                    if holder.is_leader() {
                        if let Err(err) = self.log_service.purge_all_compacted().await {
                            error!(error = %err, "purger sweep failed");
                        }
                    }
                }
                _ = metrics_tick.tick() => {
                    if holder.is_leader() {
                        self.report_metrics().await;
                    }
                }
            }
        }
    }

    async fn acquire(&self) -> Box<dyn LeaseHolder> {
        loop {
            let ttl = Duration::from_secs(self.lease_config.lease_duration_secs);
            match self
                .lease_manager
                .acquire(&self.lease_config.lease_name, ttl)
                .await
            {
                Ok(holder) => {
                    info!(lease = %self.lease_config.lease_name, "acquired maintenance lease");
                    return holder;
                }
                Err(err) => {
                    warn!(error = %err, "failed to acquire maintenance lease, retrying");
                    tokio::time::sleep(Duration::from_secs(
                        self.lease_config.retry_interval_secs,
                    ))
                    .await;
                }
            }
        }
    }

    /// Publishes `enumeration_offset - compaction_offset` per collection with
    /// a backlog. `get_all_collection_info_to_compact` doubles as the source
    /// of truth both for the compactor's poll loop and for this operational
    /// signal, so the two can never disagree; the per-collection lag itself
    /// comes from `collection_log_state`, which the poll loop only reads in
    /// aggregate to decide whether a collection clears `min_compaction_size`.
    async fn report_metrics(&self) {
        let candidates = match self.log_service.get_all_collection_info_to_compact().await {
            Ok(candidates) => candidates,
            Err(err) => {
                error!(error = %err, "metrics sweep failed to enumerate collections");
                return;
            }
        };
        for candidate in &candidates {
            match self
                .log_service
                .collection_log_state(candidate.collection_id)
                .await
            {
                Ok(state) => {
                    let lag = (state.enumeration_offset - state.compaction_offset).max(0) as u64;
                    self.backlog_lag.record(
                        lag,
                        &[opentelemetry::KeyValue::new(
                            "collection_id",
                            candidate.collection_id.to_string(),
                        )],
                    );
                    info!(
                        collection_id = %candidate.collection_id,
                        lag,
                        "collection backlog lag"
                    );
                }
                Err(err) => {
                    error!(
                        collection_id = %candidate.collection_id,
                        error = %err,
                        "metrics sweep failed to read collection log state"
                    );
                }
            }
        }
        info!(
            collections_with_backlog = candidates.len(),
            "maintenance metrics sweep"
        );
    }
}
