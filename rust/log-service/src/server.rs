use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::signal::unix::{signal, SignalKind};
use tonic::{transport::Server, Request, Response, Status};

use chroma_config::{registry::Registry, Configurable};
use chroma_error::ChromaError;
use chroma_leader::{InProcessLeaseManager, KubeLeaseManager, LeaseManager, LeaseProviderConfig};
use chroma_log::{LogService, LogStore};
use chroma_proto::log_service::{
    log_service_server::{LogService as LogServiceRpc, LogServiceServer},
    CollectionInfo as ProtoCollectionInfo, GetAllCollectionInfoToCompactRequest,
    GetAllCollectionInfoToCompactResponse, LogRecord as ProtoLogRecord, PullLogsRequest,
    PullLogsResponse, PushLogsRequest, PushLogsResponse, UpdateCollectionLogOffsetRequest,
    UpdateCollectionLogOffsetResponse,
};
use chroma_sysdb::Catalog;
use chroma_types::{CatalogError, CollectionUuid, LogError, LogPositionSink};

use crate::config::LogServiceConfig;
use crate::maintenance::MaintenanceLoops;

fn to_status(err: LogError) -> Status {
    Status::new(err.code().into(), err.to_string())
}

fn parse_collection_id(raw: &str) -> Result<CollectionUuid, Status> {
    CollectionUuid::from_str(raw)
        .map_err(|err| Status::invalid_argument(format!("invalid collection_id: {err}")))
}

/// Adapts a `Catalog` backend to the narrow `LogPositionSink` capability
/// `chroma_log::LogService` depends on, so the Log Service's business logic
/// never has to know which catalog backend (or that a catalog exists at
/// all) is on the other end of `UpdateCollectionLogOffset`.
#[derive(Debug)]
struct CatalogLogPositionSink(Arc<dyn Catalog>);

#[async_trait]
impl LogPositionSink for CatalogLogPositionSink {
    async fn set_log_position(
        &self,
        collection_id: CollectionUuid,
        position: i64,
    ) -> Result<(), CatalogError> {
        self.0.set_log_position(collection_id, position).await
    }

    async fn collection_exists(&self, collection_id: CollectionUuid) -> Result<bool, CatalogError> {
        self.0.collection_exists(collection_id).await
    }
}

/// The gRPC-facing wrapper around `chroma_log::LogService`. Kept separate
/// from `LogGrpcService` so the maintenance loops can be spawned and moved
/// off on their own without needing this type to also carry them.
#[derive(Clone)]
struct LogRpc {
    core: LogService,
}

/// The Log Service process: the gRPC surface over `chroma_log::LogService`,
/// plus the leader-gated purge and metrics loops that run alongside it.
pub struct LogGrpcService {
    port: u16,
    core: LogService,
    maintenance: MaintenanceLoops,
}

impl LogGrpcService {
    pub async fn run(self) {
        let LogGrpcService {
            port,
            core,
            maintenance,
        } = self;

        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

        let addr = format!("[::]:{port}")
            .parse()
            .expect("failed to parse listen address");

        let (health_reporter, health_service) = tonic_health::server::health_reporter();
        health_reporter
            .set_serving::<LogServiceServer<LogRpc>>()
            .await;

        tracing::info!(address = %addr, "log service listening");

        tokio::spawn(maintenance.run());

        Server::builder()
            .add_service(health_service)
            .add_service(LogServiceServer::new(LogRpc { core }))
            .serve_with_shutdown(addr, async move {
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down log service"),
                    _ = sigint.recv() => tracing::info!("received SIGINT, shutting down log service"),
                }
            })
            .await
            .expect("log service grpc server failed");
    }
}

#[async_trait]
impl Configurable<LogServiceConfig> for LogGrpcService {
    async fn try_from_config(
        config: &LogServiceConfig,
        registry: &Registry,
    ) -> Result<Self, Box<dyn ChromaError>> {
        let store = <Arc<dyn LogStore> as Configurable<chroma_log::LogConfig>>::try_from_config(
            &config.log,
            registry,
        )
        .await?;
        let mut core = LogService::new(store, &config.log);

        if let Some(catalog_config) = &config.catalog {
            let catalog = <Arc<dyn Catalog> as Configurable<chroma_sysdb::CatalogConfig>>::try_from_config(
                catalog_config,
                registry,
            )
            .await?;
            core = core.with_catalog_sink(Arc::new(CatalogLogPositionSink(catalog)));
        }

        let lease_manager: Box<dyn LeaseManager> = match &config.leader.provider {
            LeaseProviderConfig::SingleProcess => Box::new(InProcessLeaseManager::new()),
            LeaseProviderConfig::Kubernetes(kube_config) => Box::new(
                KubeLeaseManager::new(
                    kube_config.clone(),
                    Duration::from_secs(config.leader.retry_interval_secs),
                )
                .await
                .map_err(|err| err.boxed())?,
            ),
        };

        let maintenance = MaintenanceLoops::new(
            core.clone(),
            lease_manager,
            config.leader.clone(),
            Duration::from_secs(config.purge_tick_interval_secs),
            Duration::from_secs(config.metrics_tick_interval_secs),
        );

        Ok(Self {
            port: config.port,
            core,
            maintenance,
        })
    }
}

#[async_trait]
impl LogServiceRpc for LogRpc {
    async fn push_logs(
        &self,
        request: Request<PushLogsRequest>,
    ) -> Result<Response<PushLogsResponse>, Status> {
        let request = request.into_inner();
        let collection_id = parse_collection_id(&request.collection_id)?;
        let records = request.records.into_iter().map(|r| r.record).collect::<Vec<_>>();
        let record_count = records.len() as i32;
        self.core
            .push_logs(collection_id, records)
            .await
            .map_err(to_status)?;
        Ok(Response::new(PushLogsResponse { record_count }))
    }

    async fn pull_logs(
        &self,
        request: Request<PullLogsRequest>,
    ) -> Result<Response<PullLogsResponse>, Status> {
        let request = request.into_inner();
        let collection_id = parse_collection_id(&request.collection_id)?;
        let end_timestamp = if request.end_timestamp > 0 {
            Some(request.end_timestamp)
        } else {
            None
        };
        let records = self
            .core
            .pull_logs(
                collection_id,
                request.start_from_offset,
                request.batch_size,
                end_timestamp,
            )
            .await
            .map_err(to_status)?
            .into_iter()
            .map(|r| ProtoLogRecord {
                log_offset: r.log_offset,
                record: r.record,
            })
            .collect();
        Ok(Response::new(PullLogsResponse { records }))
    }

    async fn get_all_collection_info_to_compact(
        &self,
        _request: Request<GetAllCollectionInfoToCompactRequest>,
    ) -> Result<Response<GetAllCollectionInfoToCompactResponse>, Status> {
        let all_collection_info = self
            .core
            .get_all_collection_info_to_compact()
            .await
            .map_err(to_status)?
            .into_iter()
            .map(|info| ProtoCollectionInfo {
                collection_id: info.collection_id.to_string(),
                first_log_offset: info.first_log_offset,
                first_log_offset_ts: info.first_log_offset_ts,
            })
            .collect();
        Ok(Response::new(GetAllCollectionInfoToCompactResponse {
            all_collection_info,
        }))
    }

    async fn update_collection_log_offset(
        &self,
        request: Request<UpdateCollectionLogOffsetRequest>,
    ) -> Result<Response<UpdateCollectionLogOffsetResponse>, Status> {
        let request = request.into_inner();
        let collection_id = parse_collection_id(&request.collection_id)?;
        self.core
            .update_collection_log_offset(collection_id, request.log_offset)
            .await
            .map_err(to_status)?;
        Ok(Response::new(UpdateCollectionLogOffsetResponse {}))
    }
}
