use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::signal::unix::{signal, SignalKind};
use tonic::{transport::Server, Request, Response, Status};

use chroma_config::assignment::AssignmentPolicy;
use chroma_config::{registry::Registry, Configurable};
use chroma_error::ChromaError;
use chroma_proto::coordinator::{
    coordinator_server::{Coordinator as CoordinatorRpc, CoordinatorServer},
    metadata_value::Value as ProtoMetadataValueKind,
    update_metadata_value::Action as ProtoUpdateAction,
    Collection as ProtoCollection, CreateCollectionRequest, CreateCollectionResponse,
    CreateDatabaseRequest, CreateDatabaseResponse, CreateSegmentRequest, CreateSegmentResponse,
    CreateTenantRequest, CreateTenantResponse, Database as ProtoDatabase, DeleteCollectionRequest,
    DeleteCollectionResponse, DeleteDatabaseRequest, DeleteDatabaseResponse, DeleteSegmentRequest,
    DeleteSegmentResponse, GetCollectionsRequest, GetCollectionsResponse, GetDatabaseRequest,
    GetDatabaseResponse, GetSegmentsRequest, GetSegmentsResponse, GetTenantRequest,
    GetTenantResponse, ListDatabasesRequest, ListDatabasesResponse,
    MetadataValue as ProtoMetadataValue, Segment as ProtoSegment, SegmentScope as ProtoSegmentScope,
    Tenant as ProtoTenant, UpdateCollectionRequest, UpdateCollectionResponse,
    UpdateMetadataValue as ProtoUpdateMetadataValue, UpdateSegmentRequest, UpdateSegmentResponse,
};
use chroma_sysdb::{
    Catalog, CatalogConfig, Coordinator, CreateCollectionSpec, CreateSegmentSpec,
    GetCollectionsOptions, GetSegmentsOptions, MetaTable, NotificationProcessor, NotificationSink,
    UpdateCollectionSpec, UpdateSegmentSpec,
};
use chroma_types::{
    CatalogError, Collection, CollectionUuid, Database, Metadata, MetadataValue, Segment,
    SegmentScope, SegmentUuid, Tenant, UpdateMetadata, UpdateMetadataValue,
};

use crate::config::CoordinatorConfig;
use crate::notification_sink::LoggingNotificationSink;

fn to_status(err: CatalogError) -> Status {
    Status::new(err.code().into(), err.to_string())
}

fn parse_collection_id(raw: &str) -> Result<CollectionUuid, Status> {
    CollectionUuid::from_str(raw).map_err(|err| Status::invalid_argument(format!("invalid collection id: {err}")))
}

fn parse_segment_id(raw: &str) -> Result<SegmentUuid, Status> {
    SegmentUuid::from_str(raw).map_err(|err| Status::invalid_argument(format!("invalid segment id: {err}")))
}

fn metadata_value_to_proto(value: &MetadataValue) -> ProtoMetadataValue {
    let kind = match value {
        MetadataValue::Str(s) => ProtoMetadataValueKind::StringValue(s.clone()),
        MetadataValue::Int(i) => ProtoMetadataValueKind::IntValue(*i),
        MetadataValue::Float(f) => ProtoMetadataValueKind::FloatValue(*f),
    };
    ProtoMetadataValue { value: Some(kind) }
}

fn proto_to_metadata_value(proto: ProtoMetadataValue) -> Result<MetadataValue, Status> {
    match proto.value {
        Some(ProtoMetadataValueKind::StringValue(s)) => Ok(MetadataValue::Str(s)),
        Some(ProtoMetadataValueKind::IntValue(i)) => Ok(MetadataValue::Int(i)),
        Some(ProtoMetadataValueKind::FloatValue(f)) => Ok(MetadataValue::Float(f)),
        None => Err(Status::invalid_argument("metadata value has no variant set")),
    }
}

fn metadata_to_proto(metadata: &Option<Metadata>) -> HashMap<String, ProtoMetadataValue> {
    metadata
        .as_ref()
        .map(|m| m.iter().map(|(k, v)| (k.clone(), metadata_value_to_proto(v))).collect())
        .unwrap_or_default()
}

fn proto_to_metadata(proto: HashMap<String, ProtoMetadataValue>) -> Result<Option<Metadata>, Status> {
    if proto.is_empty() {
        return Ok(None);
    }
    let mut metadata = Metadata::new();
    for (key, value) in proto {
        metadata.insert(key, proto_to_metadata_value(value)?);
    }
    Ok(Some(metadata))
}

fn proto_to_update_metadata(
    proto: HashMap<String, ProtoUpdateMetadataValue>,
) -> Result<Option<UpdateMetadata>, Status> {
    if proto.is_empty() {
        return Ok(None);
    }
    let mut metadata = UpdateMetadata::new();
    for (key, value) in proto {
        let update = match value.action {
            Some(ProtoUpdateAction::Set(value)) => UpdateMetadataValue::Set(proto_to_metadata_value(value)?),
            Some(ProtoUpdateAction::Remove(_)) => UpdateMetadataValue::Remove,
            None => return Err(Status::invalid_argument("update metadata value has no action set")),
        };
        metadata.insert(key, update);
    }
    Ok(Some(metadata))
}

fn collection_to_proto(collection: Collection) -> ProtoCollection {
    ProtoCollection {
        id: collection.collection_id.to_string(),
        name: collection.name,
        database_id: collection.database_id.to_string(),
        tenant: collection.tenant,
        database: collection.database,
        dimension: collection.dimension,
        metadata: metadata_to_proto(&collection.metadata),
        configuration: collection.configuration,
        topic: collection.topic,
        log_position: collection.log_position,
        version: collection.version,
    }
}

fn database_to_proto(database: Database) -> ProtoDatabase {
    ProtoDatabase {
        id: database.id.to_string(),
        name: database.name,
        tenant: database.tenant,
        created_at_unix_secs: database.created_at.timestamp(),
    }
}

fn tenant_to_proto(tenant: Tenant) -> ProtoTenant {
    ProtoTenant {
        id: tenant.id,
        created_at_unix_secs: tenant.created_at.timestamp(),
    }
}

fn segment_scope_to_proto(scope: SegmentScope) -> i32 {
    (match scope {
        SegmentScope::Vector => ProtoSegmentScope::Vector,
        SegmentScope::Metadata => ProtoSegmentScope::Metadata,
        SegmentScope::Record => ProtoSegmentScope::Record,
    }) as i32
}

fn proto_to_segment_scope(raw: i32) -> Result<SegmentScope, Status> {
    match ProtoSegmentScope::try_from(raw).map_err(|_| Status::invalid_argument("invalid segment scope"))? {
        ProtoSegmentScope::Vector => Ok(SegmentScope::Vector),
        ProtoSegmentScope::Metadata => Ok(SegmentScope::Metadata),
        ProtoSegmentScope::Record => Ok(SegmentScope::Record),
    }
}

fn segment_to_proto(segment: Segment) -> ProtoSegment {
    ProtoSegment {
        id: segment.id.to_string(),
        r#type: segment.r#type,
        scope: segment_scope_to_proto(segment.scope),
        collection_id: segment.collection.to_string(),
        metadata: metadata_to_proto(&segment.metadata),
    }
}

/// The gRPC-facing wrapper around `chroma_sysdb::Coordinator`. Kept
/// separate from `CoordinatorProcess` so the notification processor can be
/// spawned and moved off on its own when the process starts serving.
#[derive(Clone)]
struct CoordinatorRpcService {
    coordinator: Coordinator,
}

/// The coordinator process: the gRPC surface over `chroma_sysdb::Coordinator`,
/// plus the background notification processor that drains the catalog's
/// change outbox.
pub struct CoordinatorProcess {
    port: u16,
    rpc: CoordinatorRpcService,
    processor: NotificationProcessor,
}

impl CoordinatorProcess {
    pub async fn run(self) {
        let CoordinatorProcess {
            port,
            rpc,
            processor,
        } = self;

        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

        let addr = format!("[::]:{port}")
            .parse()
            .expect("failed to parse listen address");

        let (health_reporter, health_service) = tonic_health::server::health_reporter();
        health_reporter
            .set_serving::<CoordinatorServer<CoordinatorRpcService>>()
            .await;

        tracing::info!(address = %addr, "coordinator listening");

        tokio::spawn(processor.run());

        Server::builder()
            .add_service(health_service)
            .add_service(CoordinatorServer::new(rpc))
            .serve_with_shutdown(addr, async move {
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down coordinator"),
                    _ = sigint.recv() => tracing::info!("received SIGINT, shutting down coordinator"),
                }
            })
            .await
            .expect("coordinator grpc server failed");
    }
}

#[async_trait]
impl Configurable<CoordinatorConfig> for CoordinatorProcess {
    async fn try_from_config(
        config: &CoordinatorConfig,
        registry: &Registry,
    ) -> Result<Self, Box<dyn ChromaError>> {
        let catalog = <Arc<dyn Catalog> as Configurable<CatalogConfig>>::try_from_config(
            &config.catalog,
            registry,
        )
        .await?;

        let assignment_policy: Arc<dyn AssignmentPolicy> =
            Arc::from(chroma_config::assignment::from_config(&config.assignment, registry).await?);

        let sink: Arc<dyn NotificationSink> = Arc::new(LoggingNotificationSink);
        let (processor, trigger) = NotificationProcessor::new(
            catalog.clone(),
            sink,
            Duration::from_secs(config.notification.sweep_interval_secs),
            Duration::from_secs(config.notification.retry_interval_secs),
        );

        let meta_table = MetaTable::new(catalog).with_trigger(trigger);
        let coordinator = Coordinator::new(Arc::new(meta_table), assignment_policy);

        Ok(Self {
            port: config.port,
            rpc: CoordinatorRpcService { coordinator },
            processor,
        })
    }
}

#[async_trait]
impl CoordinatorRpc for CoordinatorRpcService {
    async fn create_tenant(
        &self,
        request: Request<CreateTenantRequest>,
    ) -> Result<Response<CreateTenantResponse>, Status> {
        let request = request.into_inner();
        self.coordinator.create_tenant(request.name).await.map_err(to_status)?;
        Ok(Response::new(CreateTenantResponse {}))
    }

    async fn get_tenant(
        &self,
        request: Request<GetTenantRequest>,
    ) -> Result<Response<GetTenantResponse>, Status> {
        let request = request.into_inner();
        let tenant = self.coordinator.get_tenant(&request.name).await.map_err(to_status)?;
        Ok(Response::new(GetTenantResponse {
            tenant: Some(tenant_to_proto(tenant)),
        }))
    }

    async fn create_database(
        &self,
        request: Request<CreateDatabaseRequest>,
    ) -> Result<Response<CreateDatabaseResponse>, Status> {
        let request = request.into_inner();
        self.coordinator
            .create_database(request.name, request.tenant)
            .await
            .map_err(to_status)?;
        Ok(Response::new(CreateDatabaseResponse {}))
    }

    async fn get_database(
        &self,
        request: Request<GetDatabaseRequest>,
    ) -> Result<Response<GetDatabaseResponse>, Status> {
        let request = request.into_inner();
        let database = self
            .coordinator
            .get_database(&request.name, &request.tenant)
            .await
            .map_err(to_status)?;
        Ok(Response::new(GetDatabaseResponse {
            database: Some(database_to_proto(database)),
        }))
    }

    async fn list_databases(
        &self,
        request: Request<ListDatabasesRequest>,
    ) -> Result<Response<ListDatabasesResponse>, Status> {
        let request = request.into_inner();
        let databases = self
            .coordinator
            .list_databases(&request.tenant, request.limit, request.offset)
            .await
            .map_err(to_status)?
            .into_iter()
            .map(database_to_proto)
            .collect();
        Ok(Response::new(ListDatabasesResponse { databases }))
    }

    async fn delete_database(
        &self,
        request: Request<DeleteDatabaseRequest>,
    ) -> Result<Response<DeleteDatabaseResponse>, Status> {
        let request = request.into_inner();
        self.coordinator
            .delete_database(&request.name, &request.tenant)
            .await
            .map_err(to_status)?;
        Ok(Response::new(DeleteDatabaseResponse {}))
    }

    async fn create_collection(
        &self,
        request: Request<CreateCollectionRequest>,
    ) -> Result<Response<CreateCollectionResponse>, Status> {
        let request = request.into_inner();
        let collection_id = if request.id.is_empty() {
            CollectionUuid::new()
        } else {
            parse_collection_id(&request.id)?
        };
        let metadata = proto_to_metadata(request.metadata)?;
        let spec = CreateCollectionSpec {
            collection_id,
            name: request.name,
            tenant: request.tenant,
            database: request.database,
            dimension: request.dimension,
            metadata,
            configuration: request.configuration,
            get_or_create: request.get_or_create,
        };
        let collection = self.coordinator.create_collection(spec).await.map_err(to_status)?;
        Ok(Response::new(CreateCollectionResponse {
            collection: Some(collection_to_proto(collection)),
        }))
    }

    async fn update_collection(
        &self,
        request: Request<UpdateCollectionRequest>,
    ) -> Result<Response<UpdateCollectionResponse>, Status> {
        let request = request.into_inner();
        let id = parse_collection_id(&request.id)?;
        let metadata = proto_to_update_metadata(request.metadata)?;
        let spec = UpdateCollectionSpec {
            name: request.name,
            metadata,
            reset_metadata: request.reset_metadata,
        };
        let collection = self.coordinator.update_collection(id, spec).await.map_err(to_status)?;
        Ok(Response::new(UpdateCollectionResponse {
            collection: Some(collection_to_proto(collection)),
        }))
    }

    async fn delete_collection(
        &self,
        request: Request<DeleteCollectionRequest>,
    ) -> Result<Response<DeleteCollectionResponse>, Status> {
        let request = request.into_inner();
        let id = parse_collection_id(&request.id)?;
        self.coordinator.delete_collection(id).await.map_err(to_status)?;
        Ok(Response::new(DeleteCollectionResponse {}))
    }

    async fn get_collections(
        &self,
        request: Request<GetCollectionsRequest>,
    ) -> Result<Response<GetCollectionsResponse>, Status> {
        let request = request.into_inner();
        let collection_id = request.id.as_deref().map(parse_collection_id).transpose()?;
        let options = GetCollectionsOptions {
            collection_id,
            name: request.name,
            tenant: (!request.tenant.is_empty()).then_some(request.tenant),
            database: (!request.database.is_empty()).then_some(request.database),
            include_soft_deleted: false,
            limit: None,
            offset: 0,
        };
        let collections = self
            .coordinator
            .get_collections(options)
            .await
            .map_err(to_status)?
            .into_iter()
            .map(collection_to_proto)
            .collect();
        Ok(Response::new(GetCollectionsResponse { collections }))
    }

    async fn create_segment(
        &self,
        request: Request<CreateSegmentRequest>,
    ) -> Result<Response<CreateSegmentResponse>, Status> {
        let proto_segment = request
            .into_inner()
            .segment
            .ok_or_else(|| Status::invalid_argument("segment is required"))?;
        let id = if proto_segment.id.is_empty() {
            SegmentUuid::new()
        } else {
            parse_segment_id(&proto_segment.id)?
        };
        let collection_id = parse_collection_id(&proto_segment.collection_id)?;
        let scope = proto_to_segment_scope(proto_segment.scope)?;
        let metadata = proto_to_metadata(proto_segment.metadata)?;
        let spec = CreateSegmentSpec {
            id,
            r#type: proto_segment.r#type,
            scope,
            collection_id,
            metadata,
        };
        self.coordinator.create_segment(spec).await.map_err(to_status)?;
        Ok(Response::new(CreateSegmentResponse {}))
    }

    async fn update_segment(
        &self,
        request: Request<UpdateSegmentRequest>,
    ) -> Result<Response<UpdateSegmentResponse>, Status> {
        let request = request.into_inner();
        let id = parse_segment_id(&request.id)?;
        let metadata = proto_to_update_metadata(request.metadata)?;
        let spec = UpdateSegmentSpec {
            metadata,
            reset_metadata: request.reset_metadata,
        };
        let segment = self.coordinator.update_segment(id, spec).await.map_err(to_status)?;
        Ok(Response::new(UpdateSegmentResponse {
            segment: Some(segment_to_proto(segment)),
        }))
    }

    async fn delete_segment(
        &self,
        request: Request<DeleteSegmentRequest>,
    ) -> Result<Response<DeleteSegmentResponse>, Status> {
        let request = request.into_inner();
        let id = parse_segment_id(&request.id)?;
        self.coordinator.delete_segment(id).await.map_err(to_status)?;
        Ok(Response::new(DeleteSegmentResponse {}))
    }

    async fn get_segments(
        &self,
        request: Request<GetSegmentsRequest>,
    ) -> Result<Response<GetSegmentsResponse>, Status> {
        let request = request.into_inner();
        let id = request.id.as_deref().map(parse_segment_id).transpose()?;
        let scope = request.scope.map(proto_to_segment_scope).transpose()?;
        let collection_id = request.collection_id.as_deref().map(parse_collection_id).transpose()?;
        let options = GetSegmentsOptions {
            id,
            r#type: request.r#type,
            scope,
            collection_id,
        };
        let segments = self
            .coordinator
            .get_segments(options)
            .await
            .map_err(to_status)?
            .into_iter()
            .map(segment_to_proto)
            .collect();
        Ok(Response::new(GetSegmentsResponse { segments }))
    }
}
