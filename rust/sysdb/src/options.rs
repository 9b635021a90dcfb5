use chroma_types::{CollectionUuid, Metadata, SegmentScope, SegmentUuid, UpdateMetadata};

/// Arguments to `Catalog::create_collection`. `get_or_create=true` makes the
/// call idempotent on `(database, name)`: a second call with the same key
/// returns the collection created by the first, unchanged (P5).
#[derive(Clone, Debug)]
pub struct CreateCollectionSpec {
    pub collection_id: CollectionUuid,
    pub name: String,
    pub tenant: String,
    pub database: String,
    pub dimension: Option<i32>,
    pub metadata: Option<Metadata>,
    pub configuration: Vec<u8>,
    pub get_or_create: bool,
}

/// A partial update to a collection. `name` and `metadata` are the only
/// mutable fields (I4); `reset_metadata=true` together with a non-empty
/// `metadata` is rejected with `InvalidArgument`.
#[derive(Clone, Debug, Default)]
pub struct UpdateCollectionSpec {
    pub name: Option<String>,
    pub metadata: Option<UpdateMetadata>,
    pub reset_metadata: bool,
}

/// AND of whichever fields are set. `tenant`/`database` scope the search;
/// when both are `None` the backend searches across all databases.
#[derive(Clone, Debug, Default)]
pub struct GetCollectionsOptions {
    pub collection_id: Option<CollectionUuid>,
    pub name: Option<String>,
    pub tenant: Option<String>,
    pub database: Option<String>,
    pub include_soft_deleted: bool,
    pub limit: Option<u32>,
    pub offset: u32,
}

#[derive(Clone, Debug)]
pub struct CreateSegmentSpec {
    pub id: SegmentUuid,
    pub r#type: String,
    pub scope: SegmentScope,
    pub collection_id: CollectionUuid,
    pub metadata: Option<Metadata>,
}

#[derive(Clone, Debug, Default)]
pub struct UpdateSegmentSpec {
    pub metadata: Option<UpdateMetadata>,
    pub reset_metadata: bool,
}

#[derive(Clone, Debug, Default)]
pub struct GetSegmentsOptions {
    pub id: Option<SegmentUuid>,
    pub r#type: Option<String>,
    pub scope: Option<SegmentScope>,
    pub collection_id: Option<CollectionUuid>,
}
