use crate::ids::{CollectionUuid, SegmentUuid};
use crate::metadata::Metadata;
use chroma_error::{ChromaError, ErrorCodes};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which physical shard of a collection's materialized state a segment
/// represents. Scopes are exclusive per collection only when the catalog's
/// validation policy says so (see `SegmentScopeValidator`); the type itself
/// carries no such guarantee.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SegmentScope {
    Vector,
    Metadata,
    Record,
}

impl std::fmt::Display for SegmentScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SegmentScope::Vector => write!(f, "VECTOR"),
            SegmentScope::Metadata => write!(f, "METADATA"),
            SegmentScope::Record => write!(f, "RECORD"),
        }
    }
}

impl std::str::FromStr for SegmentScope {
    type Err = SegmentConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VECTOR" => Ok(SegmentScope::Vector),
            "METADATA" => Ok(SegmentScope::Metadata),
            "RECORD" => Ok(SegmentScope::Record),
            _ => Err(SegmentConversionError::InvalidScope),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    pub id: SegmentUuid,
    pub r#type: String,
    pub scope: SegmentScope,
    pub collection: CollectionUuid,
    pub metadata: Option<Metadata>,
}

#[derive(Error, Debug)]
pub enum SegmentConversionError {
    #[error("Invalid segment id")]
    InvalidUuid,
    #[error("Invalid segment scope")]
    InvalidScope,
}

impl ChromaError for SegmentConversionError {
    fn code(&self) -> ErrorCodes {
        ErrorCodes::InvalidArgument
    }
}
