use std::collections::HashMap;

use chroma_error::{ChromaError, ErrorCodes};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single collection or segment metadata value.
///
/// Only three variants are recognized: strings, 64-bit integers and 64-bit
/// floats. There is no boolean variant: callers that need boolean flags
/// encode them as `Int(0)`/`Int(1)`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl std::fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataValue::Int(v) => write!(f, "{}", v),
            MetadataValue::Float(v) => write!(f, "{}", v),
            MetadataValue::Str(v) => write!(f, "\"{}\"", v),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetadataValueType {
    Int,
    Float,
    Str,
}

impl MetadataValue {
    pub fn value_type(&self) -> MetadataValueType {
        match self {
            MetadataValue::Int(_) => MetadataValueType::Int,
            MetadataValue::Float(_) => MetadataValueType::Float,
            MetadataValue::Str(_) => MetadataValueType::Str,
        }
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Int(v)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Float(v)
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        MetadataValue::Str(v)
    }
}

pub type Metadata = HashMap<String, MetadataValue>;

/// An update to a single metadata key: either set it to a new value, or
/// remove it entirely (the `reset_metadata` path on `UpdateCollection`).
#[derive(Clone, Debug, PartialEq)]
pub enum UpdateMetadataValue {
    Set(MetadataValue),
    Remove,
}

pub type UpdateMetadata = HashMap<String, UpdateMetadataValue>;

#[derive(Error, Debug)]
pub enum MetadataValueConversionError {
    #[error("Invalid metadata value, valid variants are: Int, Float, Str")]
    InvalidValue,
    #[error("Metadata row for key {0} has more than one value column populated")]
    AmbiguousStorageRow(String),
}

impl ChromaError for MetadataValueConversionError {
    fn code(&self) -> ErrorCodes {
        match self {
            MetadataValueConversionError::InvalidValue => ErrorCodes::InvalidArgument,
            MetadataValueConversionError::AmbiguousStorageRow(_) => ErrorCodes::Internal,
        }
    }
}
