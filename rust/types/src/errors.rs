//! Backend-agnostic error types for the catalog and the log.
//!
//! Backends (in-memory, relational) convert their internal errors into
//! these types so that the API layer only ever has to map one error kind
//! per surface, regardless of which storage backend is configured.

use chroma_error::{ChromaError, ErrorCodes};
use thiserror::Error;

/// Errors returned by the Catalog Store / MetaTable / Coordinator.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ChromaError for CatalogError {
    fn code(&self) -> ErrorCodes {
        match self {
            CatalogError::NotFound(_) => ErrorCodes::NotFound,
            CatalogError::AlreadyExists(_) => ErrorCodes::AlreadyExists,
            CatalogError::InvalidArgument(_) => ErrorCodes::InvalidArgument,
            CatalogError::FailedPrecondition(_) => ErrorCodes::FailedPrecondition,
            CatalogError::Unavailable(_) => ErrorCodes::Unavailable,
            CatalogError::Internal(_) => ErrorCodes::Internal,
        }
    }
}

/// Errors returned by the Log Store / Log Service.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("log store unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ChromaError for LogError {
    fn code(&self) -> ErrorCodes {
        match self {
            LogError::NotFound(_) => ErrorCodes::NotFound,
            LogError::InvalidArgument(_) => ErrorCodes::InvalidArgument,
            LogError::FailedPrecondition(_) => ErrorCodes::FailedPrecondition,
            LogError::Unavailable(_) => ErrorCodes::Unavailable,
            LogError::Internal(_) => ErrorCodes::Internal,
        }
    }
}
