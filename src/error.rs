//! Error types for provcache.
//!
//! All errors are represented by the `CacheError` enum, which provides
//! specific variants for the different failure categories of the caching core
//! and its storage collaborator.

use std::{io::ErrorKind, string::FromUtf8Error};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all provcache operations.
#[derive(Deserialize, Serialize, Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    /// A value cannot be normalized or persisted (NaN/Inf, invalid key).
    #[error("{0}")]
    Validation(String),

    /// Caching configuration is invalid or ambiguous.
    #[error("{0}")]
    Configuration(String),

    /// Invalid argument: malformed identifier pattern, illegal cache source.
    #[error("{0}")]
    Value(String),

    /// Failure while assembling or digesting the objects to hash.
    #[error("{0}")]
    Hashing(String),

    /// Attempt to mutate something that is immutable in its current state.
    #[error("{0}")]
    ModificationNotAllowed(String),

    /// Operation is not allowed in the current state of the node.
    #[error("{0}")]
    InvalidOperation(String),

    /// Requested entity does not exist.
    #[error("{0}")]
    NotExistent(String),

    /// Storage operation errors.
    #[error("{0}")]
    Store(String),

    /// Data conversion errors (JSON, TOML).
    #[error("{0}")]
    Convert(String),

    /// I/O operation errors.
    #[error("{0}")]
    IoError(String),
}

impl From<CacheError> for String {
    fn from(val: CacheError) -> Self {
        val.to_string()
    }
}

impl From<std::io::Error> for CacheError {
    fn from(error: std::io::Error) -> Self {
        CacheError::IoError(error.to_string())
    }
}

impl From<CacheError> for std::io::Error {
    fn from(val: CacheError) -> Self {
        #[allow(clippy::io_other_error)]
        std::io::Error::new(ErrorKind::Other, val.to_string())
    }
}

impl From<FromUtf8Error> for CacheError {
    fn from(_: FromUtf8Error) -> Self {
        CacheError::Convert("Error with utf-8 string convert".to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(error: serde_json::Error) -> Self {
        CacheError::Convert(error.to_string())
    }
}

impl From<toml::de::Error> for CacheError {
    fn from(error: toml::de::Error) -> Self {
        CacheError::Configuration(error.to_string())
    }
}
