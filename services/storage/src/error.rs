//! services/storage/src/error.rs
//!
//! Defines the primary error type for the storage service.

use crate::config::ConfigError;
use mdpdf_core::{PortError, StorageError};

/// The primary error type for the `storage` service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error from session storage or archive handling.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Represents an error that propagated up from a collaborator port.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents a standard Input/Output error (e.g., creating the storage root).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}
