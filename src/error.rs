//! Error taxonomy for registry operations and its HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;

use crate::types::{Identity, Slot};

/// Failures of the durable store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O failed on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Stored state is malformed: {0}")]
    Malformed(String),

    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Store is unavailable")]
    Unavailable,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("No slot assigned to {0}")]
    NotFound(Identity),

    #[error("Slot {slot} is already held by {holder}")]
    SlotConflict { slot: Slot, holder: Identity },

    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Queue is full ({capacity} participants)")]
    CapacityExceeded { capacity: usize },
}

impl RegistryError {
    /// Stable kind string used in error bodies and socket error codes
    pub fn kind(&self) -> &'static str {
        match self {
            RegistryError::NotFound(_) => "NotFound",
            RegistryError::SlotConflict { .. } => "SlotConflict",
            RegistryError::Persistence(_) => "PersistenceError",
            RegistryError::InvalidInput(_) => "InvalidInput",
            RegistryError::CapacityExceeded { .. } => "CapacityExceeded",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
            RegistryError::SlotConflict { .. } => StatusCode::CONFLICT,
            RegistryError::Persistence(_) => StatusCode::SERVICE_UNAVAILABLE,
            RegistryError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            RegistryError::CapacityExceeded { .. } => StatusCode::CONFLICT,
        }
    }
}

/// `{ error, reason }` body returned by the REST layer
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub reason: String,
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        if let RegistryError::Persistence(ref e) = self {
            tracing::error!(error = %e, "Registry write failed");
        }
        let body = ErrorBody {
            error: self.kind().to_string(),
            reason: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_and_status() {
        let holder = Identity::parse("bob").unwrap();
        let err = RegistryError::SlotConflict { slot: 2, holder };
        assert_eq!(err.kind(), "SlotConflict");
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert!(err.to_string().contains("held by bob"));

        let err = RegistryError::from(StoreError::Unavailable);
        assert_eq!(err.kind(), "PersistenceError");
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
