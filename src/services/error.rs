//! Caller-facing error taxonomy for the inventory and order services.
//!
//! Each variant maps to a stable string code and an HTTP-class status so any
//! front-end can surface it without inspecting messages.

use http::StatusCode;

use crate::bus::BusError;
use crate::domain::ValidationError;
use crate::storage::StorageError;

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Errors returned by service operations.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Bad caller input. Never reaches the broker or the store.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// Duplicate identifier.
    #[error("{0}")]
    Conflict(String),

    /// Business-rule rejection. Carries the responder's message verbatim.
    #[error("{0}")]
    InsufficientStock(String),

    /// Broker or peer service unreachable, or a request timed out.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "VALIDATION_ERROR",
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::Conflict(_) => "CONFLICT",
            ServiceError::InsufficientStock(_) => "INSUFFICIENT_STOCK",
            ServiceError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            ServiceError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Status a front-end should answer with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) | ServiceError::InsufficientStock(_) => StatusCode::CONFLICT,
            ServiceError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound(_))
    }

    pub fn is_insufficient_stock(&self) -> bool {
        matches!(self, ServiceError::InsufficientStock(_))
    }
}

impl From<ValidationError> for ServiceError {
    fn from(error: ValidationError) -> Self {
        ServiceError::Validation(error.0)
    }
}

impl From<StorageError> for ServiceError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::NotFound { .. } => ServiceError::NotFound(error.to_string()),
            StorageError::Conflict { .. } => ServiceError::Conflict(error.to_string()),
            StorageError::Backend(msg) => ServiceError::Internal(msg),
        }
    }
}

impl From<BusError> for ServiceError {
    fn from(error: BusError) -> Self {
        if error.is_unavailable() {
            ServiceError::UpstreamUnavailable(error.to_string())
        } else {
            ServiceError::Internal(error.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_codes_and_statuses() {
        let cases = [
            (
                ServiceError::Validation("x".into()),
                "VALIDATION_ERROR",
                StatusCode::BAD_REQUEST,
            ),
            (
                ServiceError::NotFound("x".into()),
                "NOT_FOUND",
                StatusCode::NOT_FOUND,
            ),
            (
                ServiceError::Conflict("x".into()),
                "CONFLICT",
                StatusCode::CONFLICT,
            ),
            (
                ServiceError::InsufficientStock("x".into()),
                "INSUFFICIENT_STOCK",
                StatusCode::CONFLICT,
            ),
            (
                ServiceError::UpstreamUnavailable("x".into()),
                "UPSTREAM_UNAVAILABLE",
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ServiceError::Internal("x".into()),
                "INTERNAL_ERROR",
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, code, status) in cases {
            assert_eq!(error.code(), code);
            assert_eq!(error.status_code(), status);
        }
    }

    #[test]
    fn test_insufficient_stock_message_is_verbatim() {
        let error = ServiceError::InsufficientStock("Only 1 left".to_string());
        assert_eq!(error.to_string(), "Only 1 left");
    }

    #[test]
    fn test_from_storage_error() {
        let not_found: ServiceError = StorageError::NotFound {
            entity: "Order",
            key: "abc".to_string(),
        }
        .into();
        assert!(not_found.is_not_found());

        let conflict: ServiceError = StorageError::Conflict {
            entity: "Inventory item",
            key: "PROD-1".to_string(),
        }
        .into();
        assert_eq!(conflict.code(), "CONFLICT");

        let backend: ServiceError = StorageError::Backend("disk".to_string()).into();
        assert_eq!(backend.code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_from_bus_error() {
        let timed_out: ServiceError = BusError::TimedOut {
            routing_key: "inventory.stock.check".to_string(),
            timeout: Duration::from_secs(1),
        }
        .into();
        assert_eq!(timed_out.code(), "UPSTREAM_UNAVAILABLE");

        let not_connected: ServiceError = BusError::NotConnected.into();
        assert_eq!(not_connected.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let codec: ServiceError = BusError::Handler("bad".to_string()).into();
        assert_eq!(codec.code(), "INTERNAL_ERROR");
    }
}
