pub mod booking;
pub mod broker;
pub mod catalog;
pub mod identity;
pub mod memory;
pub mod reconciler;
pub mod repository;
pub mod reservation;
pub mod ticket;

/// Failure taxonomy shared by every component of the reservation saga.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Expired: {0}")]
    Expired(String),
    /// Losing a seat race. Expected, not exceptional.
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("Store error: {0}")]
    StoreError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
