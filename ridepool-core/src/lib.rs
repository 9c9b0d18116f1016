pub mod alert;
pub mod booking;
pub mod clock;
pub mod command;
pub mod events;
pub mod identity;
pub mod keys;
pub mod memory;
pub mod notify;
pub mod profile;
pub mod push;
pub mod repository;
pub mod review;
pub mod rule;
pub mod trip;

pub use alert::RouteAlert;
pub use booking::{Booking, Receipt};
pub use clock::{Clock, FixedClock, SystemClock};
pub use events::EventPublisher;
pub use identity::{Caller, Role};
pub use profile::UserProfile;
pub use review::{RatingAggregate, Review};
pub use rule::Rule;
pub use trip::{DriverSnapshot, Trip};

/// Failure taxonomy shared by every operation. The kebab-case `code()` is what
/// callers see on the wire.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    FailedPrecondition(String),
    #[error("{0}")]
    PermissionDenied(String),
    #[error("{0}")]
    AlreadyExists(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Internal service error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Unauthenticated(_) => "unauthenticated",
            CoreError::InvalidArgument(_) => "invalid-argument",
            CoreError::NotFound(_) => "not-found",
            CoreError::FailedPrecondition(_) => "failed-precondition",
            CoreError::PermissionDenied(_) => "permission-denied",
            CoreError::AlreadyExists(_) => "already-exists",
            CoreError::Storage(_) => "internal",
            CoreError::Internal(_) => "internal",
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        CoreError::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        CoreError::NotFound(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        CoreError::FailedPrecondition(msg.into())
    }

    pub fn denied(msg: impl Into<String>) -> Self {
        CoreError::PermissionDenied(msg.into())
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        CoreError::Storage(err.to_string())
    }

    /// Business-rule failures a caller can act on, as opposed to infrastructure faults.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, CoreError::Storage(_) | CoreError::Internal(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
