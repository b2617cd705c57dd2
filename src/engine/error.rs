use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

/// Failure taxonomy reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    PreconditionFailed,
    InvalidArgument,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::PreconditionFailed => "precondition_failed",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::Internal => "internal",
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("room not found: {0}")]
    RoomNotFound(String),
    #[error("reservation not found: {0}")]
    ReservationNotFound(Ulid),
    #[error("room already exists: {0}")]
    RoomExists(String),
    #[error("slot taken: conflicts with reservation {0}")]
    Conflict(Ulid),
    #[error("room {0} is not available")]
    RoomUnavailable(String),
    #[error("cannot delete room {0}: has reservations")]
    HasReservations(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::RoomNotFound(_) | EngineError::ReservationNotFound(_) => {
                ErrorKind::NotFound
            }
            EngineError::RoomExists(_) | EngineError::Conflict(_) => ErrorKind::AlreadyExists,
            EngineError::RoomUnavailable(_) | EngineError::HasReservations(_) => {
                ErrorKind::PreconditionFailed
            }
            EngineError::InvalidArgument(_) | EngineError::LimitExceeded(_) => {
                ErrorKind::InvalidArgument
            }
            EngineError::Internal(_) => ErrorKind::Internal,
        }
    }
}
