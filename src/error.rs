use std::{array::TryFromSliceError, fmt::Display, string::FromUtf8Error, sync::PoisonError};

use bincode::ErrorKind;
use serde::{de, ser};

/// Custom Result type for hospital-db operations
pub type Result<T> = std::result::Result<T, Error>;

/// Kinds of records an identifier can refer to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Department,
    Doctor,
    Patient,
    Appointment,
}

impl Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Entity::Department => "department",
            Entity::Doctor => "doctor",
            Entity::Patient => "patient",
            Entity::Appointment => "appointment",
        };
        f.write_str(name)
    }
}

/// Error types for hospital-db
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// A referenced record does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: i64 },
    /// The appointment is not owned by the given doctor
    #[error("appointment {appointment} is not linked to doctor {doctor}")]
    LinkMismatch { appointment: i64, doctor: i64 },
    /// MVCC write conflict, the transaction may be retried
    #[error("transaction conflict, retry the transaction")]
    TransactionConflict,
    /// Malformed input (identifiers, dates, time slots, names)
    #[error("invalid input: {0}")]
    Validation(String),
    /// Storage, serialization or other internal failure
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(entity: Entity, id: i64) -> Self {
        Error::NotFound { entity, id }
    }

    /// Whether retrying the whole transaction may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::TransactionConflict)
    }
}

impl From<chrono::ParseError> for Error {
    fn from(value: chrono::ParseError) -> Self {
        Error::Validation(value.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Internal(value.to_string())
    }
}

impl<T> From<PoisonError<T>> for Error {
    fn from(value: PoisonError<T>) -> Self {
        Error::Internal(value.to_string())
    }
}

impl From<Box<ErrorKind>> for Error {
    fn from(value: Box<ErrorKind>) -> Self {
        Error::Internal(value.to_string())
    }
}

impl From<TryFromSliceError> for Error {
    fn from(value: TryFromSliceError) -> Self {
        Error::Internal(value.to_string())
    }
}

impl From<FromUtf8Error> for Error {
    fn from(value: FromUtf8Error) -> Self {
        Error::Internal(value.to_string())
    }
}

impl ser::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error::Internal(msg.to_string())
    }
}

impl de::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error::Internal(msg.to_string())
    }
}
