#![forbid(unsafe_code)]

//! Error taxonomy shared by the compiler, the coordinator and the mapper.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tx::TxState;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, OgmError>;

/// Opaque failure reported by the graph driver or a transaction handle.
///
/// The endpoint reports errors as `{"code": ..., "message": ...}`; the code is
/// kept verbatim and never interpreted here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverError {
    /// Status code reported by the endpoint, when it sent one.
    #[serde(default)]
    pub code: Option<String>,
    /// Human readable message.
    pub message: String,
}

impl DriverError {
    /// Builds an error carrying only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// Builds an error with an endpoint status code.
    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{code}] {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for DriverError {}

/// Rejection returned by the schema when a payload does not validate.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    /// Offending property, if the schema pinned the failure to one.
    pub field: Option<String>,
    /// Human readable reason.
    pub message: String,
}

impl ValidationError {
    /// Builds a payload-level validation error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }

    /// Builds a validation error attached to a single property.
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let field = field.into();
        let message = format!("{field}: {}", message.into());
        Self {
            field: Some(field),
            message,
        }
    }
}

/// Errors surfaced by every mapper operation.
#[derive(Debug, Error)]
pub enum OgmError {
    /// Required request fields are missing or malformed. Detected before any I/O.
    #[error("invalid options: {0}")]
    InvalidOptions(String),
    /// The schema rejected the payload.
    #[error("validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
    /// The driver response did not have the expected envelope or columns.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// Failure surfaced by the driver or the ambient transaction.
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),
    /// The ambient transaction already committed or rolled back.
    #[error("transaction is {0}, expected open")]
    InvalidTransactionState(TxState),
    /// The operation failed and rolling back the ambient transaction failed too.
    #[error("{cause} (rollback also failed: {rollback})")]
    RollbackFailed {
        /// Error that triggered the rollback.
        cause: Box<OgmError>,
        /// Error reported by the rollback itself.
        rollback: DriverError,
    },
}

impl OgmError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        OgmError::InvalidOptions(msg.into())
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        OgmError::MalformedResponse(msg.into())
    }

    /// Returns the error that started the failure, unwrapping rollback failures.
    pub fn primary(&self) -> &OgmError {
        match self {
            OgmError::RollbackFailed { cause, .. } => cause.primary(),
            other => other,
        }
    }

    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            OgmError::InvalidOptions(_) => "InvalidOptions",
            OgmError::ValidationFailed(_) => "ValidationFailed",
            OgmError::MalformedResponse(_) => "MalformedResponse",
            OgmError::Driver(_) => "DriverError",
            OgmError::InvalidTransactionState(_) => "InvalidTransactionState",
            OgmError::RollbackFailed { .. } => "RollbackFailed",
        }
    }
}
