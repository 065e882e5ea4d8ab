//! Error types for relay remote invocation.
//!
//! The variants fall into four families:
//! - **usage** errors (missing arguments, double transaction inflow, calling a
//!   capability on the wrong component kind) fail the call immediately;
//! - **state conflicts** (already stateful, not stateful) are not retried
//!   because retrying cannot change the outcome;
//! - **remote/business** failures are whatever the invoked operation raised,
//!   reshaped by the client to fit the called method's declared faults;
//! - **transaction inflow** failures abandon the invocation.

use crate::fault::{Fault, FaultKind};
use crate::identifier::SessionId;
use std::time::Duration;
use thiserror::Error;

/// Main error type for relay operations.
#[derive(Debug, Error)]
pub enum RelayError {
    // Usage errors
    #[error("Required argument missing: {name}")]
    MissingArgument { name: &'static str },

    #[error("Transaction was already inflowed for this request")]
    TransactionAlreadyInflowed,

    #[error("Cannot invoke {operation} on {target}")]
    WrongComponentKind { operation: String, target: String },

    // State conflicts
    #[error("Component is already stateful with session {existing}")]
    AlreadyStateful { existing: SessionId },

    #[error("Invocation already converted to session {committed}, cannot convert to {requested}")]
    SessionConflict {
        committed: SessionId,
        requested: SessionId,
    },

    #[error("Component {identifier} is not stateful")]
    NotStateful { identifier: String },

    #[error("Session {session} is not active on {identifier}")]
    SessionNotActive {
        identifier: String,
        session: SessionId,
    },

    // Remote and business failures
    #[error("{0}")]
    Application(Fault),

    #[error("{0}")]
    Unchecked(Fault),

    #[error("Remote invocation failed: {message}")]
    Remote {
        message: String,
        #[source]
        cause: Box<RelayError>,
    },

    #[error("Business invocation failed: {cause}")]
    Business {
        #[source]
        cause: Box<RelayError>,
    },

    #[error("No such component: {identifier}")]
    NoSuchComponent { identifier: String },

    #[error("No such method {method} on {identifier}")]
    NoSuchMethod { identifier: String, method: String },

    #[error("Invocation cancelled")]
    Cancelled,

    #[error("Invocation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {message}")]
    Transport { message: String },

    // Transaction inflow
    #[error("Transaction inflow failed: {message}")]
    TransactionInflow { message: String },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl RelayError {
    /// Raise an application fault of the given kind.
    pub fn fault(kind: FaultKind, message: impl Into<String>) -> Self {
        let fault = Fault::new(kind, message);
        if fault.kind().is_checked() {
            RelayError::Application(fault)
        } else {
            RelayError::Unchecked(fault)
        }
    }

    /// Whether this failure passes through method-signature translation untouched.
    ///
    /// Usage errors, state conflicts and runtime faults never need to match a
    /// declared fault list; everything else is a checked failure.
    pub fn is_unchecked(&self) -> bool {
        !matches!(
            self,
            RelayError::Application(_)
                | RelayError::Remote { .. }
                | RelayError::Transport { .. }
                | RelayError::TransactionInflow { .. }
                | RelayError::Json { .. }
        )
    }

    /// The fault kind of a checked failure, or `None` for unchecked ones.
    pub fn fault_kind(&self) -> Option<FaultKind> {
        match self {
            RelayError::Application(fault) => Some(fault.kind().clone()),
            RelayError::Remote { .. } => Some(FaultKind::remote()),
            RelayError::Transport { .. } | RelayError::Json { .. } => Some(FaultKind::io()),
            RelayError::TransactionInflow { .. } => Some(FaultKind::system()),
            _ => None,
        }
    }

    /// Wrap this failure as a remote failure.
    pub fn into_remote(self) -> Self {
        RelayError::Remote {
            message: "Error".to_string(),
            cause: Box::new(self),
        }
    }

    /// Wrap this failure as a generic business failure.
    pub fn into_business(self) -> Self {
        RelayError::Business {
            cause: Box::new(self),
        }
    }

    /// Check if this is a state-conflict error.
    pub fn is_state_conflict(&self) -> bool {
        matches!(
            self,
            RelayError::AlreadyStateful { .. }
                | RelayError::SessionConflict { .. }
                | RelayError::NotStateful { .. }
        )
    }
}
