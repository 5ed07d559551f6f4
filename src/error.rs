//! Error taxonomy shared by the storage engine and the cluster layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ElementKind;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Every failure a caller can observe, as a distinguishable typed variant
/// with the offending uid/type/name embedded in its message.
///
/// The enum is serializable so worker responses carry the exact variant
/// across the RPC boundary and the client side rebuilds it unchanged.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum GraphError {
    /// The named type is not registered (or was removed mid-operation).
    #[error("{kind} type not found: {name}")]
    TypeNotFound {
        /// Namespace the lookup ran in.
        kind: ElementKind,
        /// The requested type name.
        name: String,
    },
    /// No record exists for the uid/type pair.
    #[error("element {element_type} with uid {uid} not found")]
    ElementNotFound {
        /// The requested element identifier.
        uid: i64,
        /// The partition or type the lookup ran against.
        element_type: String,
    },
    /// Registration collision for a kind/name pair.
    #[error("{kind} type already registered: {name}")]
    DuplicateType {
        /// Namespace the registration ran in.
        kind: ElementKind,
        /// The colliding type name.
        name: String,
    },
    /// Caller misuse: wrong handle kind, reserved attribute, malformed input.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// What the caller got wrong.
        message: String,
    },
    /// Partition not yet created or not yet stable. Drives the await-ready
    /// retry path inside the store; surfaces only once retries are exhausted.
    #[error("backend unavailable: {message}")]
    BackendUnavailable {
        /// What was unavailable.
        message: String,
    },
    /// RPC to a worker failed. Surfaced to the caller synchronously; the
    /// dispatcher never retries on its own.
    #[error("worker unreachable: {message}")]
    WorkerUnreachable {
        /// Which worker, and how the call failed.
        message: String,
    },
    /// The unstructured-attribute blob could not be encoded or decoded.
    #[error("codec error: {message}")]
    Codec {
        /// The underlying codec failure.
        message: String,
    },
    /// Client-side HTTP or serialization failure outside the graph taxonomy.
    #[error("transport error: {message}")]
    Transport {
        /// The underlying transport failure.
        message: String,
    },
}

impl GraphError {
    pub(crate) fn type_not_found(kind: ElementKind, name: impl Into<String>) -> Self {
        GraphError::TypeNotFound {
            kind,
            name: name.into(),
        }
    }

    pub(crate) fn element_not_found(uid: i64, element_type: impl Into<String>) -> Self {
        GraphError::ElementNotFound {
            uid,
            element_type: element_type.into(),
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        GraphError::InvalidArgument {
            message: message.into(),
        }
    }

    pub(crate) fn unavailable(message: impl Into<String>) -> Self {
        GraphError::BackendUnavailable {
            message: message.into(),
        }
    }

    pub(crate) fn worker_unreachable(message: impl Into<String>) -> Self {
        GraphError::WorkerUnreachable {
            message: message.into(),
        }
    }

    pub(crate) fn codec(message: impl Into<String>) -> Self {
        GraphError::Codec {
            message: message.into(),
        }
    }

    pub(crate) fn transport(message: impl Into<String>) -> Self {
        GraphError::Transport {
            message: message.into(),
        }
    }
}
