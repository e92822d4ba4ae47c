//! Error taxonomy for the client core.
//!
//! Every fallible public operation returns [`Result`]. The variants follow
//! the failure modes of the transaction lifecycle: identity and request
//! construction, per-peer transport, endorsement validation, ordering, and
//! event delivery.
//!
//! Two of them are rarely seen as `Err` by callers of the happy-path API:
//! per-target [`ClientError::TransportError`]s are captured inside the
//! response batch rather than propagated, and orderer rejections are
//! reported as a [`crate::transaction::SubmissionOutcome`].

use thiserror::Error;

use crate::crypto::keys::KeyError;
use crate::transport::TransportError;

/// Errors produced by the client core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The signing identity is missing or lacks signing material.
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// The proposal target list is unusable for the requested operation.
    #[error("invalid targets: {0}")]
    InvalidTargets(String),

    /// A request field is missing or malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A single peer could not be reached or refused the proposal.
    #[error("transport error from {peer}: {message}")]
    TransportError {
        /// Name of the peer the failure came from.
        peer: String,
        /// Verbatim failure message.
        message: String,
    },

    /// The endorsement batch did not pass validation; nothing was sent
    /// to the orderer.
    #[error("endorsement rejected: {reason}")]
    EndorsementRejected {
        /// First failure found in the batch, verbatim.
        reason: String,
    },

    /// No orderer is configured, or the orderer could not be reached.
    #[error("orderer unreachable: {0}")]
    OrdererUnreachable(String),

    /// The orderer (or the submission path) answered with a non-success
    /// status.
    #[error("rejected with status {code}: {message}")]
    Rejected {
        /// Status code reported.
        code: i32,
        /// Human-readable reason.
        message: String,
    },

    /// An event registration expired before a matching notification.
    #[error("timed out after {waited_ms}ms waiting for event")]
    Timeout {
        /// Configured registration timeout.
        waited_ms: u64,
    },

    /// The transaction was committed with a non-`VALID` validation code.
    #[error("transaction {tx_id} is invalid: {code}")]
    InvalidTransaction {
        /// Transaction id reported by the committer.
        tx_id: String,
        /// Validation code reported by the committer.
        code: String,
    },

    /// Encoding or decoding of an opaque message failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The key-value store failed.
    #[error("state store error: {0}")]
    Store(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<KeyError> for ClientError {
    fn from(e: KeyError) -> Self {
        Self::InvalidIdentity(e.to_string())
    }
}

impl From<TransportError> for ClientError {
    fn from(e: TransportError) -> Self {
        Self::TransportError {
            peer: e.endpoint,
            message: e.message,
        }
    }
}
