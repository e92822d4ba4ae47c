//! What endorsers send back.

use serde::{Deserialize, Serialize};

use crate::config::STATUS_SUCCESS;
use crate::crypto::keys::Signature;
use crate::error::ClientError;
use crate::events::ChaincodeEvent;
use crate::identity::{SerializedIdentity, TransactionId};

/// An endorser's signature over the simulation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endorsement {
    pub endorser: SerializedIdentity,
    pub signature: Signature,
}

impl Endorsement {
    /// Bytes an endorser signs: the transaction id followed by the
    /// simulation payload.
    pub fn signed_bytes(tx_id: &TransactionId, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(tx_id.as_str().len() + payload.len());
        buf.extend_from_slice(tx_id.as_str().as_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    pub fn verify(&self, tx_id: &TransactionId, payload: &[u8]) -> bool {
        self.endorser
            .verify(&Self::signed_bytes(tx_id, payload), &self.signature)
    }
}

/// A peer's answer to a proposal it was able to process.
///
/// A status other than 200 means the chaincode itself failed; in that case
/// the endorsement is usually absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndorsementResponse {
    pub peer: String,
    pub status: i32,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub payload: Vec<u8>,
    #[serde(default)]
    pub endorsement: Option<Endorsement>,
    /// Event the chaincode set during simulation, emitted on commit.
    #[serde(default)]
    pub chaincode_event: Option<ChaincodeEvent>,
}

impl EndorsementResponse {
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}

/// One entry of an endorsement batch, positionally aligned with the
/// proposal's targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposalResponse {
    Endorsed(EndorsementResponse),
    Failed { peer: String, error: ClientError },
}

impl ProposalResponse {
    pub fn peer(&self) -> &str {
        match self {
            Self::Endorsed(r) => &r.peer,
            Self::Failed { peer, .. } => peer,
        }
    }

    /// True for an endorsement with status 200.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Endorsed(r) if r.is_success())
    }

    pub fn status(&self) -> Option<i32> {
        match self {
            Self::Endorsed(r) => Some(r.status),
            Self::Failed { .. } => None,
        }
    }

    pub fn as_endorsed(&self) -> Option<&EndorsementResponse> {
        match self {
            Self::Endorsed(r) => Some(r),
            Self::Failed { .. } => None,
        }
    }

    /// The failure message as the peer reported it, or `None` on success.
    pub fn failure_message(&self) -> Option<String> {
        match self {
            Self::Endorsed(r) if r.is_success() => None,
            Self::Endorsed(r) => Some(format!(
                "{} returned status {}: {}",
                r.peer, r.status, r.message
            )),
            Self::Failed {
                error: ClientError::TransportError { message, .. },
                ..
            } => Some(message.clone()),
            Self::Failed { error, .. } => Some(error.to_string()),
        }
    }
}
