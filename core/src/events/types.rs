//! Notifications delivered by a peer's event stream.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::VALIDATION_CODE_VALID;
use crate::identity::TransactionId;

// ---------------------------------------------------------------------------
// TxValidationCode
// ---------------------------------------------------------------------------

/// Verdict a committing peer reaches for a transaction it received in a
/// block. Only `VALID` transactions change ledger state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxValidationCode {
    Valid,
    NilEnvelope,
    BadPayload,
    BadCommonHeader,
    BadCreatorSignature,
    BadProposalTxid,
    DuplicateTxid,
    EndorsementPolicyFailure,
    MvccReadConflict,
    PhantomReadConflict,
    ExpiredChaincode,
    ChaincodeVersionConflict,
    InvalidOtherReason,
}

impl TxValidationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => VALIDATION_CODE_VALID,
            Self::NilEnvelope => "NIL_ENVELOPE",
            Self::BadPayload => "BAD_PAYLOAD",
            Self::BadCommonHeader => "BAD_COMMON_HEADER",
            Self::BadCreatorSignature => "BAD_CREATOR_SIGNATURE",
            Self::BadProposalTxid => "BAD_PROPOSAL_TXID",
            Self::DuplicateTxid => "DUPLICATE_TXID",
            Self::EndorsementPolicyFailure => "ENDORSEMENT_POLICY_FAILURE",
            Self::MvccReadConflict => "MVCC_READ_CONFLICT",
            Self::PhantomReadConflict => "PHANTOM_READ_CONFLICT",
            Self::ExpiredChaincode => "EXPIRED_CHAINCODE",
            Self::ChaincodeVersionConflict => "CHAINCODE_VERSION_CONFLICT",
            Self::InvalidOtherReason => "INVALID_OTHER_REASON",
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

impl fmt::Display for TxValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// A transaction reached a block and was validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxCommit {
    pub tx_id: TransactionId,
    pub validation_code: TxValidationCode,
    /// Height of the block the transaction was committed in.
    pub block_number: u64,
}

/// An event set by chaincode during simulation, emitted once the
/// transaction commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChaincodeEvent {
    pub chaincode_id: String,
    pub tx_id: TransactionId,
    pub event_name: String,
    #[serde(default)]
    pub payload: Vec<u8>,
}

/// One item of a peer's event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventNotification {
    TxCommit(TxCommit),
    Chaincode(ChaincodeEvent),
}
