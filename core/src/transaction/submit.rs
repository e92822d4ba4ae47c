//! Transaction assembly and submission to the ordering service.
//!
//! ## Flow
//!
//! ```text
//! TransactionRequest ──check_well_formed──▶ EndorsedTransaction::assemble
//!                                              │ (validate)
//!                                              ▼
//!                         TransactionSubmitter::submit ──▶ SubmissionOutcome
//! ```
//!
//! [`EndorsedTransaction`] can only be obtained through `assemble`, so a
//! batch that failed validation cannot reach the orderer. Whatever the
//! orderer answers is reported as a [`SubmissionOutcome`]; only local
//! failures (signing, encoding) come back as `Err`.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::endorsement::{first_failure, validate, EndorsementResults};
use super::proposal::{Header, Proposal, SignedProposal};
use super::response::{Endorsement, EndorsementResponse, ProposalResponse};
use crate::config::is_broadcast_success;
use crate::crypto::keys::Signature;
use crate::error::{ClientError, Result};
use crate::events::ChaincodeEvent;
use crate::identity::{IdentityContext, TransactionId};
use crate::transport::{OrdererTransport, PeerRef};

// ---------------------------------------------------------------------------
// TransactionRequest
// ---------------------------------------------------------------------------

/// What a caller hands to `send_transaction`: the endorsement batch with
/// the proposal and header it answers.
#[derive(Debug, Clone)]
pub struct TransactionRequest {
    pub responses: Vec<ProposalResponse>,
    pub proposal: SignedProposal,
    pub header: Header,
}

impl From<EndorsementResults> for TransactionRequest {
    fn from(results: EndorsementResults) -> Self {
        Self {
            responses: results.responses,
            proposal: results.proposal,
            header: results.header,
        }
    }
}

impl TransactionRequest {
    /// Structural checks that do not look at endorsement outcomes.
    /// The error is a human-readable reason.
    pub fn check_well_formed(&self) -> std::result::Result<(), String> {
        if self.responses.is_empty() {
            return Err("transaction request has no proposal responses".into());
        }
        if self.proposal.proposal_bytes.is_empty() {
            return Err("transaction request has an empty proposal".into());
        }
        let proposal = Proposal::from_bytes(&self.proposal.proposal_bytes)
            .map_err(|e| format!("proposal cannot be decoded: {e}"))?;
        if proposal.header.tx_id() != self.header.tx_id() {
            return Err(format!(
                "proposal transaction id {} does not match header transaction id {}",
                proposal.header.tx_id(),
                self.header.tx_id()
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// EndorsedTransaction
// ---------------------------------------------------------------------------

/// A batch that passed validation, ready to be wrapped in an envelope.
#[derive(Debug, Clone)]
pub struct EndorsedTransaction {
    endorsements: Vec<EndorsementResponse>,
    proposal: SignedProposal,
    header: Header,
}

impl EndorsedTransaction {
    /// Runs [`validate`] over `responses`.
    ///
    /// # Errors
    ///
    /// [`ClientError::EndorsementRejected`] carrying the first failure of
    /// the batch verbatim.
    pub fn assemble(
        responses: Vec<ProposalResponse>,
        proposal: SignedProposal,
        header: Header,
    ) -> Result<Self> {
        if !validate(&responses) {
            let reason = first_failure(&responses)
                .unwrap_or_else(|| "no proposal responses".to_string());
            return Err(ClientError::EndorsementRejected { reason });
        }
        let endorsements = responses
            .into_iter()
            .filter_map(|r| match r {
                ProposalResponse::Endorsed(e) => Some(e),
                ProposalResponse::Failed { .. } => None,
            })
            .collect();
        Ok(Self {
            endorsements,
            proposal,
            header,
        })
    }

    pub fn tx_id(&self) -> &TransactionId {
        self.header.tx_id()
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn endorsements(&self) -> &[EndorsementResponse] {
        &self.endorsements
    }

    /// The payload that goes into the envelope.
    pub fn payload(&self) -> TransactionPayload {
        let first = self.endorsements.first();
        TransactionPayload {
            header: self.header.clone(),
            proposal_bytes: self.proposal.proposal_bytes.clone(),
            response_payload: first.map(|r| r.payload.clone()).unwrap_or_default(),
            endorsements: self
                .endorsements
                .iter()
                .filter_map(|r| r.endorsement.clone())
                .collect(),
            chaincode_event: first.and_then(|r| r.chaincode_event.clone()),
        }
    }
}

impl TryFrom<TransactionRequest> for EndorsedTransaction {
    type Error = ClientError;

    fn try_from(request: TransactionRequest) -> Result<Self> {
        Self::assemble(request.responses, request.proposal, request.header)
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Contents of an envelope, as the orderer and committers decode it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPayload {
    pub header: Header,
    pub proposal_bytes: Vec<u8>,
    pub response_payload: Vec<u8>,
    pub endorsements: Vec<Endorsement>,
    #[serde(default)]
    pub chaincode_event: Option<ChaincodeEvent>,
}

impl TransactionPayload {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Signed transaction as broadcast to the orderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEnvelope {
    pub payload: Vec<u8>,
    pub signature: Signature,
}

/// The orderer's acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastResponse {
    pub status: i32,
    #[serde(default)]
    pub info: String,
}

/// Result of handing a transaction to the ordering service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// The orderer accepted the envelope. Commit is reported separately
    /// through the event hub.
    Accepted { tx_id: TransactionId, status: i32 },
    /// No orderer configured, or it could not be reached in time.
    OrdererUnreachable { reason: String },
    /// The orderer or the submission path refused the request.
    Rejected { code: i32, message: String },
}

impl SubmissionOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// Converts non-accepted outcomes into the matching [`ClientError`].
    pub fn into_result(self) -> Result<TransactionId> {
        match self {
            Self::Accepted { tx_id, .. } => Ok(tx_id),
            Self::OrdererUnreachable { reason } => Err(ClientError::OrdererUnreachable(reason)),
            Self::Rejected { code, message } => Err(ClientError::Rejected { code, message }),
        }
    }
}

// ---------------------------------------------------------------------------
// TransactionSubmitter
// ---------------------------------------------------------------------------

/// Signs envelopes and broadcasts them. No retries.
pub struct TransactionSubmitter {
    identity: IdentityContext,
    transport: Arc<dyn OrdererTransport>,
    timeout: Duration,
}

impl TransactionSubmitter {
    pub fn new(
        identity: IdentityContext,
        transport: Arc<dyn OrdererTransport>,
        timeout: Duration,
    ) -> Self {
        Self {
            identity,
            transport,
            timeout,
        }
    }

    pub fn envelope(&self, transaction: &EndorsedTransaction) -> Result<TransactionEnvelope> {
        let payload = transaction.payload().to_bytes()?;
        let signature = self.identity.sign(&payload)?;
        Ok(TransactionEnvelope { payload, signature })
    }

    pub async fn submit(
        &self,
        orderer: &PeerRef,
        transaction: &EndorsedTransaction,
    ) -> Result<SubmissionOutcome> {
        let envelope = self.envelope(transaction)?;
        let tx_id = transaction.tx_id().clone();

        let outcome =
            match tokio::time::timeout(self.timeout, self.transport.broadcast(orderer, &envelope))
                .await
            {
                Err(_) => SubmissionOutcome::OrdererUnreachable {
                    reason: format!(
                        "{} did not answer within {}ms",
                        orderer.name,
                        self.timeout.as_millis()
                    ),
                },
                Ok(Err(e)) => SubmissionOutcome::OrdererUnreachable {
                    reason: e.to_string(),
                },
                Ok(Ok(response)) if is_broadcast_success(response.status) => {
                    SubmissionOutcome::Accepted {
                        tx_id: tx_id.clone(),
                        status: response.status,
                    }
                }
                Ok(Ok(response)) => SubmissionOutcome::Rejected {
                    code: response.status,
                    message: response.info,
                },
            };

        match &outcome {
            SubmissionOutcome::Accepted { status, .. } => {
                info!(tx_id = %tx_id, orderer = %orderer, status, "transaction accepted by orderer");
            }
            SubmissionOutcome::OrdererUnreachable { reason } => {
                warn!(tx_id = %tx_id, orderer = %orderer, reason = %reason, "orderer unreachable");
            }
            SubmissionOutcome::Rejected { code, message } => {
                warn!(tx_id = %tx_id, orderer = %orderer, code, message = %message, "transaction rejected");
            }
        }
        Ok(outcome)
    }
}
