//! # Transaction Module
//!
//! The client side of the transaction lifecycle: build a proposal, collect
//! endorsements from several peers, validate the batch, and hand it to the
//! ordering service.
//!
//! ## Architecture
//!
//! ```text
//! types.rs       — ProposalKind and its per-kind rules
//! proposal.rs    — ProposalBuilder, ProposalRequest, headers, SignedProposal
//! response.rs    — EndorsementResponse and the per-target ProposalResponse
//! endorsement.rs — EndorsementCoordinator fan-out, validate / responses_agree
//! submit.rs      — EndorsedTransaction, envelopes, TransactionSubmitter
//! ```
//!
//! ## Transaction Lifecycle
//!
//! 1. **Build** — [`ProposalBuilder`] derives the transaction id from a fresh
//!    nonce and the submitting identity.
//! 2. **Endorse** — [`EndorsementCoordinator::send_proposal`] signs once and
//!    queries every target concurrently.
//! 3. **Validate** — [`EndorsedTransaction::assemble`] refuses any batch with
//!    a failed or non-200 entry.
//! 4. **Submit** — [`TransactionSubmitter::submit`] signs the envelope and
//!    broadcasts it. The orderer's verdict comes back as a
//!    [`SubmissionOutcome`].
//! 5. **Commit** — observed asynchronously through [`crate::events::EventHub`].
//!
//! ## Design Decisions
//!
//! - Messages are serde structures encoded as JSON. Signatures always cover
//!   the exact bytes that travel, never a re-encoding.
//! - Validation only checks statuses. Payload agreement across endorsers is
//!   available as [`responses_agree`] for callers who want it.
//! - No retries at any stage.

pub mod endorsement;
pub mod proposal;
pub mod response;
pub mod submit;
pub mod types;

pub use endorsement::{
    first_failure, responses_agree, validate, EndorsementCoordinator, EndorsementResults,
};
pub use proposal::{
    ChaincodeInvocation, ChannelHeader, Header, Proposal, ProposalBuilder, ProposalRequest,
    SignatureHeader, SignedProposal,
};
pub use response::{Endorsement, EndorsementResponse, ProposalResponse};
pub use submit::{
    BroadcastResponse, EndorsedTransaction, SubmissionOutcome, TransactionEnvelope,
    TransactionPayload, TransactionRequest, TransactionSubmitter,
};
pub use types::ProposalKind;
