//! Concurrent endorsement collection.
//!
//! [`EndorsementCoordinator::send_proposal`] signs a proposal once and sends
//! it to every target at the same time. It waits for all of them: a slow or
//! broken peer costs at most one proposal timeout and never prevents the
//! others' answers from being collected. Output position `i` always holds
//! the outcome for target `i`.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};

use super::proposal::{Header, ProposalRequest, SignedProposal};
use super::response::ProposalResponse;
use crate::error::{ClientError, Result};
use crate::identity::IdentityContext;
use crate::transport::PeerProposalTransport;

/// The outcome of one fan-out: responses aligned with the targets, plus the
/// signed proposal and its header, which the submitter needs to build the
/// envelope.
#[derive(Debug, Clone)]
pub struct EndorsementResults {
    pub responses: Vec<ProposalResponse>,
    pub proposal: SignedProposal,
    pub header: Header,
}

impl EndorsementResults {
    pub fn is_valid(&self) -> bool {
        validate(&self.responses)
    }
}

/// Sends proposals to endorsers on behalf of one identity.
pub struct EndorsementCoordinator {
    identity: IdentityContext,
    transport: Arc<dyn PeerProposalTransport>,
    timeout: Duration,
}

impl EndorsementCoordinator {
    pub fn new(
        identity: IdentityContext,
        transport: Arc<dyn PeerProposalTransport>,
        timeout: Duration,
    ) -> Self {
        Self {
            identity,
            transport,
            timeout,
        }
    }

    /// Signs `request` and collects one response per target.
    ///
    /// Only signing can fail. Per-target problems (unreachable peer,
    /// timeout, peer-side error) are recorded as
    /// [`ProposalResponse::Failed`] entries.
    pub async fn send_proposal(&self, request: &ProposalRequest) -> Result<EndorsementResults> {
        if request.targets().is_empty() {
            return Err(ClientError::InvalidTargets(
                "proposal has no target peers".into(),
            ));
        }

        let signed = request.sign(&self.identity)?;
        let tx_id = request.tx_id();

        let calls = request.targets().iter().map(|peer| {
            let transport = Arc::clone(&self.transport);
            let signed = &signed;
            async move {
                debug!(tx_id = %tx_id, peer = %peer, "sending proposal");
                match tokio::time::timeout(self.timeout, transport.process_proposal(peer, signed))
                    .await
                {
                    Ok(Ok(response)) => {
                        debug!(tx_id = %tx_id, peer = %peer, status = response.status, "proposal answered");
                        ProposalResponse::Endorsed(response)
                    }
                    Ok(Err(e)) => {
                        warn!(tx_id = %tx_id, peer = %peer, error = %e.message, "proposal failed");
                        ProposalResponse::Failed {
                            peer: peer.name.clone(),
                            error: e.into(),
                        }
                    }
                    Err(_) => {
                        warn!(tx_id = %tx_id, peer = %peer, timeout_ms = self.timeout.as_millis() as u64, "proposal timed out");
                        ProposalResponse::Failed {
                            peer: peer.name.clone(),
                            error: ClientError::TransportError {
                                peer: peer.name.clone(),
                                message: format!(
                                    "no response within {}ms",
                                    self.timeout.as_millis()
                                ),
                            },
                        }
                    }
                }
            }
        });

        let responses = join_all(calls).await;

        Ok(EndorsementResults {
            responses,
            proposal: signed,
            header: request.header(),
        })
    }
}

/// True iff the batch is non-empty and every entry is an endorsement with
/// status 200.
///
/// Payloads are not compared; see [`responses_agree`].
pub fn validate(responses: &[ProposalResponse]) -> bool {
    !responses.is_empty() && responses.iter().all(ProposalResponse::is_success)
}

/// True iff every successful endorsement carries byte-identical payloads.
/// Vacuously true when fewer than two succeeded.
pub fn responses_agree(responses: &[ProposalResponse]) -> bool {
    let mut payloads = responses
        .iter()
        .filter_map(ProposalResponse::as_endorsed)
        .filter(|r| r.is_success())
        .map(|r| r.payload.as_slice());
    match payloads.next() {
        Some(first) => payloads.all(|p| p == first),
        None => true,
    }
}

/// Message of the first unsuccessful entry, verbatim.
pub fn first_failure(responses: &[ProposalResponse]) -> Option<String> {
    responses.iter().find_map(ProposalResponse::failure_message)
}
