//! # Channel
//!
//! The caller-facing surface of the transaction lifecycle. A [`Channel`]
//! knows its peers and orderers and runs proposals and submissions as the
//! client's current user.
//!
//! ## `send_transaction` checks, in order
//!
//! 1. No orderer configured → [`SubmissionOutcome::OrdererUnreachable`].
//! 2. No request → [`SubmissionOutcome::Rejected`] with status 400.
//! 3. Malformed request → `Rejected` with status 400.
//! 4. Endorsements fail validation → `Rejected` carrying the first
//!    failure verbatim (unknown chaincode, upgrade version mismatch, ...).
//! 5. Broadcast to the first orderer. No retry, no fallback.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::config::{STATUS_BAD_REQUEST, STATUS_INTERNAL_ERROR};
use crate::error::{ClientError, Result};
use crate::transaction::{
    EndorsedTransaction, EndorsementCoordinator, EndorsementResults, ProposalBuilder,
    ProposalKind, ProposalRequest, ProposalResponse, SubmissionOutcome, TransactionRequest,
    TransactionSubmitter,
};
use crate::transport::PeerRef;

/// Channel configuration as read from the orderer's latest config block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub channel_id: String,
    /// Number of the block the configuration was read from.
    pub sequence: u64,
    /// MSP ids of the member organizations.
    pub msp_ids: Vec<String>,
}

pub struct Channel {
    name: String,
    client: Client,
    peers: RwLock<Vec<PeerRef>>,
    orderers: RwLock<Vec<PeerRef>>,
    config: RwLock<Option<ChannelConfig>>,
}

impl Channel {
    pub(crate) fn new(name: String, client: Client) -> Self {
        Self {
            name,
            client,
            peers: RwLock::new(Vec::new()),
            orderers: RwLock::new(Vec::new()),
            config: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds an endorsing peer. A peer with the same name replaces the old
    /// entry.
    pub fn add_peer(&self, peer: PeerRef) {
        upsert(&mut self.peers.write(), peer);
    }

    /// Adds an orderer. Submissions go to the first one added.
    pub fn add_orderer(&self, orderer: PeerRef) {
        upsert(&mut self.orderers.write(), orderer);
    }

    pub fn peers(&self) -> Vec<PeerRef> {
        self.peers.read().clone()
    }

    pub fn orderers(&self) -> Vec<PeerRef> {
        self.orderers.read().clone()
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    /// Loads the channel configuration from the first orderer.
    ///
    /// # Errors
    ///
    /// - [`ClientError::OrdererUnreachable`] when no orderer is configured,
    ///   or it fails or does not answer in time.
    /// - [`ClientError::InvalidRequest`] when the orderer answers for
    ///   another channel.
    pub async fn initialize(&self) -> Result<ChannelConfig> {
        let orderer = self.orderers.read().first().cloned().ok_or_else(|| {
            ClientError::OrdererUnreachable(format!(
                "no orderer configured on channel '{}'",
                self.name
            ))
        })?;
        let inner = self.client.inner();
        let timeout = inner.config.orderer_timeout();
        let config = match tokio::time::timeout(
            timeout,
            inner.orderer_transport.channel_config(&orderer, &self.name),
        )
        .await
        {
            Err(_) => {
                return Err(ClientError::OrdererUnreachable(format!(
                    "{} did not answer within {}ms",
                    orderer.name,
                    timeout.as_millis()
                )))
            }
            Ok(Err(e)) => return Err(ClientError::OrdererUnreachable(e.to_string())),
            Ok(Ok(config)) => config,
        };
        if config.channel_id != self.name {
            return Err(ClientError::InvalidRequest(format!(
                "orderer returned configuration for channel '{}', not '{}'",
                config.channel_id, self.name
            )));
        }

        info!(channel = %self.name, orderer = %orderer, orgs = config.msp_ids.len(), "channel initialized");
        *self.config.write() = Some(config.clone());
        Ok(config)
    }

    pub fn is_initialized(&self) -> bool {
        self.config.read().is_some()
    }

    /// MSP ids of the channel's organizations. Empty until
    /// [`initialize`](Self::initialize) succeeds.
    pub fn organization_units(&self) -> Vec<String> {
        self.config
            .read()
            .as_ref()
            .map(|c| c.msp_ids.clone())
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Proposals
    // -----------------------------------------------------------------------

    /// Builds an invoke request for the currently committed version of
    /// `chaincode_id`. Empty `targets` means every peer of the channel.
    pub fn create_request<I, S>(
        &self,
        chaincode_id: &str,
        targets: Vec<PeerRef>,
        function: &str,
        args: I,
    ) -> Result<ProposalRequest>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.build_request(
            ProposalBuilder::new(ProposalKind::Invoke)
                .chaincode(chaincode_id)
                .targets(targets)
                .function(function)
                .args(args),
        )
    }

    /// Builds `builder` as the current user, defaulting the channel to this
    /// one and the targets to this channel's peers.
    pub fn build_request(&self, builder: ProposalBuilder) -> Result<ProposalRequest> {
        let identity = self.client.identity_context()?;
        builder.with_defaults(&self.name, self.peers()).build(&identity)
    }

    /// Sends `request` to its targets and collects the endorsements.
    ///
    /// # Errors
    ///
    /// - [`ClientError::InvalidRequest`] when the request belongs to another
    ///   channel.
    /// - [`ClientError::InvalidTargets`] when it has no targets.
    /// - [`ClientError::InvalidIdentity`] when no user is set.
    pub async fn send_proposal(&self, request: &ProposalRequest) -> Result<EndorsementResults> {
        if request.channel_id() != self.name {
            return Err(ClientError::InvalidRequest(format!(
                "request is for channel '{}', not '{}'",
                request.channel_id(),
                self.name
            )));
        }
        let identity = self.client.identity_context()?;
        let inner = self.client.inner();
        let coordinator = EndorsementCoordinator::new(
            identity,
            inner.peer_transport.clone(),
            inner.config.proposal_timeout(),
        );
        info!(
            channel = %self.name,
            tx_id = %request.tx_id(),
            kind = %request.kind(),
            chaincode = %request.chaincode_id(),
            targets = request.targets().len(),
            "sending proposal"
        );
        coordinator.send_proposal(request).await
    }

    /// [`send_proposal`](Self::send_proposal) for upgrade requests only.
    /// Peer-side failures (unknown chaincode, version already running,
    /// package not installed) come back as failed entries in the results.
    pub async fn send_upgrade_proposal(
        &self,
        request: &ProposalRequest,
    ) -> Result<EndorsementResults> {
        if request.kind() != ProposalKind::Upgrade {
            return Err(ClientError::InvalidRequest(format!(
                "expected an upgrade proposal, got {}",
                request.kind()
            )));
        }
        self.send_proposal(request).await
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /// Submits an endorsed transaction to the ordering service.
    pub async fn send_transaction(
        &self,
        request: Option<TransactionRequest>,
    ) -> Result<SubmissionOutcome> {
        let Some(orderer) = self.orderers.read().first().cloned() else {
            return Ok(SubmissionOutcome::OrdererUnreachable {
                reason: format!("no orderer configured on channel '{}'", self.name),
            });
        };
        let Some(request) = request else {
            return Ok(SubmissionOutcome::Rejected {
                code: STATUS_BAD_REQUEST,
                message: "missing transaction request".into(),
            });
        };
        if let Err(message) = request.check_well_formed() {
            debug!(channel = %self.name, reason = %message, "malformed transaction request");
            return Ok(SubmissionOutcome::Rejected {
                code: STATUS_BAD_REQUEST,
                message,
            });
        }

        let code = rejection_status(&request.responses);
        let transaction = match EndorsedTransaction::try_from(request) {
            Ok(transaction) => transaction,
            Err(ClientError::EndorsementRejected { reason }) => {
                warn!(channel = %self.name, code, reason = %reason, "endorsements rejected, not submitting");
                return Ok(SubmissionOutcome::Rejected {
                    code,
                    message: reason,
                });
            }
            Err(e) => return Err(e),
        };
        let identity = self.client.identity_context()?;
        let inner = self.client.inner();
        let submitter = TransactionSubmitter::new(
            identity,
            inner.orderer_transport.clone(),
            inner.config.orderer_timeout(),
        );
        submitter.submit(&orderer, &transaction).await
    }
}

/// Status of the first unsuccessful response. Peers that could not endorse
/// at all count as 500.
fn rejection_status(responses: &[ProposalResponse]) -> i32 {
    responses
        .iter()
        .find(|r| !r.is_success())
        .and_then(ProposalResponse::status)
        .unwrap_or(STATUS_INTERNAL_ERROR)
}

fn upsert(list: &mut Vec<PeerRef>, peer: PeerRef) {
    match list.iter_mut().find(|p| p.name == peer.name) {
        Some(existing) => *existing = peer,
        None => list.push(peer),
    }
}
