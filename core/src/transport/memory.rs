//! In-process transports.
//!
//! A small simulated network: peers that endorse proposals against a
//! per-peer chaincode registry, an orderer that verifies envelopes and
//! "commits" them by publishing notifications, an event source that
//! streams those notifications, and a key-value store.
//!
//! Peer-side failures use the messages a real peer produces, so callers
//! can match on them the same way against either network.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::{
    KeyValueStore, NotificationStream, OrdererTransport, PeerEventTransport,
    PeerProposalTransport, PeerRef, TransportError,
};
use crate::channel::ChannelConfig;
use crate::config::{STATUS_BAD_REQUEST, STATUS_FORBIDDEN, STATUS_INTERNAL_ERROR, STATUS_SUCCESS};
use crate::error::Result;
use crate::events::{ChaincodeEvent, EventNotification, TxCommit, TxValidationCode};
use crate::identity::{compute_transaction_id, SigningIdentity, TransactionId};
use crate::transaction::{
    BroadcastResponse, Endorsement, EndorsementResponse, Proposal, ProposalKind, SignedProposal,
    TransactionEnvelope, TransactionPayload,
};

/// Chaincode function the simulated peers treat as a failing invocation.
pub const FAILING_FUNCTION: &str = "fail";

/// Capacity of the commit feed. Slow subscribers skip what they missed.
const COMMIT_FEED_CAPACITY: usize = 1024;

// ---------------------------------------------------------------------------
// MemoryPeerNetwork
// ---------------------------------------------------------------------------

struct SimulatedPeer {
    url: String,
    identity: SigningIdentity,
    online: bool,
    latency: Duration,
    /// Installed `(chaincode id, version)` pairs.
    installed: HashSet<(String, String)>,
    /// Running version per chaincode id.
    instantiated: HashMap<String, String>,
}

/// A set of simulated endorsing peers.
#[derive(Default)]
pub struct MemoryPeerNetwork {
    peers: DashMap<String, SimulatedPeer>,
}

impl MemoryPeerNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an online peer with a fresh identity in `msp_id`.
    pub fn add_peer(&self, peer: &PeerRef, msp_id: &str) {
        self.peers.insert(
            peer.name.clone(),
            SimulatedPeer {
                url: peer.url.clone(),
                identity: SigningIdentity::generate(peer.name.clone(), msp_id),
                online: true,
                latency: Duration::ZERO,
                installed: HashSet::new(),
                instantiated: HashMap::new(),
            },
        );
    }

    pub fn set_online(&self, peer: &str, online: bool) {
        if let Some(mut p) = self.peers.get_mut(peer) {
            p.online = online;
        }
    }

    /// Delay applied before the peer answers.
    pub fn set_latency(&self, peer: &str, latency: Duration) {
        if let Some(mut p) = self.peers.get_mut(peer) {
            p.latency = latency;
        }
    }

    /// Marks a chaincode package as installed without a proposal.
    pub fn install_chaincode(&self, peer: &str, chaincode_id: &str, version: &str) {
        if let Some(mut p) = self.peers.get_mut(peer) {
            p.installed
                .insert((chaincode_id.to_string(), version.to_string()));
        }
    }

    /// Marks a chaincode as installed and running without a proposal.
    pub fn instantiate_chaincode(&self, peer: &str, chaincode_id: &str, version: &str) {
        if let Some(mut p) = self.peers.get_mut(peer) {
            p.installed
                .insert((chaincode_id.to_string(), version.to_string()));
            p.instantiated
                .insert(chaincode_id.to_string(), version.to_string());
        }
    }

    pub fn is_installed(&self, peer: &str, chaincode_id: &str, version: &str) -> bool {
        self.peers.get(peer).is_some_and(|p| {
            p.installed
                .contains(&(chaincode_id.to_string(), version.to_string()))
        })
    }

    pub fn instantiated_version(&self, peer: &str, chaincode_id: &str) -> Option<String> {
        self.peers
            .get(peer)
            .and_then(|p| p.instantiated.get(chaincode_id).cloned())
    }

    /// The peer's identity, as it appears in its endorsements.
    pub fn peer_identity(&self, peer: &str) -> Option<SigningIdentity> {
        self.peers.get(peer).map(|p| p.identity.clone())
    }
}

impl SimulatedPeer {
    fn endorse(
        &mut self,
        name: &str,
        proposal: &Proposal,
    ) -> std::result::Result<EndorsementResponse, String> {
        let header = &proposal.header.channel_header;
        let invocation = &proposal.payload;
        let id = invocation.chaincode_id.as_str();
        let version = invocation.chaincode_version.as_str();

        let (payload, chaincode_event) = match header.kind {
            ProposalKind::Install => {
                if !self.installed.insert((id.to_string(), version.to_string())) {
                    return Err(format!("chaincode {id}:{version} already exists"));
                }
                (b"OK".to_vec(), None)
            }
            ProposalKind::Instantiate => {
                if self.instantiated.contains_key(id) {
                    return Err(format!("chaincode with name '{id}' already exists"));
                }
                self.require_package(id, version, "instantiated")?;
                self.instantiated.insert(id.to_string(), version.to_string());
                (format!("{id}:{version}").into_bytes(), None)
            }
            ProposalKind::Upgrade => {
                match self.instantiated.get(id) {
                    None => {
                        return Err(format!(
                            "could not find chaincode with name '{id}': chaincode {id} not found"
                        ))
                    }
                    Some(running) if running == version => {
                        return Err(format!(
                            "version already exists for chaincode with name '{id}'"
                        ))
                    }
                    Some(_) => {}
                }
                self.require_package(id, version, "upgraded")?;
                self.instantiated.insert(id.to_string(), version.to_string());
                (format!("{id}:{version}").into_bytes(), None)
            }
            ProposalKind::Invoke | ProposalKind::Query => {
                let running = self
                    .instantiated
                    .get(id)
                    .ok_or_else(|| format!("chaincode {id} not found"))?;
                if !version.is_empty() && running != version {
                    return Err(format!("chaincode {id}:{version} not found"));
                }
                if invocation.function == FAILING_FUNCTION {
                    return Ok(EndorsementResponse {
                        peer: name.to_string(),
                        status: STATUS_INTERNAL_ERROR,
                        message: format!("chaincode {id} returned an error"),
                        payload: Vec::new(),
                        endorsement: None,
                        chaincode_event: None,
                    });
                }
                let payload =
                    format!("{}({})", invocation.function, invocation.args.join(",")).into_bytes();
                let event = (header.kind == ProposalKind::Invoke).then(|| ChaincodeEvent {
                    chaincode_id: id.to_string(),
                    tx_id: header.tx_id.clone(),
                    event_name: invocation.function.clone(),
                    payload: invocation.args.join(",").into_bytes(),
                });
                (payload, event)
            }
        };

        let signature = self
            .identity
            .sign(&Endorsement::signed_bytes(&header.tx_id, &payload))
            .map_err(|e| e.to_string())?;
        Ok(EndorsementResponse {
            peer: name.to_string(),
            status: STATUS_SUCCESS,
            message: String::new(),
            payload,
            endorsement: Some(Endorsement {
                endorser: self.identity.serialize(),
                signature,
            }),
            chaincode_event,
        })
    }

    fn require_package(&self, id: &str, version: &str, action: &str) -> std::result::Result<(), String> {
        if self.installed.contains(&(id.to_string(), version.to_string())) {
            Ok(())
        } else {
            Err(format!(
                "cannot get package for the chaincode to be {action} ({id}:{version})-open \
                 /var/hyperledger/production/chaincodes/{id}.{version}: no such file or directory"
            ))
        }
    }
}

#[async_trait]
impl PeerProposalTransport for MemoryPeerNetwork {
    async fn process_proposal(
        &self,
        peer: &PeerRef,
        proposal: &SignedProposal,
    ) -> std::result::Result<EndorsementResponse, TransportError> {
        let latency = match self.peers.get(&peer.name) {
            None => return Err(TransportError::new(&peer.name, "unknown peer")),
            Some(p) if !p.online => {
                return Err(TransportError::new(
                    &peer.name,
                    format!("connect ECONNREFUSED {}", p.url),
                ))
            }
            Some(p) => p.latency,
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let opened = proposal.open().ok_or_else(|| {
            TransportError::new(&peer.name, "failed to verify proposal signature")
        })?;
        let signature_header = &opened.header.signature_header;
        let expected = compute_transaction_id(&signature_header.nonce, &signature_header.creator);
        if expected != opened.header.channel_header.tx_id {
            return Err(TransportError::new(
                &peer.name,
                format!(
                    "invalid txID. got [{}], expected [{}]",
                    opened.header.channel_header.tx_id, expected
                ),
            ));
        }

        let mut sim = self
            .peers
            .get_mut(&peer.name)
            .ok_or_else(|| TransportError::new(&peer.name, "unknown peer"))?;
        let result = sim.endorse(&peer.name, &opened);
        drop(sim);

        match result {
            Ok(response) => {
                debug!(peer = %peer, tx_id = %opened.header.tx_id(), status = response.status, "endorsed");
                Ok(response)
            }
            Err(message) => Err(TransportError::new(&peer.name, message)),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryOrderer
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Ledger {
    height: u64,
    seen: HashSet<TransactionId>,
    committed: Vec<TxCommit>,
}

/// A single-node ordering service that commits every accepted envelope in
/// its own block and publishes the result.
pub struct MemoryOrderer {
    ledger: Mutex<Ledger>,
    feed: broadcast::Sender<EventNotification>,
    online: AtomicBool,
    /// MSP ids listed in the genesis configuration block.
    organizations: Mutex<BTreeSet<String>>,
}

impl Default for MemoryOrderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryOrderer {
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(COMMIT_FEED_CAPACITY);
        Self {
            ledger: Mutex::new(Ledger::default()),
            feed,
            online: AtomicBool::new(true),
            organizations: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Adds `msp_id` to the member organizations of the configuration
    /// block.
    pub fn add_organization(&self, msp_id: impl Into<String>) {
        self.organizations.lock().insert(msp_id.into());
    }

    /// Number of blocks cut so far.
    pub fn height(&self) -> u64 {
        self.ledger.lock().height
    }

    /// Every commit so far, in order.
    pub fn committed(&self) -> Vec<TxCommit> {
        self.ledger.lock().committed.clone()
    }

    /// Event source fed by this orderer's commits.
    pub fn event_source(&self) -> MemoryEventSource {
        MemoryEventSource::from_feed(self.feed.clone())
    }

    fn validation_code(ledger: &Ledger, payload: &TransactionPayload) -> TxValidationCode {
        let tx_id = payload.header.tx_id();
        let signature_header = &payload.header.signature_header;
        if ledger.seen.contains(tx_id) {
            return TxValidationCode::DuplicateTxid;
        }
        if &compute_transaction_id(&signature_header.nonce, &signature_header.creator) != tx_id {
            return TxValidationCode::BadProposalTxid;
        }
        let endorsed = !payload.endorsements.is_empty()
            && payload
                .endorsements
                .iter()
                .all(|e| e.verify(tx_id, &payload.response_payload));
        if !endorsed {
            return TxValidationCode::EndorsementPolicyFailure;
        }
        TxValidationCode::Valid
    }
}

#[async_trait]
impl OrdererTransport for MemoryOrderer {
    async fn broadcast(
        &self,
        orderer: &PeerRef,
        envelope: &TransactionEnvelope,
    ) -> std::result::Result<BroadcastResponse, TransportError> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(TransportError::new(&orderer.name, "connection refused"));
        }

        let payload = match TransactionPayload::from_bytes(&envelope.payload) {
            Ok(p) => p,
            Err(e) => {
                return Ok(BroadcastResponse {
                    status: STATUS_BAD_REQUEST,
                    info: format!("BAD_REQUEST: malformed envelope payload: {e}"),
                })
            }
        };
        if !payload
            .header
            .signature_header
            .creator
            .verify(&envelope.payload, &envelope.signature)
        {
            return Ok(BroadcastResponse {
                status: STATUS_FORBIDDEN,
                info: "FORBIDDEN: envelope signature verification failed".into(),
            });
        }

        let commit = {
            let mut ledger = self.ledger.lock();
            let code = Self::validation_code(&ledger, &payload);
            ledger.height += 1;
            ledger.seen.insert(payload.header.tx_id().clone());
            let commit = TxCommit {
                tx_id: payload.header.tx_id().clone(),
                validation_code: code,
                block_number: ledger.height,
            };
            ledger.committed.push(commit.clone());
            commit
        };
        debug!(orderer = %orderer, tx_id = %commit.tx_id, code = %commit.validation_code, block = commit.block_number, "committed");

        let valid = commit.validation_code.is_valid();
        // No subscribers is not an error.
        let _ = self.feed.send(EventNotification::TxCommit(commit));
        if valid {
            if let Some(event) = payload.chaincode_event {
                let _ = self.feed.send(EventNotification::Chaincode(event));
            }
        }

        Ok(BroadcastResponse {
            status: STATUS_SUCCESS,
            info: "SUCCESS".into(),
        })
    }

    async fn channel_config(
        &self,
        orderer: &PeerRef,
        channel_id: &str,
    ) -> std::result::Result<ChannelConfig, TransportError> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(TransportError::new(&orderer.name, "connection refused"));
        }
        let msp_ids: Vec<String> = self.organizations.lock().iter().cloned().collect();
        if msp_ids.is_empty() {
            return Err(TransportError::new(
                &orderer.name,
                format!("channel '{channel_id}' has no configuration block"),
            ));
        }
        debug!(orderer = %orderer, channel = channel_id, orgs = msp_ids.len(), "served channel config");
        Ok(ChannelConfig {
            channel_id: channel_id.to_string(),
            sequence: 0,
            msp_ids,
        })
    }
}

// ---------------------------------------------------------------------------
// MemoryEventSource
// ---------------------------------------------------------------------------

/// Streams a notification feed to every subscriber.
pub struct MemoryEventSource {
    feed: broadcast::Sender<EventNotification>,
    unreachable: Mutex<HashSet<String>>,
}

impl Default for MemoryEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEventSource {
    /// A standalone source; notifications come only from [`publish`](Self::publish).
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(COMMIT_FEED_CAPACITY);
        Self::from_feed(feed)
    }

    fn from_feed(feed: broadcast::Sender<EventNotification>) -> Self {
        Self {
            feed,
            unreachable: Mutex::new(HashSet::new()),
        }
    }

    /// Pushes a notification to every current subscriber. Returns how many
    /// received it.
    pub fn publish(&self, notification: EventNotification) -> usize {
        self.feed.send(notification).unwrap_or(0)
    }

    /// Makes subscriptions to `peer` fail (or succeed again).
    pub fn set_reachable(&self, peer: &str, reachable: bool) {
        let mut unreachable = self.unreachable.lock();
        if reachable {
            unreachable.remove(peer);
        } else {
            unreachable.insert(peer.to_string());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.feed.receiver_count()
    }
}

#[async_trait]
impl PeerEventTransport for MemoryEventSource {
    async fn subscribe(
        &self,
        peer: &PeerRef,
    ) -> std::result::Result<NotificationStream, TransportError> {
        if self.unreachable.lock().contains(&peer.name) {
            return Err(TransportError::new(
                &peer.name,
                format!("event service unavailable at {}", peer.url),
            ));
        }
        let receiver = self.feed.subscribe();
        let peer_name = peer.name.clone();
        let stream = futures::stream::unfold(receiver, move |mut rx| {
            let peer_name = peer_name.clone();
            async move {
                loop {
                    match rx.recv().await {
                        Ok(notification) => return Some((Ok(notification), rx)),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(peer = %peer_name, skipped, "event subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });
        Ok(stream.boxed())
    }
}

// ---------------------------------------------------------------------------
// MemoryKeyValueStore
// ---------------------------------------------------------------------------

/// Process-local [`KeyValueStore`].
#[derive(Default)]
pub struct MemoryKeyValueStore {
    values: DashMap<String, String>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get_value(&self, name: &str) -> Result<Option<String>> {
        Ok(self.values.get(name).map(|v| v.value().clone()))
    }

    async fn set_value(&self, name: &str, value: String) -> Result<()> {
        self.values.insert(name.to_string(), value);
        Ok(())
    }
}
