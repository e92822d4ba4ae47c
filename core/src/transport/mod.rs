//! # Transport Interfaces
//!
//! The client core never opens a socket. Everything that crosses the
//! network goes through one of four narrow async traits:
//!
//! | Trait                    | Used by                   | Talks to        |
//! |--------------------------|---------------------------|-----------------|
//! | [`PeerProposalTransport`] | `EndorsementCoordinator`  | endorsing peers |
//! | [`OrdererTransport`]     | `TransactionSubmitter`    | ordering service|
//! | [`PeerEventTransport`]   | `EventHub`                | peer event feed |
//! | [`KeyValueStore`]        | `Client`                  | user-record store|
//!
//! Real deployments plug gRPC/TLS implementations in here. The [`memory`]
//! module ships in-process implementations that simulate a small network
//! well enough to drive the whole transaction lifecycle in tests and in the
//! `hfc simulate` command.

pub mod memory;

use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::channel::ChannelConfig;
use crate::config::EndpointConfig;
use crate::error::Result;
use crate::events::EventNotification;
use crate::transaction::{BroadcastResponse, EndorsementResponse, SignedProposal, TransactionEnvelope};

pub use memory::{MemoryEventSource, MemoryKeyValueStore, MemoryOrderer, MemoryPeerNetwork};

// ---------------------------------------------------------------------------
// PeerRef
// ---------------------------------------------------------------------------

/// Reference to a peer or orderer endpoint. The name is the identity used in
/// logs, responses and error messages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerRef {
    pub name: String,
    pub url: String,
}

impl PeerRef {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

impl From<&EndpointConfig> for PeerRef {
    fn from(endpoint: &EndpointConfig) -> Self {
        Self::new(endpoint.name.clone(), endpoint.url.clone())
    }
}

impl fmt::Display for PeerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// ---------------------------------------------------------------------------
// TransportError
// ---------------------------------------------------------------------------

/// A failure talking to one endpoint. The message is kept verbatim: callers
/// match on peer-reported strings such as "no such file or directory".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{endpoint}: {message}")]
pub struct TransportError {
    pub endpoint: String,
    pub message: String,
}

impl TransportError {
    pub fn new(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Stream of notifications from one peer. Ends when the peer closes it.
pub type NotificationStream =
    BoxStream<'static, std::result::Result<EventNotification, TransportError>>;

/// Sends signed proposals to endorsing peers.
#[async_trait]
pub trait PeerProposalTransport: Send + Sync {
    /// Ask `peer` to simulate and endorse `proposal`.
    async fn process_proposal(
        &self,
        peer: &PeerRef,
        proposal: &SignedProposal,
    ) -> std::result::Result<EndorsementResponse, TransportError>;
}

/// Hands signed envelopes to the ordering service and serves channel
/// configuration.
#[async_trait]
pub trait OrdererTransport: Send + Sync {
    /// Broadcast one envelope. A non-success status is a normal response,
    /// not a transport error.
    async fn broadcast(
        &self,
        orderer: &PeerRef,
        envelope: &TransactionEnvelope,
    ) -> std::result::Result<BroadcastResponse, TransportError>;

    /// Reads the latest configuration block of `channel_id`.
    async fn channel_config(
        &self,
        orderer: &PeerRef,
        channel_id: &str,
    ) -> std::result::Result<ChannelConfig, TransportError> {
        Err(TransportError::new(
            &orderer.name,
            format!("configuration of channel '{channel_id}' is not available"),
        ))
    }
}

/// Opens a peer's event feed.
#[async_trait]
pub trait PeerEventTransport: Send + Sync {
    async fn subscribe(
        &self,
        peer: &PeerRef,
    ) -> std::result::Result<NotificationStream, TransportError>;
}

/// Persistent storage for user records.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns `None` when nothing is stored under `name`.
    async fn get_value(&self, name: &str) -> Result<Option<String>>;

    async fn set_value(&self, name: &str, value: String) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_ref_from_endpoint_config() {
        let endpoint = EndpointConfig::new("peer1", "grpcs://localhost:7051");
        let peer = PeerRef::from(&endpoint);
        assert_eq!(peer.name, "peer1");
        assert_eq!(peer.to_string(), "peer1");
    }

    #[test]
    fn transport_error_display() {
        let err = TransportError::new("orderer0", "connection refused");
        assert_eq!(err.to_string(), "orderer0: connection refused");
    }
}
