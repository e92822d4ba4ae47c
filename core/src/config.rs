//! # Client Configuration & Constants
//!
//! Every magic number the client core relies on lives here, next to the
//! [`ClientConfig`] struct that callers hand to [`crate::Client::new`].
//! There is no global configuration object: each component receives the
//! values it needs from the config it was built with.
//!
//! The network section mirrors the `test-network` block of the JSON files
//! the integration harness has always used, so existing configs load as-is
//! (unknown keys are ignored).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

// ---------------------------------------------------------------------------
// Protocol Constants
// ---------------------------------------------------------------------------

/// Nonce length in bytes. 24 random bytes per request.
pub const NONCE_LENGTH: usize = 24;

/// Status code reported by peers and orderers on success.
pub const STATUS_SUCCESS: i32 = 200;

/// Status code an orderer may use instead of 200 to accept a broadcast.
pub const STATUS_BROADCAST_OK: i32 = 0;

/// Status code for a malformed or missing request body.
pub const STATUS_BAD_REQUEST: i32 = 400;

/// Status code for a request that was understood but not permitted.
pub const STATUS_FORBIDDEN: i32 = 403;

/// Status code peers use for chaincode execution failures.
pub const STATUS_INTERNAL_ERROR: i32 = 500;

/// Validation code a committing peer reports for an accepted transaction.
pub const VALIDATION_CODE_VALID: &str = "VALID";

/// True for the statuses that mean the orderer accepted a broadcast:
/// [`STATUS_BROADCAST_OK`] and [`STATUS_SUCCESS`].
pub fn is_broadcast_success(status: i32) -> bool {
    status == STATUS_BROADCAST_OK || status == STATUS_SUCCESS
}

// ---------------------------------------------------------------------------
// Timing Defaults
// ---------------------------------------------------------------------------

/// Upper bound for a single peer to answer a proposal.
pub const DEFAULT_PROPOSAL_TIMEOUT: Duration = Duration::from_secs(45);

/// Upper bound for the orderer to acknowledge a broadcast.
pub const DEFAULT_ORDERER_TIMEOUT: Duration = Duration::from_secs(30);

/// Default lifetime of an event registration.
pub const DEFAULT_EVENT_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Network Configuration
// ---------------------------------------------------------------------------

/// A single peer or orderer endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Logical name, used as the peer reference throughout the client.
    pub name: String,
    /// Endpoint URL, e.g. `grpcs://localhost:7051`.
    pub url: String,
    /// TLS server-name override.
    #[serde(default, rename = "server-hostname")]
    pub server_hostname: Option<String>,
}

impl EndpointConfig {
    /// Creates an endpoint without a hostname override.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            server_hostname: None,
        }
    }
}

/// The network a client talks to: one channel, its endorsers, its orderer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Channel name.
    #[serde(default)]
    pub channel: String,
    /// Ordering service endpoint. `None` means transactions cannot be
    /// submitted.
    #[serde(default)]
    pub orderer: Option<EndpointConfig>,
    /// Endorsing peers.
    #[serde(default)]
    pub peers: Vec<EndpointConfig>,
}

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

/// Tunable parameters for a [`crate::Client`] and everything it creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Per-peer proposal timeout, in milliseconds. A peer that does not
    /// answer within this window is recorded as a transport failure.
    pub proposal_timeout_ms: u64,

    /// Orderer broadcast timeout, in milliseconds.
    pub orderer_timeout_ms: u64,

    /// Default event registration timeout, in milliseconds.
    pub event_timeout_ms: u64,

    /// Network topology.
    pub network: NetworkConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            proposal_timeout_ms: DEFAULT_PROPOSAL_TIMEOUT.as_millis() as u64,
            orderer_timeout_ms: DEFAULT_ORDERER_TIMEOUT.as_millis() as u64,
            event_timeout_ms: DEFAULT_EVENT_TIMEOUT.as_millis() as u64,
            network: NetworkConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Parses a configuration from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ClientError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&raw)
    }

    /// Rejects configurations that cannot work at all.
    pub fn validate(&self) -> Result<()> {
        if self.proposal_timeout_ms == 0 || self.orderer_timeout_ms == 0 {
            return Err(ClientError::Config(
                "transport timeouts must be non-zero".into(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for peer in &self.network.peers {
            if !seen.insert(peer.name.as_str()) {
                return Err(ClientError::Config(format!(
                    "duplicate peer name: {}",
                    peer.name
                )));
            }
        }
        Ok(())
    }

    pub fn proposal_timeout(&self) -> Duration {
        Duration::from_millis(self.proposal_timeout_ms)
    }

    pub fn orderer_timeout(&self) -> Duration {
        Duration::from_millis(self.orderer_timeout_ms)
    }

    pub fn event_timeout(&self) -> Duration {
        Duration::from_millis(self.event_timeout_ms)
    }
}
