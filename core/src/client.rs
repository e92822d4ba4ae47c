//! # Client
//!
//! Entry point of the SDK. A [`Client`] owns the configuration, the
//! transports, the optional state store and the current user, and hands out
//! [`Channel`]s and [`EventHub`]s that share them.
//!
//! User records are persisted as JSON under the user's name when a state
//! store is configured, so a later process can restore the same identity
//! with [`Client::load_user_context`].

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::channel::Channel;
use crate::config::ClientConfig;
use crate::crypto::keys::SigningKeypair;
use crate::error::{ClientError, Result};
use crate::events::EventHub;
use crate::identity::{IdentityContext, SigningIdentity};
use crate::transport::{
    KeyValueStore, OrdererTransport, PeerEventTransport, PeerProposalTransport, PeerRef,
};

/// Stored form of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct UserRecord {
    name: String,
    msp_id: String,
    /// Hex-encoded certificate bytes.
    certificate: String,
    /// Hex-encoded Ed25519 secret key.
    signing_key: String,
}

impl UserRecord {
    fn from_identity(identity: &SigningIdentity) -> Result<Self> {
        let keypair = identity.ensure_signing_material()?;
        Ok(Self {
            name: identity.name().to_string(),
            msp_id: identity.msp_id().to_string(),
            certificate: hex::encode(identity.certificate()),
            signing_key: keypair.secret_key_hex(),
        })
    }

    fn into_identity(self) -> Result<SigningIdentity> {
        let certificate = hex::decode(&self.certificate)
            .map_err(|e| ClientError::Store(format!("corrupt certificate for {}: {e}", self.name)))?;
        let keypair = SigningKeypair::from_hex(&self.signing_key)?;
        Ok(SigningIdentity::new(
            self.name,
            self.msp_id,
            certificate,
            Some(keypair),
        ))
    }
}

pub(crate) struct ClientInner {
    pub(crate) config: ClientConfig,
    pub(crate) peer_transport: Arc<dyn PeerProposalTransport>,
    pub(crate) orderer_transport: Arc<dyn OrdererTransport>,
    event_transport: RwLock<Option<Arc<dyn PeerEventTransport>>>,
    state_store: RwLock<Option<Arc<dyn KeyValueStore>>>,
    user: RwLock<Option<IdentityContext>>,
}

/// Shared client handle. Clones see the same user and store.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    pub fn new(
        config: ClientConfig,
        peer_transport: Arc<dyn PeerProposalTransport>,
        orderer_transport: Arc<dyn OrdererTransport>,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                peer_transport,
                orderer_transport,
                event_transport: RwLock::new(None),
                state_store: RwLock::new(None),
                user: RwLock::new(None),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub(crate) fn inner(&self) -> &ClientInner {
        &self.inner
    }

    pub fn set_state_store(&self, store: Arc<dyn KeyValueStore>) {
        *self.inner.state_store.write() = Some(store);
    }

    /// Transport used by hubs from [`Client::new_event_hub`].
    pub fn set_event_transport(&self, transport: Arc<dyn PeerEventTransport>) {
        *self.inner.event_transport.write() = Some(transport);
    }

    /// Makes `identity` the current user and persists it when a state
    /// store is configured.
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidIdentity`] when the identity cannot sign, or a
    /// store error.
    pub async fn set_user_context(&self, identity: SigningIdentity) -> Result<IdentityContext> {
        let context = IdentityContext::new(identity)?;
        let store = self.inner.state_store.read().clone();
        if let Some(store) = store {
            let record = UserRecord::from_identity(context.identity())?;
            store
                .set_value(&record.name, serde_json::to_string(&record)?)
                .await?;
            debug!(user = %record.name, "user record persisted");
        }
        info!(user = %context.identity().name(), msp_id = %context.identity().msp_id(), "user context set");
        *self.inner.user.write() = Some(context.clone());
        Ok(context)
    }

    /// Restores a user saved by [`Client::set_user_context`] and makes it
    /// current. `Ok(None)` when the store has no record under `name`.
    pub async fn load_user_context(&self, name: &str) -> Result<Option<IdentityContext>> {
        let store = self
            .inner
            .state_store
            .read()
            .clone()
            .ok_or_else(|| ClientError::Store("no state store configured".into()))?;
        let Some(raw) = store.get_value(name).await? else {
            return Ok(None);
        };
        let record: UserRecord = serde_json::from_str(&raw)
            .map_err(|e| ClientError::Store(format!("corrupt user record for {name}: {e}")))?;
        let context = IdentityContext::new(record.into_identity()?)?;
        info!(user = %name, "user context restored");
        *self.inner.user.write() = Some(context.clone());
        Ok(Some(context))
    }

    pub fn user_context(&self) -> Option<IdentityContext> {
        self.inner.user.read().clone()
    }

    /// The current user, or [`ClientError::InvalidIdentity`] if none is set.
    pub fn identity_context(&self) -> Result<IdentityContext> {
        self.user_context()
            .ok_or_else(|| ClientError::InvalidIdentity("no user context set on client".into()))
    }

    /// An empty channel: add peers and orderers before use.
    pub fn new_channel(&self, name: impl Into<String>) -> Channel {
        Channel::new(name.into(), self.clone())
    }

    /// The channel described by the network section of the configuration.
    pub fn channel_from_config(&self) -> Result<Channel> {
        let network = &self.inner.config.network;
        if network.channel.is_empty() {
            return Err(ClientError::Config("network has no channel name".into()));
        }
        let channel = self.new_channel(network.channel.clone());
        for peer in &network.peers {
            channel.add_peer(PeerRef::from(peer));
        }
        if let Some(orderer) = &network.orderer {
            channel.add_orderer(PeerRef::from(orderer));
        }
        Ok(channel)
    }

    /// An event hub using the configured event timeout, connectable when an
    /// event transport is set.
    pub fn new_event_hub(&self) -> EventHub {
        let timeout = self.inner.config.event_timeout();
        match self.inner.event_transport.read().clone() {
            Some(transport) => EventHub::with_transport(transport, timeout),
            None => EventHub::new(timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EndpointConfig, NetworkConfig};
    use crate::transport::{MemoryKeyValueStore, MemoryOrderer, MemoryPeerNetwork};

    fn client(config: ClientConfig) -> Client {
        Client::new(
            config,
            Arc::new(MemoryPeerNetwork::new()),
            Arc::new(MemoryOrderer::new()),
        )
    }

    #[tokio::test]
    async fn user_context_roundtrips_through_store() {
        let store = Arc::new(MemoryKeyValueStore::new());
        let first = client(ClientConfig::default());
        first.set_state_store(store.clone());
        let admin = SigningIdentity::generate("admin", "Org1MSP");
        let saved = first.set_user_context(admin).await.unwrap();

        let second = client(ClientConfig::default());
        second.set_state_store(store);
        let loaded = second.load_user_context("admin").await.unwrap().unwrap();
        assert_eq!(loaded.creator(), saved.creator());
        assert_eq!(second.user_context().unwrap().creator(), saved.creator());
        assert!(second.load_user_context("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn identity_without_key_is_refused() {
        let c = client(ClientConfig::default());
        let err = c
            .set_user_context(SigningIdentity::new("admin", "Org1MSP", b"cert".to_vec(), None))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidIdentity(_)));
        assert!(c.identity_context().is_err());
    }

    #[tokio::test]
    async fn load_without_store_is_an_error() {
        let c = client(ClientConfig::default());
        assert!(matches!(
            c.load_user_context("admin").await,
            Err(ClientError::Store(_))
        ));
    }

    #[test]
    fn channel_from_config_uses_network_section() {
        let config = ClientConfig {
            network: NetworkConfig {
                channel: "mychannel".into(),
                orderer: Some(EndpointConfig::new("orderer0", "grpcs://localhost:7050")),
                peers: vec![
                    EndpointConfig::new("peer1", "grpcs://localhost:7051"),
                    EndpointConfig::new("peer2", "grpcs://localhost:8051"),
                ],
            },
            ..ClientConfig::default()
        };
        let channel = client(config).channel_from_config().unwrap();
        assert_eq!(channel.name(), "mychannel");
        assert_eq!(channel.peers().len(), 2);
        assert_eq!(channel.orderers()[0].name, "orderer0");

        assert!(matches!(
            client(ClientConfig::default()).channel_from_config(),
            Err(ClientError::Config(_))
        ));
    }
}
