//! Proposal construction via the builder pattern.
//!
//! The [`ProposalBuilder`] collects the inputs of a chaincode call, checks
//! them against the rules of the requested [`ProposalKind`], and produces an
//! immutable [`ProposalRequest`] carrying a fresh nonce and the transaction
//! id derived from it.
//!
//! The builder does not sign. Signing happens when the request is turned
//! into a [`SignedProposal`], right before dispatch to the endorsers.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::types::ProposalKind;
use crate::crypto::keys::Signature;
use crate::crypto::nonce::Nonce;
use crate::error::{ClientError, Result};
use crate::identity::{IdentityContext, SerializedIdentity, TransactionId};
use crate::transport::PeerRef;

// ---------------------------------------------------------------------------
// Headers
// ---------------------------------------------------------------------------

/// Routing information every peer and orderer reads first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelHeader {
    pub tx_id: TransactionId,
    pub channel_id: String,
    pub kind: ProposalKind,
    pub chaincode_id: String,
    /// Creation time, milliseconds since the Unix epoch.
    pub timestamp: i64,
}

/// Who created the proposal, and the nonce the tx id was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureHeader {
    pub creator: SerializedIdentity,
    pub nonce: Nonce,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub channel_header: ChannelHeader,
    pub signature_header: SignatureHeader,
}

impl Header {
    pub fn tx_id(&self) -> &TransactionId {
        &self.channel_header.tx_id
    }
}

// ---------------------------------------------------------------------------
// Proposal
// ---------------------------------------------------------------------------

/// The chaincode call itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChaincodeInvocation {
    pub chaincode_id: String,
    /// Empty means "the currently committed version".
    pub chaincode_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chaincode_path: Option<String>,
    pub function: String,
    pub args: Vec<String>,
}

/// Header plus invocation. Endorsers receive it as opaque bytes inside a
/// [`SignedProposal`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub header: Header,
    pub payload: ChaincodeInvocation,
}

impl Proposal {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Encoded proposal plus the creator's signature over exactly those bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedProposal {
    pub proposal_bytes: Vec<u8>,
    pub signature: Signature,
}

impl SignedProposal {
    /// Decodes the proposal and checks the signature against its creator.
    /// Returns `None` when either step fails.
    pub fn open(&self) -> Option<Proposal> {
        let proposal = Proposal::from_bytes(&self.proposal_bytes).ok()?;
        proposal
            .header
            .signature_header
            .creator
            .verify(&self.proposal_bytes, &self.signature)
            .then_some(proposal)
    }
}

// ---------------------------------------------------------------------------
// ProposalRequest
// ---------------------------------------------------------------------------

/// A fully specified, not yet signed chaincode call.
///
/// Built by [`ProposalBuilder`]; read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalRequest {
    kind: ProposalKind,
    targets: Vec<PeerRef>,
    invocation: ChaincodeInvocation,
    channel_id: String,
    tx_id: TransactionId,
    nonce: Nonce,
    creator: SerializedIdentity,
    timestamp: i64,
}

impl ProposalRequest {
    pub fn kind(&self) -> ProposalKind {
        self.kind
    }

    pub fn targets(&self) -> &[PeerRef] {
        &self.targets
    }

    pub fn chaincode_id(&self) -> &str {
        &self.invocation.chaincode_id
    }

    pub fn chaincode_version(&self) -> &str {
        &self.invocation.chaincode_version
    }

    pub fn chaincode_path(&self) -> Option<&str> {
        self.invocation.chaincode_path.as_deref()
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn function(&self) -> &str {
        &self.invocation.function
    }

    pub fn args(&self) -> &[String] {
        &self.invocation.args
    }

    pub fn tx_id(&self) -> &TransactionId {
        &self.tx_id
    }

    pub fn nonce(&self) -> &Nonce {
        &self.nonce
    }

    pub fn header(&self) -> Header {
        Header {
            channel_header: ChannelHeader {
                tx_id: self.tx_id.clone(),
                channel_id: self.channel_id.clone(),
                kind: self.kind,
                chaincode_id: self.invocation.chaincode_id.clone(),
                timestamp: self.timestamp,
            },
            signature_header: SignatureHeader {
                creator: self.creator.clone(),
                nonce: self.nonce.clone(),
            },
        }
    }

    pub fn proposal(&self) -> Proposal {
        Proposal {
            header: self.header(),
            payload: self.invocation.clone(),
        }
    }

    /// Encodes and signs the proposal with `identity`, which must be the
    /// identity the request was built for.
    pub fn sign(&self, identity: &IdentityContext) -> Result<SignedProposal> {
        if identity.creator() != self.creator {
            return Err(ClientError::InvalidIdentity(
                "proposal was built for a different identity".into(),
            ));
        }
        let proposal_bytes = self.proposal().to_bytes()?;
        let signature = identity.sign(&proposal_bytes)?;
        Ok(SignedProposal {
            proposal_bytes,
            signature,
        })
    }
}

// ---------------------------------------------------------------------------
// ProposalBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`ProposalRequest`].
///
/// ```rust,no_run
/// use hfc_core::identity::{IdentityContext, SigningIdentity};
/// use hfc_core::transaction::{ProposalBuilder, ProposalKind};
/// use hfc_core::transport::PeerRef;
///
/// let ctx = IdentityContext::new(SigningIdentity::generate("admin", "Org1MSP")).unwrap();
/// let request = ProposalBuilder::new(ProposalKind::Invoke)
///     .channel("mychannel")
///     .chaincode("end2end")
///     .targets(vec![PeerRef::new("peer1", "grpcs://localhost:7051")])
///     .function("move")
///     .args(["a", "b", "100"])
///     .build(&ctx)
///     .unwrap();
/// assert_eq!(request.tx_id().as_str().len(), 64);
/// ```
#[derive(Debug, Clone)]
pub struct ProposalBuilder {
    kind: ProposalKind,
    targets: Vec<PeerRef>,
    channel_id: String,
    chaincode_id: String,
    chaincode_version: String,
    chaincode_path: Option<String>,
    function: String,
    args: Vec<String>,
    nonce: Option<Nonce>,
}

impl ProposalBuilder {
    pub fn new(kind: ProposalKind) -> Self {
        Self {
            kind,
            targets: Vec::new(),
            channel_id: String::new(),
            chaincode_id: String::new(),
            chaincode_version: String::new(),
            chaincode_path: None,
            function: String::new(),
            args: Vec::new(),
            nonce: None,
        }
    }

    pub fn channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = channel_id.into();
        self
    }

    pub fn chaincode(mut self, chaincode_id: impl Into<String>) -> Self {
        self.chaincode_id = chaincode_id.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.chaincode_version = version.into();
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.chaincode_path = Some(path.into());
        self
    }

    pub fn targets(mut self, targets: Vec<PeerRef>) -> Self {
        self.targets = targets;
        self
    }

    pub fn function(mut self, function: impl Into<String>) -> Self {
        self.function = function.into();
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Use a fixed nonce instead of a random one. Replaying a nonce replays
    /// the transaction id; only tests and tooling should need this.
    pub fn nonce(mut self, nonce: Nonce) -> Self {
        self.nonce = Some(nonce);
        self
    }

    /// Fills the channel and targets from `channel_id` / `peers` when the
    /// caller left them empty.
    pub(crate) fn with_defaults(mut self, channel_id: &str, peers: Vec<PeerRef>) -> Self {
        if self.channel_id.is_empty() {
            self.channel_id = channel_id.to_string();
        }
        if self.targets.is_empty() {
            self.targets = peers;
        }
        self
    }

    /// Validates the inputs and derives the transaction id.
    ///
    /// # Errors
    ///
    /// - [`ClientError::InvalidTargets`] when a lifecycle proposal has no
    ///   targets.
    /// - [`ClientError::InvalidRequest`] for an empty channel or chaincode
    ///   id, or a lifecycle proposal without a version.
    /// - [`ClientError::InvalidIdentity`] when `identity` cannot sign.
    pub fn build(self, identity: &IdentityContext) -> Result<ProposalRequest> {
        if self.channel_id.is_empty() {
            return Err(ClientError::InvalidRequest("missing channel id".into()));
        }
        if self.chaincode_id.is_empty() {
            return Err(ClientError::InvalidRequest("missing chaincode id".into()));
        }
        if self.kind.requires_explicit_endorsers() && self.targets.is_empty() {
            return Err(ClientError::InvalidTargets(format!(
                "{} proposal requires at least one target peer",
                self.kind
            )));
        }
        if self.kind.requires_version() && self.chaincode_version.is_empty() {
            return Err(ClientError::InvalidRequest(format!(
                "{} proposal requires a chaincode version",
                self.kind
            )));
        }

        let nonce = self.nonce.unwrap_or_else(Nonce::generate);
        let tx_id = identity.transaction_id(&nonce)?;

        Ok(ProposalRequest {
            kind: self.kind,
            targets: self.targets,
            invocation: ChaincodeInvocation {
                chaincode_id: self.chaincode_id,
                chaincode_version: self.chaincode_version,
                chaincode_path: self.chaincode_path,
                function: self.function,
                args: self.args,
            },
            channel_id: self.channel_id,
            tx_id,
            nonce,
            creator: identity.creator(),
            timestamp: Utc::now().timestamp_millis(),
        })
    }
}
