//! Signing identities.
//!
//! A [`SigningIdentity`] is what the network knows a client by: the MSP
//! (membership service provider) it belongs to, the certificate that MSP
//! issued, and the private key matching that certificate. Enrollment with a
//! certificate authority happens elsewhere; this crate accepts the result.
//!
//! For development networks, [`SigningIdentity::generate`] issues a
//! self-described certificate (subject + Ed25519 public key, JSON-encoded).
//! Peers and orderers in this crate's in-memory transport read the public
//! key out of it to verify signatures.

use serde::{Deserialize, Serialize};

use crate::crypto::keys::{PublicKey, Signature, SigningKeypair};
use crate::error::{ClientError, Result};

/// Certificate body for self-issued identities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    /// Enrollment name the certificate was issued to.
    pub subject: String,
    /// Hex-encoded Ed25519 public key.
    pub public_key: String,
}

impl Certificate {
    pub fn encode(&self) -> Vec<u8> {
        // Two string fields cannot fail to serialize.
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Parses the embedded public key.
    pub fn public_key(&self) -> Result<PublicKey> {
        Ok(PublicKey::from_hex(&self.public_key)?)
    }
}

/// The creator field carried in every proposal and envelope header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedIdentity {
    pub msp_id: String,
    pub id_bytes: Vec<u8>,
}

impl SerializedIdentity {
    /// Canonical byte form: `u32_be(len(msp_id)) || msp_id || certificate`.
    ///
    /// This is the exact input, after the nonce, of transaction-id
    /// derivation. The length prefix keeps the split between MSP id and
    /// certificate unambiguous whatever bytes either contains.
    pub fn to_bytes(&self) -> Vec<u8> {
        let msp = self.msp_id.as_bytes();
        let mut buf = Vec::with_capacity(4 + msp.len() + self.id_bytes.len());
        buf.extend_from_slice(&(msp.len() as u32).to_be_bytes());
        buf.extend_from_slice(msp);
        buf.extend_from_slice(&self.id_bytes);
        buf
    }

    /// Verifies `signature` over `message` with the key in the certificate.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        Certificate::decode(&self.id_bytes)
            .and_then(|cert| cert.public_key())
            .map(|key| key.verify(message, signature))
            .unwrap_or(false)
    }
}

/// An enrolled member of the network, able to sign.
#[derive(Debug, Clone)]
pub struct SigningIdentity {
    name: String,
    msp_id: String,
    certificate: Vec<u8>,
    keypair: Option<SigningKeypair>,
}

impl SigningIdentity {
    /// Wraps enrollment material obtained elsewhere. No validation happens
    /// here; an identity without key material is representable (e.g. a
    /// peer's identity) but cannot sign.
    pub fn new(
        name: impl Into<String>,
        msp_id: impl Into<String>,
        certificate: Vec<u8>,
        keypair: Option<SigningKeypair>,
    ) -> Self {
        Self {
            name: name.into(),
            msp_id: msp_id.into(),
            certificate,
            keypair,
        }
    }

    /// Issues a fresh keypair and a self-described certificate.
    pub fn generate(name: impl Into<String>, msp_id: impl Into<String>) -> Self {
        Self::from_keypair(name, msp_id, SigningKeypair::generate())
    }

    /// Builds an identity around an existing keypair.
    pub fn from_keypair(
        name: impl Into<String>,
        msp_id: impl Into<String>,
        keypair: SigningKeypair,
    ) -> Self {
        let name = name.into();
        let certificate = Certificate {
            subject: name.clone(),
            public_key: keypair.public_key().to_hex(),
        }
        .encode();
        Self::new(name, msp_id, certificate, Some(keypair))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn msp_id(&self) -> &str {
        &self.msp_id
    }

    pub fn certificate(&self) -> &[u8] {
        &self.certificate
    }

    pub fn keypair(&self) -> Option<&SigningKeypair> {
        self.keypair.as_ref()
    }

    /// Fails with [`ClientError::InvalidIdentity`] unless the identity has
    /// an MSP id, a certificate and a private key.
    pub fn ensure_signing_material(&self) -> Result<&SigningKeypair> {
        if self.msp_id.is_empty() {
            return Err(ClientError::InvalidIdentity(format!(
                "identity '{}' has no MSP id",
                self.name
            )));
        }
        if self.certificate.is_empty() {
            return Err(ClientError::InvalidIdentity(format!(
                "identity '{}' has no certificate",
                self.name
            )));
        }
        self.keypair.as_ref().ok_or_else(|| {
            ClientError::InvalidIdentity(format!("identity '{}' has no signing key", self.name))
        })
    }

    pub fn serialize(&self) -> SerializedIdentity {
        SerializedIdentity {
            msp_id: self.msp_id.clone(),
            id_bytes: self.certificate.clone(),
        }
    }

    pub fn sign(&self, message: &[u8]) -> Result<Signature> {
        Ok(self.ensure_signing_material()?.sign(message))
    }
}
