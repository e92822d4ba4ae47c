//! Transaction-id derivation.
//!
//! A transaction id is `hex(SHA-256(nonce || creator))`, where `creator` is
//! the canonical serialized identity of the submitter. Peers recompute it
//! from the proposal header and refuse proposals whose id does not match,
//! so the derivation must be byte-exact and deterministic.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::signing_identity::{SerializedIdentity, SigningIdentity};
use crate::crypto::hash::sha256_parts;
use crate::crypto::keys::Signature;
use crate::crypto::nonce::Nonce;
use crate::error::Result;

/// Correlation key across proposal, responses, submission and commit
/// events. Hex-encoded SHA-256, 64 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    /// Wraps an id received from elsewhere (an event, a log line).
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TransactionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derives the transaction id for `(nonce, identity)`.
///
/// Fails with `InvalidIdentity` when the identity cannot sign: an id for a
/// transaction that can never be signed is useless.
pub fn derive_transaction_id(nonce: &Nonce, identity: &SigningIdentity) -> Result<TransactionId> {
    identity.ensure_signing_material()?;
    Ok(compute_transaction_id(nonce, &identity.serialize()))
}

/// Recomputes a transaction id from a header's creator and nonce. Used on
/// the receiving side, where only the serialized identity is known.
pub fn compute_transaction_id(nonce: &Nonce, creator: &SerializedIdentity) -> TransactionId {
    let digest = sha256_parts(&[nonce.as_bytes(), &creator.to_bytes()]);
    TransactionId(hex::encode(digest))
}

/// A validated signing identity shared by everything that builds or signs
/// messages on behalf of one user.
#[derive(Debug, Clone)]
pub struct IdentityContext {
    identity: Arc<SigningIdentity>,
}

impl IdentityContext {
    /// Validates up front that the identity can sign.
    pub fn new(identity: SigningIdentity) -> Result<Self> {
        Self::from_shared(Arc::new(identity))
    }

    pub fn from_shared(identity: Arc<SigningIdentity>) -> Result<Self> {
        identity.ensure_signing_material()?;
        Ok(Self { identity })
    }

    pub fn identity(&self) -> &SigningIdentity {
        &self.identity
    }

    pub fn creator(&self) -> SerializedIdentity {
        self.identity.serialize()
    }

    /// Fresh nonce plus the transaction id it yields for this identity.
    pub fn new_transaction(&self) -> Result<(Nonce, TransactionId)> {
        let nonce = Nonce::generate();
        let tx_id = derive_transaction_id(&nonce, &self.identity)?;
        Ok((nonce, tx_id))
    }

    pub fn transaction_id(&self, nonce: &Nonce) -> Result<TransactionId> {
        derive_transaction_id(nonce, &self.identity)
    }

    pub fn sign(&self, message: &[u8]) -> Result<Signature> {
        self.identity.sign(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::SigningKeypair;
    use crate::error::ClientError;

    fn admin() -> SigningIdentity {
        SigningIdentity::from_keypair("admin", "Org1MSP", SigningKeypair::from_seed(&[1u8; 32]))
    }

    #[test]
    fn same_inputs_same_id() {
        let nonce = Nonce::from_bytes(vec![42u8; 24]);
        let id = admin();
        let a = derive_transaction_id(&nonce, &id).unwrap();
        let b = derive_transaction_id(&nonce, &id).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_nonces_different_ids() {
        let id = admin();
        let a = derive_transaction_id(&Nonce::generate(), &id).unwrap();
        let b = derive_transaction_id(&Nonce::generate(), &id).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn different_identities_different_ids() {
        let nonce = Nonce::from_bytes(vec![3u8; 24]);
        let other =
            SigningIdentity::from_keypair("user1", "Org2MSP", SigningKeypair::from_seed(&[2u8; 32]));
        assert_ne!(
            derive_transaction_id(&nonce, &admin()).unwrap(),
            derive_transaction_id(&nonce, &other).unwrap()
        );
    }

    #[test]
    fn nul_in_msp_id_does_not_collide_with_certificate_prefix() {
        let nonce = Nonce::from_bytes(vec![7u8; 24]);
        let a = SerializedIdentity {
            msp_id: "Org1\0x".into(),
            id_bytes: b"cert".to_vec(),
        };
        let b = SerializedIdentity {
            msp_id: "Org1".into(),
            id_bytes: b"x\0cert".to_vec(),
        };
        assert_ne!(
            compute_transaction_id(&nonce, &a),
            compute_transaction_id(&nonce, &b)
        );
    }

    #[test]
    fn receiver_side_recomputation_matches() {
        let nonce = Nonce::generate();
        let id = admin();
        assert_eq!(
            derive_transaction_id(&nonce, &id).unwrap(),
            compute_transaction_id(&nonce, &id.serialize())
        );
    }

    #[test]
    fn identity_without_key_is_rejected() {
        let id = SigningIdentity::new("admin", "Org1MSP", b"cert".to_vec(), None);
        let err = derive_transaction_id(&Nonce::generate(), &id).unwrap_err();
        assert!(matches!(err, ClientError::InvalidIdentity(_)));
        assert!(IdentityContext::new(id).is_err());
    }

    #[test]
    fn context_new_transaction_is_consistent() {
        let ctx = IdentityContext::new(admin()).unwrap();
        let (nonce, tx_id) = ctx.new_transaction().unwrap();
        assert_eq!(ctx.transaction_id(&nonce).unwrap(), tx_id);
    }
}
