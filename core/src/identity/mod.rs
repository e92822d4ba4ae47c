//! # Identity Module
//!
//! Who is signing, and how transaction ids are derived from that.
//!
//! 1. **SigningIdentity** — MSP id, certificate and Ed25519 key of an
//!    enrolled member.
//! 2. **IdentityContext** — a validated, shareable handle on a signing
//!    identity; mints `(nonce, transaction id)` pairs and signs messages.
//!
//! Transaction ids are `hex(SHA-256(nonce || creator))`. They are the
//! correlation key between a proposal, its endorsements, the envelope sent
//! to the orderer, and the commit event that eventually comes back.

pub mod context;
pub mod signing_identity;

pub use context::{compute_transaction_id, derive_transaction_id, IdentityContext, TransactionId};
pub use signing_identity::{Certificate, SerializedIdentity, SigningIdentity};
