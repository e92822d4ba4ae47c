//! # Cryptographic Primitives
//!
//! Thin, typed wrappers around audited implementations:
//!
//! - **Ed25519** (`ed25519-dalek`) for proposal, envelope and endorsement
//!   signatures.
//! - **SHA-256** (`sha2`) for transaction ids and payload digests.
//! - **OsRng** (`rand`) for request nonces.

pub mod hash;
pub mod keys;
pub mod nonce;

pub use hash::{sha256, sha256_hex, sha256_parts};
pub use keys::{KeyError, PublicKey, Signature, SigningKeypair};
pub use nonce::Nonce;
