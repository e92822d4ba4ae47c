// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # hfc — Permissioned-Ledger Client Core
//!
//! Client-side SDK core for a permissioned ledger network: build and sign
//! transaction proposals, collect endorsements from several peers at once,
//! submit endorsed transactions to the ordering service, and watch peers
//! for commit and chaincode events.
//!
//! ## Architecture
//!
//! - **config** — Constants, timeouts and the network description.
//! - **crypto** — SHA-256, Ed25519 key material, request nonces.
//! - **identity** — Signing identities and transaction-id derivation.
//! - **transaction** — Proposal builder, endorsement fan-out, submission.
//! - **events** — The event hub: registrations, timeouts, stream dispatch.
//! - **transport** — Async traits for peers, orderers, event streams and the
//!   state store, plus an in-memory network.
//! - **client** / **channel** — The surface applications use.
//!
//! ## Lifecycle
//!
//! ```text
//! IdentityContext ─▶ ProposalBuilder ─▶ EndorsementCoordinator ─▶ TransactionSubmitter
//!                                                                      │
//!                  EventHub ◀──────── commit / chaincode events ◀──────┘
//! ```
//!
//! The library logs through `tracing` and never installs a subscriber.

pub mod channel;
pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod events;
pub mod identity;
pub mod transaction;
pub mod transport;

pub use channel::{Channel, ChannelConfig};
pub use client::Client;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use events::EventHub;
