//! # Events Module
//!
//! Asynchronous notifications from peers: transaction commits and chaincode
//! events, correlated with submitted transactions by transaction id.
//!
//! ```text
//! types.rs        — TxCommit, ChaincodeEvent, TxValidationCode
//! registration.rs — per-registration state machine and handles
//! hub.rs          — EventHub: registry, timers, stream dispatch
//! ```

pub mod hub;
pub mod registration;
pub mod types;

pub use hub::EventHub;
pub use registration::{ChaincodeCallback, RegistrationHandle, RegistrationState, TxCallback};
pub use types::{ChaincodeEvent, EventNotification, TxCommit, TxValidationCode};
