//! Event registrations.
//!
//! Each registration lives in a [`RegistrationCell`] shared between the hub's
//! registry, its deadline timer and the caller's [`RegistrationHandle`].
//! The cell's state only ever moves out of `Registered` once: whoever makes
//! that move (a matching notification, the timer, or `unregister`) takes
//! the callback, and everyone after it finds a terminal state and an empty
//! slot.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use regex::Regex;
use tokio::task::AbortHandle;
use uuid::Uuid;

use super::types::{ChaincodeEvent, EventNotification, TxCommit};
use crate::error::{ClientError, Result};
use crate::identity::TransactionId;

/// Lifecycle of a registration. Every state but `Registered` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistrationState {
    Registered,
    Fired,
    TimedOut,
    Unregistered,
}

impl RegistrationState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Registered)
    }
}

/// Callback for transaction-commit registrations.
pub type TxCallback = Box<dyn FnOnce(Result<TxCommit>) + Send + 'static>;

/// Callback for chaincode-event registrations.
pub type ChaincodeCallback = Box<dyn FnOnce(Result<ChaincodeEvent>) + Send + 'static>;

pub(crate) enum Callback {
    Tx(TxCallback),
    Chaincode(ChaincodeCallback),
}

impl Callback {
    /// Delivers a matched notification. Commits with a validation code other
    /// than `VALID` are delivered as [`ClientError::InvalidTransaction`].
    pub(crate) fn deliver(self, notification: &EventNotification) {
        match (self, notification) {
            (Self::Tx(cb), EventNotification::TxCommit(commit)) => {
                if commit.validation_code.is_valid() {
                    cb(Ok(commit.clone()))
                } else {
                    cb(Err(ClientError::InvalidTransaction {
                        tx_id: commit.tx_id.to_string(),
                        code: commit.validation_code.to_string(),
                    }))
                }
            }
            (Self::Chaincode(cb), EventNotification::Chaincode(event)) => cb(Ok(event.clone())),
            // Matchers only accept their own notification type.
            (Self::Tx(_), _) | (Self::Chaincode(_), _) => {}
        }
    }

    pub(crate) fn fail(self, error: ClientError) {
        match self {
            Self::Tx(cb) => cb(Err(error)),
            Self::Chaincode(cb) => cb(Err(error)),
        }
    }
}

/// What a registration listens for.
#[derive(Debug, Clone)]
pub(crate) enum Matcher {
    Tx(TransactionId),
    Chaincode { chaincode_id: String, pattern: Regex },
}

impl Matcher {
    /// Chaincode ids compare exactly. Event names are searched with the
    /// pattern unanchored, so `"^evt$"` is needed for an exact match.
    pub(crate) fn matches(&self, notification: &EventNotification) -> bool {
        match (self, notification) {
            (Self::Tx(tx_id), EventNotification::TxCommit(commit)) => &commit.tx_id == tx_id,
            (
                Self::Chaincode {
                    chaincode_id,
                    pattern,
                },
                EventNotification::Chaincode(event),
            ) => &event.chaincode_id == chaincode_id && pattern.is_match(&event.event_name),
            _ => false,
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tx(tx_id) => write!(f, "tx {tx_id}"),
            Self::Chaincode {
                chaincode_id,
                pattern,
            } => write!(f, "chaincode {chaincode_id} /{pattern}/"),
        }
    }
}

struct Slot {
    state: RegistrationState,
    callback: Option<Callback>,
    timer: Option<AbortHandle>,
}

pub(crate) struct RegistrationCell {
    id: Uuid,
    matcher: Matcher,
    timeout: Duration,
    slot: Mutex<Slot>,
}

impl RegistrationCell {
    pub(crate) fn new(matcher: Matcher, timeout: Duration, callback: Callback) -> Self {
        Self {
            id: Uuid::new_v4(),
            matcher,
            timeout,
            slot: Mutex::new(Slot {
                state: RegistrationState::Registered,
                callback: Some(callback),
                timer: None,
            }),
        }
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn state(&self) -> RegistrationState {
        self.slot.lock().state
    }

    /// Attaches the deadline timer. Aborts it straight away if the cell
    /// already settled.
    pub(crate) fn arm(&self, timer: AbortHandle) {
        let mut slot = self.slot.lock();
        if slot.state.is_terminal() {
            timer.abort();
        } else {
            slot.timer = Some(timer);
        }
    }

    /// Moves `Registered -> to` and hands back the callback. `None` when the
    /// cell had already settled. The timer is aborted unless it is the one
    /// settling.
    pub(crate) fn settle(&self, to: RegistrationState) -> Option<Callback> {
        let mut slot = self.slot.lock();
        if slot.state.is_terminal() {
            return None;
        }
        slot.state = to;
        if let Some(timer) = slot.timer.take() {
            if to != RegistrationState::TimedOut {
                timer.abort();
            }
        }
        slot.callback.take()
    }
}

/// Caller's reference to a registration, used to inspect or cancel it.
#[derive(Clone)]
pub struct RegistrationHandle {
    cell: Arc<RegistrationCell>,
}

impl RegistrationHandle {
    pub(crate) fn new(cell: Arc<RegistrationCell>) -> Self {
        Self { cell }
    }

    pub fn id(&self) -> Uuid {
        self.cell.id()
    }

    pub fn state(&self) -> RegistrationState {
        self.cell.state()
    }

    pub fn is_active(&self) -> bool {
        !self.state().is_terminal()
    }

    pub(crate) fn cell(&self) -> &Arc<RegistrationCell> {
        &self.cell
    }
}

impl fmt::Debug for RegistrationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationHandle")
            .field("id", &self.cell.id())
            .field("matcher", &self.cell.matcher().to_string())
            .field("state", &self.state())
            .finish()
    }
}
