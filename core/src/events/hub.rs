//! # Event Hub
//!
//! Registration, timeout and delivery of transaction-commit and chaincode
//! events coming from one peer's event stream.
//!
//! ## Design
//!
//! - The registry is a `parking_lot::Mutex<HashMap<Uuid, Arc<RegistrationCell>>>`.
//!   It is only held to insert, remove or snapshot matching cells, never
//!   while a callback runs.
//! - Every registration arms a deadline timer (a spawned tokio task). The
//!   timer holds a weak reference to the hub, so dropping the hub does not
//!   wait for outstanding deadlines.
//! - A notification is matched against every pending registration before it
//!   is discarded. Each matching registration fires once and is removed.
//! - [`EventHub::connect`] spawns a dispatch task that feeds the peer's
//!   stream into [`EventHub::process_notification`]. Tests and embedders with
//!   their own stream can call `process_notification` directly.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use regex::Regex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::registration::{
    Callback, Matcher, RegistrationCell, RegistrationHandle, RegistrationState,
};
use super::types::{ChaincodeEvent, EventNotification, TxCommit};
use crate::error::{ClientError, Result};
use crate::identity::TransactionId;
use crate::transport::{PeerEventTransport, PeerRef};

struct Connection {
    peer: PeerRef,
    task: JoinHandle<()>,
}

struct HubInner {
    registry: Mutex<HashMap<Uuid, Arc<RegistrationCell>>>,
    default_timeout: Duration,
    transport: Option<Arc<dyn PeerEventTransport>>,
    connection: Mutex<Option<Connection>>,
}

impl HubInner {
    fn unregister(&self, handle: &RegistrationHandle) -> bool {
        self.registry.lock().remove(&handle.id());
        // The callback is dropped here, never called.
        let cancelled = handle
            .cell()
            .settle(RegistrationState::Unregistered)
            .is_some();
        if cancelled {
            debug!(registration = %handle.id(), "registration cancelled");
        }
        cancelled
    }

    fn dispatch(&self, notification: &EventNotification) -> usize {
        let matched: Vec<Arc<RegistrationCell>> = {
            let mut registry = self.registry.lock();
            let ids: Vec<Uuid> = registry
                .values()
                .filter(|cell| cell.matcher().matches(notification))
                .map(|cell| cell.id())
                .collect();
            let cells: Vec<Arc<RegistrationCell>> =
                ids.iter().filter_map(|id| registry.remove(id)).collect();
            cells
        };

        let mut delivered = 0;
        for cell in matched {
            if let Some(callback) = cell.settle(RegistrationState::Fired) {
                debug!(registration = %cell.id(), matcher = %cell.matcher(), "delivering event");
                callback.deliver(notification);
                delivered += 1;
            }
        }
        delivered
    }
}

impl Drop for HubInner {
    fn drop(&mut self) {
        if let Some(conn) = self.connection.get_mut().take() {
            conn.task.abort();
        }
    }
}

/// Event subscription manager for one peer.
///
/// Cheap to clone; clones share registrations and the connection.
#[derive(Clone)]
pub struct EventHub {
    inner: Arc<HubInner>,
}

impl EventHub {
    /// A hub without a transport. Notifications must be fed through
    /// [`EventHub::process_notification`].
    pub fn new(default_timeout: Duration) -> Self {
        Self::build(None, default_timeout)
    }

    /// A hub that can [`connect`](EventHub::connect) to peers through
    /// `transport`.
    pub fn with_transport(transport: Arc<dyn PeerEventTransport>, default_timeout: Duration) -> Self {
        Self::build(Some(transport), default_timeout)
    }

    fn build(transport: Option<Arc<dyn PeerEventTransport>>, default_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(HubInner {
                registry: Mutex::new(HashMap::new()),
                default_timeout,
                transport,
                connection: Mutex::new(None),
            }),
        }
    }

    /// Timeout configured for this hub, used by callers that have no
    /// specific deadline of their own.
    pub fn default_timeout(&self) -> Duration {
        self.inner.default_timeout
    }

    /// Number of registrations still waiting.
    pub fn pending_count(&self) -> usize {
        self.inner.registry.lock().len()
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Waits for the commit of `tx_id`.
    ///
    /// `on_event` runs at most once: `Ok` for a `VALID` commit,
    /// `Err(InvalidTransaction)` for any other validation code,
    /// `Err(Timeout)` if nothing arrives within `timeout`.
    ///
    /// # Errors
    ///
    /// [`ClientError::Config`] when called outside a tokio runtime, which
    /// the deadline timer needs.
    pub fn register_tx_event<F>(
        &self,
        tx_id: TransactionId,
        timeout: Duration,
        on_event: F,
    ) -> Result<RegistrationHandle>
    where
        F: FnOnce(Result<TxCommit>) + Send + 'static,
    {
        self.register(Matcher::Tx(tx_id), timeout, Callback::Tx(Box::new(on_event)))
    }

    /// Waits for the first event of `chaincode_id` whose name matches the
    /// regular expression `event_name_pattern`.
    ///
    /// # Errors
    ///
    /// - [`ClientError::InvalidRequest`] for an empty chaincode id or a
    ///   pattern that does not compile.
    /// - [`ClientError::Config`] when called outside a tokio runtime.
    pub fn register_chaincode_event<F>(
        &self,
        chaincode_id: impl Into<String>,
        event_name_pattern: &str,
        timeout: Duration,
        on_event: F,
    ) -> Result<RegistrationHandle>
    where
        F: FnOnce(Result<ChaincodeEvent>) + Send + 'static,
    {
        let chaincode_id = chaincode_id.into();
        if chaincode_id.is_empty() {
            return Err(ClientError::InvalidRequest(
                "chaincode event registration needs a chaincode id".into(),
            ));
        }
        let pattern = Regex::new(event_name_pattern).map_err(|e| {
            ClientError::InvalidRequest(format!(
                "invalid event name pattern '{event_name_pattern}': {e}"
            ))
        })?;
        self.register(
            Matcher::Chaincode {
                chaincode_id,
                pattern,
            },
            timeout,
            Callback::Chaincode(Box::new(on_event)),
        )
    }

    fn register(
        &self,
        matcher: Matcher,
        timeout: Duration,
        callback: Callback,
    ) -> Result<RegistrationHandle> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            ClientError::Config("event registration needs a running tokio runtime".into())
        })?;
        let cell = Arc::new(RegistrationCell::new(matcher, timeout, callback));
        let id = cell.id();
        self.inner.registry.lock().insert(id, Arc::clone(&cell));
        debug!(registration = %id, matcher = %cell.matcher(), timeout_ms = timeout.as_millis() as u64, "registered");

        let hub: Weak<HubInner> = Arc::downgrade(&self.inner);
        let timer_cell = Arc::clone(&cell);
        let timer = runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = hub.upgrade() {
                inner.registry.lock().remove(&id);
            }
            if let Some(callback) = timer_cell.settle(RegistrationState::TimedOut) {
                warn!(registration = %id, matcher = %timer_cell.matcher(), "registration timed out");
                callback.fail(ClientError::Timeout {
                    waited_ms: timer_cell.timeout().as_millis() as u64,
                });
            }
        });
        cell.arm(timer.abort_handle());

        Ok(RegistrationHandle::new(cell))
    }

    /// Cancels a registration. Returns `true` if it was still pending; the
    /// callback is then guaranteed never to run. Repeated calls are no-ops.
    pub fn unregister(&self, handle: &RegistrationHandle) -> bool {
        self.inner.unregister(handle)
    }

    // -----------------------------------------------------------------------
    // Awaitable helpers
    // -----------------------------------------------------------------------

    /// Registers for `tx_id` and waits for the outcome. Dropping the future
    /// unregisters.
    pub async fn wait_for_tx_event(&self, tx_id: TransactionId, timeout: Duration) -> Result<TxCommit> {
        let (tx, rx) = oneshot::channel();
        let handle = self.register_tx_event(tx_id, timeout, move |res| {
            let _ = tx.send(res);
        })?;
        let _guard = UnregisterOnDrop {
            hub: Arc::clone(&self.inner),
            handle,
        };
        rx.await.unwrap_or_else(|_| Err(cancelled()))
    }

    /// Registers for a chaincode event and waits for it. Dropping the future
    /// unregisters.
    pub async fn wait_for_chaincode_event(
        &self,
        chaincode_id: impl Into<String>,
        event_name_pattern: &str,
        timeout: Duration,
    ) -> Result<ChaincodeEvent> {
        let (tx, rx) = oneshot::channel();
        let handle = self.register_chaincode_event(chaincode_id, event_name_pattern, timeout, move |res| {
            let _ = tx.send(res);
        })?;
        let _guard = UnregisterOnDrop {
            hub: Arc::clone(&self.inner),
            handle,
        };
        rx.await.unwrap_or_else(|_| Err(cancelled()))
    }

    // -----------------------------------------------------------------------
    // Delivery
    // -----------------------------------------------------------------------

    /// Delivers `notification` to every matching registration. Returns how
    /// many callbacks ran.
    pub fn process_notification(&self, notification: &EventNotification) -> usize {
        self.inner.dispatch(notification)
    }

    /// Opens `peer`'s event stream and starts dispatching it.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Config`] when the hub was built without a transport.
    /// - [`ClientError::InvalidRequest`] when already connected.
    /// - [`ClientError::TransportError`] when the subscription fails.
    pub async fn connect(&self, peer: PeerRef) -> Result<()> {
        let transport = self
            .inner
            .transport
            .clone()
            .ok_or_else(|| ClientError::Config("event hub has no event transport".into()))?;
        ensure_disconnected(&self.inner.connection.lock())?;

        let mut stream = transport.subscribe(&peer).await?;

        // Another connect may have finished while subscribing. Check and
        // install under one lock; the losing stream is dropped.
        let mut connection = self.inner.connection.lock();
        ensure_disconnected(&connection)?;

        let hub = Arc::downgrade(&self.inner);
        let stream_peer = peer.clone();
        let task = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(notification) => match hub.upgrade() {
                        Some(inner) => {
                            inner.dispatch(&notification);
                        }
                        None => break,
                    },
                    Err(e) => {
                        warn!(peer = %stream_peer, error = %e, "event stream failed");
                        break;
                    }
                }
            }
            debug!(peer = %stream_peer, "event stream closed");
        });

        info!(peer = %peer, "event hub connected");
        *connection = Some(Connection { peer, task });
        Ok(())
    }

    /// Stops dispatching. Pending registrations stay registered and run out
    /// their timers.
    pub fn disconnect(&self) {
        if let Some(conn) = self.inner.connection.lock().take() {
            conn.task.abort();
            info!(peer = %conn.peer, "event hub disconnected");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner
            .connection
            .lock()
            .as_ref()
            .is_some_and(|conn| !conn.task.is_finished())
    }

    pub fn connected_peer(&self) -> Option<PeerRef> {
        self.inner
            .connection
            .lock()
            .as_ref()
            .map(|conn| conn.peer.clone())
    }
}

/// Fails while a dispatch task is still running. A finished task counts as
/// disconnected.
fn ensure_disconnected(connection: &Option<Connection>) -> Result<()> {
    match connection {
        Some(conn) if !conn.task.is_finished() => Err(ClientError::InvalidRequest(format!(
            "event hub is already connected to {}",
            conn.peer
        ))),
        _ => Ok(()),
    }
}

fn cancelled() -> ClientError {
    ClientError::InvalidRequest("event registration was cancelled".into())
}

struct UnregisterOnDrop {
    hub: Arc<HubInner>,
    handle: RegistrationHandle,
}

impl Drop for UnregisterOnDrop {
    fn drop(&mut self) {
        self.hub.unregister(&self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::TxValidationCode;
    use crate::transport::MemoryEventSource;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn commit(tx_id: &TransactionId, code: TxValidationCode) -> EventNotification {
        EventNotification::TxCommit(TxCommit {
            tx_id: tx_id.clone(),
            validation_code: code,
            block_number: 1,
        })
    }

    fn cc_event(cc: &str, name: &str) -> EventNotification {
        EventNotification::Chaincode(ChaincodeEvent {
            chaincode_id: cc.into(),
            tx_id: TransactionId::from_string("t1"),
            event_name: name.into(),
            payload: b"data".to_vec(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn tx_event_fires_once() {
        let hub = EventHub::new(Duration::from_secs(30));
        let tx_id = TransactionId::from_string("abc");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handle = hub
            .register_tx_event(tx_id.clone(), Duration::from_secs(5), move |res| {
                assert!(res.is_ok());
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert_eq!(hub.process_notification(&commit(&tx_id, TxValidationCode::Valid)), 1);
        assert_eq!(hub.process_notification(&commit(&tx_id, TxValidationCode::Valid)), 0);
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(handle.state(), RegistrationState::Fired);
        assert_eq!(hub.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unregistered_callback_never_runs() {
        let hub = EventHub::new(Duration::from_secs(30));
        let tx_id = TransactionId::from_string("abc");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handle = hub
            .register_tx_event(tx_id.clone(), Duration::from_millis(100), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert!(hub.unregister(&handle));
        assert!(!hub.unregister(&handle));
        assert_eq!(hub.process_notification(&commit(&tx_id, TxValidationCode::Valid)), 0);
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(handle.state(), RegistrationState::Unregistered);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_reported_no_earlier_than_deadline() {
        let hub = EventHub::new(Duration::from_secs(30));
        let start = tokio::time::Instant::now();
        let result = hub
            .wait_for_chaincode_event("end2end", "^evt$", Duration::from_millis(750))
            .await;
        assert_eq!(result, Err(ClientError::Timeout { waited_ms: 750 }));
        assert!(start.elapsed() >= Duration::from_millis(750));
        assert_eq!(hub.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_commit_is_an_error() {
        let hub = EventHub::new(Duration::from_secs(30));
        let tx_id = TransactionId::from_string("abc");
        let waiter = {
            let hub = hub.clone();
            let tx_id = tx_id.clone();
            tokio::spawn(async move { hub.wait_for_tx_event(tx_id, Duration::from_secs(5)).await })
        };
        while hub.pending_count() == 0 {
            tokio::task::yield_now().await;
        }
        hub.process_notification(&commit(&tx_id, TxValidationCode::EndorsementPolicyFailure));

        let result = waiter.await.unwrap();
        assert_eq!(
            result,
            Err(ClientError::InvalidTransaction {
                tx_id: "abc".into(),
                code: "ENDORSEMENT_POLICY_FAILURE".into(),
            })
        );
    }

    #[tokio::test]
    async fn invalid_pattern_is_rejected() {
        let hub = EventHub::new(Duration::from_secs(30));
        let err = hub
            .register_chaincode_event("end2end", "(unclosed", Duration::from_secs(1), |_| {})
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidRequest(_)));
        assert_eq!(hub.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn one_notification_reaches_every_matching_registration() {
        let hub = EventHub::new(Duration::from_secs(30));
        let calls = Arc::new(AtomicUsize::new(0));
        for pattern in ["^move", "done$", "^query"] {
            let counter = calls.clone();
            hub.register_chaincode_event("end2end", pattern, Duration::from_secs(5), move |res| {
                assert_eq!(res.unwrap().payload, b"data".to_vec());
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        assert_eq!(hub.process_notification(&cc_event("end2end", "move_done")), 2);
        assert_eq!(hub.pending_count(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_wait_future_unregisters() {
        let hub = EventHub::new(Duration::from_secs(30));
        let wait = hub.wait_for_tx_event(TransactionId::from_string("x"), Duration::from_secs(5));
        let _ = tokio::time::timeout(Duration::from_millis(10), wait).await;
        assert_eq!(hub.pending_count(), 0);
    }

    #[test]
    fn registration_outside_runtime_is_a_config_error() {
        let hub = EventHub::new(Duration::from_secs(1));
        let err = hub
            .register_tx_event(TransactionId::from_string("abc"), Duration::from_secs(1), |_| {})
            .unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
        let err = hub
            .register_chaincode_event("end2end", "^evt$", Duration::from_secs(1), |_| {})
            .unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
        assert_eq!(hub.pending_count(), 0);
    }

    /// Yields once before subscribing so that concurrent connects overlap.
    struct YieldingTransport(Arc<MemoryEventSource>);

    #[async_trait::async_trait]
    impl PeerEventTransport for YieldingTransport {
        async fn subscribe(
            &self,
            peer: &PeerRef,
        ) -> std::result::Result<crate::transport::NotificationStream, crate::transport::TransportError>
        {
            tokio::task::yield_now().await;
            self.0.subscribe(peer).await
        }
    }

    #[tokio::test]
    async fn concurrent_connects_keep_a_single_live_connection() {
        let source = Arc::new(MemoryEventSource::new());
        let hub = EventHub::with_transport(
            Arc::new(YieldingTransport(Arc::clone(&source))),
            Duration::from_secs(5),
        );
        let peer = PeerRef::new("peer1", "grpcs://localhost:7053");

        let (a, b) = tokio::join!(hub.connect(peer.clone()), hub.connect(peer.clone()));
        assert_eq!(
            [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(),
            1,
            "{a:?} {b:?}"
        );
        assert!(matches!(
            a.err().or(b.err()),
            Some(ClientError::InvalidRequest(_))
        ));
        assert!(hub.is_connected());

        let tx_id = TransactionId::from_string("abc");
        let wait = hub.wait_for_tx_event(tx_id.clone(), Duration::from_secs(5));
        let (result, _) = tokio::join!(wait, async {
            while hub.pending_count() == 0 {
                tokio::task::yield_now().await;
            }
            source.publish(commit(&tx_id, TxValidationCode::Valid));
        });
        assert_eq!(result.unwrap().tx_id, tx_id);
    }

    #[tokio::test]
    async fn connect_without_transport_fails() {
        let hub = EventHub::new(Duration::from_secs(1));
        let err = hub
            .connect(PeerRef::new("peer1", "grpcs://localhost:7053"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
        assert!(!hub.is_connected());
    }
}
