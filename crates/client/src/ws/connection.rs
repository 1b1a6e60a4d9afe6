//! Reconnecting WebSocket client with multiplexed message dispatch.
//!
//! One [`RealtimeClient`] owns one persistent connection. Inbound frames are
//! parsed and fanned out, in registration order, to every registered
//! listener. An unexpected close triggers fixed-delay, capped-attempt
//! reconnection with the identity recorded at `connect()`; a manual
//! [`disconnect`](RealtimeClient::disconnect) suppresses it and fully
//! quiesces the client (listeners are dropped and must be re-registered).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_channel::mpsc::UnboundedReceiver;
use futures_util::StreamExt;
use linnet_shared::{InboundFrame, OutboundFrame, RealtimeError};
use tokio::task::AbortHandle;
use url::Url;

use super::transport::{FrameSink, Transport, TransportEvent, WsTransport};
use crate::session::Identity;

/// How the WebSocket handshake is authenticated. Exactly one scheme is
/// active per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// Ambient session cookie; the URL carries nothing.
    SessionCookie,
    /// Explicit `?token=` query parameter from the stored credential.
    QueryToken,
}

/// Fixed-delay, capped-attempt retry. Intentionally not exponential and not
/// jittered; the delay and cap are construction-time parameters so tests can
/// inject a near-zero delay.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(3000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed,
}

/// Token returned by [`RealtimeClient::on_message`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&InboundFrame) + Send + Sync>;

pub struct RealtimeClient {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Box<dyn Transport>,
    endpoint: String,
    auth: AuthScheme,
    policy: ReconnectPolicy,
    state: Mutex<ConnState>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
}

struct ConnState {
    sink: Option<Box<dyn FrameSink>>,
    identity: Option<Identity>,
    phase: ConnectionState,
    attempts: u32,
    manual_close: bool,
    pending_retry: Option<AbortHandle>,
    /// Incremented per connection attempt; stale pump tasks compare it so a
    /// superseded connection can't close or retry a newer one.
    epoch: u64,
}

impl RealtimeClient {
    /// Client over the real WebSocket transport with the default policy.
    pub fn new(endpoint: impl Into<String>, auth: AuthScheme) -> Self {
        Self::with_transport(Box::new(WsTransport), endpoint, auth, ReconnectPolicy::default())
    }

    pub fn with_transport(
        transport: Box<dyn Transport>,
        endpoint: impl Into<String>,
        auth: AuthScheme,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                endpoint: endpoint.into(),
                auth,
                policy,
                state: Mutex::new(ConnState {
                    sink: None,
                    identity: None,
                    phase: ConnectionState::Idle,
                    attempts: 0,
                    manual_close: false,
                    pending_retry: None,
                    epoch: 0,
                }),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(1),
            }),
        }
    }

    /// Open the connection as `identity`. Resolves when the transport reports
    /// open; errors if it fails first. A failure to open feeds the same retry
    /// policy as an unexpected close, so the caller is not obliged to loop.
    pub async fn connect(&self, identity: Identity) -> Result<(), RealtimeError> {
        {
            let mut st = self.inner.state.lock().unwrap();
            st.manual_close = false;
            st.identity = Some(identity);
            // An explicit connect supersedes any scheduled retry.
            if let Some(retry) = st.pending_retry.take() {
                retry.abort();
            }
        }
        Inner::connect_current(self.inner.clone()).await
    }

    /// Send a private chat message. Returns `false` without any network
    /// action when the connection is not open; never errors.
    pub fn send_direct(&self, to_user_id: &str, text: &str) -> bool {
        self.send_frame(|from| OutboundFrame::direct(from, to_user_id, text))
    }

    /// Send a group chat message. Same contract as [`send_direct`](Self::send_direct).
    pub fn send_group(&self, group_id: &str, text: &str) -> bool {
        self.send_frame(|from| OutboundFrame::group(from, group_id, text))
    }

    fn send_frame(&self, build: impl FnOnce(&str) -> OutboundFrame) -> bool {
        let st = self.inner.state.lock().unwrap();
        let Some(sink) = st.sink.as_ref().filter(|s| s.is_open()) else {
            tracing::warn!("send while websocket is not open");
            return false;
        };
        let Some(identity) = st.identity.as_ref() else {
            return false;
        };
        let frame = build(&identity.user_id);
        let json = match serde_json::to_string(&frame) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize outbound frame");
                return false;
            }
        };
        match sink.send_text(&json) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "websocket send failed");
                false
            }
        }
    }

    /// Register a message listener. Listeners are invoked synchronously, in
    /// registration order, once per successfully parsed inbound frame.
    pub fn on_message(
        &self,
        listener: impl Fn(&InboundFrame) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        self.inner
            .listeners
            .lock()
            .unwrap()
            .push((id, Arc::new(listener)));
        id
    }

    /// Unregister a listener. Unknown ids are ignored.
    pub fn off_message(&self, id: ListenerId) {
        self.inner
            .listeners
            .lock()
            .unwrap()
            .retain(|(lid, _)| *lid != id);
    }

    /// Close the connection, cancel any pending retry and drop all
    /// listeners. Idempotent; a later `connect()` starts from a clean slate.
    pub fn disconnect(&self) {
        {
            let mut st = self.inner.state.lock().unwrap();
            st.manual_close = true;
            if let Some(retry) = st.pending_retry.take() {
                retry.abort();
            }
            if let Some(sink) = st.sink.take() {
                sink.close();
            }
            st.phase = ConnectionState::Closed;
        }
        self.inner.listeners.lock().unwrap().clear();
    }

    /// Whether the transport handle exists and is open. Pure query.
    pub fn is_connected(&self) -> bool {
        self.inner
            .state
            .lock()
            .unwrap()
            .sink
            .as_ref()
            .is_some_and(|s| s.is_open())
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.lock().unwrap().phase
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl Inner {
    fn build_url(&self, identity: &Identity) -> Result<String, RealtimeError> {
        match self.auth {
            AuthScheme::SessionCookie => Ok(self.endpoint.clone()),
            AuthScheme::QueryToken => {
                let token = identity
                    .credential
                    .as_deref()
                    .filter(|t| !t.is_empty())
                    .ok_or(RealtimeError::MissingCredential)?;
                let mut url = Url::parse(&self.endpoint)
                    .map_err(|e| RealtimeError::InvalidEndpoint(e.to_string()))?;
                url.query_pairs_mut().append_pair("token", token);
                Ok(url.into())
            }
        }
    }

    /// One connection attempt with the stored identity. On failure the retry
    /// policy is fed exactly as for an unexpected close, so every failed
    /// attempt re-schedules itself subject to the attempt cap.
    async fn connect_current(inner: Arc<Inner>) -> Result<(), RealtimeError> {
        let (identity, epoch) = {
            let mut st = inner.state.lock().unwrap();
            let Some(identity) = st.identity.clone() else {
                return Err(RealtimeError::Transport("no identity recorded".into()));
            };
            st.epoch += 1;
            st.phase = ConnectionState::Connecting;
            // A superseded connection is closed, not leaked.
            if let Some(old) = st.sink.take() {
                old.close();
            }
            (identity, st.epoch)
        };

        let attempt = async {
            let url = inner.build_url(&identity)?;
            inner.transport.open(&url).await
        };
        let link = match attempt.await {
            Ok(link) => link,
            Err(e) => {
                let retry = {
                    let mut st = inner.state.lock().unwrap();
                    // A superseded attempt's failure is not ours to retry.
                    if st.epoch != epoch {
                        return Err(e);
                    }
                    st.phase = ConnectionState::Closed;
                    !st.manual_close
                };
                if retry {
                    Self::schedule_reconnect(inner.clone());
                }
                return Err(e);
            }
        };

        {
            let mut st = inner.state.lock().unwrap();
            if st.manual_close || st.epoch != epoch {
                // disconnect() or a newer connect raced the open.
                link.sink.close();
                return Err(RealtimeError::Transport("connection superseded".into()));
            }
            st.sink = Some(link.sink);
            st.attempts = 0;
            st.phase = ConnectionState::Open;
        }
        tracing::info!(endpoint = %inner.endpoint, "websocket connected");

        tokio::spawn(Self::pump(inner.clone(), link.events, epoch));
        Ok(())
    }

    /// Drive one connection's inbound events until it closes.
    async fn pump(inner: Arc<Inner>, mut events: UnboundedReceiver<TransportEvent>, epoch: u64) {
        while let Some(event) = events.next().await {
            match event {
                TransportEvent::Frame(text) => match InboundFrame::parse(&text) {
                    Ok(frame) => Self::dispatch(&inner, &frame),
                    Err(e) => tracing::warn!(error = %e, "dropping malformed frame"),
                },
                TransportEvent::Closed => break,
            }
        }
        Self::handle_close(inner, epoch);
    }

    /// Deliver one frame to every listener, in registration order. The set is
    /// snapshotted first so a listener mutating registrations cannot corrupt
    /// the iteration, and a panicking listener is isolated and logged.
    fn dispatch(inner: &Arc<Inner>, frame: &InboundFrame) {
        let listeners: Vec<Listener> = inner
            .listeners
            .lock()
            .unwrap()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            let outcome =
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener(frame)));
            if outcome.is_err() {
                tracing::error!("message listener panicked; continuing delivery");
            }
        }
    }

    fn handle_close(inner: Arc<Inner>, epoch: u64) {
        let retry = {
            let mut st = inner.state.lock().unwrap();
            if st.epoch != epoch {
                return;
            }
            st.sink = None;
            st.phase = ConnectionState::Closed;
            !st.manual_close
        };
        if retry {
            tracing::warn!("websocket closed unexpectedly");
            Self::schedule_reconnect(inner);
        }
    }

    /// Schedule one retry. Consumes one attempt; gives up silently (log only)
    /// once the cap is reached. The scheduled task re-checks `manual_close`
    /// after its sleep and its handle is aborted by `disconnect()`, so a
    /// manual close can never be resurrected by an in-flight timer.
    fn schedule_reconnect(inner: Arc<Inner>) {
        let attempt = {
            let mut st = inner.state.lock().unwrap();
            if st.manual_close {
                return;
            }
            if st.attempts >= inner.policy.max_attempts {
                tracing::error!(
                    attempts = st.attempts,
                    "websocket reconnect abandoned: attempt cap reached"
                );
                return;
            }
            st.attempts += 1;
            st.attempts
        };
        tracing::info!(
            attempt,
            max = inner.policy.max_attempts,
            "scheduling websocket reconnect"
        );

        let task_inner = inner.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(task_inner.policy.delay).await;
            if task_inner.state.lock().unwrap().manual_close {
                return;
            }
            match Self::connect_current(task_inner.clone()).await {
                Ok(()) => tracing::info!(attempt, "websocket reconnected"),
                // A failed attempt already re-scheduled itself.
                Err(e) => tracing::warn!(attempt, error = %e, "reconnect attempt failed"),
            }
        });
        inner.state.lock().unwrap().pending_retry = Some(handle.abort_handle());
    }
}

#[cfg(test)]
mod tests {
    use super::super::transport::TransportLink;
    use super::*;
    use futures_channel::mpsc::{unbounded, UnboundedSender};
    use linnet_shared::DirectMessage;
    use std::sync::atomic::AtomicU32;
    use tokio::time::sleep;

    const SETTLE: Duration = Duration::from_millis(50);

    fn fast_policy(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts,
            delay: Duration::from_millis(1),
        }
    }

    fn identity(user_id: &str) -> Identity {
        Identity {
            user_id: user_id.into(),
            nickname: user_id.into(),
            ..Default::default()
        }
    }

    // --- in-memory transport fake ---

    #[derive(Clone, Default)]
    struct FakeTransport(Arc<FakeState>);

    #[derive(Default)]
    struct FakeState {
        /// Number of upcoming open() calls that must fail.
        remaining_failures: AtomicU32,
        opened_urls: Mutex<Vec<String>>,
        remotes: Mutex<Vec<FakeRemote>>,
    }

    #[derive(Clone)]
    struct FakeRemote {
        events: UnboundedSender<TransportEvent>,
        sent: Arc<Mutex<Vec<String>>>,
        open: Arc<std::sync::atomic::AtomicBool>,
    }

    impl FakeRemote {
        fn push_frame(&self, text: &str) {
            let _ = self.events.unbounded_send(TransportEvent::Frame(text.into()));
        }

        fn drop_connection(&self) {
            self.open.store(false, Ordering::SeqCst);
            let _ = self.events.unbounded_send(TransportEvent::Closed);
        }

        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl FakeTransport {
        fn failing(failures: u32) -> Self {
            let t = Self::default();
            t.0.remaining_failures.store(failures, Ordering::SeqCst);
            t
        }

        fn open_count(&self) -> usize {
            self.0.opened_urls.lock().unwrap().len()
        }

        fn remote(&self, index: usize) -> FakeRemote {
            self.0.remotes.lock().unwrap()[index].clone()
        }

        fn last_remote(&self) -> FakeRemote {
            self.0.remotes.lock().unwrap().last().unwrap().clone()
        }
    }

    struct FakeSink {
        events: UnboundedSender<TransportEvent>,
        sent: Arc<Mutex<Vec<String>>>,
        open: Arc<std::sync::atomic::AtomicBool>,
    }

    impl FrameSink for FakeSink {
        fn send_text(&self, frame: &str) -> Result<(), RealtimeError> {
            if !self.is_open() {
                return Err(RealtimeError::Transport("link is not open".into()));
            }
            self.sent.lock().unwrap().push(frame.to_owned());
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }

        fn close(&self) {
            self.open.store(false, Ordering::SeqCst);
            let _ = self.events.unbounded_send(TransportEvent::Closed);
        }
    }

    #[async_trait::async_trait]
    impl Transport for FakeTransport {
        async fn open(&self, url: &str) -> Result<TransportLink, RealtimeError> {
            self.0.opened_urls.lock().unwrap().push(url.to_owned());
            let failures = self.0.remaining_failures.load(Ordering::SeqCst);
            if failures > 0 {
                self.0
                    .remaining_failures
                    .store(failures - 1, Ordering::SeqCst);
                return Err(RealtimeError::Transport("connection refused".into()));
            }
            let (events_tx, events_rx) = unbounded();
            let sent = Arc::new(Mutex::new(Vec::new()));
            let open = Arc::new(std::sync::atomic::AtomicBool::new(true));
            self.0.remotes.lock().unwrap().push(FakeRemote {
                events: events_tx.clone(),
                sent: sent.clone(),
                open: open.clone(),
            });
            Ok(TransportLink {
                sink: Box::new(FakeSink {
                    events: events_tx,
                    sent,
                    open,
                }),
                events: events_rx,
            })
        }
    }

    fn client(transport: &FakeTransport, policy: ReconnectPolicy) -> RealtimeClient {
        RealtimeClient::with_transport(
            Box::new(transport.clone()),
            "ws://localhost:8080/ws",
            AuthScheme::SessionCookie,
            policy,
        )
    }

    fn collector(client: &RealtimeClient) -> (ListenerId, Arc<Mutex<Vec<InboundFrame>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = client.on_message(move |frame| sink.lock().unwrap().push(frame.clone()));
        (id, seen)
    }

    #[tokio::test]
    async fn delivers_frames_to_listeners_in_arrival_order() {
        let transport = FakeTransport::default();
        let client = client(&transport, fast_policy(5));
        let (_, seen_a) = collector(&client);
        let (_, seen_b) = collector(&client);

        client.connect(identity("u1")).await.unwrap();
        assert!(client.is_connected());
        assert_eq!(client.state(), ConnectionState::Open);

        let remote = transport.remote(0);
        remote.push_frame(r#"{"type":"chat","fromUserId":"a","toUserId":"u1","message":"f1"}"#);
        remote.push_frame(r#"{"type":"group_chat","fromUserId":"a","groupId":"g","message":"f2"}"#);
        remote.push_frame(r#"{"type":"user_online","userId":"u9"}"#);
        sleep(SETTLE).await;

        let seen_a = seen_a.lock().unwrap().clone();
        let seen_b = seen_b.lock().unwrap().clone();
        assert_eq!(seen_a.len(), 3);
        assert_eq!(seen_a, seen_b);
        assert!(matches!(seen_a[0], InboundFrame::Direct(_)));
        assert!(matches!(seen_a[1], InboundFrame::Group(_)));
        // Unknown type is forwarded unmodified.
        assert!(matches!(&seen_a[2], InboundFrame::Other(v) if v["userId"] == "u9"));
    }

    #[tokio::test]
    async fn malformed_frames_are_dropped_without_breaking_delivery() {
        let transport = FakeTransport::default();
        let client = client(&transport, fast_policy(5));
        let (_, seen) = collector(&client);
        client.connect(identity("u1")).await.unwrap();

        let remote = transport.remote(0);
        remote.push_frame("this is not json");
        remote.push_frame(r#"{"type":"chat","message":"missing fields"}"#);
        remote.push_frame(r#"{"type":"chat","fromUserId":"a","toUserId":"u1","message":"ok"}"#);
        sleep(SETTLE).await;

        let seen = seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![InboundFrame::Direct(DirectMessage {
                from_user_id: "a".into(),
                to_user_id: "u1".into(),
                message: "ok".into(),
            })]
        );
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn send_fails_without_an_open_link_and_transmits_nothing() {
        let transport = FakeTransport::default();
        let client = client(&transport, fast_policy(0));
        assert!(!client.send_direct("u2", "hello"));
        assert_eq!(transport.open_count(), 0);

        client.connect(identity("u1")).await.unwrap();
        assert!(client.send_direct("u2", "hello"));
        let remote = transport.remote(0);
        let sent = remote.sent();
        assert_eq!(sent.len(), 1);
        let frame: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(frame["type"], "chat");
        assert_eq!(frame["fromUserId"], "u1");
        assert_eq!(frame["toUserId"], "u2");

        assert!(client.send_group("g1", "hi all"));
        assert_eq!(remote.sent().len(), 2);

        remote.drop_connection();
        assert!(!client.send_direct("u2", "too late"));
        assert_eq!(remote.sent().len(), 2);
    }

    #[tokio::test]
    async fn failing_opens_are_retried_exactly_max_times_then_abandoned() {
        let transport = FakeTransport::failing(u32::MAX);
        let client = client(&transport, fast_policy(3));

        assert!(client.connect(identity("u1")).await.is_err());
        sleep(SETTLE).await;

        // 1 explicit attempt + exactly 3 scheduled retries.
        assert_eq!(transport.open_count(), 4);
        sleep(SETTLE).await;
        assert_eq!(transport.open_count(), 4, "retries must stop permanently");
        assert!(!client.is_connected());
        assert_eq!(client.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn unexpected_close_reconnects_and_keeps_listeners() {
        let transport = FakeTransport::default();
        let client = client(&transport, fast_policy(5));
        let (_, seen) = collector(&client);
        client.connect(identity("u1")).await.unwrap();

        transport.remote(0).drop_connection();
        sleep(SETTLE).await;

        assert_eq!(transport.open_count(), 2);
        assert!(client.is_connected());

        // Listeners survive an unexpected close (only disconnect clears them).
        transport
            .last_remote()
            .push_frame(r#"{"type":"chat","fromUserId":"a","toUserId":"u1","message":"back"}"#);
        sleep(SETTLE).await;
        assert_eq!(seen.lock().unwrap().len(), 1);

        // A successful open reset the counter: the next drop reconnects again.
        transport.last_remote().drop_connection();
        sleep(SETTLE).await;
        assert_eq!(transport.open_count(), 3);
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn attempt_counter_is_consumed_across_failed_retries() {
        // First open succeeds, then every retry fails.
        let transport = FakeTransport::default();
        let client = client(&transport, fast_policy(2));
        client.connect(identity("u1")).await.unwrap();

        transport.0.remaining_failures.store(u32::MAX, Ordering::SeqCst);
        transport.remote(0).drop_connection();
        sleep(SETTLE).await;

        // 1 initial + exactly 2 scheduled retries, both failing.
        assert_eq!(transport.open_count(), 3);
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn disconnect_during_pending_retry_prevents_any_new_link() {
        let transport = FakeTransport::default();
        let policy = ReconnectPolicy {
            max_attempts: 5,
            delay: Duration::from_millis(200),
        };
        let client = client(&transport, policy);
        client.connect(identity("u1")).await.unwrap();

        transport.remote(0).drop_connection();
        sleep(Duration::from_millis(20)).await; // retry is now pending
        client.disconnect();
        sleep(Duration::from_millis(400)).await;

        assert_eq!(transport.open_count(), 1, "no reconnect after disconnect");
        assert!(!client.is_connected());
        assert_eq!(client.state(), ConnectionState::Closed);
    }

    /// First open parks until released, then fails; later opens delegate to
    /// the normal fake.
    struct SlowFirstFailure {
        inner: FakeTransport,
        gate: Arc<tokio::sync::Notify>,
        first: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl Transport for SlowFirstFailure {
        async fn open(&self, url: &str) -> Result<TransportLink, RealtimeError> {
            if self.first.swap(false, Ordering::SeqCst) {
                self.gate.notified().await;
                return Err(RealtimeError::Transport("connection refused".into()));
            }
            self.inner.open(url).await
        }
    }

    #[tokio::test]
    async fn superseded_failed_attempt_does_not_retry_over_a_newer_connection() {
        let transport = FakeTransport::default();
        let gate = Arc::new(tokio::sync::Notify::new());
        let client = RealtimeClient::with_transport(
            Box::new(SlowFirstFailure {
                inner: transport.clone(),
                gate: gate.clone(),
                first: std::sync::atomic::AtomicBool::new(true),
            }),
            "ws://localhost:8080/ws",
            AuthScheme::SessionCookie,
            fast_policy(5),
        );

        let (first, second) = tokio::join!(
            // Parks inside the transport until the gate is released.
            client.connect(identity("u1")),
            async {
                sleep(Duration::from_millis(10)).await;
                let second = client.connect(identity("u1")).await;
                sleep(Duration::from_millis(10)).await;
                // Now let the stale first attempt come back with its failure.
                gate.notify_one();
                second
            }
        );
        assert!(first.is_err());
        second.unwrap();
        sleep(SETTLE).await;

        // The stale failure must not schedule a retry that would bump the
        // epoch and close the healthy connection.
        assert_eq!(transport.open_count(), 1);
        assert!(client.is_connected());
        assert_eq!(client.state(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_and_clears_listeners() {
        let transport = FakeTransport::default();
        let client = client(&transport, fast_policy(5));
        let (_, seen) = collector(&client);
        client.connect(identity("u1")).await.unwrap();

        client.disconnect();
        client.disconnect();
        assert!(!client.is_connected());

        // A fresh connect starts with an empty listener set.
        client.connect(identity("u1")).await.unwrap();
        transport
            .last_remote()
            .push_frame(r#"{"type":"chat","fromUserId":"a","toUserId":"u1","message":"x"}"#);
        sleep(SETTLE).await;
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn panicking_listener_does_not_block_later_listeners() {
        let transport = FakeTransport::default();
        let client = client(&transport, fast_policy(5));
        client.on_message(|_| panic!("listener bug"));
        let (_, seen) = collector(&client);
        client.connect(identity("u1")).await.unwrap();

        let remote = transport.remote(0);
        remote.push_frame(r#"{"type":"chat","fromUserId":"a","toUserId":"u1","message":"1"}"#);
        remote.push_frame(r#"{"type":"chat","fromUserId":"a","toUserId":"u1","message":"2"}"#);
        sleep(SETTLE).await;

        // The set is intact: both frames reached the second listener.
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn off_message_unregisters() {
        let transport = FakeTransport::default();
        let client = client(&transport, fast_policy(5));
        let (id_a, seen_a) = collector(&client);
        let (_, seen_b) = collector(&client);
        client.connect(identity("u1")).await.unwrap();

        client.off_message(id_a);
        transport
            .remote(0)
            .push_frame(r#"{"type":"chat","fromUserId":"a","toUserId":"u1","message":"x"}"#);
        sleep(SETTLE).await;

        assert!(seen_a.lock().unwrap().is_empty());
        assert_eq!(seen_b.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn query_token_auth_carries_the_credential() {
        let transport = FakeTransport::default();
        let client = RealtimeClient::with_transport(
            Box::new(transport.clone()),
            "ws://localhost:8080/ws",
            AuthScheme::QueryToken,
            fast_policy(0),
        );
        let id = Identity {
            credential: Some("t0k en".into()),
            ..identity("u1")
        };
        client.connect(id).await.unwrap();
        let urls = transport.0.opened_urls.lock().unwrap().clone();
        assert_eq!(urls, vec!["ws://localhost:8080/ws?token=t0k+en".to_string()]);
    }

    #[tokio::test]
    async fn query_token_auth_without_credential_fails_before_opening() {
        let transport = FakeTransport::default();
        let client = RealtimeClient::with_transport(
            Box::new(transport.clone()),
            "ws://localhost:8080/ws",
            AuthScheme::QueryToken,
            fast_policy(0),
        );
        let err = client.connect(identity("u1")).await.unwrap_err();
        assert_eq!(err, RealtimeError::MissingCredential);
        assert_eq!(transport.open_count(), 0);
    }

    #[tokio::test]
    async fn session_cookie_auth_leaves_the_url_untouched() {
        let transport = FakeTransport::default();
        let client = client(&transport, fast_policy(0));
        client.connect(identity("u1")).await.unwrap();
        let urls = transport.0.opened_urls.lock().unwrap().clone();
        assert_eq!(urls, vec!["ws://localhost:8080/ws".to_string()]);
    }
}
