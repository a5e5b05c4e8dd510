/*
[INPUT]:  Endpoint URL, transport, connection timings, session hooks
[OUTPUT]: Connection state machine with liveness probing and reconnection
[POS]:    WebSocket layer - connection manager
[UPDATE]: When changing reconnection policy, liveness protocol or state transitions
*/

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ConnectionSettings;
use crate::error::{OkxWsError, Result};

use super::transport::{
    CLOSE_ABNORMAL, CLOSE_GOING_AWAY, CLOSE_NORMAL, OutboundFrame, Transport, TransportEvent,
};

/// Liveness check frame; plain text, not JSON
pub const PING: &str = "ping";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Connected,
    Reconnecting,
}

/// Callbacks from the connection manager into the session layer
#[async_trait]
pub trait ConnectionHooks: Send + Sync {
    /// Runs on every transition into `Connected`, before `connect` returns
    async fn after_connected(&self) -> Result<()>;

    /// Every inbound text frame, in arrival order
    fn on_message(&self, text: &str);
}

/// Owns the physical connection and its state
#[derive(Clone)]
pub struct Connector {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("url", &self.shared.url)
            .field("state", &self.state())
            .field("settings", &self.shared.settings)
            .finish()
    }
}

struct Shared {
    url: String,
    settings: ConnectionSettings,
    transport: Arc<dyn Transport>,
    hooks: Weak<dyn ConnectionHooks>,
    state: watch::Sender<ConnectionState>,
    outbound: Mutex<Option<mpsc::Sender<OutboundFrame>>>,
    /// Identifies the live connection; stale reader tasks compare against it
    epoch: AtomicU64,
    reconnect_attempts: AtomicU32,
    connect_lock: Mutex<()>,
    /// Cancelled by an intentional `close`
    shutdown: StdMutex<CancellationToken>,
    /// Highest epoch whose connection has closed
    closed_epoch: watch::Sender<u64>,
}

impl Connector {
    pub fn new(
        url: impl Into<String>,
        settings: ConnectionSettings,
        transport: Arc<dyn Transport>,
        hooks: Weak<dyn ConnectionHooks>,
    ) -> Self {
        let (state, _rx) = watch::channel(ConnectionState::Closed);
        Self {
            shared: Arc::new(Shared {
                url: url.into(),
                settings,
                transport,
                hooks,
                state,
                outbound: Mutex::new(None),
                epoch: AtomicU64::new(0),
                reconnect_attempts: AtomicU32::new(0),
                connect_lock: Mutex::new(()),
                shutdown: StdMutex::new(CancellationToken::new()),
                closed_epoch: watch::channel(0).0,
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Subscribe to connection state changes
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Connect and run the session bootstrap. No-op when already connected.
    /// A `close` that lands while the transport is opening wins; the new
    /// connection is discarded. `NotConnected` when the connection drops
    /// before the bootstrap settles; the background reconnect takes over.
    pub async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        self.shared.fresh_shutdown_if_cancelled();
        self.shared.establish().await
    }

    /// Retry connecting until it succeeds or the attempt budget is spent.
    /// No-op while connected or while another reconnect is running.
    pub async fn reconnect(&self) -> Result<()> {
        self.shared.fresh_shutdown_if_cancelled();
        self.shared.reconnect().await
    }

    /// Send one text frame; fails fast unless connected
    pub async fn send(&self, payload: String) -> Result<()> {
        self.shared.send_text(payload).await
    }

    /// Close with the normal-closure code. No reconnect follows.
    pub async fn close(&self) -> Result<()> {
        self.shared.shutdown_token().cancel();

        let sender = self.shared.outbound.lock().await.clone();
        let mut state_rx = self.shared.state.subscribe();
        match sender {
            Some(sender) if self.is_connected() => {
                sender
                    .send(OutboundFrame::Close { code: CLOSE_NORMAL })
                    .await
                    .map_err(|_| OkxWsError::WebSocket("send channel closed".to_string()))?;
                state_rx
                    .wait_for(|state| *state == ConnectionState::Closed)
                    .await
                    .map_err(|_| OkxWsError::WebSocket("state channel closed".to_string()))?;
            }
            _ => {
                self.shared.state.send_replace(ConnectionState::Closed);
            }
        }
        info!(url = %self.shared.url, "ws connection closed by client");
        Ok(())
    }

    /// Best-effort synchronous close for drop paths
    pub fn shutdown(&self) {
        self.shared.shutdown_token().cancel();
        if let Ok(guard) = self.shared.outbound.try_lock()
            && let Some(sender) = guard.as_ref()
        {
            let _ = sender.try_send(OutboundFrame::Close { code: CLOSE_NORMAL });
        }
    }
}

impl Shared {
    fn shutdown_token(&self) -> CancellationToken {
        self.shutdown
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// A previous `close` must not cancel a later connection's reconnects
    fn fresh_shutdown_if_cancelled(&self) {
        let mut token = self
            .shutdown
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if token.is_cancelled() {
            *token = CancellationToken::new();
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    async fn establish(self: &Arc<Self>) -> Result<()> {
        match self.open(false).await? {
            Some(epoch) => self.bootstrap(epoch).await,
            None => Ok(()),
        }
    }

    /// Run the session hooks for `epoch`. Outside the connect lock so a
    /// reconnect can proceed if this connection drops before they settle.
    async fn bootstrap(self: &Arc<Self>, epoch: u64) -> Result<()> {
        let Some(hooks) = self.hooks.upgrade() else {
            return Ok(());
        };
        let mut closed = self.closed_epoch.subscribe();
        tokio::select! {
            result = hooks.after_connected() => result,
            _ = closed.wait_for(|closed| *closed >= epoch) => {
                debug!(epoch, "ws connection dropped during session bootstrap");
                Err(OkxWsError::NotConnected)
            }
        }
    }

    /// Open the transport. Returns the new epoch, or None when there was
    /// nothing to do or a `close` landed while the transport was opening.
    async fn open(self: &Arc<Self>, reconnecting: bool) -> Result<Option<u64>> {
        let _guard = self.connect_lock.lock().await;
        if self.state() == ConnectionState::Connected {
            return Ok(None);
        }
        let shutdown = self.shutdown_token();
        if shutdown.is_cancelled() {
            return Ok(None);
        }
        let marked_connecting = !reconnecting && self.state() != ConnectionState::Reconnecting;
        if marked_connecting {
            self.state.send_replace(ConnectionState::Connecting);
        }

        info!(url = %self.url, reconnecting, "connecting ws");
        let session = match self.transport.connect(&self.url).await {
            Ok(session) => session,
            Err(err) => {
                if marked_connecting {
                    self.state.send_replace(ConnectionState::Closed);
                }
                let err = match err {
                    OkxWsError::Connect(_) => err,
                    other => OkxWsError::Connect(other.to_string()),
                };
                warn!(url = %self.url, error = %err, "ws connect failed");
                return Err(err);
            }
        };

        if shutdown.is_cancelled() {
            // dropping the session closes it
            drop(session);
            if marked_connecting {
                self.state.send_replace(ConnectionState::Closed);
            }
            info!(url = %self.url, "ws connect abandoned after close");
            return Ok(None);
        }

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        *self.outbound.lock().await = Some(session.outbound);
        self.reconnect_attempts.store(0, Ordering::SeqCst);
        self.state.send_replace(ConnectionState::Connected);
        info!(url = %self.url, epoch, "ws connected");

        tokio::spawn(self.clone().read_loop(epoch, session.events));
        Ok(Some(epoch))
    }

    async fn reconnect(self: &Arc<Self>) -> Result<()> {
        let entered = self.state.send_if_modified(|state| match state {
            ConnectionState::Connected | ConnectionState::Reconnecting => false,
            _ => {
                *state = ConnectionState::Reconnecting;
                true
            }
        });
        if !entered {
            return Ok(());
        }
        self.reconnect_attempts.store(0, Ordering::SeqCst);

        let shutdown = self.shutdown_token();
        let max_attempts = self.settings.max_reconnect_attempts;
        loop {
            if shutdown.is_cancelled() {
                self.state.send_replace(ConnectionState::Closed);
                return Ok(());
            }
            if self.state() != ConnectionState::Reconnecting {
                return Ok(());
            }
            let attempts = self.reconnect_attempts.load(Ordering::SeqCst);
            if max_attempts.is_some_and(|max| attempts >= max) {
                self.state.send_replace(ConnectionState::Closed);
                warn!(attempts, "ws reconnect gave up");
                return Err(OkxWsError::ReconnectExhausted { attempts });
            }
            let attempt = self.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
            info!(attempt, max_attempts = ?max_attempts, "ws reconnecting");

            match self.open(true).await {
                // a drop during the bootstrap hands over to the reconnect its close spawns
                Ok(Some(epoch)) => return self.bootstrap(epoch).await,
                Ok(None) => return Ok(()),
                Err(err) => {
                    debug!(attempt, error = %err, "ws reconnect attempt failed");
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    self.state.send_replace(ConnectionState::Closed);
                    return Ok(());
                }
                _ = sleep(self.settings.reconnect_delay) => {}
            }
        }
    }

    fn reconnect_task(self: Arc<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            if let Err(err) = self.reconnect().await {
                warn!(error = %err, "ws reconnect failed");
            }
        })
    }

    async fn send_text(&self, payload: String) -> Result<()> {
        if self.state() != ConnectionState::Connected {
            return Err(OkxWsError::NotConnected);
        }
        let sender = self
            .outbound
            .lock()
            .await
            .clone()
            .ok_or(OkxWsError::NotConnected)?;

        debug!(message = %payload, "ws send");
        let (ack_tx, ack_rx) = oneshot::channel();
        sender
            .send(OutboundFrame::Text {
                payload,
                ack: ack_tx,
            })
            .await
            .map_err(|_| OkxWsError::WebSocket("send channel closed".to_string()))?;
        ack_rx
            .await
            .map_err(|_| OkxWsError::WebSocket("write not acknowledged".to_string()))?
    }

    /// Per-connection reader with the two-timer liveness protocol:
    /// silence for one interval sends `ping`, silence for a second interval
    /// closes the connection as going away.
    async fn read_loop(self: Arc<Self>, epoch: u64, mut events: mpsc::Receiver<TransportEvent>) {
        let interval = self.settings.ping_interval;
        let mut deadline = Instant::now() + interval;
        let mut probing = false;

        let (code, reason) = loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(TransportEvent::Message(text)) => {
                        deadline = Instant::now() + interval;
                        probing = false;
                        if let Some(hooks) = self.hooks.upgrade() {
                            hooks.on_message(&text);
                        }
                    }
                    Some(TransportEvent::Error(err)) => {
                        warn!(epoch, error = %err, "ws transport error");
                    }
                    Some(TransportEvent::Closed { code, reason }) => break (code, reason),
                    None => break (CLOSE_ABNORMAL, "transport ended".to_string()),
                },
                _ = sleep_until(deadline) => {
                    if self.epoch.load(Ordering::SeqCst) != epoch
                        || self.state() != ConnectionState::Connected
                    {
                        deadline = Instant::now() + interval;
                        continue;
                    }
                    if probing {
                        warn!(epoch, ?interval, "ws liveness ping unanswered; closing");
                        if let Some(sender) = self.outbound.lock().await.as_ref() {
                            let _ = sender.try_send(OutboundFrame::Close { code: CLOSE_GOING_AWAY });
                        }
                        break (CLOSE_GOING_AWAY, "liveness timeout".to_string());
                    }
                    if let Err(err) = self.send_text(PING.to_string()).await {
                        debug!(epoch, error = %err, "ws ping not sent");
                    }
                    probing = true;
                    deadline = Instant::now() + interval;
                }
            }
        };

        self.on_closed(epoch, code, &reason).await;
    }

    async fn on_closed(self: &Arc<Self>, epoch: u64, code: u16, reason: &str) {
        self.closed_epoch.send_if_modified(|closed| {
            let advanced = epoch > *closed;
            if advanced {
                *closed = epoch;
            }
            advanced
        });
        if self.epoch.load(Ordering::SeqCst) != epoch {
            return;
        }
        self.outbound.lock().await.take();
        self.state.send_replace(ConnectionState::Closed);
        info!(epoch, code, reason, "ws connection closed");

        if code != CLOSE_NORMAL && !self.shutdown_token().is_cancelled() {
            tokio::spawn(self.clone().reconnect_task());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::transport::TransportSession;

    #[derive(Debug)]
    struct RefusingTransport;

    #[async_trait]
    impl Transport for RefusingTransport {
        async fn connect(&self, _url: &str) -> Result<TransportSession> {
            Err(OkxWsError::Connect("connection refused".to_string()))
        }
    }

    /// Opens after `delay`; the far end never speaks
    #[derive(Debug)]
    struct SlowTransport {
        delay: std::time::Duration,
        opened: AtomicU32,
    }

    #[async_trait]
    impl Transport for SlowTransport {
        async fn connect(&self, _url: &str) -> Result<TransportSession> {
            sleep(self.delay).await;
            self.opened.fetch_add(1, Ordering::SeqCst);
            let (outbound, _outbound_rx) = mpsc::channel(8);
            let (_event_tx, events) = mpsc::channel(8);
            Ok(TransportSession { outbound, events })
        }
    }

    fn connector(settings: ConnectionSettings) -> Connector {
        connector_over(settings, Arc::new(RefusingTransport))
    }

    fn connector_over(settings: ConnectionSettings, transport: Arc<dyn Transport>) -> Connector {
        let hooks: Weak<dyn ConnectionHooks> = Weak::<NoHooks>::new();
        Connector::new("ws://127.0.0.1:1", settings, transport, hooks)
    }

    struct NoHooks;

    #[async_trait]
    impl ConnectionHooks for NoHooks {
        async fn after_connected(&self) -> Result<()> {
            Ok(())
        }

        fn on_message(&self, _text: &str) {}
    }

    #[tokio::test]
    async fn test_send_fails_fast_when_closed() {
        let connector = connector(ConnectionSettings::default());
        assert_eq!(connector.state(), ConnectionState::Closed);
        assert!(matches!(
            connector.send("{}".to_string()).await,
            Err(OkxWsError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_connect_failure_is_connect_error() {
        let connector = connector(ConnectionSettings::default());
        let err = connector.connect().await.unwrap_err();
        assert!(matches!(err, OkxWsError::Connect(_)));
        assert_eq!(connector.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_reconnect_exhausts_budget() {
        let connector = connector(ConnectionSettings {
            ping_interval: std::time::Duration::from_secs(15),
            reconnect_delay: std::time::Duration::from_millis(5),
            max_reconnect_attempts: Some(3),
        });
        let err = connector.reconnect().await.unwrap_err();
        assert!(matches!(err, OkxWsError::ReconnectExhausted { attempts: 3 }));
        assert_eq!(connector.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_close_while_reconnecting_stops_retries() {
        let connector = connector(ConnectionSettings {
            ping_interval: std::time::Duration::from_secs(15),
            reconnect_delay: std::time::Duration::from_secs(60),
            max_reconnect_attempts: None,
        });
        let task = {
            let connector = connector.clone();
            tokio::spawn(async move { connector.reconnect().await })
        };
        let mut state = connector.subscribe_state();
        state
            .wait_for(|state| *state == ConnectionState::Reconnecting)
            .await
            .unwrap();
        // second reconnect is a no-op while one is running
        assert!(connector.reconnect().await.is_ok());

        connector.close().await.unwrap();
        assert!(task.await.unwrap().is_ok());
        assert_eq!(connector.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_close_during_slow_connect_discards_connection() {
        let transport = Arc::new(SlowTransport {
            delay: std::time::Duration::from_millis(100),
            opened: AtomicU32::new(0),
        });
        let connector = connector_over(ConnectionSettings::default(), transport.clone());
        let task = {
            let connector = connector.clone();
            tokio::spawn(async move { connector.connect().await })
        };
        let mut state = connector.subscribe_state();
        state
            .wait_for(|state| *state == ConnectionState::Connecting)
            .await
            .unwrap();

        connector.close().await.unwrap();
        assert_eq!(connector.state(), ConnectionState::Closed);

        assert!(task.await.unwrap().is_ok());
        assert_eq!(transport.opened.load(Ordering::SeqCst), 1);
        assert_eq!(connector.state(), ConnectionState::Closed);
        assert!(matches!(
            connector.send("{}".to_string()).await,
            Err(OkxWsError::NotConnected)
        ));
    }
}
