/*
[INPUT]:  ClientConfig, transport, application calls (subscribe, trade, handlers)
[OUTPUT]: Correlated replies and channel pushes for one venue connection
[POS]:    WebSocket layer - client facade and session bootstrap
[UPDATE]: When adding operations or changing what happens after (re)connect
*/

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::auth::LoginSigner;
use crate::config::ClientConfig;
use crate::error::{OkxWsError, Result};
use crate::types::{
    ChannelMessage, LoginResponse, SubscriptionResponse, SubscriptionTopic, TradeOp, TradeRequest,
    TradeResponse, UnsubscriptionResponse,
};

use super::connection::{ConnectionHooks, ConnectionState, Connector};
use super::dispatch::{ChannelMessageHandler, Dispatcher, PendingKey, RawMessageHandler, Reply};
use super::queue::{OperationKind, OperationQueue};
use super::transport::{Transport, TungsteniteTransport};

/// WebSocket client for the OKX v5 API
#[derive(Debug, Clone)]
pub struct OkxV5Ws {
    inner: Arc<Inner>,
}

/// Builder for clients that need a custom transport or a raw frame hook
pub struct OkxV5WsBuilder {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    message_handler: Option<RawMessageHandler>,
}

impl OkxV5WsBuilder {
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Hook called with every inbound text frame, before routing
    pub fn message_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.message_handler = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> Result<OkxV5Ws> {
        self.config.validate()?;

        let queue = OperationQueue::new();
        let mut dispatcher = Dispatcher::new(queue.clone(), self.config.options);
        if let Some(handler) = self.message_handler {
            dispatcher = dispatcher.with_raw_handler(handler);
        }
        let signer = self.config.credentials.clone().map(LoginSigner::new);
        let config = self.config;
        let transport = self.transport;

        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let hooks: Weak<dyn ConnectionHooks> = weak.clone();
            Inner {
                connector: Connector::new(config.url.clone(), config.connection, transport, hooks),
                config,
                queue,
                dispatcher,
                signer,
                sessions: watch::channel(0).0,
            }
        });
        Ok(OkxV5Ws { inner })
    }
}

impl OkxV5Ws {
    /// Create a client over `tokio-tungstenite`
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: ClientConfig) -> OkxV5WsBuilder {
        OkxV5WsBuilder {
            config,
            transport: Arc::new(TungsteniteTransport),
            message_handler: None,
        }
    }

    /// Connect, then reset all session tables and log in if configured.
    ///
    /// Handlers registered before this call are dropped by the reset, as
    /// they are on every reconnect.
    pub async fn connect(&self) -> Result<()> {
        self.inner.connector.connect().await
    }

    /// Close with the normal-closure code; no reconnect follows
    pub async fn close(&self) -> Result<()> {
        self.inner.connector.close().await
    }

    /// Reconnect with the configured fixed delay and attempt budget
    pub async fn reconnect(&self) -> Result<()> {
        self.inner.connector.reconnect().await
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.connector.state()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connector.is_connected()
    }

    /// Subscribe to connection state changes
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connector.subscribe_state()
    }

    /// Counter bumped after every completed session bootstrap.
    ///
    /// Subscriptions and handlers do not survive a reconnect; wait on this
    /// to restore them once the new session is ready.
    pub fn subscribe_sessions(&self) -> watch::Receiver<u64> {
        self.inner.sessions.subscribe()
    }

    /// Send an arbitrary JSON payload
    pub async fn send<T: Serialize + ?Sized>(&self, payload: &T) -> Result<()> {
        self.inner.send_json(payload).await
    }

    /// Log in with the configured credentials
    pub async fn login(&self) -> Result<LoginResponse> {
        self.inner.login().await
    }

    /// Subscribe to a channel and wait for the server's acknowledgement
    pub async fn subscribe_channel(&self, topic: &SubscriptionTopic) -> Result<SubscriptionResponse> {
        self.inner
            .channel_operation(OperationKind::Subscribe, topic)
            .await
            .inspect_err(|err| warn!(%topic, error = %err, "subscribe channel failed"))
    }

    /// Unsubscribe from a channel and wait for the server's acknowledgement
    pub async fn unsubscribe_channel(
        &self,
        topic: &SubscriptionTopic,
    ) -> Result<UnsubscriptionResponse> {
        self.inner
            .channel_operation(OperationKind::Unsubscribe, topic)
            .await
            .inspect_err(|err| warn!(%topic, error = %err, "unsubscribe channel failed"))
    }

    pub fn add_channel_message_handler(
        &self,
        topic: &SubscriptionTopic,
        handler: ChannelMessageHandler,
    ) {
        self.inner.dispatcher.add_handler(topic, handler);
    }

    /// Register a closure and return the handle needed to remove it
    pub fn on_channel_message<F>(&self, topic: &SubscriptionTopic, handler: F) -> ChannelMessageHandler
    where
        F: Fn(&ChannelMessage) + Send + Sync + 'static,
    {
        let handler: ChannelMessageHandler = Arc::new(handler);
        self.add_channel_message_handler(topic, handler.clone());
        handler
    }

    pub fn remove_channel_message_handler(
        &self,
        topic: &SubscriptionTopic,
        handler: &ChannelMessageHandler,
    ) {
        self.inner.dispatcher.remove_handler(topic, handler);
    }

    pub fn remove_all_channel_message_handlers(&self, topic: &SubscriptionTopic) {
        self.inner.dispatcher.remove_all_handlers(topic);
    }

    /// Send a trade request and wait for the reply carrying the same id.
    ///
    /// An id is generated when the request has none.
    pub async fn trade(&self, request: TradeRequest) -> Result<TradeResponse> {
        self.inner.trade(request).await
    }

    /// Like [`trade`](Self::trade) for a raw JSON payload with an `op` field
    pub async fn trade_json(&self, payload: Value) -> Result<TradeResponse> {
        let op = payload
            .get("op")
            .and_then(Value::as_str)
            .unwrap_or_default();
        op.parse::<TradeOp>()?;
        let request: TradeRequest = serde_json::from_value(payload)?;
        self.trade(request).await
    }

    /// Replies still awaited across login, subscription and trade tables
    pub fn pending_request_count(&self) -> usize {
        self.inner.dispatcher.pending_count()
    }

    /// Control operations queued or in flight
    pub fn queued_operation_count(&self) -> usize {
        self.inner.queue.len()
    }

    /// Topics with at least one handler
    pub fn channel_topic_count(&self) -> usize {
        self.inner.dispatcher.topic_count()
    }
}

#[derive(Debug)]
struct Inner {
    config: ClientConfig,
    connector: Connector,
    queue: OperationQueue,
    dispatcher: Dispatcher,
    signer: Option<LoginSigner>,
    sessions: watch::Sender<u64>,
}

impl Inner {
    fn ensure_connected(&self) -> Result<()> {
        if self.connector.is_connected() {
            Ok(())
        } else {
            Err(OkxWsError::NotConnected)
        }
    }

    async fn send_json<T: Serialize + ?Sized>(&self, payload: &T) -> Result<()> {
        self.ensure_connected()?;
        let text = serde_json::to_string(payload)?;
        self.connector.send(text).await
    }

    /// Send a request whose reply slot is already registered under `key`
    async fn request<T: Serialize + ?Sized>(
        &self,
        key: PendingKey,
        reply: oneshot::Receiver<Reply>,
        payload: &T,
    ) -> Result<Value> {
        if let Err(err) = self.send_json(payload).await {
            self.dispatcher.withdraw(&key);
            return Err(err);
        }

        let reply = match self.config.request_timeout {
            None => reply.await,
            Some(duration) => match tokio::time::timeout(duration, reply).await {
                Ok(reply) => reply,
                Err(_) => {
                    self.dispatcher.abandon(&key);
                    return Err(OkxWsError::Timeout { duration });
                }
            },
        };

        match reply {
            Ok(Ok(frame)) => Ok(frame),
            Ok(Err(frame)) => Err(OkxWsError::rejection(frame)),
            // slot dropped by a connection reset; the reply can no longer arrive
            Err(_) => std::future::pending().await,
        }
    }

    async fn login(&self) -> Result<LoginResponse> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| OkxWsError::Config("login requires credentials".to_string()))?;

        self.queue
            .enqueue(OperationKind::Login, self.login_once(signer))
            .await
            .inspect_err(|err| warn!(error = %err, "login failed"))
    }

    async fn login_once(&self, signer: &LoginSigner) -> Result<LoginResponse> {
        self.ensure_connected()?;
        let args = signer.login_args(Utc::now())?;
        if self.config.options.log_login_message {
            info!(timestamp = %args.timestamp, "login");
        }
        let (key, reply) = self.dispatcher.register_login();
        let frame = self
            .request(key, reply, &json!({ "op": "login", "args": [args] }))
            .await?;
        Ok(serde_json::from_value(frame)?)
    }

    async fn channel_operation(
        &self,
        kind: OperationKind,
        topic: &SubscriptionTopic,
    ) -> Result<SubscriptionResponse> {
        self.queue
            .enqueue(kind, self.channel_operation_once(kind, topic))
            .await
    }

    async fn channel_operation_once(
        &self,
        kind: OperationKind,
        topic: &SubscriptionTopic,
    ) -> Result<SubscriptionResponse> {
        if self.config.options.log_subscription_message {
            info!(op = %kind, %topic, "channel operation");
        }
        self.ensure_connected()?;
        let (key, reply) = self.dispatcher.register_channel();
        let frame = self
            .request(key, reply, &json!({ "op": kind.as_str(), "args": [topic] }))
            .await?;
        Ok(serde_json::from_value(frame)?)
    }

    async fn trade(&self, mut request: TradeRequest) -> Result<TradeResponse> {
        self.ensure_connected()?;
        let op = request.op;
        let id = request.ensure_id().to_string();
        if self.config.options.log_trade_message {
            debug!(%op, %id, "trade request");
        }

        let (key, reply) = self.dispatcher.register_trade(op, &id);
        let frame = self
            .request(key, reply, &request)
            .await
            .inspect_err(|err| warn!(%op, %id, error = %err, "trade request failed"))?;
        Ok(serde_json::from_value(frame)?)
    }
}

#[async_trait]
impl ConnectionHooks for Inner {
    async fn after_connected(&self) -> Result<()> {
        self.queue.clear();
        self.dispatcher.reset();
        debug!("session tables reset");

        if self.config.should_auto_login() {
            self.login().await?;
            info!("auto login succeeded");
        }
        self.sessions.send_modify(|session| *session += 1);
        Ok(())
    }

    fn on_message(&self, text: &str) {
        self.dispatcher.dispatch(text);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.connector.shutdown();
    }
}
