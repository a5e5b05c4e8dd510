/*
[INPUT]:  Inbound text frames and the head of the operation queue
[OUTPUT]: Replies routed to pending callers, pushes fanned out to channel handlers
[POS]:    WebSocket layer - response correlation and dispatch
[UPDATE]: When the venue changes reply envelopes or error codes
*/

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};

use regex::Regex;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::config::ClientOptions;
use crate::error::OkxWsError;
use crate::types::{ChannelMessage, SubscriptionTopic, TradeOp, codes};

use super::queue::{OperationKind, OperationQueue};

/// Liveness reply; plain text, not JSON
pub const PONG: &str = "pong";

static INVALID_REQUEST_OP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Invalid request: \{"op": "([a-zA-Z0-9-]+)""#).expect("valid regex")
});

/// Handler invoked for every push on a topic
pub type ChannelMessageHandler = Arc<dyn Fn(&ChannelMessage) + Send + Sync>;

/// Hook that sees every inbound text frame before routing
pub type RawMessageHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Outcome delivered to a pending caller: `Ok(frame)` or `Err(frame)` on rejection
pub type Reply = std::result::Result<Value, Value>;

/// Where a frame goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Topic(SubscriptionTopic),
    Login,
    Subscribe,
    Unsubscribe,
    Trade { op: TradeOp, id: Option<String> },
    Unclassified { event: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub route: Route,
    pub is_error: bool,
}

/// Classify a parsed frame. First matching rule wins.
///
/// `queue_head` is the kind of the oldest outstanding control operation and
/// only matters for error replies whose event is the generic `error`.
pub fn classify(frame: &Value, queue_head: Option<OperationKind>) -> Classification {
    let mut event = frame.get("event").and_then(Value::as_str).map(str::to_string);

    if event.is_none()
        && let Some(arg) = frame.get("arg")
        && arg.get("channel").is_some_and(Value::is_string)
        && let Ok(topic) = serde_json::from_value::<SubscriptionTopic>(arg.clone())
    {
        return Classification {
            route: Route::Topic(topic),
            is_error: false,
        };
    }

    let code = match frame.get("code") {
        Some(Value::String(code)) => Some(code.clone()),
        Some(Value::Number(code)) => Some(code.to_string()),
        _ => None,
    };
    let is_error = match &code {
        Some(code) => code != codes::OK,
        None => event.as_deref() == Some("error"),
    };
    let code = code.unwrap_or_default();
    let msg = frame.get("msg").and_then(Value::as_str).unwrap_or_default();

    if is_error {
        if code == codes::INVALID_REQUEST
            && let Some(op) = INVALID_REQUEST_OP.captures(msg).and_then(|caps| caps.get(1))
        {
            event = Some(op.as_str().to_string());
        }

        if codes::is_login_failure(&code) {
            event = Some(OperationKind::Login.as_str().to_string());
        }

        if code == codes::DOES_NOT_EXIST && msg.starts_with("channel:") {
            event = Some(OperationKind::Subscribe.as_str().to_string());
        }

        if code == codes::ENDPOINT_NOT_SUPPORT_SUBSCRIBE_CHANNEL {
            event = Some(OperationKind::Subscribe.as_str().to_string());
        }

        if event.as_deref() == Some("error")
            && let Some(head) = queue_head
        {
            event = Some(head.as_str().to_string());
        }
    }

    if let Some(op) = frame
        .get("op")
        .and_then(Value::as_str)
        .and_then(|op| op.parse::<TradeOp>().ok())
    {
        let id = match frame.get("id") {
            Some(Value::String(id)) if !id.is_empty() => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        };
        return Classification {
            route: Route::Trade { op, id },
            is_error,
        };
    }

    let route = match event.as_deref() {
        Some("login") => Route::Login,
        Some("subscribe") => Route::Subscribe,
        Some("unsubscribe") => Route::Unsubscribe,
        _ => Route::Unclassified { event },
    };
    Classification { route, is_error }
}

/// Pending reply slot. `seq` lets a caller withdraw exactly its own entry.
#[derive(Debug)]
struct Pending {
    seq: u64,
    tx: oneshot::Sender<Reply>,
}

/// Identifies a registered pending reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingKey {
    Login(u64),
    Channel(u64),
    Trade { op: TradeOp, id: String, seq: u64 },
}

#[derive(Default)]
struct Tables {
    next_seq: u64,
    login: VecDeque<Pending>,
    /// Shared by subscribe and unsubscribe
    channel: VecDeque<Pending>,
    trades: HashMap<TradeOp, HashMap<String, VecDeque<Pending>>>,
    topics: HashMap<String, Vec<ChannelMessageHandler>>,
}

impl Tables {
    fn seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

/// Correlation maps plus the routing of inbound frames
#[derive(Clone)]
pub struct Dispatcher {
    tables: Arc<Mutex<Tables>>,
    queue: OperationQueue,
    options: ClientOptions,
    raw_handler: Option<RawMessageHandler>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("queue", &self.queue)
            .field("options", &self.options)
            .field("raw_handler", &self.raw_handler.is_some())
            .finish()
    }
}

impl Dispatcher {
    pub fn new(queue: OperationQueue, options: ClientOptions) -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            queue,
            options,
            raw_handler: None,
        }
    }

    pub fn with_raw_handler(mut self, handler: RawMessageHandler) -> Self {
        self.raw_handler = Some(handler);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Empty every correlation table and the subscriber table
    pub fn reset(&self) {
        let mut tables = self.lock();
        tables.login.clear();
        tables.channel.clear();
        tables.trades.clear();
        tables.topics.clear();
    }

    pub fn register_login(&self) -> (PendingKey, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        let mut tables = self.lock();
        let seq = tables.seq();
        tables.login.push_back(Pending { seq, tx });
        (PendingKey::Login(seq), rx)
    }

    pub fn register_channel(&self) -> (PendingKey, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        let mut tables = self.lock();
        let seq = tables.seq();
        tables.channel.push_back(Pending { seq, tx });
        (PendingKey::Channel(seq), rx)
    }

    pub fn register_trade(&self, op: TradeOp, id: &str) -> (PendingKey, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        let mut tables = self.lock();
        let seq = tables.seq();
        tables
            .trades
            .entry(op)
            .or_default()
            .entry(id.to_string())
            .or_default()
            .push_back(Pending { seq, tx });
        (
            PendingKey::Trade {
                op,
                id: id.to_string(),
                seq,
            },
            rx,
        )
    }

    /// Give up on a request that was sent but never answered in time.
    ///
    /// Login and channel replies carry no id, so their entry stays queued with
    /// its receiver gone: the late reply still pops it and is discarded
    /// instead of landing on the next caller. Trade entries are withdrawn.
    pub fn abandon(&self, key: &PendingKey) {
        match key {
            PendingKey::Login(seq) | PendingKey::Channel(seq) => {
                debug!(seq, "pending reply abandoned; late reply will be discarded");
            }
            PendingKey::Trade { .. } => self.withdraw(key),
        }
    }

    /// Withdraw a pending entry whose request never reached the server
    pub fn withdraw(&self, key: &PendingKey) {
        let mut tables = self.lock();
        match key {
            PendingKey::Login(seq) => tables.login.retain(|pending| pending.seq != *seq),
            PendingKey::Channel(seq) => tables.channel.retain(|pending| pending.seq != *seq),
            PendingKey::Trade { op, id, seq } => {
                let Some(by_id) = tables.trades.get_mut(op) else {
                    return;
                };
                if let Some(list) = by_id.get_mut(id) {
                    list.retain(|pending| pending.seq != *seq);
                    if list.is_empty() {
                        by_id.remove(id);
                    }
                }
                if by_id.is_empty() {
                    tables.trades.remove(op);
                }
            }
        }
    }

    pub fn add_handler(&self, topic: &SubscriptionTopic, handler: ChannelMessageHandler) {
        let key = topic.canonical_key();
        debug!(topic = %key, "add channel message handler");
        self.lock().topics.entry(key).or_default().push(handler);
    }

    /// Remove every registration of exactly this handler
    pub fn remove_handler(&self, topic: &SubscriptionTopic, handler: &ChannelMessageHandler) {
        let key = topic.canonical_key();
        debug!(topic = %key, "remove channel message handler");
        let mut tables = self.lock();
        if let Some(handlers) = tables.topics.get_mut(&key) {
            handlers.retain(|existing| !Arc::ptr_eq(existing, handler));
            if handlers.is_empty() {
                tables.topics.remove(&key);
            }
        }
    }

    pub fn remove_all_handlers(&self, topic: &SubscriptionTopic) {
        let key = topic.canonical_key();
        debug!(topic = %key, "remove all channel message handlers");
        self.lock().topics.remove(&key);
    }

    pub fn handler_count(&self, topic: &SubscriptionTopic) -> usize {
        self.lock()
            .topics
            .get(&topic.canonical_key())
            .map_or(0, Vec::len)
    }

    /// Number of replies still awaited, across every table
    pub fn pending_count(&self) -> usize {
        let tables = self.lock();
        let trades: usize = tables
            .trades
            .values()
            .flat_map(HashMap::values)
            .map(VecDeque::len)
            .sum();
        tables.login.len() + tables.channel.len() + trades
    }

    pub fn topic_count(&self) -> usize {
        self.lock().topics.len()
    }

    /// Route one inbound text frame. Never fails; problems are logged.
    pub fn dispatch(&self, text: &str) {
        if let Some(handler) = &self.raw_handler {
            handler(text);
        }

        if text == PONG {
            return;
        }

        let frame: Value = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(err) => {
                let err = OkxWsError::Parse(err.to_string());
                warn!(error = %err, bytes = text.len(), "ws frame dropped");
                return;
            }
        };

        let Classification { route, is_error } = classify(&frame, self.queue.head_kind());
        match route {
            Route::Topic(topic) => self.dispatch_topic(&topic, frame, text),
            Route::Login => {
                if self.options.log_login_message {
                    debug!(message = %text, "received login response");
                }
                let pending = self.lock().login.pop_front();
                settle(pending, frame, is_error);
            }
            Route::Subscribe | Route::Unsubscribe => {
                if self.options.log_subscription_message {
                    debug!(message = %text, "received subscription response");
                }
                let pending = self.lock().channel.pop_front();
                settle(pending, frame, is_error);
            }
            Route::Trade { op, id } => {
                if self.options.log_trade_message {
                    debug!(%op, id = ?id, message = %text, "received trade response");
                }
                let Some(id) = id else {
                    debug!(%op, "trade response without id dropped");
                    return;
                };
                let pending = self.take_trade(op, &id);
                settle(pending, frame, is_error);
            }
            Route::Unclassified { event } => {
                let err = OkxWsError::UnclassifiableFrame { event };
                debug!(error = %err, message = %text, "ws frame not routed");
            }
        }
    }

    fn take_trade(&self, op: TradeOp, id: &str) -> Option<Pending> {
        let mut tables = self.lock();
        let by_id = tables.trades.get_mut(&op)?;
        let list = by_id.get_mut(id)?;
        let pending = list.pop_front();
        if list.is_empty() {
            by_id.remove(id);
        }
        if by_id.is_empty() {
            tables.trades.remove(&op);
        }
        pending
    }

    fn dispatch_topic(&self, topic: &SubscriptionTopic, frame: Value, text: &str) {
        if self.options.log_channel_topic_message {
            debug!(message = %text, "received topic message");
        }
        let handlers = match self.lock().topics.get(&topic.canonical_key()) {
            Some(handlers) => handlers.clone(),
            None => return,
        };
        let message: ChannelMessage = match serde_json::from_value(frame) {
            Ok(message) => message,
            Err(err) => {
                let err = OkxWsError::Parse(err.to_string());
                warn!(error = %err, %topic, "topic message dropped");
                return;
            }
        };
        for handler in handlers {
            handler(&message);
        }
    }
}

fn settle(pending: Option<Pending>, frame: Value, is_error: bool) {
    let Some(pending) = pending else {
        return;
    };
    let reply = if is_error { Err(frame) } else { Ok(frame) };
    let _ = pending.tx.send(reply);
}
