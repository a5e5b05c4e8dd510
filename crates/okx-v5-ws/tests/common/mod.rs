/*
[INPUT]:  Test configuration and scripted server behaviour
[OUTPUT]: In-memory transport, server handles and client fixtures
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for okx-v5-ws tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use okx_v5_ws::{
    ClientConfig, Credentials, OkxV5Ws, OkxWsError, OutboundFrame, Result, Transport,
    TransportEvent, TransportSession,
};
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};

pub const TEST_URL: &str = "ws://mock.okx.test/ws/v5/private";
const WAIT: Duration = Duration::from_secs(2);

/// Transport that hands every accepted connection to the test as a [`MockServer`]
#[derive(Debug)]
pub struct MockTransport {
    sessions: mpsc::UnboundedSender<MockServer>,
    refuse: AtomicU32,
    attempts: AtomicU32,
    open_delay_ms: AtomicU64,
}

impl MockTransport {
    pub fn new() -> (Arc<Self>, MockServers) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            sessions: tx,
            refuse: AtomicU32::new(0),
            attempts: AtomicU32::new(0),
            open_delay_ms: AtomicU64::new(0),
        });
        (transport, MockServers { sessions: rx })
    }

    /// Refuse the next `count` connection attempts
    pub fn refuse_next(&self, count: u32) {
        self.refuse.store(count, Ordering::SeqCst);
    }

    /// Hold every later connection attempt open for `delay` before it completes
    pub fn set_open_delay(&self, delay: Duration) {
        self.open_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Connection attempts seen so far, refused ones included
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, _url: &str) -> Result<TransportSession> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if refused {
            return Err(OkxWsError::Connect("connection refused".to_string()));
        }
        let delay = self.open_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundFrame>(64);
        let (event_tx, event_rx) = mpsc::channel(64);
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();

        let relay_events = event_tx.clone();
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                match frame {
                    OutboundFrame::Text { payload, ack } => {
                        let _ = ack.send(Ok(()));
                        let _ = frame_tx.send(payload);
                    }
                    OutboundFrame::Close { code } => {
                        let _ = relay_events
                            .send(TransportEvent::Closed {
                                code,
                                reason: "closed by client".to_string(),
                            })
                            .await;
                        break;
                    }
                }
            }
        });

        let _ = self.sessions.send(MockServer {
            frames: Arc::new(Mutex::new(frame_rx)),
            events: event_tx,
        });
        Ok(TransportSession {
            outbound: outbound_tx,
            events: event_rx,
        })
    }
}

/// Accepted connections, in order
pub struct MockServers {
    sessions: mpsc::UnboundedReceiver<MockServer>,
}

impl MockServers {
    pub async fn next(&mut self) -> MockServer {
        tokio::time::timeout(WAIT, self.sessions.recv())
            .await
            .expect("no connection within timeout")
            .expect("transport dropped")
    }

    pub fn try_next(&mut self) -> Option<MockServer> {
        self.sessions.try_recv().ok()
    }
}

/// Server side of one accepted connection
#[derive(Clone)]
pub struct MockServer {
    frames: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    events: mpsc::Sender<TransportEvent>,
}

impl MockServer {
    /// Next text frame written by the client
    pub async fn next_frame(&self) -> String {
        let mut frames = self.frames.lock().await;
        tokio::time::timeout(WAIT, frames.recv())
            .await
            .expect("no frame within timeout")
            .expect("connection closed")
    }

    pub async fn next_json(&self) -> Value {
        let frame = self.next_frame().await;
        serde_json::from_str(&frame).expect("client sent invalid json")
    }

    /// True when no frame arrives within `wait`
    pub async fn is_quiet(&self, wait: Duration) -> bool {
        let mut frames = self.frames.lock().await;
        tokio::time::timeout(wait, frames.recv()).await.is_err()
    }

    pub async fn push(&self, frame: Value) {
        self.push_text(&frame.to_string()).await;
    }

    pub async fn push_text(&self, text: &str) {
        self.events
            .send(TransportEvent::Message(text.to_string()))
            .await
            .expect("client reader gone");
    }

    /// Drop the connection from the server side
    pub async fn close(&self, code: u16) {
        let _ = self
            .events
            .send(TransportEvent::Closed {
                code,
                reason: "closed by server".to_string(),
            })
            .await;
    }
}

pub fn test_credentials() -> Credentials {
    Credentials {
        api_key: "985d5b66-57ce-40fb-b714-afc0b9787083".to_string(),
        secret_key: "secret".to_string(),
        passphrase: "123456".to_string(),
    }
}

/// Client without credentials; nothing is sent on connect
pub fn public_client(config: ClientConfig) -> (OkxV5Ws, Arc<MockTransport>, MockServers) {
    let (transport, servers) = MockTransport::new();
    let client = OkxV5Ws::builder(config)
        .transport(transport.clone())
        .build()
        .expect("valid config");
    (client, transport, servers)
}

pub fn public_config() -> ClientConfig {
    ClientConfig::new(TEST_URL).with_reconnect_delay(Duration::from_millis(20))
}

pub fn private_config() -> ClientConfig {
    public_config().with_credentials(test_credentials())
}

/// Answer the login request the client sends after connecting
pub async fn accept_login(server: &MockServer) -> Value {
    let request = server.next_json().await;
    assert_eq!(request["op"], "login");
    server
        .push(serde_json::json!({"event": "login", "code": "0", "msg": "", "connId": "a4d3ae55"}))
        .await;
    request
}

/// Connect a private client, completing auto-login on the server side
pub async fn connect_private(client: &OkxV5Ws, servers: &mut MockServers) -> MockServer {
    let connecting = {
        let client = client.clone();
        tokio::spawn(async move { client.connect().await })
    };
    let server = servers.next().await;
    accept_login(&server).await;
    connecting
        .await
        .expect("connect task panicked")
        .expect("connect failed");
    server
}

/// Poll until `check` holds or the wait expires
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
