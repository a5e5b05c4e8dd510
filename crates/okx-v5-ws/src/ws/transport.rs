/*
[INPUT]:  Endpoint URL and outbound text/close frames
[OUTPUT]: Inbound text messages, close and error events per connection
[POS]:    WebSocket layer - physical connection (Transport Session)
[UPDATE]: When changing the socket library or frame handling
*/

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, warn};

use crate::error::{OkxWsError, Result};

/// Intentional closure; never followed by a reconnect
pub const CLOSE_NORMAL: u16 = 1000;
/// Used when the liveness ping goes unanswered
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Stream ended without a close frame
pub const CLOSE_ABNORMAL: u16 = 1006;
const CLOSE_NO_STATUS: u16 = 1005;

const CHANNEL_CAPACITY: usize = 100;

/// Frame handed to the transport
#[derive(Debug)]
pub enum OutboundFrame {
    /// Text frame; `ack` resolves once the write completed
    Text {
        payload: String,
        ack: oneshot::Sender<Result<()>>,
    },
    /// Close the connection with the given code
    Close { code: u16 },
}

/// Event emitted by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Message(String),
    Closed { code: u16, reason: String },
    Error(String),
}

/// Channels of one live connection
#[derive(Debug)]
pub struct TransportSession {
    pub outbound: mpsc::Sender<OutboundFrame>,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Opens physical connections
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    async fn connect(&self, url: &str) -> Result<TransportSession>;
}

/// `tokio-tungstenite` transport
#[derive(Debug, Default, Clone, Copy)]
pub struct TungsteniteTransport;

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn connect(&self, url: &str) -> Result<TransportSession> {
        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(|err| OkxWsError::Connect(err.to_string()))?;
        let (mut write, mut read) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundFrame>(CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let closed = loop {
                tokio::select! {
                    outbound = outbound_rx.recv() => {
                        match outbound {
                            Some(OutboundFrame::Text { payload, ack }) => {
                                let result = write
                                    .send(WsMessage::Text(payload.into()))
                                    .await
                                    .map_err(|err| OkxWsError::WebSocket(err.to_string()));
                                let failed = result.is_err();
                                let _ = ack.send(result);
                                if failed {
                                    break TransportEvent::Closed {
                                        code: CLOSE_ABNORMAL,
                                        reason: "write failed".to_string(),
                                    };
                                }
                            }
                            Some(OutboundFrame::Close { code }) => {
                                let frame = CloseFrame {
                                    code: CloseCode::from(code),
                                    reason: String::new().into(),
                                };
                                if let Err(err) = write.send(WsMessage::Close(Some(frame))).await {
                                    debug!(error = %err, code, "ws close frame not delivered");
                                }
                                break TransportEvent::Closed {
                                    code,
                                    reason: "closed by client".to_string(),
                                };
                            }
                            None => {
                                let _ = write.send(WsMessage::Close(None)).await;
                                break TransportEvent::Closed {
                                    code: CLOSE_NORMAL,
                                    reason: "session dropped".to_string(),
                                };
                            }
                        }
                    }
                    incoming = read.next() => {
                        match incoming {
                            Some(Ok(WsMessage::Text(text))) => {
                                if event_tx.send(TransportEvent::Message(text.to_string())).await.is_err() {
                                    break TransportEvent::Closed {
                                        code: CLOSE_NORMAL,
                                        reason: "session dropped".to_string(),
                                    };
                                }
                            }
                            Some(Ok(WsMessage::Binary(bytes))) => {
                                let event = match String::from_utf8(bytes.to_vec()) {
                                    Ok(text) => TransportEvent::Message(text),
                                    Err(err) => TransportEvent::Error(format!("non-utf8 binary frame: {err}")),
                                };
                                if event_tx.send(event).await.is_err() {
                                    break TransportEvent::Closed {
                                        code: CLOSE_NORMAL,
                                        reason: "session dropped".to_string(),
                                    };
                                }
                            }
                            Some(Ok(WsMessage::Close(frame))) => {
                                let _ = write.send(WsMessage::Close(None)).await;
                                break match frame {
                                    Some(frame) => TransportEvent::Closed {
                                        code: u16::from(frame.code),
                                        reason: frame.reason.to_string(),
                                    },
                                    None => TransportEvent::Closed {
                                        code: CLOSE_NO_STATUS,
                                        reason: String::new(),
                                    },
                                };
                            }
                            Some(Ok(_)) => {}
                            Some(Err(err)) => {
                                warn!(error = %err, "ws read failed");
                                let _ = event_tx.send(TransportEvent::Error(err.to_string())).await;
                                break TransportEvent::Closed {
                                    code: CLOSE_ABNORMAL,
                                    reason: err.to_string(),
                                };
                            }
                            None => {
                                break TransportEvent::Closed {
                                    code: CLOSE_ABNORMAL,
                                    reason: "stream ended".to_string(),
                                };
                            }
                        }
                    }
                }
            };

            let _ = event_tx.send(closed).await;
        });

        Ok(TransportSession {
            outbound: outbound_tx,
            events: event_rx,
        })
    }
}
