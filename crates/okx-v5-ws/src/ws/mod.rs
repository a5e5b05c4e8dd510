/*
[INPUT]:  Client configuration, transport and application operations
[OUTPUT]: Connection management, operation queue, frame dispatch and client facade
[POS]:    WebSocket layer - session engine
[UPDATE]: When adding new submodules or changing the public ws surface
*/

pub mod client;
pub mod connection;
pub mod dispatch;
pub mod queue;
pub mod transport;

pub use client::{OkxV5Ws, OkxV5WsBuilder};
pub use connection::{ConnectionState, PING};
pub use dispatch::{ChannelMessageHandler, PONG, RawMessageHandler};
pub use queue::OperationKind;
pub use transport::{
    CLOSE_ABNORMAL, CLOSE_GOING_AWAY, CLOSE_NORMAL, OutboundFrame, Transport, TransportEvent,
    TransportSession, TungsteniteTransport,
};
