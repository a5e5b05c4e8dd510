/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public OKX v5 WebSocket client crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod auth;
pub mod config;
pub mod error;
pub mod types;
pub mod ws;

pub use auth::{LoginArgs, LoginSigner};

pub use config::{
    ClientConfig,
    ClientOptions,
    ConnectionSettings,
    Credentials,
    DEMO_PRIVATE_ENDPOINT,
    DEMO_PUBLIC_ENDPOINT,
    PRIVATE_ENDPOINT,
    PUBLIC_ENDPOINT,
};

pub use error::{OkxWsError, Result};

// Re-export all types
pub use types::*;

pub use ws::{
    ChannelMessageHandler,
    ConnectionState,
    OkxV5Ws,
    OkxV5WsBuilder,
    OutboundFrame,
    RawMessageHandler,
    Transport,
    TransportEvent,
    TransportSession,
    TungsteniteTransport,
};
