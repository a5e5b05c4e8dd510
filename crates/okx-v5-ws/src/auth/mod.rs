/*
[INPUT]:  API credentials
[OUTPUT]: Signed login arguments
[POS]:    Auth layer - WebSocket login authentication
[UPDATE]: When auth flow or signature methods change
*/

pub mod signer;

pub use signer::{LoginArgs, LoginSigner};
