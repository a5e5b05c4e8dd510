/*
[INPUT]:  Venue WebSocket schema definitions and serde requirements
[OUTPUT]: Typed Rust structs/enums with serialization support
[POS]:    Data layer - type definitions for WebSocket communication
[UPDATE]: When API schema changes or new types added
*/

pub mod codes;
pub mod responses;
pub mod topic;
pub mod trade;

pub use responses::*;
pub use topic::*;
pub use trade::*;
