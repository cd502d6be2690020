//! Network Module Implementation
//!
//! Stream connections and the wire format spoken on them.
//!
//! # Components
//!
//! - `Connection`: receive-exactly / send-exactly over one stream, sharing a
//!   single deadline timer, reporting back through `IoHandler` hooks
//! - `frame`: the fixed 8 byte request and response headers
//!
//! A connection never interprets the bytes it moves. What to read next, what
//! to write and when to close is decided by its `IoHandler`.

pub use connection::{Connection, Interest, IoHandler, IoOutcome};
pub use frame::{
    Limits, RequestHeader, ResponseHeader, StatusCode, REQUEST_HEADER_SIZE, RESPONSE_HEADER_SIZE,
};
mod connection;
mod frame;
