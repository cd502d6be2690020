//! Protocol sessions.
//!
//! [`ProtoSession`] is the request/response state machine driven by a
//! [`Connection`](crate::network::Connection). [`SessionHandle`] is the only
//! thing a task carries back to it.

pub use handle::SessionHandle;
pub use proto_session::{ProtoSession, State};

mod handle;
mod proto_session;
