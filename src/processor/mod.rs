//! Image processing off the connection tasks.
//!
//! A session hands a [`Task`] to a [`TaskSink`]. The stock sink is the
//! [`WorkerPool`]: a bounded queue, a fixed number of workers and a
//! [`Transformer`] run on the blocking thread pool. Results travel back through
//! the task's session handle.

pub use task::{Task, TaskOutcome};
pub use transform::{CaptionStamp, TransformError, Transformer, STAMP_MARKER};
pub use worker_pool::{TaskSink, WorkerPool};

mod task;
mod transform;
mod worker_pool;
