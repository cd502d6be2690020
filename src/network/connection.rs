// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::io;
use std::pin::Pin;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, Sleep};
use tracing::{debug, trace, warn};

use crate::AppError;

/// What the owner of a connection wants to happen next.
#[derive(Debug)]
pub enum Interest {
    /// read exactly this many bytes
    Receive(usize),
    /// write the whole buffer
    Send(Bytes),
    /// wait for an event posted from outside the connection, no deadline applies
    Park,
    Close,
}

/// Completion hooks of a connection owner.
///
/// The driver in [`Connection::run`] calls exactly one hook at a time and
/// always on the connection's own task, so implementations need no locking.
/// Each hook returns the next [`Interest`].
pub trait IoHandler {
    type Event: Send + 'static;

    fn start(&mut self) -> Interest;

    fn on_receive(&mut self, data: Bytes) -> Interest;

    fn on_sent(&mut self) -> Interest;

    /// A read or write failed. Deadline expiry never reaches this hook.
    fn on_error(&mut self, error: AppError) -> Interest;

    fn on_event(&mut self, event: Self::Event) -> Interest;
}

#[derive(Debug)]
pub enum IoOutcome<T> {
    Completed(T),
    Failed(io::Error),
    TimedOut,
}

/// One stream connection with a single re-armed deadline timer.
///
/// Every `receive` and `send` resets the same timer and races it against
/// the I/O. The loser of the race is dropped, there is no other cancellation.
#[derive(Debug)]
pub struct Connection<S> {
    id: u64,
    stream: S,
    io_timeout: Duration,
    deadline: Pin<Box<Sleep>>,
    done: bool,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(id: u64, stream: S, io_timeout: Duration) -> Self {
        Connection {
            id,
            stream,
            io_timeout,
            deadline: Box::pin(time::sleep(io_timeout)),
            done: false,
        }
    }

    fn restart_timer(&mut self) {
        let expires = Instant::now() + self.io_timeout;
        self.deadline.as_mut().reset(expires);
    }

    pub async fn receive(&mut self, size: usize) -> IoOutcome<Bytes> {
        self.restart_timer();
        let mut buffer = BytesMut::zeroed(size);

        let stream = &mut self.stream;
        let deadline = &mut self.deadline;
        let result = tokio::select! {
            res = stream.read_exact(&mut buffer) => Some(res),
            _ = deadline.as_mut() => None,
        };

        match result {
            Some(Ok(n)) => {
                trace!(conn_id = self.id, bytes = n, "received");
                IoOutcome::Completed(buffer.freeze())
            }
            Some(Err(e)) => IoOutcome::Failed(e),
            None => IoOutcome::TimedOut,
        }
    }

    pub async fn send(&mut self, buffer: &[u8]) -> IoOutcome<()> {
        self.restart_timer();

        let stream = &mut self.stream;
        let deadline = &mut self.deadline;
        let write = async move {
            stream.write_all(buffer).await?;
            stream.flush().await
        };
        let result = tokio::select! {
            res = write => Some(res),
            _ = deadline.as_mut() => None,
        };

        match result {
            Some(Ok(())) => {
                trace!(conn_id = self.id, bytes = buffer.len(), "sent");
                IoOutcome::Completed(())
            }
            Some(Err(e)) => IoOutcome::Failed(e),
            None => IoOutcome::TimedOut,
        }
    }

    /// Marks the connection finished and shuts the transport down. Idempotent.
    pub async fn done(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        if let Err(e) = self.stream.shutdown().await {
            debug!(conn_id = self.id, error = %e, "shutdown after done failed");
        }
    }

    /// Drives `handler` until it asks to close or a deadline expires.
    ///
    /// `events` is the mailbox for completions posted from other tasks. It is
    /// only read while the handler is parked. If all its senders are gone
    /// while parked, the handler gets an `on_error`.
    pub async fn run<H>(mut self, mut handler: H, mut events: mpsc::UnboundedReceiver<H::Event>)
    where
        H: IoHandler,
    {
        let mut interest = handler.start();
        loop {
            interest = match interest {
                Interest::Receive(size) => match self.receive(size).await {
                    IoOutcome::Completed(data) => handler.on_receive(data),
                    IoOutcome::Failed(e) => {
                        debug!(conn_id = self.id, error = %e, "read error");
                        handler.on_error(AppError::IoError(e))
                    }
                    IoOutcome::TimedOut => {
                        warn!(conn_id = self.id, "connection timeout while reading");
                        break;
                    }
                },
                Interest::Send(buffer) => match self.send(&buffer).await {
                    IoOutcome::Completed(()) => handler.on_sent(),
                    IoOutcome::Failed(e) => {
                        debug!(conn_id = self.id, error = %e, "write error");
                        handler.on_error(AppError::IoError(e))
                    }
                    IoOutcome::TimedOut => {
                        warn!(conn_id = self.id, "connection timeout while writing");
                        break;
                    }
                },
                Interest::Park => match events.recv().await {
                    Some(event) => handler.on_event(event),
                    None => handler.on_error(AppError::ChannelRecvError(
                        "completion mailbox closed without an event".into(),
                    )),
                },
                Interest::Close => break,
            };
        }
        self.done().await;
    }
}
