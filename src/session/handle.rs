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

use tokio::sync::mpsc;
use tracing::debug;

use crate::processor::TaskOutcome;

/// Reference-counted link from a task back to its session.
///
/// The handle never touches session state. `complete` posts the outcome to
/// the connection's mailbox and the session picks it up on its own task.
/// Once the connection task is gone the mailbox is closed and delivery is a
/// silent no-op.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    connection_id: u64,
    completion_tx: mpsc::UnboundedSender<TaskOutcome>,
}

impl SessionHandle {
    /// Creates the handle together with the mailbox the connection drains.
    pub fn new(connection_id: u64) -> (SessionHandle, mpsc::UnboundedReceiver<TaskOutcome>) {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        (
            SessionHandle {
                connection_id,
                completion_tx,
            },
            completion_rx,
        )
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Safe to call from any thread. Returns false if the session is gone.
    pub fn complete(&self, outcome: TaskOutcome) -> bool {
        match self.completion_tx.send(outcome) {
            Ok(()) => true,
            Err(_) => {
                debug!(conn_id = self.connection_id, "completion for a closed session ignored");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn complete_from_another_thread() {
        let (handle, mut mailbox) = SessionHandle::new(11);
        assert_eq!(handle.connection_id(), 11);

        let remote = handle.clone();
        std::thread::spawn(move || remote.complete(Ok(Bytes::from_static(&[9, 9]))))
            .join()
            .unwrap();

        let outcome = mailbox.try_recv().unwrap();
        assert_eq!(outcome, Ok(Bytes::from_static(&[9, 9])));
    }

    #[test]
    fn complete_after_mailbox_closed_is_noop() {
        let (handle, mut mailbox) = SessionHandle::new(1);
        assert!(handle.complete(Ok(Bytes::new())));
        assert!(mailbox.try_recv().is_ok());

        drop(mailbox);
        assert!(!handle.complete(Ok(Bytes::new())));
    }
}
