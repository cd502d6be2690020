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

use std::fmt;

use bytes::Bytes;

use crate::session::SessionHandle;

use super::TransformError;

/// Result delivered back to the session that submitted a task.
pub type TaskOutcome = Result<Bytes, TransformError>;

/// One unit of work for the worker pool.
///
/// The task owns its payload, the submitting session keeps nothing it could
/// still mutate. The only link back is the session handle.
pub struct Task {
    session: SessionHandle,
    caption: Bytes,
    image: Bytes,
}

impl Task {
    pub fn new(session: SessionHandle, caption: Bytes, image: Bytes) -> Self {
        Task {
            session,
            caption,
            image,
        }
    }

    pub fn connection_id(&self) -> u64 {
        self.session.connection_id()
    }

    pub fn caption(&self) -> &Bytes {
        &self.caption
    }

    pub fn image(&self) -> &Bytes {
        &self.image
    }

    /// Splits the task so the payload can be moved onto a blocking thread
    /// while the handle stays with the worker.
    pub fn into_parts(self) -> (SessionHandle, Bytes, Bytes) {
        (self.session, self.caption, self.image)
    }

    /// Delivers the outcome, returns false if the session is already gone.
    pub fn complete(self, outcome: TaskOutcome) -> bool {
        self.session.complete(outcome)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("conn_id", &self.session.connection_id())
            .field("caption_size", &self.caption.len())
            .field("image_size", &self.image.len())
            .finish()
    }
}
