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

use std::mem;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::network::{
    Interest, IoHandler, Limits, RequestHeader, ResponseHeader, StatusCode, REQUEST_HEADER_SIZE,
};
use crate::processor::{Task, TaskOutcome, TaskSink};
use crate::AppError;

use super::SessionHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    ReadHeader,
    ReadCaption,
    ReadImage,
    Processing,
    WriteHeader,
    WriteResult,
    Done,
}

/// One request/response exchange on one connection.
///
/// ```text
/// ReadHeader -> ReadCaption -> ReadImage -> Processing -> WriteHeader -> WriteResult -> Done
///      |                           |                          ^      \
///      +-- Limit ------------------+-- Busy ------------------+       +-- no body -> Done
/// ```
///
/// Any read or write failure sends a single `Error` header; a failure after
/// that closes the connection without another attempt.
pub struct ProtoSession {
    conn_id: u64,
    state: State,
    header: RequestHeader,
    caption: Bytes,
    image: Bytes,
    has_body: bool,
    has_errors: bool,
    limits: Limits,
    sink: Arc<dyn TaskSink>,
    // moved into the task on submission, a session submits at most once
    handle: Option<SessionHandle>,
}

impl ProtoSession {
    pub fn new(handle: SessionHandle, sink: Arc<dyn TaskSink>, limits: Limits) -> Self {
        ProtoSession {
            conn_id: handle.connection_id(),
            state: State::ReadHeader,
            header: RequestHeader::default(),
            caption: Bytes::new(),
            image: Bytes::new(),
            has_body: false,
            has_errors: false,
            limits,
            sink,
            handle: Some(handle),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn has_errors(&self) -> bool {
        self.has_errors
    }

    fn respond(&mut self, header: ResponseHeader) -> Interest {
        self.state = State::WriteHeader;
        self.has_body = header.has_body();
        debug!(
            conn_id = self.conn_id,
            status = ?header.status,
            image_size = header.image_size,
            "sending response header"
        );
        Interest::Send(header.encode())
    }

    fn respond_error(&mut self) -> Interest {
        self.has_errors = true;
        self.image = Bytes::new();
        self.respond(ResponseHeader::status_only(StatusCode::Error))
    }

    fn close(&mut self) -> Interest {
        self.state = State::Done;
        Interest::Close
    }

    fn on_header(&mut self, mut data: Bytes) -> Interest {
        let header = match RequestHeader::read_from(&mut data) {
            Ok(header) => header,
            Err(e) => return self.on_error(e),
        };
        info!(
            conn_id = self.conn_id,
            caption_size = header.caption_size,
            image_size = header.image_size,
            "new request"
        );
        self.header = header;

        if !header.within(&self.limits) {
            warn!(
                conn_id = self.conn_id,
                caption_size = header.caption_size,
                image_size = header.image_size,
                "data size limit reached"
            );
            return self.respond(ResponseHeader::status_only(StatusCode::Limit));
        }

        self.state = State::ReadCaption;
        Interest::Receive(header.caption_size as usize)
    }

    fn on_image(&mut self) -> Interest {
        self.state = State::Processing;

        let Some(handle) = self.handle.take() else {
            warn!(conn_id = self.conn_id, "session handle already consumed");
            return self.respond_error();
        };
        let task = Task::new(handle, mem::take(&mut self.caption), mem::take(&mut self.image));

        if !self.sink.submit(task) {
            info!(conn_id = self.conn_id, "worker pool busy, request rejected");
            return self.respond(ResponseHeader::status_only(StatusCode::Busy));
        }
        debug!(conn_id = self.conn_id, "task submitted");
        Interest::Park
    }
}

impl IoHandler for ProtoSession {
    type Event = TaskOutcome;

    fn start(&mut self) -> Interest {
        Interest::Receive(REQUEST_HEADER_SIZE)
    }

    fn on_receive(&mut self, data: Bytes) -> Interest {
        match self.state {
            State::ReadHeader => self.on_header(data),
            State::ReadCaption => {
                debug!(conn_id = self.conn_id, "caption received");
                self.caption = data;
                self.state = State::ReadImage;
                Interest::Receive(self.header.image_size as usize)
            }
            State::ReadImage => {
                debug!(conn_id = self.conn_id, "image received");
                self.image = data;
                self.on_image()
            }
            state => {
                warn!(conn_id = self.conn_id, ?state, "unexpected read completion");
                self.close()
            }
        }
    }

    fn on_sent(&mut self) -> Interest {
        if self.state == State::WriteHeader && self.has_body {
            debug!(conn_id = self.conn_id, "header sent");
            self.state = State::WriteResult;
            return Interest::Send(self.image.clone());
        }
        debug!(conn_id = self.conn_id, "session done");
        self.close()
    }

    fn on_error(&mut self, error: AppError) -> Interest {
        if self.has_errors {
            debug!(
                conn_id = self.conn_id,
                error = %error,
                "error after an error response, closing"
            );
            return self.close();
        }
        warn!(conn_id = self.conn_id, state = ?self.state, error = %error, "session error");
        self.respond_error()
    }

    fn on_event(&mut self, outcome: TaskOutcome) -> Interest {
        if self.state != State::Processing {
            warn!(
                conn_id = self.conn_id,
                state = ?self.state,
                "completion outside processing ignored"
            );
            return self.close();
        }
        match outcome {
            Ok(image) => match u32::try_from(image.len()) {
                Ok(image_size) => {
                    debug!(conn_id = self.conn_id, image_size, "task done");
                    self.image = image;
                    self.respond(ResponseHeader::ok(image_size))
                }
                Err(_) => {
                    warn!(
                        conn_id = self.conn_id,
                        len = image.len(),
                        "result does not fit a response"
                    );
                    self.respond_error()
                }
            },
            Err(e) => {
                warn!(conn_id = self.conn_id, error = %e, "task failed");
                self.respond_error()
            }
        }
    }
}
