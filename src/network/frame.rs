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

//! Wire headers.
//!
//! ```text
//! request : | caption_size u32 | image_size u32 | caption | image |
//! response: | status u32       | image_size u32 | result (status == Ok only) |
//! ```
//!
//! All integers are little-endian, both headers are exactly 8 bytes and the
//! declared sizes are the only framing of the bodies that follow.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::service::config::{DEFAULT_MAX_CAPTION_SIZE, DEFAULT_MAX_IMAGE_SIZE};
use crate::AppError::{Incomplete, MalformedProtocol};
use crate::AppResult;

pub const REQUEST_HEADER_SIZE: usize = 8;
pub const RESPONSE_HEADER_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum StatusCode {
    Ok = 0,
    Busy = 1,
    Limit = 2,
    Error = 3,
}

impl StatusCode {
    pub fn from_wire(value: u32) -> AppResult<StatusCode> {
        match value {
            0 => Ok(StatusCode::Ok),
            1 => Ok(StatusCode::Busy),
            2 => Ok(StatusCode::Limit),
            3 => Ok(StatusCode::Error),
            other => Err(MalformedProtocol(format!("unknown status code {}", other))),
        }
    }
}

/// Upper bounds for the declared body sizes of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_caption_size: u32,
    pub max_image_size: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_caption_size: DEFAULT_MAX_CAPTION_SIZE,
            max_image_size: DEFAULT_MAX_IMAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestHeader {
    pub caption_size: u32,
    pub image_size: u32,
}

impl RequestHeader {
    pub fn new(caption_size: u32, image_size: u32) -> Self {
        RequestHeader {
            caption_size,
            image_size,
        }
    }

    pub fn read_from(buffer: &mut impl Buf) -> AppResult<RequestHeader> {
        if buffer.remaining() < REQUEST_HEADER_SIZE {
            return Err(Incomplete);
        }
        let caption_size = buffer.get_u32_le();
        let image_size = buffer.get_u32_le();
        Ok(RequestHeader {
            caption_size,
            image_size,
        })
    }

    pub fn write_to(&self, buffer: &mut BytesMut) {
        buffer.reserve(REQUEST_HEADER_SIZE);
        buffer.put_u32_le(self.caption_size);
        buffer.put_u32_le(self.image_size);
    }

    pub fn within(&self, limits: &Limits) -> bool {
        self.caption_size <= limits.max_caption_size && self.image_size <= limits.max_image_size
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub status: StatusCode,
    pub image_size: u32,
}

impl ResponseHeader {
    /// A header without a body.
    pub fn status_only(status: StatusCode) -> Self {
        ResponseHeader {
            status,
            image_size: 0,
        }
    }

    pub fn ok(image_size: u32) -> Self {
        ResponseHeader {
            status: StatusCode::Ok,
            image_size,
        }
    }

    pub fn has_body(&self) -> bool {
        self.status == StatusCode::Ok
    }

    pub fn encode(&self) -> Bytes {
        let mut buffer = BytesMut::with_capacity(RESPONSE_HEADER_SIZE);
        buffer.put_u32_le(self.status as u32);
        buffer.put_u32_le(self.image_size);
        buffer.freeze()
    }

    pub fn read_from(buffer: &mut impl Buf) -> AppResult<ResponseHeader> {
        if buffer.remaining() < RESPONSE_HEADER_SIZE {
            return Err(Incomplete);
        }
        let status = StatusCode::from_wire(buffer.get_u32_le())?;
        let image_size = buffer.get_u32_le();
        if status != StatusCode::Ok && image_size != 0 {
            return Err(MalformedProtocol(format!(
                "{:?} response declares a body of {} bytes",
                status, image_size
            )));
        }
        Ok(ResponseHeader { status, image_size })
    }
}
