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

use bytes::{BufMut, Bytes, BytesMut};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    #[error("image payload is empty")]
    EmptyImage,

    #[error("transformation failed: {0}")]
    Failed(String),

    #[error("transformation panicked: {0}")]
    Panicked(String),
}

/// Image transformation run by the worker pool, always off the I/O tasks.
pub trait Transformer: Send + Sync + 'static {
    fn transform(&self, caption: &[u8], image: Bytes) -> Result<Bytes, TransformError>;
}

pub const STAMP_MARKER: &[u8; 7] = b"IMPRINT";

/// Appends the caption after the image data as a trailer:
///
/// ```text
/// | image | "IMPRINT" | caption_len u32 le | caption |
/// ```
///
/// JPEG and PNG decoders stop at their end marker, so the stamped file still
/// opens everywhere while the caption travels with it.
#[derive(Debug, Default, Clone, Copy)]
pub struct CaptionStamp;

impl Transformer for CaptionStamp {
    fn transform(&self, caption: &[u8], image: Bytes) -> Result<Bytes, TransformError> {
        if image.is_empty() {
            return Err(TransformError::EmptyImage);
        }
        if caption.is_empty() {
            return Ok(image);
        }
        let caption_len = u32::try_from(caption.len())
            .map_err(|_| TransformError::Failed(format!("caption of {} bytes", caption.len())))?;

        let mut stamped =
            BytesMut::with_capacity(image.len() + STAMP_MARKER.len() + 4 + caption.len());
        stamped.put_slice(&image);
        stamped.put_slice(STAMP_MARKER);
        stamped.put_u32_le(caption_len);
        stamped.put_slice(caption);
        Ok(stamped.freeze())
    }
}
