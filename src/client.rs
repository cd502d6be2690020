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

//! A minimal client for the imprint protocol.
//!
//! One request per connection: the server closes the socket after its
//! response, so [`Client::request`] consumes the client.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, trace};

use crate::network::{RequestHeader, ResponseHeader, StatusCode, RESPONSE_HEADER_SIZE};
use crate::AppError::{DetailedIoError, InvalidValue};
use crate::AppResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    /// Empty unless `status` is `Ok`.
    pub image: Bytes,
}

#[derive(Debug)]
pub struct Client {
    stream: TcpStream,
}

impl Client {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> AppResult<Client> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        debug!(peer = ?stream.peer_addr().ok(), "connected");
        Ok(Client { stream })
    }

    pub async fn request(mut self, caption: &[u8], image: &[u8]) -> AppResult<Response> {
        let caption_size = u32::try_from(caption.len())
            .map_err(|_| InvalidValue(format!("caption of {} bytes", caption.len())))?;
        let image_size = u32::try_from(image.len())
            .map_err(|_| InvalidValue(format!("image of {} bytes", image.len())))?;

        let mut header = BytesMut::new();
        RequestHeader::new(caption_size, image_size).write_to(&mut header);
        self.stream.write_all(&header).await?;
        self.stream.write_all(caption).await?;
        self.stream.write_all(image).await?;
        self.stream.flush().await?;
        trace!(caption_size, image_size, "request sent");

        let mut header = [0u8; RESPONSE_HEADER_SIZE];
        self.stream
            .read_exact(&mut header)
            .await
            .map_err(|e| DetailedIoError(format!("reading response header: {}", e)))?;
        let header = ResponseHeader::read_from(&mut &header[..])?;

        let mut image = BytesMut::zeroed(header.image_size as usize);
        self.stream
            .read_exact(&mut image)
            .await
            .map_err(|e| DetailedIoError(format!("reading response image: {}", e)))?;
        debug!(status = ?header.status, size = header.image_size, "response received");

        Ok(Response {
            status: header.status,
            image: image.freeze(),
        })
    }
}
