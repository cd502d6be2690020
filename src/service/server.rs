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

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Semaphore};
use tokio::time::{self, Duration};
use tracing::{debug, info_span, Instrument};

use crate::network::{Connection, Limits};
use crate::processor::TaskSink;
use crate::session::{ProtoSession, SessionHandle};
use crate::AppError;
use crate::AppResult;

use super::ServerConfig;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

// handler for each connection
struct ConnectionHandler {
    _shutdown_complete_tx: mpsc::Sender<()>,
    connection_id: u64,
    io_timeout: Duration,
    limits: Limits,
    sink: Arc<dyn TaskSink>,
}

impl ConnectionHandler {
    async fn handle_connection(self, socket: TcpStream) {
        if let Err(e) = socket.set_nodelay(true) {
            debug!(error = %e, "failed to set TCP_NODELAY");
        }
        let (handle, mailbox) = SessionHandle::new(self.connection_id);
        let session = ProtoSession::new(handle, self.sink.clone(), self.limits);
        let connection = Connection::new(self.connection_id, socket, self.io_timeout);
        connection.run(session, mailbox).await;
    }
}

impl Drop for ConnectionHandler {
    fn drop(&mut self) {
        debug!(conn_id = self.connection_id, "connection handler dropped");
    }
}

pub struct Server {
    listener: TcpListener,
    limit_connections: Arc<Semaphore>,
    shutdown_complete_tx: mpsc::Sender<()>,
    sink: Arc<dyn TaskSink>,
    limits: Limits,
    io_timeout: Duration,
}

impl Server {
    pub fn new(
        listener: TcpListener,
        config: &ServerConfig,
        sink: Arc<dyn TaskSink>,
        shutdown_complete_tx: mpsc::Sender<()>,
    ) -> Self {
        Server {
            listener,
            limit_connections: Arc::new(Semaphore::new(config.network.max_connection)),
            shutdown_complete_tx,
            sink,
            limits: Limits::from(&config.limits),
            io_timeout: config.network.io_timeout(),
        }
    }

    pub fn local_addr(&self) -> AppResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until an accept fails for good.
    ///
    /// Each connection runs on its own task inside a `connection` span and
    /// holds one permit of the connection limit until it closes. Dropping
    /// the future returned here stops accepting; connections already running
    /// finish on their own, bounded by the I/O deadline, and each holds a
    /// shutdown-complete sender until then.
    pub async fn run(&self) -> AppResult<()> {
        loop {
            let permit = self
                .limit_connections
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| AppError::IllegalStateError(format!("connection limit: {}", e)))?;

            let (socket, peer) = self.accept().await?;
            let connection_id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
            debug!(conn_id = connection_id, peer = %peer, "accept new connection");

            let handler = ConnectionHandler {
                _shutdown_complete_tx: self.shutdown_complete_tx.clone(),
                connection_id,
                io_timeout: self.io_timeout,
                limits: self.limits,
                sink: self.sink.clone(),
            };

            let span = info_span!("connection", conn_id = connection_id, peer = %peer);
            tokio::spawn(
                async move {
                    handler.handle_connection(socket).await;
                    // whether gracefully or unexpectedly closed, release connection
                    drop(permit);
                }
                .instrument(span),
            );
        }
    }

    async fn accept(&self) -> AppResult<(TcpStream, SocketAddr)> {
        let mut backoff = 1;

        loop {
            match self.listener.accept().await {
                Ok(accepted) => return Ok(accepted),
                Err(err) => {
                    if backoff > 64 {
                        return Err(AppError::Accept(err.to_string()));
                    }
                    debug!(error = %err, backoff, "accept failed, retrying");
                }
            }

            time::sleep(Duration::from_secs(backoff)).await;
            backoff *= 2;
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        debug!("tcp server dropped");
    }
}
