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

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::{runtime, signal};
use tracing::{error, info, trace, warn};

use crate::processor::{CaptionStamp, Transformer, WorkerPool};
use crate::AppError::IllegalStateError;
use crate::AppResult;

use super::{Server, ServerConfig};

/// Wires the worker pool and the tcp server together and runs them until ctrl-c.
pub struct Launcher {
    config: ServerConfig,
    transformer: Arc<dyn Transformer>,
}

impl Launcher {
    pub fn new(config: ServerConfig) -> Self {
        Launcher {
            config,
            transformer: Arc::new(CaptionStamp),
        }
    }

    pub fn with_transformer(mut self, transformer: Arc<dyn Transformer>) -> Self {
        self.transformer = transformer;
        self
    }

    // Graceful shutdown sequence:
    // 1. ctrl-c cancels the accept loop, no new connections are taken.
    // 2. The worker pool is closed, sessions that finish reading from now on get `Busy`.
    // 3. Workers drain the tasks already queued and exit, connections write their
    //    responses and exit. Each drops its `shutdown_complete_tx` on exit.
    // 4. A second ctrl-c broadcasts shutdown: workers stop at once, queued tasks are
    //    dropped and their sessions answer `Error`.
    pub fn start(&self, rt: &runtime::Runtime) -> AppResult<()> {
        let (notify_shutdown, _) = broadcast::channel(1);
        let (shutdown_complete_tx, mut shutdown_complete_rx) = mpsc::channel(1);

        rt.block_on(async {
            let pool_config = &self.config.worker_pool;
            let pool = Arc::new(WorkerPool::new(
                pool_config.channel_capacity,
                pool_config.worker_count(),
                self.transformer.clone(),
                notify_shutdown.clone(),
                shutdown_complete_tx.clone(),
            ));

            Self::run_tcp_server(&self.config, pool.clone(), shutdown_complete_tx).await?;

            pool.close();
            drop(pool);

            trace!("waiting for shutdown complete...");
            let forced = tokio::select! {
                _ = shutdown_complete_rx.recv() => false,
                _ = signal::ctrl_c() => true,
            };
            if forced {
                warn!("second shutdown signal, dropping queued tasks");
                let _ = notify_shutdown.send(());
                shutdown_complete_rx.recv().await;
            }
            info!("imprint shutdown complete");
            Ok(())
        })
    }

    async fn run_tcp_server(
        config: &ServerConfig,
        pool: Arc<WorkerPool>,
        shutdown_complete_tx: mpsc::Sender<()>,
    ) -> AppResult<()> {
        let listen_address = config.network.listen_address();

        let listener = match TcpListener::bind(&listen_address).await {
            Ok(listener) => listener,
            Err(err) => {
                let error_msg = format!(
                    "Failed to bind server to address: {} - Error: {}",
                    listen_address, err
                );
                error!("{}", error_msg);
                return Err(IllegalStateError(error_msg));
            }
        };
        info!(
            workers = pool.worker_count(),
            io_timeout = config.network.io_timeout,
            "tcp server binding to {} for listening",
            &listen_address
        );

        let server = Server::new(listener, config, pool, shutdown_complete_tx);
        tokio::select! {
          res = server.run() => {
              if let Err(err) = res {
                  error!(cause = %err, "failed to accept");
              }
          }
          _ = signal::ctrl_c() => {
              info!("get shutdown signal");
          }
        }

        Ok(())
    }
}
