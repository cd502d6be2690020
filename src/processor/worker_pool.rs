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

use std::any::type_name;
use std::sync::Arc;

use async_channel::TrySendError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{self, JoinError};
use tracing::{debug, error, trace, warn};

use crate::Shutdown;

use super::{Task, TransformError, Transformer};

/// Where a session hands its finished request.
///
/// `submit` never blocks. It returns false when the task cannot be queued;
/// the rejected task is dropped without having been started.
pub trait TaskSink: Send + Sync {
    fn submit(&self, task: Task) -> bool;
}

/// Bounded queue drained by a fixed set of workers.
///
/// Each worker runs the transformation on the blocking thread pool and
/// completes the task through its session handle, exactly once.
#[derive(Debug)]
pub struct WorkerPool {
    notify_shutdown: broadcast::Sender<()>,
    request_tx: async_channel::Sender<Task>,
    // kept so the queue stays open even with zero live workers
    _request_rx: async_channel::Receiver<Task>,
    worker_count: usize,
}

impl WorkerPool {
    /// Spawns the workers, must be called from within a tokio runtime.
    pub fn new(
        capacity: usize,
        num_workers: usize,
        transformer: Arc<dyn Transformer>,
        notify_shutdown: broadcast::Sender<()>,
        shutdown_complete_tx: mpsc::Sender<()>,
    ) -> Self {
        let (request_tx, request_rx) = async_channel::bounded(capacity);

        for id in 0..num_workers {
            let rx = request_rx.clone();
            let transformer = transformer.clone();
            let shutdown = Shutdown::new(notify_shutdown.subscribe());
            let shutdown_complete_tx = shutdown_complete_tx.clone();
            tokio::spawn(async move {
                run_worker(id, rx, transformer, shutdown).await;
                drop(shutdown_complete_tx);
            });
        }
        debug!(capacity, num_workers, "worker pool started");

        WorkerPool {
            notify_shutdown,
            request_tx,
            _request_rx: request_rx,
            worker_count: num_workers,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Tasks waiting for a worker.
    pub fn queued(&self) -> usize {
        self.request_tx.len()
    }

    /// Stops accepting tasks. Tasks already queued are still drained.
    pub fn close(&self) {
        self.request_tx.close();
    }

    /// Stops the workers at once. Queued tasks are dropped without completion.
    pub fn shutdown(&self) {
        let _ = self.notify_shutdown.send(());
    }
}

impl TaskSink for WorkerPool {
    fn submit(&self, task: Task) -> bool {
        match self.request_tx.try_send(task) {
            Ok(()) => true,
            Err(TrySendError::Full(task)) => {
                debug!(conn_id = task.connection_id(), "worker pool at capacity");
                false
            }
            Err(TrySendError::Closed(task)) => {
                warn!(conn_id = task.connection_id(), "worker pool is closed");
                false
            }
        }
    }
}

async fn run_worker(
    id: usize,
    request_rx: async_channel::Receiver<Task>,
    transformer: Arc<dyn Transformer>,
    mut shutdown: Shutdown,
) {
    debug!("Worker {} started", id);
    loop {
        let task = tokio::select! {
            biased;
            _ = shutdown.recv() => {
                debug!("Worker {} shutting down", id);
                drop_queued(&request_rx);
                break;
            }
            res = request_rx.recv() => match res {
                Ok(task) => task,
                Err(_) => {
                    debug!("Worker {} queue closed", id);
                    break;
                }
            },
        };
        process_task(task, transformer.clone()).await;
    }
    debug!("Worker {} exited", id);
}

// Closing first makes later submissions fail, so nothing can be left behind
// in the queue once the workers are gone.
fn drop_queued(request_rx: &async_channel::Receiver<Task>) {
    request_rx.close();
    let mut dropped = 0;
    while let Ok(task) = request_rx.try_recv() {
        trace!(conn_id = task.connection_id(), "dropping queued task");
        drop(task);
        dropped += 1;
    }
    if dropped > 0 {
        warn!(dropped, "queued tasks dropped on shutdown");
    }
}

async fn process_task(task: Task, transformer: Arc<dyn Transformer>) {
    let (session, caption, image) = task.into_parts();
    let conn_id = session.connection_id();
    trace!(conn_id, image_size = image.len(), "transforming");

    let outcome = match task::spawn_blocking(move || transformer.transform(&caption, image)).await
    {
        Ok(outcome) => outcome,
        Err(join_error) => {
            let message = panic_message(join_error);
            error!(conn_id, "Transformation panicked with message: {}", message);
            Err(TransformError::Panicked(message))
        }
    };

    if let Err(e) = &outcome {
        warn!(conn_id, error = %e, "transformation failed");
    }
    if !session.complete(outcome) {
        debug!(conn_id, "session closed before its result was ready, result dropped");
    }
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return "blocking task cancelled".to_string();
    }
    let payload = err.into_panic();
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        format!("unknown payload type: {}", get_type_name(&payload))
    }
}

#[inline]
fn get_type_name<R>(_: &R) -> &'static str {
    type_name::<R>()
}
