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

use dotenv::dotenv;
use once_cell::sync::OnceCell;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use super::config::LogConfig;
use super::{AppError, AppResult};

const TIMER_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

static LOCAL_TRACING: OnceCell<()> = OnceCell::new();

/// Keeps the non-blocking file writer alive, buffered lines are flushed on drop.
pub struct TracingGuard {
    _worker_guard: WorkerGuard,
}

impl Drop for TracingGuard {
    fn drop(&mut self) {
        tracing::info!("flushing log writer");
    }
}

/// `RUST_LOG` wins, otherwise the level derived from the `-v` count.
fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

pub fn level_from_verbosity(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// stdout only, used by tests. Safe to call more than once.
pub fn setup_local_tracing() -> AppResult<()> {
    LOCAL_TRACING.get_or_try_init(|| {
        dotenv().ok();
        let timer = ChronoLocal::new(TIMER_FORMAT.to_string());
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_timer(timer)
            .with_target(true)
            .with_thread_names(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .with_test_writer();
        tracing_subscriber::registry()
            .with(fmt_layer)
            .with(env_filter("debug"))
            .try_init()
            .map_err(|e| AppError::TracingSetup(e.to_string()))
    })?;
    Ok(())
}

/// stdout plus an hourly rolling file under `log.dir`.
pub fn setup_tracing(log: &LogConfig, verbose: u8) -> AppResult<TracingGuard> {
    dotenv().ok();

    let file_appender = tracing_appender::rolling::hourly(&log.dir, &log.file_prefix);
    let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
    let writer = non_blocking.and(std::io::stdout);

    let timer = ChronoLocal::new(TIMER_FORMAT.to_string());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_timer(timer)
        .with_target(true)
        .with_thread_names(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(writer);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter(level_from_verbosity(verbose)))
        .try_init()
        .map_err(|e| AppError::TracingSetup(e.to_string()))?;

    Ok(TracingGuard {
        _worker_guard: worker_guard,
    })
}
