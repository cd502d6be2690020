pub use app_error::{AppError, AppResult};
pub use config::{
    LimitsConfig, LogConfig, NetworkConfig, ServerConfig, WorkerPoolConfig,
    DEFAULT_MAX_CAPTION_SIZE, DEFAULT_MAX_IMAGE_SIZE,
};
pub use launcher::Launcher;
pub use server::Server;
pub use shutdown::Shutdown;
pub use tracing_config::{level_from_verbosity, setup_local_tracing, setup_tracing, TracingGuard};

mod app_error;
pub mod config;
mod launcher;
mod server;
mod shutdown;
mod tracing_config;
