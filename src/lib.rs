pub mod client;
pub mod network;
pub mod processor;
pub mod service;
pub mod session;

pub use client::{Client, Response};
pub use service::{
    setup_local_tracing, setup_tracing, AppError, AppResult, Launcher, Server, ServerConfig,
    Shutdown,
};
