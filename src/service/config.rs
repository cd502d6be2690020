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

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::network::Limits;

use super::{AppError, AppResult};

pub const DEFAULT_MAX_CAPTION_SIZE: u32 = 512;
pub const DEFAULT_MAX_IMAGE_SIZE: u32 = 100 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct NetworkConfig {
    pub ip: String,
    pub port: u16,
    pub max_connection: usize,
    /// Per-operation deadline in seconds, re-armed on every read and write.
    pub io_timeout: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            ip: "0.0.0.0".to_string(),
            port: 9400,
            max_connection: 1024,
            io_timeout: 30,
        }
    }
}

impl NetworkConfig {
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_caption_size: u32,
    pub max_image_size: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        LimitsConfig {
            max_caption_size: DEFAULT_MAX_CAPTION_SIZE,
            max_image_size: DEFAULT_MAX_IMAGE_SIZE,
        }
    }
}

impl From<&LimitsConfig> for Limits {
    fn from(value: &LimitsConfig) -> Self {
        Limits {
            max_caption_size: value.max_caption_size,
            max_image_size: value.max_image_size,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// number of tasks that may wait in the queue before submissions are rejected
    pub channel_capacity: usize,
    /// 0 means one worker per cpu
    pub num_workers: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        WorkerPoolConfig {
            channel_capacity: 64,
            num_workers: 0,
        }
    }
}

impl WorkerPoolConfig {
    pub fn worker_count(&self) -> usize {
        if self.num_workers == 0 {
            num_cpus::get()
        } else {
            self.num_workers
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LogConfig {
    pub dir: String,
    pub file_prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            dir: "logs".to_string(),
            file_prefix: "imprint.log".to_string(),
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub network: NetworkConfig,
    pub limits: LimitsConfig,
    pub worker_pool: WorkerPoolConfig,
    pub log: LogConfig,
}

impl ServerConfig {
    pub fn set_up_config<P: AsRef<Path>>(path: P) -> AppResult<ServerConfig> {
        let path_str = path.as_ref().to_str().ok_or(AppError::InvalidValue(format!(
            "config file path: {}",
            path.as_ref().to_string_lossy()
        )))?;
        let config = config::Config::builder()
            .add_source(config::File::with_name(path_str))
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.network.port == 0 {
            return Err(AppError::InvalidValue("network.port must not be 0".into()));
        }
        if self.network.io_timeout == 0 {
            return Err(AppError::InvalidValue(
                "network.io_timeout must be at least 1 second".into(),
            ));
        }
        if self.network.max_connection == 0 {
            return Err(AppError::InvalidValue(
                "network.max_connection must be greater than 0".into(),
            ));
        }
        if self.worker_pool.channel_capacity == 0 {
            return Err(AppError::InvalidValue(
                "worker_pool.channel_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
