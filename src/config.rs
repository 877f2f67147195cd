use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::error::{Result, RouterError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    pub simulated_ip: String,
    #[serde(default = "default_process_ip")]
    pub process_ip: String,
    /// Listening port; scanned from the bottom of the process range when absent
    #[serde(default)]
    pub process_port: Option<u16>,
    #[serde(default = "default_num_ports")]
    pub num_ports: usize,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_heartbeat_max_retry")]
    pub heartbeat_max_retry: u32,
    #[serde(default = "default_io_timeout")]
    pub io_timeout_ms: u64,
}

fn default_process_ip() -> String {
    "127.0.0.1".to_string()
}

fn default_num_ports() -> usize {
    4
}

fn default_heartbeat_interval() -> u64 {
    10
}

fn default_heartbeat_max_retry() -> u32 {
    3
}

fn default_io_timeout() -> u64 {
    3000
}

impl RouterConfig {
    pub fn new(simulated_ip: impl Into<String>) -> Self {
        Self {
            simulated_ip: simulated_ip.into(),
            process_ip: default_process_ip(),
            process_port: None,
            num_ports: default_num_ports(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            heartbeat_max_retry: default_heartbeat_max_retry(),
            io_timeout_ms: default_io_timeout(),
        }
    }

    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: RouterConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.simulated_ip.trim().is_empty() {
            return Err(RouterError::Config("simulated_ip must not be empty".to_string()));
        }
        if self.process_ip.trim().is_empty() {
            return Err(RouterError::Config("process_ip must not be empty".to_string()));
        }
        if self.num_ports == 0 {
            return Err(RouterError::Config("num_ports must be at least 1".to_string()));
        }
        if self.heartbeat_max_retry == 0 {
            return Err(RouterError::Config(
                "heartbeat_max_retry must be at least 1".to_string(),
            ));
        }
        if self.heartbeat_interval_secs == 0 || self.io_timeout_ms == 0 {
            return Err(RouterError::Config(
                "heartbeat interval and I/O timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}
