//! Configuration loading for greeterd.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.greeter/config.toml` (user)
//! 3. `/etc/greeter/config.toml` (system)
//!
//! When no file exists the built-in defaults are used.

use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{GreeterError, Result};

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub greeting: GreetingConfig,
}

/// Server network configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to (default: 0.0.0.0).
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on (default: 8080).
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            limits: LimitsConfig::default(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl ServerConfig {
    /// Socket address to bind.
    pub fn address(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| GreeterError::Configuration(format!("Invalid address: {e}")))
    }
}

/// Resource limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum concurrent requests per connection (default: 100).
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
    /// Server-side call timeout in seconds (default: none).
    ///
    /// Applies to every call, including streams paced by the client.
    /// Callers normally bound their own calls with a client timeout.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: default_max_concurrent(),
            request_timeout_secs: None,
        }
    }
}

fn default_max_concurrent() -> usize {
    100
}

impl LimitsConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

/// Greeting behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct GreetingConfig {
    /// Responses sent by GreetStream (default: 5).
    #[serde(default = "default_stream_count")]
    pub stream_count: usize,
    /// Pause between GreetStream responses in milliseconds (default: 1000).
    #[serde(default = "default_stream_interval_ms")]
    pub stream_interval_ms: u64,
}

impl Default for GreetingConfig {
    fn default() -> Self {
        Self {
            stream_count: default_stream_count(),
            stream_interval_ms: default_stream_interval_ms(),
        }
    }
}

fn default_stream_count() -> usize {
    5
}

fn default_stream_interval_ms() -> u64 {
    1000
}

impl GreetingConfig {
    pub fn stream_interval(&self) -> Duration {
        Duration::from_millis(self.stream_interval_ms)
    }
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided, must exist)
    /// 2. `~/.greeter/config.toml`
    /// 3. `/etc/greeter/config.toml`
    /// 4. Built-in defaults
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Config::default()),
        }
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            GreeterError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            GreeterError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    /// Resolve the config file path. `None` means "use defaults".
    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(GreeterError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".greeter").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/greeter/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }
}
