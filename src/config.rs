//! Server Configuration
//!
//! Settings are read from a JSON file and then overridden by command-line
//! flags. Every field has a default, so an empty object (or no file at all)
//! yields a usable configuration.
//!
//! ```json
//! {
//!   "port": 6380,
//!   "version": "6.0.3",
//!   "sweep_interval_ms": 50
//! }
//! ```

use crate::protocol::parser::MAX_BULK_SIZE;
use crate::storage::ExpiryConfig;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Extra headroom on top of the largest bulk string, for the frame around it.
const FRAME_HEADROOM: usize = 64 * 1024;

/// Errors raised while loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Process-wide settings, shared read-only behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,

    /// Reported as `server` by HELLO
    pub server_name: String,
    /// Reported as `version` by HELLO
    pub version: String,
    /// Highest protocol version HELLO accepts
    pub proto_version: i64,
    pub mode: String,
    pub role: String,
    pub modules: Vec<String>,

    /// Keys examined per sweeper iteration
    pub sweep_chunk_size: usize,
    /// Pause between sweeper iterations
    pub sweep_interval_ms: u64,
    /// Pause before relaunching a sweeper that panicked
    pub sweep_restart_cooldown_ms: u64,

    /// Largest read buffer a single connection may accumulate
    pub max_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            server_name: "redis".to_string(),
            version: "6.0.3".to_string(),
            proto_version: 3,
            mode: "standalone".to_string(),
            role: "master".to_string(),
            modules: Vec::new(),
            sweep_chunk_size: 100,
            sweep_interval_ms: 100,
            sweep_restart_cooldown_ms: 2000,
            max_buffer_size: MAX_BULK_SIZE + FRAME_HEADROOM,
        }
    }
}

impl ServerConfig {
    /// Loads the configuration from `path`.
    ///
    /// A missing file is not an error: the defaults are returned instead.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Returns the `host:port` string the transport binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the sweeper settings.
    pub fn expiry_config(&self) -> ExpiryConfig {
        ExpiryConfig {
            chunk_size: self.sweep_chunk_size.max(1),
            interval: Duration::from_millis(self.sweep_interval_ms),
            restart_cooldown: Duration::from_millis(self.sweep_restart_cooldown_ms),
        }
    }
}
