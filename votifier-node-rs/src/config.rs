//! Node configuration
//!
//! Stored as `config.json` in the data directory. The first run writes a
//! fresh file with a free port so two nodes on one host don't collide.

use std::fs;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;
use votifier_core::receiver::DEFAULT_PORT;
use votifier_core::ReceiverConfig;

use crate::error::NodeError;

/// Config file name inside the data directory
pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Address to listen on
    pub host: String,
    pub port: u16,

    /// Log rejected votes in detail
    pub debug: bool,

    pub read_timeout_ms: u64,
    pub shutdown_grace_ms: u64,

    /// Append received votes to this JSON-lines file
    pub vote_log: Option<PathBuf>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            debug: false,
            read_timeout_ms: 5000,
            shutdown_grace_ms: 5000,
            vote_log: None,
        }
    }
}

impl NodeConfig {
    /// Load the config, creating it with defaults on first run.
    ///
    /// Returns the config and whether it was just created.
    pub fn load_or_create(path: &Path) -> Result<(Self, bool), NodeError> {
        if path.exists() {
            return Ok((Self::load(path)?, false));
        }

        info!("Configuring Votifier for the first time...");
        let config = Self {
            port: find_open_port(),
            ..Default::default()
        };
        config.save(path)?;

        info!("------------------------------------------------------------------------------");
        info!("Assigning Votifier to listen on port {}. If you are hosting on a", config.port);
        info!("shared server please check with your hosting provider to verify that this port");
        info!("is available for your use. Chances are that your hosting provider will assign");
        info!("a different port, which you need to specify in {}", path.display());
        info!("------------------------------------------------------------------------------");

        Ok((config, true))
    }

    pub fn load(path: &Path) -> Result<Self, NodeError> {
        let text = fs::read_to_string(path).map_err(|source| NodeError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| NodeError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), NodeError> {
        let write_err = |source| NodeError::Write {
            path: path.to_path_buf(),
            source,
        };

        let text = serde_json::to_string_pretty(self).map_err(|source| NodeError::ConfigEncode {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(path, text).map_err(write_err)
    }

    /// Settings for the core receiver
    pub fn receiver_config(&self) -> ReceiverConfig {
        ReceiverConfig::new(self.host.clone(), self.port)
            .with_debug(self.debug)
            .with_read_timeout(Duration::from_millis(self.read_timeout_ms))
            .with_shutdown_grace(Duration::from_millis(self.shutdown_grace_ms))
    }
}

/// Ask the OS for a free port, falling back to the default
pub fn find_open_port() -> u16 {
    TcpListener::bind("0.0.0.0:0")
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .unwrap_or(DEFAULT_PORT)
}
