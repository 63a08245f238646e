// Copyright 2020 TiKV Project Authors. Licensed under Apache-2.0.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Default address the HTTP server binds to.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3000";
/// Default upper bound on request bodies.
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024;

/// Config contains the parameters to start a ledger server.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The address the HTTP API listens on.
    pub listen_addr: String,

    /// Directory holding the vote log. When unset the ledger lives in memory
    /// only and is lost on restart.
    pub data_dir: Option<PathBuf>,

    /// Requests with a larger body are rejected before parsing.
    pub max_body_bytes: usize,

    /// Flush every appended vote to disk before acknowledging it.
    pub sync_writes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_owned(),
            data_dir: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            sync_writes: true,
        }
    }
}

impl Config {
    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
        let data = fs::read_to_string(path)?;
        let cfg: Config = serde_json::from_str(&data)?;
        Ok(cfg)
    }

    /// The parsed listen address. Call `validate` first.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.listen_addr.parse().map_err(|e| {
            Error::ConfigInvalid(format!("invalid listen_addr {}: {}", self.listen_addr, e))
        })
    }

    /// Runs validations against the config.
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        if self.max_body_bytes == 0 {
            return Err(Error::ConfigInvalid(
                "max body bytes must be greater than 0".to_owned(),
            ));
        }

        if let Some(dir) = &self.data_dir {
            if dir.as_os_str().is_empty() {
                return Err(Error::ConfigInvalid(
                    "data dir must not be empty when set".to_owned(),
                ));
            }
        }

        Ok(())
    }
}
