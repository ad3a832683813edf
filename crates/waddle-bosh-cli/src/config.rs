// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Waddle Social

//! Configuration for the BOSH command-line client.
//!
//! Loaded from `$XDG_CONFIG_HOME/waddle-bosh/config.toml`, then overridden by
//! `WADDLE_BOSH_*` environment variables, then by command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use waddle_bosh::auth::DEFAULT_MAX_CHALLENGE_ROUNDS;
use waddle_bosh::{ClientConfig, TransportConfig};

const ENV_SERVICE_URL: &str = "WADDLE_BOSH_SERVICE_URL";
const ENV_RESOURCE: &str = "WADDLE_BOSH_RESOURCE";
const ENV_TIMEOUT_MARGIN: &str = "WADDLE_BOSH_TIMEOUT_MARGIN_SECS";
const ENV_MAX_CHALLENGE_ROUNDS: &str = "WADDLE_BOSH_MAX_CHALLENGE_ROUNDS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Connection manager endpoint, e.g. `http://localhost:5280/http-bind/`
    pub service_url: String,
    /// Resource requested at bind time
    pub resource: String,
    /// Seconds added to the negotiated wait for each request deadline
    pub timeout_margin_secs: u64,
    /// SASL challenge rounds tolerated before giving up
    pub max_challenge_rounds: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_url: "http://localhost:5280/http-bind/".into(),
            resource: "waddle-bosh".into(),
            timeout_margin_secs: 10,
            max_challenge_rounds: DEFAULT_MAX_CHALLENGE_ROUNDS,
        }
    }
}

impl Config {
    /// Load from `path`, or from the default location when `path` is `None`.
    /// A missing file at the default location yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::config_file_path() {
                Some(path) => (path, false),
                None => {
                    tracing::debug!("No config directory available, using defaults");
                    return Ok(Config::default());
                }
            },
        };

        if !explicit && !path.exists() {
            tracing::debug!("No config file at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        tracing::debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Apply `WADDLE_BOSH_*` overrides, looked up through `var`.
    pub fn apply_env<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = var(ENV_SERVICE_URL) {
            self.service_url = url;
        }
        if let Some(resource) = var(ENV_RESOURCE) {
            self.resource = resource;
        }
        if let Some(margin) = var(ENV_TIMEOUT_MARGIN) {
            self.timeout_margin_secs = margin
                .trim()
                .parse()
                .with_context(|| format!("{ENV_TIMEOUT_MARGIN} must be a number of seconds"))?;
        }
        if let Some(rounds) = var(ENV_MAX_CHALLENGE_ROUNDS) {
            self.max_challenge_rounds = rounds
                .trim()
                .parse()
                .with_context(|| format!("{ENV_MAX_CHALLENGE_ROUNDS} must be an integer"))?;
        }
        Ok(())
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            transport: TransportConfig {
                timeout_margin: Duration::from_secs(self.timeout_margin_secs),
                ..TransportConfig::default()
            },
            max_challenge_rounds: self.max_challenge_rounds,
        }
    }

    /// `$XDG_CONFIG_HOME/waddle-bosh/config.toml`
    pub fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("waddle-bosh").join("config.toml"))
    }
}
