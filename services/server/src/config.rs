use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;

// Gateway configuration sourced from environment variables, with an
// optional YAML override file for ops-friendly deployments.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // HTTP listener bind address.
    pub address: String,
    // Memory ceiling shared by the buffer manager and the throttler, bytes.
    pub max_memory: u64,
}

const DEFAULT_ADDRESS: &str = ":8080";
const DEFAULT_MAX_MEMORY_MB: u64 = 2048;
const DEFAULT_CONFIG_PATH: &str = "/usr/local/ripple/config.yml";

#[derive(Debug, Deserialize)]
struct ServerConfigOverride {
    address: Option<String>,
    max_memory_mb: Option<u64>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let address = std::env::var("ADDRESS").unwrap_or_else(|_| DEFAULT_ADDRESS.to_string());
        let max_memory_mb = match std::env::var("MAX_MEMORY_MB") {
            Ok(value) => value
                .parse::<u64>()
                .with_context(|| format!("parse MAX_MEMORY_MB: {value}"))?,
            Err(_) => DEFAULT_MAX_MEMORY_MB,
        };
        Ok(Self {
            address: normalize_address(&address),
            max_memory: max_memory_mb * 1024 * 1024,
        })
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        let override_path = std::env::var("RIPPLE_CONFIG").ok();
        let config_path = override_path
            .clone()
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
        let contents = match fs::read_to_string(&config_path) {
            Ok(contents) => Some(contents),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                // Only an explicitly requested file is allowed to fail.
                if override_path.is_some() {
                    return Err(err).with_context(|| format!("read RIPPLE_CONFIG: {config_path}"));
                }
                None
            }
            Err(err) => {
                return Err(err).with_context(|| format!("read server config: {config_path}"));
            }
        };
        if let Some(contents) = contents {
            let override_cfg: ServerConfigOverride =
                serde_yaml::from_str(&contents).context("parse server config yaml")?;
            if let Some(value) = override_cfg.address {
                config.address = normalize_address(&value);
            }
            if let Some(value) = override_cfg.max_memory_mb {
                config.max_memory = value * 1024 * 1024;
            }
        }
        Ok(config)
    }
}

// Accept the Go-style ":8080" shorthand as well as a full host:port.
fn normalize_address(address: &str) -> String {
    if let Some(port) = address.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        address.to_string()
    }
}
