//! Server configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Default config file, looked up relative to the working directory
const CONFIG_FILE: &str = "pricing";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerConfig {
    /// Directory holding matches.json, bins.json and the model manifests
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,

    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Load every registered model before reporting ready
    #[serde(default = "default_preload_models")]
    pub preload_models: bool,
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_api_port() -> u16 {
    8080
}

fn default_preload_models() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: default_artifacts_dir(),
            api_port: default_api_port(),
            preload_models: default_preload_models(),
        }
    }
}

impl ServerConfig {
    /// Load from an optional `pricing.toml` and `PRICING_*` environment variables
    pub fn load() -> Result<Self> {
        Self::load_from(CONFIG_FILE)
    }

    /// Same as [`ServerConfig::load`] with an explicit file name; the file may be absent
    pub fn load_from(file: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(file).required(false))
            .add_source(config::Environment::with_prefix("PRICING"))
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Invalid configuration")
    }
}
