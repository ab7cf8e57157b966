use std::fs;
use std::path::Path;

use anyhow::Context;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use trust::ConfigFlags;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub certificates: ConfigFlags,
}

/// Written on first start, and used when no config file exists.
pub static DEFAULT_CONFIG: Lazy<Config> = Lazy::new(|| Config {
    certificates: ConfigFlags {
        check_hostname: false,
        check_validity: false,
    },
});

impl Config {
    /// Reads the config at `path`, falling back to the defaults when it doesn't exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(*DEFAULT_CONFIG);
        }
        let content =
            fs::read_to_string(path).with_context(|| format!("Reading config from {:?}", path))?;
        let config =
            toml::from_str(&content).with_context(|| format!("Parsing config at {:?}", path))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string(self).context("Serializing config")?;
        fs::write(path, content).with_context(|| format!("Writing config to {:?}", path))?;
        Ok(())
    }
}
