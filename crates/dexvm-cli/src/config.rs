//! `dexvm.toml` loading
//!
//! ```toml
//! [vm]
//! instructions_per_priority = 50
//! detect_deadlock = false
//! ```

use anyhow::Context;
use dexvm_core::VmOptions;
use serde::Deserialize;
use std::path::Path;

/// Default configuration file looked up in the working directory
pub const CONFIG_FILE: &str = "dexvm.toml";

/// Contents of a configuration file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `[vm]` table
    pub vm: VmOptions,
}

impl Config {
    /// Parse configuration text
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("invalid configuration")
    }

    /// Read a configuration file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("in {}", path.display()))
    }
}

/// Configuration from `explicit`, else `./dexvm.toml`, else defaults
pub fn load(explicit: Option<&Path>) -> anyhow::Result<Config> {
    if let Some(path) = explicit {
        return Config::from_file(path);
    }
    let default = Path::new(CONFIG_FILE);
    if default.exists() {
        log::debug!("using {}", CONFIG_FILE);
        return Config::from_file(default);
    }
    Ok(Config::default())
}
