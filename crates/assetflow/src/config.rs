//! Configuration file (assetflow.toml) and project resolution.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use assetflow_pipeline::{PipelineConfig, ProjectPaths, TaskGraph};
use assetflow_server::{DevServerConfig, WatchOptions};
use serde::Deserialize;

pub const CONFIG_FILE: &str = "assetflow.toml";

/// Configuration file structure.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub watch: WatchSettings,
    #[serde(flatten)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_open")]
    pub open: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            open: default_open(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WatchSettings {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_reload_debounce_ms")]
    pub reload_debounce_ms: u64,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            reload_debounce_ms: default_reload_debounce_ms(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_open() -> bool {
    true
}
fn default_debounce_ms() -> u64 {
    200
}
fn default_reload_debounce_ms() -> u64 {
    100
}

/// Parse a config file. A missing file is only an error when it was asked
/// for explicitly.
pub fn load_config(path: &Path, explicit: bool) -> Result<ConfigFile> {
    if !path.exists() {
        if explicit {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        return Ok(ConfigFile::default());
    }

    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let config: ConfigFile =
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;

    tracing::debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// A resolved project: absolute paths plus its configuration.
#[derive(Debug)]
pub struct Project {
    pub paths: ProjectPaths,
    pub config: ConfigFile,
}

impl Project {
    pub fn load(root: &Path, config: Option<&Path>) -> Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("Project root not found: {}", root.display()))?;

        let (config_path, explicit) = match config {
            Some(path) => (PathBuf::from(path), true),
            None => (root.join(CONFIG_FILE), false),
        };

        Ok(Self {
            config: load_config(&config_path, explicit)?,
            paths: ProjectPaths::new(root),
        })
    }

    pub fn graph(&self) -> Result<TaskGraph> {
        TaskGraph::from_config(self.paths.clone(), &self.config.pipeline)
            .context("Invalid task configuration")
    }

    /// Server settings with command-line overrides applied.
    pub fn server(&self, port: Option<u16>, open: bool) -> DevServerConfig {
        DevServerConfig {
            dist_root: self.paths.dist_root.clone(),
            port: port.unwrap_or(self.config.server.port),
            host: self.config.server.host.clone(),
            open: open && self.config.server.open,
        }
    }

    pub fn watch_options(&self) -> WatchOptions {
        WatchOptions {
            debounce: Duration::from_millis(self.config.watch.debounce_ms),
            reload_debounce: Duration::from_millis(self.config.watch.reload_debounce_ms),
        }
    }
}
