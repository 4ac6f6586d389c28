use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Fallback tracing filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit logs as JSON lines instead of text
    #[serde(default)]
    pub log_json: bool,

    /// Deadline for a whole pipeline, in seconds (0 = wait forever)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub escalation: EscalationConfig,

    /// Container engine CLI (`docker`, `podman`)
    #[serde(default = "default_container_engine")]
    pub container_engine: String,

    /// Endpoint answering with the caller's public address
    #[serde(default = "default_public_ip_url")]
    pub public_ip_url: String,
}

/// Privilege-escalation runner reading its credential from stdin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    #[serde(default = "default_escalation_program")]
    pub program: String,
    #[serde(default = "default_escalation_args")]
    pub args: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            timeout_secs: default_timeout_secs(),
            escalation: EscalationConfig::default(),
            container_engine: default_container_engine(),
            public_ip_url: default_public_ip_url(),
        }
    }
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            program: default_escalation_program(),
            args: default_escalation_args(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_container_engine() -> String {
    "docker".to_string()
}

fn default_public_ip_url() -> String {
    "ifconfig.me".to_string()
}

fn default_escalation_program() -> String {
    "sudo".to_string()
}

fn default_escalation_args() -> Vec<String> {
    vec!["-S".to_string()]
}

impl Config {
    pub fn path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("could not determine config directory")?;
        Ok(config_dir.join("servpilot").join("config.yaml"))
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Defaults ← YAML file ← `SERVPILOT_*` environment.
///
/// A missing file is not an error.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => Config::path()?,
    };

    Figment::from(Serialized::defaults(Config::default()))
        .merge(Yaml::file(&path))
        .merge(Env::prefixed("SERVPILOT_").split("__"))
        .extract()
        .map_err(|e| anyhow::anyhow!("loading {}: {}", path.display(), e))
}
