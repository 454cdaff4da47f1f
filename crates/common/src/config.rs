//! Panel configuration

use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Panel configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the state database
    pub store_path: PathBuf,

    /// Root for stored unit files, site configs and checkouts
    pub media_root: PathBuf,

    /// HTTP API configuration
    pub web: WebConfig,

    /// nginx layout
    pub nginx: NginxConfig,

    /// External command configuration
    pub commands: CommandConfig,

    /// Lifecycle controller behaviour
    pub controller: ControllerConfig,
}

impl Default for Config {
    fn default() -> Self {
        let store_path = crate::default_store_path();
        Self {
            media_root: store_path.join("media"),
            store_path,
            web: WebConfig::default(),
            nginx: NginxConfig::default(),
            commands: CommandConfig::default(),
            controller: ControllerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Listen address of the JSON API
    pub listen: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NginxConfig {
    pub available_dir: PathBuf,
    pub enabled_dir: PathBuf,
    /// systemd unit reloaded after site changes
    pub service: String,
}

impl Default for NginxConfig {
    fn default() -> Self {
        Self {
            available_dir: PathBuf::from("/etc/nginx/sites-available"),
            enabled_dir: PathBuf::from("/etc/nginx/sites-enabled"),
            service: "nginx".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    /// Prefix privileged commands with `sudo`
    pub use_sudo: bool,
    pub sudo: String,
    pub git: String,
    pub systemctl: String,
    pub ln: String,
    pub rm: String,
    /// Per-command timeout in seconds; 0 waits forever
    pub timeout_secs: u64,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            use_sudo: true,
            sudo: "sudo".to_string(),
            git: "git".to_string(),
            systemctl: "systemctl".to_string(),
            ln: "ln".to_string(),
            rm: "rm".to_string(),
            timeout_secs: 300,
        }
    }
}

/// How lifecycle operations treat a failing external command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the operation and leave the state untouched
    #[default]
    Strict,
    /// Log the failure, run the remaining steps and record the new state anyway
    FireAndForget,
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePolicy::Strict => write!(f, "strict"),
            FailurePolicy::FireAndForget => write!(f, "fire_and_forget"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub failure_policy: FailurePolicy,
}

impl Config {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `MULTISERVER_STORE` and `MULTISERVER_WEB_ADDR`
    pub fn apply_env_overrides(&mut self) {
        if let Some(store) = std::env::var_os("MULTISERVER_STORE") {
            if !store.is_empty() {
                self.store_path = PathBuf::from(store);
            }
        }
        if let Ok(addr) = std::env::var("MULTISERVER_WEB_ADDR") {
            if !addr.trim().is_empty() {
                self.web.listen = addr;
            }
        }
    }

    /// Get the database path
    pub fn db_path(&self) -> PathBuf {
        self.store_path.join("state.db")
    }

    /// Directory of the per-service lock files
    pub fn lock_dir(&self) -> PathBuf {
        self.store_path.join("locks")
    }
}
