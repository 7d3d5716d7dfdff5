//! Configuration for the update endpoint.
//!
//! Loads settings from /etc/sui/update.toml or uses defaults. Every field has
//! a default, so a partial file only overrides what it names.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// System config file path
pub const CONFIG_PATH: &str = "/etc/sui/update.toml";

/// Environment variable naming an alternate config file
pub const CONFIG_ENV: &str = "SUI_UPDATE_CONFIG";

/// Endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Base URL of the update server; manifest and artifact URLs are relative to it
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Manifest file name under `base_url`
    #[serde(default = "default_manifest_name")]
    pub manifest_name: String,

    /// CA certificate the update server must chain to. `None` uses the system roots.
    #[serde(default = "default_ca_file")]
    pub ca_file: Option<PathBuf>,

    /// Where the downloaded firmware image lives between requests
    #[serde(default = "default_artifact_path")]
    pub artifact_path: PathBuf,

    /// Log file the upgrade command appends to
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,

    /// Fixed device model; when unset the model is read from UCI
    #[serde(default)]
    pub model: Option<String>,

    /// UCI option holding the device model
    #[serde(default = "default_model_key")]
    pub model_key: String,

    /// Overrides the firmware version baked in at build time
    #[serde(default)]
    pub installed_version: Option<String>,

    /// Flashing command, invoked as `<cmd> -v -d <reboot_delay> <artifact>`
    #[serde(default = "default_sysupgrade_command")]
    pub sysupgrade_command: String,

    /// Seconds to wait before the flashing command starts
    #[serde(default = "default_launch_delay")]
    pub launch_delay_secs: u64,

    /// Reboot delay handed to the flashing command
    #[serde(default = "default_reboot_delay")]
    pub reboot_delay_secs: u64,

    /// Free memory required on top of the image size before downloading
    #[serde(default = "default_memory_margin")]
    pub memory_margin_bytes: u64,

    /// Upper bound on the manifest body
    #[serde(default = "default_max_manifest_bytes")]
    pub max_manifest_bytes: usize,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_manifest_timeout")]
    pub manifest_timeout_secs: u64,

    /// Whole-transfer timeout for the firmware image
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    /// Age after which an artifact lock is reclaimed even if its holder looks
    /// alive. Raised to cover a full download, see `lock_stale_limit`.
    #[serde(default = "default_lock_stale")]
    pub lock_stale_secs: u64,
}

fn default_base_url() -> String {
    "https://www.whoisonmywifi.net/hw/".to_string()
}

fn default_manifest_name() -> String {
    "latest.json".to_string()
}

fn default_ca_file() -> Option<PathBuf> {
    Some(PathBuf::from("/etc/ssl/certs/f081611a.0"))
}

fn default_artifact_path() -> PathBuf {
    PathBuf::from("/tmp/sysupgrade.bin")
}

fn default_log_path() -> PathBuf {
    PathBuf::from("/tmp/sysupgrade.log")
}

fn default_model_key() -> String {
    "sui.system.model".to_string()
}

fn default_sysupgrade_command() -> String {
    "sysupgrade".to_string()
}

fn default_launch_delay() -> u64 {
    3
}

fn default_reboot_delay() -> u64 {
    30
}

fn default_memory_margin() -> u64 {
    2 * 1024 * 1024 // 2 MiB
}

fn default_max_manifest_bytes() -> usize {
    1024 * 1024
}

fn default_connect_timeout() -> u64 {
    15
}

fn default_manifest_timeout() -> u64 {
    30
}

fn default_download_timeout() -> u64 {
    900
}

fn default_lock_stale() -> u64 {
    1800
}

/// Headroom on top of connect + download for the md5 passes and cleanup
pub const LOCK_MARGIN_SECS: u64 = 300;

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            manifest_name: default_manifest_name(),
            ca_file: default_ca_file(),
            artifact_path: default_artifact_path(),
            log_path: default_log_path(),
            model: None,
            model_key: default_model_key(),
            installed_version: None,
            sysupgrade_command: default_sysupgrade_command(),
            launch_delay_secs: default_launch_delay(),
            reboot_delay_secs: default_reboot_delay(),
            memory_margin_bytes: default_memory_margin(),
            max_manifest_bytes: default_max_manifest_bytes(),
            connect_timeout_secs: default_connect_timeout(),
            manifest_timeout_secs: default_manifest_timeout(),
            download_timeout_secs: default_download_timeout(),
            lock_stale_secs: default_lock_stale(),
        }
    }
}

impl UpdateConfig {
    /// Load configuration.
    ///
    /// Order: explicit path, `$SUI_UPDATE_CONFIG`, /etc/sui/update.toml, defaults.
    /// An explicitly named file must exist; the system file is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::load_from(Path::new(&path));
        }

        let system = Path::new(CONFIG_PATH);
        if system.exists() {
            return Self::load_from(system);
        }

        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: UpdateConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Full manifest URL
    pub fn manifest_url(&self) -> String {
        self.join_url(&self.manifest_name)
    }

    /// Resolve a manifest-relative artifact URL against the base URL
    pub fn join_url(&self, suffix: &str) -> String {
        format!("{}{}", self.base_url, suffix)
    }

    /// Version the running firmware reports
    pub fn installed_version(&self) -> &str {
        self.installed_version
            .as_deref()
            .unwrap_or(crate::version::FIRMWARE_VERSION)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn manifest_timeout(&self) -> Duration {
        Duration::from_secs(self.manifest_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Effective stale age for the artifact lock. A live holder can be inside
    /// a download for up to connect + download timeout, so the lock is never
    /// considered stale before that plus `LOCK_MARGIN_SECS`.
    pub fn lock_stale_limit(&self) -> u64 {
        let busiest = self
            .connect_timeout_secs
            .saturating_add(self.download_timeout_secs)
            .saturating_add(LOCK_MARGIN_SECS);
        self.lock_stale_secs.max(busiest)
    }

    /// Lock file guarding the artifact
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self.artifact_path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }
}
