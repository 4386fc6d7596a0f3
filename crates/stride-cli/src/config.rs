//! Configuration file management.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use stride_core::{FixedOffsetClock, Permission, Platform, RetryConfig, parse_utc_offset};
use tracing::warn;

use crate::cli::ConfigKey;

/// Configuration file structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Owner of remote documents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_uid: Option<String>,

    /// Local step database
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,

    /// Remote step database
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_db_path: Option<PathBuf>,

    /// Fixed UTC offset for day boundaries; the local offset when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utc_offset: Option<String>,

    /// Platform for the permission gate: "android", "ios" or "other"
    #[serde(default = "default_platform")]
    pub platform: String,

    /// Android API level, which decides whether notifications are required
    #[serde(default = "default_api_level")]
    pub android_api_level: u32,

    /// Permission settings
    #[serde(default)]
    pub permissions: PermissionsConfig,

    /// Remote mirroring settings
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Permissions the host has granted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PermissionsConfig {
    /// Permissions already held
    #[serde(default)]
    pub granted: Vec<Permission>,

    /// Answer permission prompts with "allow"
    #[serde(default)]
    pub grant_on_request: bool,
}

/// Remote mirroring settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Mirror days to the remote store while tracking
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Retries for a failed remote write (0 drops it after one attempt)
    #[serde(default)]
    pub max_retries: u32,

    /// Delay before the first retry, in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
}

fn default_platform() -> String {
    "other".to_string()
}

fn default_api_level() -> u32 {
    33
}

fn default_true() -> bool {
    true
}

fn default_initial_delay_ms() -> u64 {
    500
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 0,
            initial_delay_ms: default_initial_delay_ms(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_uid: None,
            db_path: None,
            remote_db_path: None,
            utc_offset: None,
            platform: default_platform(),
            android_api_level: default_api_level(),
            permissions: PermissionsConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl Config {
    /// Default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stride")
            .join("config.toml")
    }

    /// Load config from `path`, or return defaults if it is missing or broken
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => warn!("Failed to parse config {}: {}", path.display(), e),
                },
                Err(e) => warn!("Failed to read config {}: {}", path.display(), e),
            }
        }
        Self::default()
    }

    /// Save config to `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// User from the flag/env, then config.
    pub fn resolve_user(&self, user: Option<String>) -> Result<String> {
        let user = user
            .or_else(|| self.user_uid.clone())
            .filter(|u| !u.trim().is_empty());
        match user {
            Some(user) => Ok(user),
            None => bail!(
                "No user set. Pass --user, set STRIDE_USER, or run 'stride config set user-uid <uid>'"
            ),
        }
    }

    pub fn platform(&self) -> Result<Platform> {
        Platform::from_name(&self.platform, self.android_api_level)
            .with_context(|| format!("Invalid platform '{}' in config", self.platform))
    }

    /// Day clock for the configured offset.
    pub fn clock(&self) -> Result<FixedOffsetClock> {
        FixedOffsetClock::from_config(self.utc_offset.as_deref())
            .context("Invalid utc_offset in config")
    }

    /// Retry policy for remote writes; `retries` overrides the config.
    pub fn retry(&self, retries: Option<u32>) -> RetryConfig {
        match retries.unwrap_or(self.sync.max_retries) {
            0 => RetryConfig::none(),
            n => RetryConfig::new(n).initial_delay(Duration::from_millis(self.sync.initial_delay_ms)),
        }
    }

    /// Local database path: flag, then config, then the platform default.
    pub fn db_path(&self, flag: Option<&Path>) -> PathBuf {
        flag.map(Path::to_path_buf)
            .or_else(|| self.db_path.clone())
            .unwrap_or_else(stride_store::default_db_path)
    }

    /// Remote database path: flag, then config, then the platform default.
    pub fn remote_db_path(&self, flag: Option<&Path>) -> PathBuf {
        flag.map(Path::to_path_buf)
            .or_else(|| self.remote_db_path.clone())
            .unwrap_or_else(stride_store::default_remote_db_path)
    }

    /// Current value of `key`, if set.
    pub fn get(&self, key: ConfigKey) -> Option<String> {
        match key {
            ConfigKey::UserUid => self.user_uid.clone(),
            ConfigKey::DbPath => self.db_path.as_ref().map(|p| p.display().to_string()),
            ConfigKey::RemoteDbPath => self
                .remote_db_path
                .as_ref()
                .map(|p| p.display().to_string()),
            ConfigKey::UtcOffset => self.utc_offset.clone(),
            ConfigKey::Platform => Some(self.platform.clone()),
            ConfigKey::AndroidApiLevel => Some(self.android_api_level.to_string()),
            ConfigKey::Granted => Some(
                self.permissions
                    .granted
                    .iter()
                    .map(|p| p.as_str())
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            ConfigKey::GrantOnRequest => Some(self.permissions.grant_on_request.to_string()),
            ConfigKey::SyncEnabled => Some(self.sync.enabled.to_string()),
            ConfigKey::MaxRetries => Some(self.sync.max_retries.to_string()),
            ConfigKey::InitialDelayMs => Some(self.sync.initial_delay_ms.to_string()),
        }
    }

    /// Validate and set `key`.
    pub fn set(&mut self, key: ConfigKey, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            ConfigKey::UserUid => {
                if value.is_empty() {
                    bail!("user-uid must not be empty");
                }
                self.user_uid = Some(value.to_string());
            }
            ConfigKey::DbPath => self.db_path = Some(PathBuf::from(value)),
            ConfigKey::RemoteDbPath => self.remote_db_path = Some(PathBuf::from(value)),
            ConfigKey::UtcOffset => {
                parse_utc_offset(value)
                    .with_context(|| format!("Invalid UTC offset '{}'", value))?;
                self.utc_offset = Some(value.to_string());
            }
            ConfigKey::Platform => {
                Platform::from_name(value, self.android_api_level)
                    .with_context(|| format!("Invalid platform '{}'", value))?;
                self.platform = value.to_ascii_lowercase();
            }
            ConfigKey::AndroidApiLevel => {
                self.android_api_level = value
                    .parse()
                    .with_context(|| format!("'{}' is not a valid API level", value))?;
            }
            ConfigKey::Granted => {
                self.permissions.granted = parse_permissions(value)?;
            }
            ConfigKey::GrantOnRequest => self.permissions.grant_on_request = parse_bool(value)?,
            ConfigKey::SyncEnabled => self.sync.enabled = parse_bool(value)?,
            ConfigKey::MaxRetries => {
                self.sync.max_retries = value
                    .parse()
                    .with_context(|| format!("'{}' is not a valid retry count", value))?;
            }
            ConfigKey::InitialDelayMs => {
                self.sync.initial_delay_ms = value
                    .parse()
                    .with_context(|| format!("'{}' is not a valid delay", value))?;
            }
        }
        Ok(())
    }

    /// Reset `key` to its default.
    pub fn unset(&mut self, key: ConfigKey) {
        let defaults = Config::default();
        match key {
            ConfigKey::UserUid => self.user_uid = None,
            ConfigKey::DbPath => self.db_path = None,
            ConfigKey::RemoteDbPath => self.remote_db_path = None,
            ConfigKey::UtcOffset => self.utc_offset = None,
            ConfigKey::Platform => self.platform = defaults.platform,
            ConfigKey::AndroidApiLevel => self.android_api_level = defaults.android_api_level,
            ConfigKey::Granted => self.permissions.granted.clear(),
            ConfigKey::GrantOnRequest => self.permissions.grant_on_request = false,
            ConfigKey::SyncEnabled => self.sync.enabled = defaults.sync.enabled,
            ConfigKey::MaxRetries => self.sync.max_retries = defaults.sync.max_retries,
            ConfigKey::InitialDelayMs => {
                self.sync.initial_delay_ms = defaults.sync.initial_delay_ms
            }
        }
    }

    /// Record `permissions` as granted, keeping request order and no duplicates.
    pub fn grant(&mut self, permissions: &[Permission]) {
        for permission in permissions {
            if !self.permissions.granted.contains(permission) {
                self.permissions.granted.push(*permission);
            }
        }
    }
}

/// Parse a comma-separated permission list. "all" grants everything.
fn parse_permissions(value: &str) -> Result<Vec<Permission>> {
    if value.eq_ignore_ascii_case("all") {
        return Ok(Permission::ALL.to_vec());
    }
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<Permission>().map_err(anyhow::Error::from))
        .collect()
}

/// Parse boolean argument with flexible input
fn parse_bool(s: &str) -> Result<bool> {
    match s.to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" | "enable" | "enabled" => Ok(true),
        "false" | "no" | "off" | "0" | "disable" | "disabled" => Ok(false),
        _ => bail!(
            "Invalid boolean value '{}'. Use: true/false, yes/no, on/off, 1/0",
            s
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.platform, "other");
        assert_eq!(config.android_api_level, 33);
        assert!(config.sync.enabled);
        assert_eq!(config.sync.max_retries, 0);
        assert_eq!(config.platform().unwrap(), Platform::Other);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_parse_full_file() {
        let config: Config = toml::from_str(
            r#"
            user_uid = "alice"
            utc_offset = "+09:00"
            platform = "android"
            android_api_level = 34

            [permissions]
            granted = ["activity_recognition", "body_sensors"]

            [sync]
            enabled = false
            max_retries = 2
            initial_delay_ms = 50
            "#,
        )
        .unwrap();

        assert_eq!(config.user_uid.as_deref(), Some("alice"));
        assert_eq!(
            config.platform().unwrap(),
            Platform::Android { api_level: 34 }
        );
        assert_eq!(
            config.permissions.granted,
            vec![Permission::ActivityRecognition, Permission::BodySensors]
        );
        assert!(!config.sync.enabled);

        let retry = config.retry(None);
        assert_eq!(retry.max_retries, 2);
        assert_eq!(retry.initial_delay, Duration::from_millis(50));
        assert_eq!(
            config.clock().unwrap().offset(),
            time::macros::offset!(+9)
        );
    }

    #[test]
    fn test_retry_override_and_none() {
        let config = Config::default();
        assert_eq!(config.retry(None), RetryConfig::none());
        assert_eq!(config.retry(Some(4)).max_retries, 4);
    }

    #[test]
    fn test_resolve_user_prefers_flag() {
        let config = Config {
            user_uid: Some("from-config".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.resolve_user(Some("from-flag".to_string())).unwrap(),
            "from-flag"
        );
        assert_eq!(config.resolve_user(None).unwrap(), "from-config");
        assert!(Config::default().resolve_user(None).is_err());
        assert!(Config::default().resolve_user(Some("  ".into())).is_err());
    }

    #[test]
    fn test_db_path_precedence() {
        let config = Config {
            db_path: Some(PathBuf::from("/config/steps.db")),
            ..Default::default()
        };
        assert_eq!(
            config.db_path(Some(Path::new("/flag/steps.db"))),
            PathBuf::from("/flag/steps.db")
        );
        assert_eq!(config.db_path(None), PathBuf::from("/config/steps.db"));
        assert_eq!(
            Config::default().remote_db_path(None),
            stride_store::default_remote_db_path()
        );
    }

    #[test]
    fn test_set_validates_values() {
        let mut config = Config::default();
        assert!(config.set(ConfigKey::UtcOffset, "nine hours").is_err());
        assert!(config.set(ConfigKey::Platform, "beos").is_err());
        assert!(config.set(ConfigKey::SyncEnabled, "maybe").is_err());
        assert!(config.set(ConfigKey::Granted, "telepathy").is_err());
        assert_eq!(config, Config::default());

        config.set(ConfigKey::UtcOffset, "-05:30").unwrap();
        config.set(ConfigKey::Granted, "activity-recognition, fine_location").unwrap();
        config.set(ConfigKey::SyncEnabled, "off").unwrap();
        assert_eq!(config.get(ConfigKey::UtcOffset).as_deref(), Some("-05:30"));
        assert_eq!(
            config.get(ConfigKey::Granted).as_deref(),
            Some("activity_recognition,fine_location")
        );
        assert!(!config.sync.enabled);

        config.unset(ConfigKey::SyncEnabled);
        config.unset(ConfigKey::UtcOffset);
        assert!(config.sync.enabled);
        assert_eq!(config.get(ConfigKey::UtcOffset), None);
    }

    #[test]
    fn test_grant_all_and_dedup() {
        let mut config = Config::default();
        config.set(ConfigKey::Granted, "all").unwrap();
        assert_eq!(config.permissions.granted.len(), Permission::ALL.len());

        config.grant(&[Permission::FineLocation]);
        assert_eq!(config.permissions.granted.len(), Permission::ALL.len());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.set(ConfigKey::UserUid, "alice").unwrap();
        config.set(ConfigKey::MaxRetries, "3").unwrap();
        config.save(&path).unwrap();

        assert_eq!(Config::load(&path), config);
    }

    #[test]
    fn test_broken_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "user_uid = [").unwrap();

        assert_eq!(Config::load(&path), Config::default());
    }
}
