//! Service configuration.
//!
//! Built once at startup and handed to the HTTP layer. Loaded from a JSON
//! settings file (missing file means defaults) with a few environment
//! overrides on top.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::{AppError, AppResult};

/// HTTP API 服务器默认端口
pub const DEFAULT_PORT: u16 = 19530;

pub const ENV_CONFIG_PATH: &str = "RELIEF_HUB_CONFIG";
pub const ENV_PORT: &str = "RELIEF_HUB_PORT";
pub const ENV_DATABASE: &str = "RELIEF_HUB_DB";
pub const ENV_API_KEY: &str = "RELIEF_HUB_API_KEY";

const APP_DIR_NAME: &str = "relief_hub";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// No API key checks.
    #[default]
    Off,
    /// Every route needs the key.
    Strict,
    /// Every route except `/health`.
    AllExceptHealth,
    /// `Off` on loopback, `AllExceptHealth` when LAN access is allowed.
    Auto,
}

/// API key gate settings, shared with the auth middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityConfig {
    pub auth_mode: AuthMode,
    pub api_key: String,
    pub allow_lan_access: bool,
}

impl SecurityConfig {
    pub fn effective_auth_mode(&self) -> AuthMode {
        match self.auth_mode {
            AuthMode::Auto if self.allow_lan_access => AuthMode::AllExceptHealth,
            AuthMode::Auto => AuthMode::Off,
            other => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bind on all interfaces instead of loopback.
    #[serde(default)]
    pub allow_lan_access: bool,
    /// SQLite file; defaults to the platform data directory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub auth_mode: AuthMode,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_true")]
    pub access_log_enabled: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Enables daily rolling log files when set.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            allow_lan_access: false,
            database_path: None,
            auth_mode: AuthMode::Off,
            api_key: String::new(),
            access_log_enabled: true,
            log_level: default_log_level(),
            log_dir: None,
        }
    }
}

impl AppConfig {
    /// Load settings from a JSON file. A missing file yields defaults.
    pub fn load(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    pub fn save(&self, path: &Path) -> AppResult<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Config(format!("Failed to serialize settings: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Resolve the settings file from the environment, load it, then apply
    /// per-field environment overrides.
    pub fn from_env() -> AppResult<Self> {
        let path = match std::env::var(ENV_CONFIG_PATH) {
            Ok(p) if !p.trim().is_empty() => PathBuf::from(p),
            _ => default_config_path()?,
        };

        let mut config = Self::load(&path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup(ENV_PORT) {
            self.port = port
                .trim()
                .parse()
                .map_err(|_| AppError::Config(format!("{} is not a valid port: {}", ENV_PORT, port)))?;
        }
        if let Some(db) = lookup(ENV_DATABASE).filter(|v| !v.trim().is_empty()) {
            self.database_path = Some(PathBuf::from(db));
        }
        if let Some(key) = lookup(ENV_API_KEY) {
            self.api_key = key;
        }
        Ok(())
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.port == 0 {
            return Err(AppError::Config("port must be non-zero".to_string()));
        }

        let needs_key = !matches!(self.security().effective_auth_mode(), AuthMode::Off);
        if needs_key && self.api_key.trim().is_empty() {
            return Err(AppError::Config(
                "auth_mode requires an api_key but none is configured".to_string(),
            ));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        let host = if self.allow_lan_access { "0.0.0.0" } else { "127.0.0.1" };
        format!("{}:{}", host, self.port)
    }

    pub fn resolved_database_path(&self) -> AppResult<PathBuf> {
        match &self.database_path {
            Some(p) => Ok(p.clone()),
            None => Ok(data_dir()?.join("relief.db")),
        }
    }

    pub fn security(&self) -> SecurityConfig {
        SecurityConfig {
            auth_mode: self.auth_mode,
            api_key: self.api_key.clone(),
            allow_lan_access: self.allow_lan_access,
        }
    }
}

fn data_dir() -> AppResult<PathBuf> {
    let base = dirs::data_dir()
        .ok_or_else(|| AppError::Config("Failed to get data dir".to_string()))?;
    Ok(base.join(APP_DIR_NAME))
}

pub fn default_config_path() -> AppResult<PathBuf> {
    Ok(data_dir()?.join("settings.json"))
}
