use crate::mapping::nullable;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Local settings of this process, read from a JSON file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Address the host process listens on for the bridge
    pub host_addr: String,
    pub ai: AiEndpointConfig,
    /// Number of lines kept in the activity log
    pub log_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host_addr: "127.0.0.1:47800".to_string(),
            ai: AiEndpointConfig::default(),
            log_capacity: 500,
        }
    }
}

/// Text-generation service the AI gateway talks to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiEndpointConfig {
    pub endpoint: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for AiEndpointConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-1.5-flash".to_string(),
            timeout_secs: 15,
        }
    }
}

/// Host-owned settings, mirrored verbatim from the last `config` event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigSnapshot {
    #[serde(deserialize_with = "nullable")]
    pub auto_reconnect: bool,
    #[serde(deserialize_with = "nullable")]
    pub app_switching: bool,
    #[serde(deserialize_with = "nullable")]
    pub velocity_zones: bool,
    #[serde(deserialize_with = "nullable")]
    pub minimize_to_tray: bool,
    #[serde(deserialize_with = "nullable")]
    pub ai_api_key: String,
    #[serde(deserialize_with = "nullable")]
    pub ai_global_prompt: String,
}

impl ConfigSnapshot {
    /// Apply one `field=value` edit; the result is only ever sent to the host
    pub fn set_field(&mut self, field: &str, value: &str) -> Result<()> {
        let flag = || -> Result<bool> {
            value
                .parse::<bool>()
                .with_context(|| format!("'{value}' is not true/false"))
        };
        match field {
            "auto_reconnect" => self.auto_reconnect = flag()?,
            "app_switching" => self.app_switching = flag()?,
            "velocity_zones" => self.velocity_zones = flag()?,
            "minimize_to_tray" => self.minimize_to_tray = flag()?,
            "ai_api_key" => self.ai_api_key = value.to_string(),
            "ai_global_prompt" => self.ai_global_prompt = value.to_string(),
            other => anyhow::bail!("Unknown config field '{other}'"),
        }
        Ok(())
    }
}

/// Configuration loader for the local settings file
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load the app configuration from a JSON file
    pub fn load_app_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: AppConfig =
            serde_json::from_str(&content).with_context(|| "Failed to parse config JSON")?;

        Ok(config)
    }

    /// Like `load_app_config`, but a file that does not exist yields defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
        match fs::metadata(path.as_ref()) {
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(AppConfig::default()),
            _ => Self::load_app_config(path),
        }
    }
}
