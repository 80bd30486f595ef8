//! CLI configuration management.

use anyhow::{Context, anyhow, bail};
use gearbox_gateway::PollPolicy;
use gearbox_notify::ChannelConfig;
use gearbox_platform::PlatformConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const API_URL_ENV: &str = "GEARBOX_API_URL";
pub const API_KEY_ENV: &str = "GEARBOX_API_KEY";

/// CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Platform API URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub poll: PollPolicy,
    /// Sender address on outgoing notifications.
    #[serde(default = "default_sender")]
    pub sender: String,
    #[serde(default)]
    pub notification: ChannelConfig,
    #[serde(default)]
    pub output_format: OutputFormat,
}

fn default_api_url() -> String {
    PlatformConfig::default().api_url
}

fn default_timeout() -> u64 {
    PlatformConfig::default().timeout_secs
}

fn default_sender() -> String {
    "noreply@gearbox.local".to_string()
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            timeout_secs: default_timeout(),
            poll: PollPolicy::default(),
            sender: default_sender(),
            notification: ChannelConfig::default(),
            output_format: OutputFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
}

impl CliConfig {
    /// Load the config file, if any, then apply environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    pub fn config_path() -> anyhow::Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("org", "gearbox", "gearbox")
            .ok_or_else(|| anyhow!("could not determine config directory"))?;
        Ok(dirs.config_dir().join("config.yaml"))
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var(API_URL_ENV) {
            self.api_url = url;
        }
        if let Some(key) = var(API_KEY_ENV) {
            self.api_key = Some(key);
        }
    }

    pub fn platform(&self) -> PlatformConfig {
        PlatformConfig {
            api_url: self.api_url.clone(),
            api_key: self.api_key.clone(),
            timeout_secs: self.timeout_secs,
        }
    }

    /// Set a configuration value.
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "api_url" => self.api_url = value.to_string(),
            "api_key" => self.api_key = Some(value.to_string()),
            "timeout_secs" => {
                self.timeout_secs = value
                    .parse()
                    .with_context(|| format!("invalid timeout: {value}"))?
            }
            "sender" => self.sender = value.to_string(),
            "output_format" => {
                self.output_format = match value {
                    "table" => OutputFormat::Table,
                    "json" => OutputFormat::Json,
                    "yaml" => OutputFormat::Yaml,
                    _ => bail!("invalid output format: {value}"),
                };
            }
            _ => bail!("unknown config key: {key}"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CliConfig::load_from(&dir.path().join("config.yaml")).unwrap();
        assert_eq!(config.api_url, "http://localhost:8080");
        assert_eq!(config.output_format, OutputFormat::Table);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let mut config = CliConfig::default();
        config.set("api_url", "https://platform.example.org").unwrap();
        config.set("output_format", "json").unwrap();
        config.save_to(&path).unwrap();

        let loaded = CliConfig::load_from(&path).unwrap();
        assert_eq!(loaded.api_url, "https://platform.example.org");
        assert_eq!(loaded.output_format, OutputFormat::Json);
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = CliConfig::default();
        config.apply_env(|key| match key {
            API_URL_ENV => Some("https://override.example.org".into()),
            API_KEY_ENV => Some("k-123".into()),
            _ => None,
        });
        assert_eq!(config.platform().api_url, "https://override.example.org");
        assert_eq!(config.platform().api_key.as_deref(), Some("k-123"));
    }

    #[test]
    fn test_set_rejects_unknown_key() {
        let mut config = CliConfig::default();
        assert!(config.set("colour", "blue").is_err());
        assert!(config.set("output_format", "xml").is_err());
        assert!(config.set("timeout_secs", "soon").is_err());
    }
}
