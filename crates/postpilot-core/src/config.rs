//! PostPilot configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PostPilotError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostPilotConfig {
    /// Telegram bot token (required at runtime).
    #[serde(default)]
    pub bot_token: String,
    /// Owner Telegram user ids. Owners pass every authorization check and
    /// are never stored in the admins table.
    #[serde(default)]
    pub owner_ids: Vec<i64>,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default)]
    pub leads: LeadConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

fn default_database_path() -> String {
    "data/postpilot.db".into()
}

impl Default for PostPilotConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            owner_ids: Vec::new(),
            database_path: default_database_path(),
            leads: LeadConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl PostPilotConfig {
    /// Load config from the default path (~/.postpilot/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PostPilotError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| PostPilotError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| PostPilotError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".postpilot")
            .join("config.toml")
    }

    /// Validate required fields before the bot can run.
    pub fn validate(&self) -> Result<()> {
        if self.bot_token.is_empty() {
            return Err(PostPilotError::Config("bot_token is required".into()));
        }
        if self.owner_ids.is_empty() {
            return Err(PostPilotError::Config(
                "owner_ids must contain at least one Telegram user id".into(),
            ));
        }
        Ok(())
    }
}

/// Lead intake limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadConfig {
    /// Maximum leads accepted from one user inside the rate window.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,
    /// Rate window length in minutes.
    #[serde(default = "default_rate_window_mins")]
    pub rate_window_mins: u32,
}

fn default_rate_limit() -> u32 {
    10
}
fn default_rate_window_mins() -> u32 {
    60
}

impl Default for LeadConfig {
    fn default() -> Self {
        Self {
            rate_limit: default_rate_limit(),
            rate_window_mins: default_rate_window_mins(),
        }
    }
}

/// Trigger runner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between runner ticks. A slot fires at most once per minute
    /// regardless of the tick rate.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
}

fn default_tick_secs() -> u64 {
    20
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PostPilotConfig::default();
        assert_eq!(config.leads.rate_limit, 10);
        assert_eq!(config.leads.rate_window_mins, 60);
        assert_eq!(config.scheduler.tick_secs, 20);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: PostPilotConfig = toml::from_str(
            r#"
            bot_token = "123:abc"
            owner_ids = [42]

            [leads]
            rate_limit = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.bot_token, "123:abc");
        assert_eq!(config.leads.rate_limit, 3);
        assert_eq!(config.leads.rate_window_mins, 60);
        assert!(config.validate().is_ok());
    }
}
