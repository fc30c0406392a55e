use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub paths: PathsConfig,
    pub feed: FeedConfig,
    pub output: OutputConfig,
    pub logging_level: String,
    pub rovi: Option<RoviConfig>,
    pub schedules_direct: Option<SchedulesDirectConfig>,
    pub gmail: Option<GmailConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// XMLTV file declaring the service channels (ids and display names).
    pub channel_map: PathBuf,
    /// Directory holding one `<lineup>.xml` per external listings source,
    /// with an optional `<lineup>.chl` expected-channel list beside each.
    pub input_xmltv_directory: PathBuf,
    /// DDL script executed verbatim when the store connection opens.
    pub create_schema: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub base_url: String,
    pub file_name: String,
    /// IANA zone used for the sports-feed DST fix-up.
    pub local_timezone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Horizons (in days) to emit, each producing a full and a short file.
    pub number_of_days: Vec<u32>,
}

/// Credentials consumed by the external Rovi guide fetcher. Opaque to the
/// engine; carried so one file configures the whole deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoviConfig {
    pub api_key: String,
    pub shared_secret: String,
    /// `country:postal_code` entries.
    pub listings: Vec<String>,
}

/// Credentials consumed by the external Schedules Direct fetcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulesDirectConfig {
    pub username: String,
    pub password: String,
    /// `country:postal_code:lineup` entries.
    pub listings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmailConfig {
    pub enabled: bool,
    pub username: String,
    pub password: String,
}

const VALID_LOGGING_LEVEL_VALUES: [&str; 3] = ["DEBUG", "ERROR", "INFO"];

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig {
                channel_map: PathBuf::from(constants::DEFAULT_CHANNEL_MAP_FILE_PATH),
                input_xmltv_directory: PathBuf::from(
                    constants::DEFAULT_INPUT_XMLTV_DIRECTORY_PATH,
                ),
                create_schema: PathBuf::from(constants::DEFAULT_DB_CREATE_SCHEMA_FILE_PATH),
            },
            feed: FeedConfig {
                base_url: constants::SPORTS_FEED_BASE_URL.to_string(),
                file_name: constants::SPORTS_FEED_FILE_NAME.to_string(),
                local_timezone: "America/New_York".to_string(),
            },
            output: OutputConfig {
                number_of_days: constants::DEFAULT_OUTPUT_NUMBER_OF_DAYS.to_vec(),
            },
            logging_level: "INFO".to_string(),
            rovi: None,
            schedules_direct: None,
            gmail: None,
        }
    }
}

impl Config {
    /// Load configuration from `config_file`, writing out the defaults when
    /// the file does not exist yet.
    pub fn load(config_file: &Path) -> Result<Self> {
        let config: Config = if config_file.exists() {
            let contents = std::fs::read_to_string(config_file)?;
            toml::from_str(&contents)?
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::write(config_file, contents)?;
            default_config
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !VALID_LOGGING_LEVEL_VALUES.contains(&self.logging_level.to_uppercase().as_str()) {
            anyhow::bail!(
                "invalid logging_level '{}', expected one of {:?}",
                self.logging_level,
                VALID_LOGGING_LEVEL_VALUES
            );
        }
        if self.output.number_of_days.is_empty() {
            anyhow::bail!("output.number_of_days must name at least one horizon");
        }
        self.feed
            .local_timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| {
                anyhow::anyhow!("unknown feed.local_timezone '{}'", self.feed.local_timezone)
            })?;
        Ok(())
    }

    pub fn local_timezone(&self) -> chrono_tz::Tz {
        // Validated at load time.
        self.feed
            .local_timezone
            .parse()
            .unwrap_or(chrono_tz::UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_unknown_logging_level() {
        let config = Config {
            logging_level: "CHATTY".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_timezone() {
        let mut config = Config::default();
        config.feed.local_timezone = "Mars/Olympus_Mons".to_string();
        assert!(config.validate().is_err());
    }
}
