use std::path::Path;
use std::str::FromStr;

use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::interval::Granularity;

/// Environment variable prefix, e.g. `PLAYLIST_HISTORY__DATABASE__URL`
pub const ENV_PREFIX: &str = "PLAYLIST_HISTORY";

/// Application configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub granularity: String,
    pub output_directory: String,
    pub concurrent_log_builders: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: Option<String>,
    pub format: String, // "json" or "text"
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig {
                granularity: Granularity::Day.to_string(),
                output_directory: "./output".to_string(),
                concurrent_log_builders: false,
            },
            database: DatabaseConfig {
                url: "data/playlists.db".to_string(),
                enabled: true,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: None,
                format: "text".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from the working directory and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Load configuration with precedence: defaults, `config/default`,
    /// `config/local`, `config`, then `PLAYLIST_HISTORY__*` variables.
    pub fn load_from(base: &Path) -> Result<Self> {
        let defaults = Config::try_from(&Self::default())
            .map_err(|e| anyhow::anyhow!("Failed to build default configuration: {}", e))?;

        let file = |name: &str| File::with_name(&base.join(name).to_string_lossy()).required(false);

        let config = Config::builder()
            .add_source(defaults)
            .add_source(file("config/default"))
            .add_source(file("config/local"))
            .add_source(file("config"))
            .add_source(Environment::with_prefix(ENV_PREFIX).prefix_separator("__").separator("__"))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("Failed to deserialize configuration: {}", e))?;

        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate pipeline config
        Granularity::from_str(&self.pipeline.granularity)?;
        if self.pipeline.output_directory.trim().is_empty() {
            return Err(anyhow::anyhow!("output_directory cannot be empty"));
        }

        // Validate database config
        if self.database.enabled && self.database.url.trim().is_empty() {
            return Err(anyhow::anyhow!("database url cannot be empty while the database is enabled"));
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            ));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format: {}. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            ));
        }

        Ok(())
    }

    /// Configured granularity
    pub fn granularity(&self) -> Result<Granularity> {
        Ok(Granularity::from_str(&self.pipeline.granularity)?)
    }
}
