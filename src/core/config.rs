//! Configuration management

use clap::{Parser, Subcommand};
use config::{Config as ConfigBuilder, ConfigError as BuilderError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid stash configuration: {0}")]
    InvalidStash(String),

    #[error("Invalid tagger configuration: {0}")]
    InvalidTagger(String),

    #[error("Invalid logging configuration: {0}")]
    InvalidLogging(String),

    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

impl From<BuilderError> for ConfigError {
    fn from(err: BuilderError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub stash: StashConfig,
    pub tagger: TaggerFileConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration with precedence: CLI args > Environment variables > Config file > Defaults
    pub fn load(cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let mut builder = with_defaults(ConfigBuilder::builder())?;

        if let Some(config_path) = &cli_args.config {
            if !config_path.exists() {
                return Err(ConfigError::FileNotFound(
                    config_path.display().to_string(),
                ));
            }
            builder = builder.add_source(File::from(config_path.as_path()));
        }

        // Environment variables are prefixed with TAGGER_ and use __ for nesting
        // Example: TAGGER_STASH__URL=http://localhost:9999/graphql
        builder = builder.add_source(
            Environment::with_prefix("TAGGER")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(url) = &cli_args.stash_url {
            builder = builder.set_override("stash.url", url.clone())?;
        }
        if let Some(api_key) = &cli_args.api_key {
            builder = builder.set_override("stash.api_key", api_key.clone())?;
        }
        if let Some(settings) = &cli_args.settings {
            builder = builder.set_override("tagger.settings_path", settings.display().to_string())?;
        }
        if let Some(log_level) = &cli_args.log_level {
            builder = builder.set_override("logging.level", log_level.clone())?;
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let config: Config = with_defaults(ConfigBuilder::builder())?
            .add_source(File::from(path))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.stash.validate()?;
        self.tagger.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

fn with_defaults(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
    Ok(builder
        .set_default("stash.url", "http://localhost:9999/graphql")?
        .set_default("stash.api_key", "")?
        .set_default("stash.request_timeout", 60)?
        .set_default("tagger.settings_path", default_settings_path().display().to_string())?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "text")?
        .set_default("logging.output", "stdout")?)
}

/// Default location of the persisted tagger settings
fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("scene-tagger")
        .join("tagger.json")
}

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "scene-tagger")]
#[command(about = "Batch scene metadata tagger", long_about = None)]
pub struct CliArgs {
    /// Path to configuration file (TOML format)
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// GraphQL endpoint of the local media server
    #[arg(long, value_name = "URL", global = true)]
    pub stash_url: Option<String>,

    /// API key for the local media server
    #[arg(long, value_name = "KEY", global = true)]
    pub api_key: Option<String>,

    /// Path of the persisted tagger settings (JSON)
    #[arg(long, value_name = "FILE", global = true)]
    pub settings: Option<PathBuf>,

    /// Log level (debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List available scrape sources
    Sources,

    /// Fragment-scrape the given scenes and print a summary
    Scrape {
        /// Source id to use instead of the persisted selection
        #[arg(long)]
        source: Option<String>,

        /// Scene ids to scrape
        #[arg(required = true, value_delimiter = ',')]
        scenes: Vec<String>,
    },

    /// Scrape, create missing tags/performers/studios and save the scenes
    Run {
        /// Source id to use instead of the persisted selection
        #[arg(long)]
        source: Option<String>,

        /// Scene ids to process
        #[arg(required = true, value_delimiter = ',')]
        scenes: Vec<String>,
    },

    /// Submit queued fingerprints to the selected stash-box endpoint
    SubmitFingerprints {
        /// Source id to use instead of the persisted selection
        #[arg(long)]
        source: Option<String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct StashConfig {
    pub url: String,
    pub api_key: String,
    pub request_timeout: u64, // seconds
}

impl StashConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::InvalidStash("url cannot be empty".to_string()));
        }

        url::Url::parse(&self.url)
            .map_err(|e| ConfigError::InvalidStash(format!("url is invalid: {}", e)))?;

        if self.request_timeout == 0 {
            return Err(ConfigError::InvalidStash(
                "request_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn api_key(&self) -> Option<&str> {
        if self.api_key.is_empty() {
            None
        } else {
            Some(&self.api_key)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaggerFileConfig {
    pub settings_path: PathBuf,
}

impl TaggerFileConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.settings_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidTagger(
                "settings_path cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
    pub log_file: Option<PathBuf>,
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.as_str()) {
            return Err(ConfigError::InvalidLogging(format!(
                "level must be one of: {:?}",
                valid_levels
            )));
        }

        let valid_formats = ["json", "text"];
        if !valid_formats.contains(&self.format.as_str()) {
            return Err(ConfigError::InvalidLogging(format!(
                "format must be one of: {:?}",
                valid_formats
            )));
        }

        let valid_outputs = ["stdout", "file"];
        if !valid_outputs.contains(&self.output.as_str()) {
            return Err(ConfigError::InvalidLogging(format!(
                "output must be one of: {:?}",
                valid_outputs
            )));
        }

        if self.output == "file" && self.log_file.is_none() {
            return Err(ConfigError::InvalidLogging(
                "log_file must be specified when output is 'file'".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn logging(level: &str, output: &str) -> LoggingConfig {
        LoggingConfig {
            level: level.to_string(),
            format: "text".to_string(),
            output: output.to_string(),
            log_file: None,
        }
    }

    #[test]
    fn test_logging_validation() {
        assert!(logging("info", "stdout").validate().is_ok());
        assert!(logging("verbose", "stdout").validate().is_err());
        assert!(logging("info", "file").validate().is_err());
    }

    #[test]
    fn test_stash_validation() {
        let mut stash = StashConfig {
            url: "http://localhost:9999/graphql".to_string(),
            api_key: String::new(),
            request_timeout: 30,
        };
        assert!(stash.validate().is_ok());
        assert_eq!(stash.api_key(), None);

        stash.url = "not a url".to_string();
        assert!(stash.validate().is_err());
    }

    #[test]
    fn test_from_file_applies_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[stash]\nurl = \"http://media.local:9999/graphql\"\napi_key = \"secret\""
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.stash.url, "http://media.local:9999/graphql");
        assert_eq!(config.stash.api_key(), Some("secret"));
        assert_eq!(config.stash.request_timeout, 60);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_cli_parses_scene_list() {
        let args = CliArgs::parse_from(["scene-tagger", "scrape", "1,2,3"]);
        match args.command {
            Command::Scrape { scenes, source } => {
                assert_eq!(scenes, vec!["1", "2", "3"]);
                assert!(source.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
