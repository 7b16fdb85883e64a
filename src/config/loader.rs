//! Layered configuration loading: defaults → file → environment.

use config::{Config, Environment, File};
use validator::Validate;

use super::types::EngineConfig;
use crate::error::ConfigError;

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    config_file: Option<String>,
    load_env: bool,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            config_file: None,
            load_env: false,
        }
    }

    /// Load configuration from file
    pub fn load_from_file(mut self, path: Option<&str>) -> Self {
        self.config_file = path.map(String::from);
        self
    }

    /// Load configuration from environment variables
    ///
    /// Variables use the `SEOFORGE_` prefix with `__` as the nesting
    /// separator, e.g. `SEOFORGE_PROVIDERS__CLAUDE__API_KEY`.
    pub fn load_from_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Build the final configuration
    pub fn build(self) -> Result<EngineConfig, ConfigError> {
        let mut builder =
            Config::builder().add_source(Config::try_from(&EngineConfig::default())?);

        // Add configuration file if specified
        if let Some(config_path) = &self.config_file {
            builder = builder.add_source(File::with_name(config_path).required(false));
        } else {
            // Try to load from standard locations
            builder = builder
                .add_source(File::with_name("seoforge").required(false))
                .add_source(File::with_name("config/seoforge").required(false));
        }

        // Add environment variables if requested
        if self.load_env {
            builder = builder.add_source(
                Environment::with_prefix("SEOFORGE")
                    .prefix_separator("_")
                    .separator("__"),
            );
        }

        let config: EngineConfig = builder.build()?.try_deserialize()?;

        config
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.check_routing()?;

        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
