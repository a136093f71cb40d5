//! # availsim Configuration System
//!
//! Hierarchical configuration for availsim runs.
//!
//! ## Sections
//! - **engine**: threads, seed, horizon and delivery buffering
//! - **telemetry**: log level and metrics toggle

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod engine;
mod error;
mod telemetry;
mod validation;

pub use engine::EngineConfig;
pub use error::ConfigError;
pub use telemetry::TelemetryConfig;

const BASE_FILE: &str = "config/availsim.yaml";
const ENV_PREFIX: &str = "AVAILSIM_";

/// Top‑level configuration container.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone, PartialEq)]
pub struct AvailsimConfig {
    #[serde(default)]
    #[validate(nested)]
    pub engine: EngineConfig,

    #[serde(default)]
    #[validate(nested)]
    pub telemetry: TelemetryConfig,
}

impl AvailsimConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default values
    /// 2. `config/availsim.yaml`, if present
    /// 3. `config/<AVAILSIM_ENV>.yaml`, if present
    /// 4. `AVAILSIM_*` environment variables, `__` separating sections
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(AvailsimConfig::default()));

        if Path::new(BASE_FILE).exists() {
            figment = figment.merge(Yaml::file(BASE_FILE));
        }

        if let Ok(env) = std::env::var("AVAILSIM_ENV") {
            let env_file = format!("config/{}.yaml", env);
            if Path::new(&env_file).exists() {
                figment = figment.merge(Yaml::file(env_file));
            }
        }

        Self::finish(figment)
    }

    /// Load configuration from a specific file, then apply the environment.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(path)));
        }

        let figment =
            Figment::from(Serialized::defaults(AvailsimConfig::default())).merge(Yaml::file(path));
        Self::finish(figment)
    }

    fn finish(figment: Figment) -> Result<Self, ConfigError> {
        figment
            .merge(Env::prefixed(ENV_PREFIX).ignore(&["env"]).split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }
}
