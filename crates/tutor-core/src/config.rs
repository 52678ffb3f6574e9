//! Configuration types for AI Tutor.
//!
//! This module provides the configuration structures that control where
//! courses are stored, how quizzes are graded, which generation service is
//! used, and where the local API listens.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tutor_genai::gemini::{DEFAULT_API_ENDPOINT, DEFAULT_MODEL};
use tutor_genai::GeminiConfig;

use crate::course::Theme;
use crate::error::{Result, TutorError};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "tutor.json";

/// Environment variable consulted when the configured one is unset.
const FALLBACK_API_KEY_ENV: &str = "API_KEY";

/// Default data directory for persisted courses and preferences.
fn default_data_dir() -> String {
    ".tutor".to_string()
}

/// Default minimum quiz percentage that marks a module completed.
const fn default_passing_score() -> f64 {
    60.0
}

fn default_api_endpoint() -> String {
    DEFAULT_API_ENDPOINT.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

const fn default_connect_timeout() -> u64 {
    30
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    3000
}

/// Main configuration for AI Tutor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Directory holding the courses file and the theme preference.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Minimum quiz percentage (0–100) that marks a module completed.
    #[serde(default = "default_passing_score")]
    pub passing_score: f64,

    /// Theme used when no preference has been stored yet.
    #[serde(default)]
    pub theme: Theme,

    /// Generation service settings.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Local HTTP API settings.
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            passing_score: default_passing_score(),
            theme: Theme::default(),
            provider: ProviderConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `tutor.json` in the current directory. If found, loads and
    /// validates the configuration. If not found, returns default configuration.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            TutorError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from a specific directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        Self::load_from_file(&config_path)
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::ConfigParseError` if the file exists but contains
    /// invalid JSON or invalid enum values.
    ///
    /// Returns `TutorError::ConfigValidationError` if the configuration values
    /// are invalid (e.g., a passing score above 100, port 0).
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(TutorError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| TutorError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// Checks that:
    /// - `dataDir` is not empty
    /// - `passingScore` lies within 0–100
    /// - `server.port` is not 0
    /// - `provider.connectTimeoutSecs` is greater than 0
    /// - model names and the API endpoint are not empty
    pub fn validate(&self) -> Result<()> {
        if self.data_dir.trim().is_empty() {
            return Err(TutorError::config_validation(
                "dataDir must not be empty",
                "Provide a valid data directory in your tutor.json (e.g. \".tutor\")",
            ));
        }

        if !(0.0..=100.0).contains(&self.passing_score) {
            return Err(TutorError::config_validation(
                format!(
                    "passingScore must be between 0 and 100 (got {})",
                    self.passing_score
                ),
                "Set passingScore to a percentage, e.g. 60",
            ));
        }

        if self.server.port == 0 {
            return Err(TutorError::config_validation(
                "server.port must be greater than 0",
                "Set server.port to a free TCP port, e.g. 3000",
            ));
        }

        if self.provider.connect_timeout_secs == 0 {
            return Err(TutorError::config_validation(
                "provider.connectTimeoutSecs must be greater than 0",
                "Set provider.connectTimeoutSecs to at least 1 second in your tutor.json",
            ));
        }

        if self.provider.api_endpoint.trim().is_empty() {
            return Err(TutorError::config_validation(
                "provider.apiEndpoint must not be empty",
                format!("Remove the field to use the default ({DEFAULT_API_ENDPOINT})"),
            ));
        }

        if self.provider.syllabus_model.trim().is_empty()
            || self.provider.lesson_model.trim().is_empty()
        {
            return Err(TutorError::config_validation(
                "provider model names must not be empty",
                format!("Remove the fields to use the default model ({DEFAULT_MODEL})"),
            ));
        }

        Ok(())
    }

    /// Resolves the data directory as a path.
    #[must_use]
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }
}

/// Generation service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Base URL of the Gemini REST API.
    #[serde(default = "default_api_endpoint")]
    pub api_endpoint: String,

    /// Model used to generate syllabi.
    #[serde(default = "default_model")]
    pub syllabus_model: String,

    /// Model used to stream lessons.
    #[serde(default = "default_model")]
    pub lesson_model: String,

    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// TCP connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_endpoint: default_api_endpoint(),
            syllabus_model: default_model(),
            lesson_model: default_model(),
            api_key_env: default_api_key_env(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl ProviderConfig {
    /// Reads the API key from the configured environment variable, falling
    /// back to `API_KEY`.
    #[must_use]
    pub fn api_key(&self) -> Option<String> {
        [self.api_key_env.as_str(), FALLBACK_API_KEY_ENV]
            .into_iter()
            .filter_map(|name| std::env::var(name).ok())
            .find(|value| !value.trim().is_empty())
    }

    /// Builds the client settings for the Gemini backend.
    #[must_use]
    pub fn gemini_config(&self) -> GeminiConfig {
        GeminiConfig {
            api_key: self.api_key(),
            api_endpoint: self.api_endpoint.clone(),
            structured_model: self.syllabus_model.clone(),
            stream_model: self.lesson_model.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }
}

/// Local HTTP API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Interface to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}
