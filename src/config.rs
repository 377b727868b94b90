//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! The Gemini API key is deliberately NOT part of this configuration. It lives in the
//! secrets store (see `credentials.rs`) so that `/api/v1/config` can return this struct
//! without ever leaking the credential.
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER__PORT, APP_SUMMARY__LANGUAGE, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)

use anyhow::Result;              // Better error handling with context
use serde::{Deserialize, Serialize};  // For converting to/from TOML, JSON, etc.
use std::env;                    // For reading environment variables
use std::time::Duration;

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Each section maps to one concern of the summary pipeline (HTTP server,
/// remote API, model choice, status polling, prompt, upload limits) so that a
/// single `[section]` in config.toml changes a single behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub gemini: GeminiConfig,
    pub models: ModelsConfig,
    pub polling: PollingConfig,
    pub summary: SummaryConfig,
    pub upload: UploadConfig,
    pub performance: PerformanceConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Remote generative-language API settings.
///
/// ## Fields:
/// - `api_base`: Scheme and host of the API (tests point this at a local mock server)
/// - `request_timeout_secs`: Upper bound for any single HTTP call. Generation over
///   an hour-long recording is slow, so the default is generous.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    pub api_base: String,
    pub request_timeout_secs: u64,
}

/// Model selection settings.
///
/// ## Fields:
/// - `auto_detect`: Ask the API which models support `generateContent` and pick one
/// - `default_model`: Model used as-is when `auto_detect` is off
/// - `priority`: Preferred models, best first, consulted when `auto_detect` is on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub auto_detect: bool,
    pub default_model: String,
    pub priority: Vec<String>,
}

/// Remote file status polling (bounded exponential backoff).
///
/// The n-th wait lasts `initial_interval_ms * multiplier^n`, capped at
/// `max_interval_ms`. Polling gives up after `max_attempts` checks or once
/// `timeout_secs` have elapsed, whichever comes first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    pub initial_interval_ms: u64,
    pub multiplier: f64,
    pub max_interval_ms: u64,
    pub max_attempts: u32,
    pub timeout_secs: u64,
}

/// Settings for the generated document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Language the meeting minutes are written in
    pub language: String,
}

/// Upload validation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Largest accepted multipart payload
    pub max_file_size_mb: usize,
    /// File extensions accepted by the upload endpoint (without the dot)
    pub allowed_extensions: Vec<String>,
}

/// Performance tuning configuration.
///
/// ## Fields:
/// - `max_concurrent_sessions`: Summary workflows allowed to run at the same time.
///   Defaults to 1: one recording is processed at a time, further uploads are
///   refused until it finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_concurrent_sessions: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),  // Localhost only (safe for development)
                port: 8080,
            },
            gemini: GeminiConfig {
                api_base: "https://generativelanguage.googleapis.com".to_string(),
                request_timeout_secs: 600,
            },
            models: ModelsConfig {
                auto_detect: true,
                default_model: "models/gemini-1.5-flash".to_string(),
                // Flash first: fastest of the family and it accepts audio input
                priority: vec![
                    "models/gemini-1.5-flash".to_string(),
                    "models/gemini-1.5-flash-latest".to_string(),
                    "models/gemini-1.5-pro".to_string(),
                    "models/gemini-1.5-pro-latest".to_string(),
                ],
            },
            polling: PollingConfig {
                initial_interval_ms: 2000,
                multiplier: 1.5,
                max_interval_ms: 15_000,
                max_attempts: 60,
                timeout_secs: 600,
            },
            summary: SummaryConfig {
                language: "Traditional Chinese".to_string(),
            },
            upload: UploadConfig {
                max_file_size_mb: 200,
                allowed_extensions: vec![
                    "mp3".to_string(),
                    "wav".to_string(),
                    "m4a".to_string(),
                    "aac".to_string(),
                ],
            },
            performance: PerformanceConfig {
                max_concurrent_sessions: 1,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle special cases for HOST and PORT environment variables
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: Override server port
    /// - `APP_SUMMARY__LANGUAGE=English`: Write the minutes in English
    /// - `HOST=0.0.0.0` / `PORT=3000`: Special cases for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            // "__" keeps multi-word keys like max_attempts intact:
            // APP_POLLING__MAX_ATTEMPTS becomes polling.max_attempts
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0
    /// - At least one concurrent workflow is allowed
    /// - Polling can make progress (attempts > 0, intervals > 0, multiplier >= 1)
    /// - Auto-detection has a priority list, pinned mode has a model
    /// - At least one upload extension is accepted
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.performance.max_concurrent_sessions == 0 {
            return Err(anyhow::anyhow!("Max concurrent sessions must be greater than 0"));
        }

        if self.gemini.api_base.trim().is_empty() {
            return Err(anyhow::anyhow!("Gemini API base URL cannot be empty"));
        }

        if self.gemini.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Request timeout must be greater than 0"));
        }

        if self.polling.max_attempts == 0 {
            return Err(anyhow::anyhow!("Polling max attempts must be greater than 0"));
        }

        if self.polling.initial_interval_ms == 0 || self.polling.max_interval_ms == 0 {
            return Err(anyhow::anyhow!("Polling intervals must be greater than 0"));
        }

        if self.polling.multiplier.is_nan() || self.polling.multiplier < 1.0 {
            return Err(anyhow::anyhow!("Polling multiplier must be at least 1.0"));
        }

        if self.polling.timeout_secs == 0 {
            return Err(anyhow::anyhow!("Polling timeout must be greater than 0"));
        }

        if self.models.auto_detect && self.models.priority.is_empty() {
            return Err(anyhow::anyhow!("Model priority list cannot be empty when auto_detect is enabled"));
        }

        if !self.models.auto_detect && self.models.default_model.trim().is_empty() {
            return Err(anyhow::anyhow!("A default model is required when auto_detect is disabled"));
        }

        if self.upload.allowed_extensions.is_empty() {
            return Err(anyhow::anyhow!("At least one upload extension must be allowed"));
        }

        if self.upload.max_file_size_mb == 0 {
            return Err(anyhow::anyhow!("Max upload size must be greater than 0"));
        }

        Ok(())
    }

    /// Timeout applied to every HTTP call against the remote API.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.gemini.request_timeout_secs)
    }

    /// Multipart payload limit in bytes.
    pub fn max_upload_bytes(&self) -> usize {
        self.upload.max_file_size_mb * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.polling.initial_interval_ms, 2000);
        assert_eq!(config.performance.max_concurrent_sessions, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.polling.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.polling.multiplier = 0.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.upload.allowed_extensions.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_model_selection_validation() {
        let mut config = AppConfig::default();
        config.models.priority.clear();
        assert!(config.validate().is_err());

        // A pinned model does not need a priority list
        config.models.auto_detect = false;
        assert!(config.validate().is_ok());

        config.models.default_model = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derived_limits() {
        let config = AppConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(600));
        assert_eq!(config.max_upload_bytes(), 200 * 1024 * 1024);
    }
}
