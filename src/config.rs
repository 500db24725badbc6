use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

use crate::detector::{
    DetectorConfig, DetectorError, DEFAULT_BASELINE_DIASTOLIC, DEFAULT_BASELINE_SYSTOLIC,
    DEFAULT_THRESHOLD, DEFAULT_WINDOW_SIZE,
};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS outside development
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// Number of readings kept in the rolling window
    #[serde(default = "default_window_size")]
    #[validate(range(min = 1, max = 10000))]
    pub window_size: usize,

    /// Fractional deviation above which a reading raises an alert
    #[serde(default = "default_threshold")]
    #[validate(custom = "validate_threshold")]
    pub threshold: f64,

    /// Systolic value the window is seeded with at startup
    #[serde(default = "default_baseline_systolic")]
    #[validate(custom = "validate_baseline")]
    pub baseline_systolic: f64,

    /// Diastolic value the window is seeded with at startup
    #[serde(default = "default_baseline_diastolic")]
    #[validate(custom = "validate_baseline")]
    pub baseline_diastolic: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            window_size: default_window_size(),
            threshold: default_threshold(),
            baseline_systolic: default_baseline_systolic(),
            baseline_diastolic: default_baseline_diastolic(),
        }
    }
}

impl AppConfig {
    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// `host:port` to bind the listener to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Explicit CORS origins, if any are configured
    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether we should fall back to permissive CORS
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    pub fn detector_config(&self) -> Result<DetectorConfig, DetectorError> {
        DetectorConfig::new(self.window_size, self.threshold)
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_window_size() -> usize {
    DEFAULT_WINDOW_SIZE
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

fn default_baseline_systolic() -> f64 {
    DEFAULT_BASELINE_SYSTOLIC
}

fn default_baseline_diastolic() -> f64 {
    DEFAULT_BASELINE_DIASTOLIC
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_threshold(threshold: f64) -> Result<(), ValidationError> {
    if !threshold.is_finite() || !(0.0..=10.0).contains(&threshold) {
        let mut err = ValidationError::new("threshold");
        err.message = Some("threshold must be a finite fraction between 0.0 and 10.0".into());
        return Err(err);
    }
    Ok(())
}

fn validate_baseline(value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || value < 0.0 {
        let mut err = ValidationError::new("baseline");
        err.message = Some("baseline pressures must be finite and non-negative".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("bp_alert_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Built-in defaults every other source layers over.
fn base_builder() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("host", DEFAULT_HOST)?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("window_size", DEFAULT_WINDOW_SIZE as i64)?
        .set_default("threshold", DEFAULT_THRESHOLD)?
        .set_default("baseline_systolic", DEFAULT_BASELINE_SYSTOLIC)?
        .set_default("baseline_diastolic", DEFAULT_BASELINE_DIASTOLIC)
}

fn finish(config: Config) -> Result<AppConfig, AppConfigError> {
    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    Ok(app_config)
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = base_builder()?
        .set_default("environment", run_env.as_str())?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(
            Environment::with_prefix("APP")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let app_config = finish(config)?;
    info!("Configuration loaded successfully");
    Ok(app_config)
}
