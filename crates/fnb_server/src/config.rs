//! Server configuration management
//!
//! Handles loading configuration from TOML files, `FNB_*` environment
//! variables and CLI arguments. Priority (highest to lowest):
//!
//! 1. CLI arguments
//! 2. Environment variables
//! 3. Config file
//! 4. Default values

use std::path::{Path, PathBuf};
use std::str::FromStr;

use fnb_backends::BackendsConfig;
use fnb_loadgen::LoadGenConfig;
use fnb_router::{BackpressurePolicy, RouterConfig};
use serde::Deserialize;
use thiserror::Error;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid port number: {0}. Must be between 1 and 65535")]
    InvalidPort(String),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: plain, json")]
    InvalidLogFormat(String),

    #[error("Invalid environment: {0}. Must be one of: development, staging, production")]
    InvalidEnvironment(String),

    #[error("Configuration file error: {0}")]
    FileError(String),

    #[error("Environment variable error: {0}")]
    EnvError(String),

    #[error("Invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Log levels supported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(ConfigError::InvalidLogLevel(s.to_string())),
        }
    }
}

impl LogLevel {
    /// Convert log level to tracing filter string
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_filter_str())
    }
}

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plain" | "text" => Ok(LogFormat::Plain),
            "json" => Ok(LogFormat::Json),
            _ => Err(ConfigError::InvalidLogFormat(s.to_string())),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Plain => f.write_str("plain"),
            LogFormat::Json => f.write_str("json"),
        }
    }
}

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidEnvironment(s.to_string())),
        }
    }
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => f.write_str("development"),
            Environment::Staging => f.write_str("staging"),
            Environment::Production => f.write_str("production"),
        }
    }
}

fn from_str_field<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: FromStr<Err = ConfigError>,
{
    let s = String::deserialize(deserializer)?;
    T::from_str(&s).map_err(serde::de::Error::custom)
}

/// Complete application configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    #[serde(deserialize_with = "from_str_field")]
    pub log_level: LogLevel,
    #[serde(deserialize_with = "from_str_field")]
    pub log_format: LogFormat,
    #[serde(deserialize_with = "from_str_field")]
    pub environment: Environment,
    /// Seconds to wait for in-flight requests on shutdown
    pub shutdown_timeout_secs: u64,
    /// Root seed for every simulated transaction; random when unset
    pub seed: Option<u64>,
    pub router: RouterConfig,
    pub backends: BackendsConfig,
    pub loadgen: LoadGenConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            log_level: LogLevel::Info,
            log_format: LogFormat::Plain,
            environment: Environment::Development,
            shutdown_timeout_secs: 30,
            seed: None,
            router: RouterConfig::default(),
            backends: BackendsConfig::default(),
            loadgen: LoadGenConfig::default(),
        }
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::EnvError(format!("{key}={value:?} could not be parsed")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::EnvError(format!(
            "{key}={value:?} is not a boolean"
        ))),
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileError(format!("Failed to read config file: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content)
            .map_err(|e| ConfigError::FileError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from defaults plus environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Override fields from `FNB_*` variables supplied by `lookup`.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("FNB_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("FNB_PORT") {
            self.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort(port.clone()))?;
        }
        if let Some(level) = lookup("FNB_LOG_LEVEL") {
            self.log_level = level.parse()?;
        }
        if let Some(format) = lookup("FNB_LOG_FORMAT") {
            self.log_format = format.parse()?;
        }
        if let Some(env) = lookup("FNB_ENV") {
            self.environment = env.parse()?;
        }
        if let Some(v) = lookup("FNB_SHUTDOWN_TIMEOUT_SECS") {
            self.shutdown_timeout_secs = parse_env("FNB_SHUTDOWN_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("FNB_SEED") {
            self.seed = Some(parse_env("FNB_SEED", &v)?);
        }

        // Router
        if let Some(v) = lookup("FNB_MAX_IN_FLIGHT") {
            self.router.max_in_flight = parse_env("FNB_MAX_IN_FLIGHT", &v)?;
        }
        if let Some(v) = lookup("FNB_STEP_TIMEOUT_MS") {
            self.router.step_timeout_ms = parse_env("FNB_STEP_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("FNB_BRANCH_TIMEOUT_MS") {
            self.router.branch_timeout_ms = parse_env("FNB_BRANCH_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("FNB_LATENCY_SCALE") {
            self.router.latency_scale = parse_env("FNB_LATENCY_SCALE", &v)?;
        }
        if let Some(v) = lookup("FNB_NOTIFY_ON_REJECT") {
            self.router.notify_on_reject = parse_bool("FNB_NOTIFY_ON_REJECT", &v)?;
        }
        if let Some(v) = lookup("FNB_RESULT_CACHE_SIZE") {
            self.router.result_cache_size = parse_env("FNB_RESULT_CACHE_SIZE", &v)?;
        }
        if let Some(v) = lookup("FNB_BACKPRESSURE") {
            let policy = BackpressurePolicy::from_str(&v).map_err(ConfigError::EnvError)?;
            self.router.backpressure = policy;
            self.loadgen.backpressure = policy;
        }

        // Simulators
        if let Some(v) = lookup("FNB_LEDGER_SLOW_QUERY_RATE") {
            self.backends.ledger.slow_query_rate = parse_env("FNB_LEDGER_SLOW_QUERY_RATE", &v)?;
        }
        if let Some(v) = lookup("FNB_LEDGER_UNAVAILABLE_RATE") {
            self.backends.ledger.unavailable_rate = parse_env("FNB_LEDGER_UNAVAILABLE_RATE", &v)?;
        }
        if let Some(v) = lookup("FNB_FRAUD_FLAG_THRESHOLD") {
            self.backends.fraud.flag_threshold = parse_env("FNB_FRAUD_FLAG_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("FNB_FRAUD_FORCED_SCORE") {
            self.backends.fraud.forced_score = Some(parse_env("FNB_FRAUD_FORCED_SCORE", &v)?);
        }
        if let Some(v) = lookup("FNB_AML_HIT_RATE") {
            self.backends.screening.hit_rate = parse_env("FNB_AML_HIT_RATE", &v)?;
        }
        if let Some(v) = lookup("FNB_SMS_FAILURE_RATE") {
            self.backends.notification.sms_failure_rate = parse_env("FNB_SMS_FAILURE_RATE", &v)?;
        }
        if let Some(v) = lookup("FNB_EMAIL_FAILURE_RATE") {
            self.backends.notification.email_failure_rate =
                parse_env("FNB_EMAIL_FAILURE_RATE", &v)?;
        }

        // Load generator
        if let Some(v) = lookup("FNB_LOADGEN_ENABLED") {
            self.loadgen.enabled = parse_bool("FNB_LOADGEN_ENABLED", &v)?;
        }
        if let Some(v) = lookup("FNB_LOADGEN_INTERVAL_SCALE") {
            self.loadgen.interval_scale = parse_env("FNB_LOADGEN_INTERVAL_SCALE", &v)?;
        }
        if let Some(v) = lookup("FNB_LOADGEN_START_DELAY_SECS") {
            self.loadgen.start_delay_secs = parse_env("FNB_LOADGEN_START_DELAY_SECS", &v)?;
        }
        if let Some(v) = lookup("FNB_LOADGEN_BACKPRESSURE") {
            self.loadgen.backpressure =
                BackpressurePolicy::from_str(&v).map_err(ConfigError::EnvError)?;
        }

        Ok(())
    }

    /// Validate the configuration, collecting every problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port.to_string()));
        }

        let mut errors = self.router.validate();
        errors.extend(self.backends.validate());
        errors.extend(self.loadgen.validate());
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Merge with CLI arguments (CLI takes precedence)
    pub fn merge_with_cli(&mut self, cli: &CliArgs) -> Result<(), ConfigError> {
        if let Some(host) = &cli.host {
            self.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(level) = &cli.log_level {
            self.log_level = level.parse()?;
        }
        if let Some(format) = &cli.log_format {
            self.log_format = format.parse()?;
        }
        if let Some(seed) = cli.seed {
            self.seed = Some(seed);
        }
        if let Some(scale) = cli.latency_scale {
            self.router.latency_scale = scale;
        }
        if let Some(cap) = cli.max_in_flight {
            self.router.max_in_flight = cap;
        }
        if let Some(policy) = cli.backpressure {
            self.router.backpressure = policy;
            self.loadgen.backpressure = policy;
        }
        if cli.no_loadgen {
            self.loadgen.enabled = false;
        }
        Ok(())
    }
}

/// CLI arguments structure
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config_file: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
    pub seed: Option<u64>,
    pub latency_scale: Option<f64>,
    pub max_in_flight: Option<usize>,
    pub backpressure: Option<BackpressurePolicy>,
    /// Serve HTTP only; do not start the load generator
    pub no_loadgen: bool,
}

/// Build configuration from all sources using the process environment.
pub fn build_config(cli: &CliArgs) -> Result<AppConfig, ConfigError> {
    build_config_with(cli, |key| std::env::var(key).ok())
}

/// Build configuration from all sources with an explicit environment lookup.
pub fn build_config_with<F>(cli: &CliArgs, lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match &cli.config_file {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };
    config.apply_env_from(lookup)?;
    config.merge_with_cli(cli)?;
    config.validate()?;
    Ok(config)
}
