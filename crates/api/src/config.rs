use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use domain::services::{CheckInTimings, Phrasebook};
use serde::Deserialize;
use shared::jwt::{JwtConfig, JwtError};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
    pub limits: LimitsConfig,
    /// Token signing for admin and kiosk sessions
    pub jwt: JwtAuthConfig,
    pub kiosk: KioskConfig,
    /// Spoken phrases and voice parameters
    #[serde(default)]
    pub announcement: Phrasebook,
    #[serde(default)]
    pub admin: AdminBootstrapConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

/// Which roster store backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    /// Process-local store; data is lost on restart.
    Memory,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Postgres => "postgres",
            StorageBackend::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,

    #[serde(default)]
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl From<&DatabaseConfig> for persistence::db::DatabaseConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            url: config.url.clone(),
            max_connections: config.max_connections,
            min_connections: config.min_connections,
            connect_timeout_secs: config.connect_timeout_secs,
            idle_timeout_secs: config.idle_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Per-client request budget. 0 disables the limiter.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,

    /// Budget shared by admin sign-in and kiosk unlock attempts.
    #[serde(default = "default_sign_in_attempts")]
    pub sign_in_attempts_per_minute: u32,

    /// Only enable behind a TLS-terminating proxy.
    #[serde(default)]
    pub hsts_enabled: bool,

    /// Peers whose `X-Forwarded-For` header is believed. Empty means the
    /// header is ignored and clients are keyed by peer address.
    #[serde(default)]
    pub trusted_proxies: Vec<IpAddr>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_import_rows")]
    pub max_import_rows: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtAuthConfig {
    /// HS256 shared secret. Takes precedence over the key pair when set.
    #[serde(default)]
    pub secret: String,

    /// RSA private key in PEM format for signing tokens
    #[serde(default)]
    pub private_key: String,

    /// RSA public key in PEM format for verifying tokens
    #[serde(default)]
    pub public_key: String,

    #[serde(default = "default_admin_token_expiry")]
    pub admin_token_expiry_secs: i64,

    /// A kiosk stays unlocked for one ceremony day by default.
    #[serde(default = "default_kiosk_token_expiry")]
    pub kiosk_token_expiry_secs: i64,

    #[serde(default = "default_jwt_leeway")]
    pub leeway_secs: u64,
}

impl JwtAuthConfig {
    pub fn build(&self) -> Result<JwtConfig, JwtError> {
        if !self.secret.is_empty() {
            return JwtConfig::from_secret(
                &self.secret,
                self.admin_token_expiry_secs,
                self.kiosk_token_expiry_secs,
                self.leeway_secs,
            );
        }
        JwtConfig::from_rsa_pem(
            &self.private_key,
            &self.public_key,
            self.admin_token_expiry_secs,
            self.kiosk_token_expiry_secs,
            self.leeway_secs,
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct KioskConfig {
    /// Argon2id PHC string, or plaintext digits for development.
    #[serde(default)]
    pub passcode: String,

    #[serde(default = "default_error_delay_ms")]
    pub error_delay_ms: u64,

    #[serde(default = "default_success_delay_ms")]
    pub success_delay_ms: u64,

    #[serde(default = "default_search_debounce_ms")]
    pub search_debounce_ms: u64,

    #[serde(default = "default_min_search_chars")]
    pub min_search_chars: usize,

    /// Sessions idle for longer are closed and must unlock again.
    #[serde(default = "default_kiosk_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl KioskConfig {
    pub fn timings(&self) -> CheckInTimings {
        CheckInTimings {
            error_delay: Duration::from_millis(self.error_delay_ms),
            success_delay: Duration::from_millis(self.success_delay_ms),
            search_debounce: Duration::from_millis(self.search_debounce_ms),
            min_search_chars: self.min_search_chars,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// First admin account, created on startup when no account exists.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminBootstrapConfig {
    #[serde(default)]
    pub bootstrap_email: String,

    #[serde(default)]
    pub bootstrap_password: String,

    #[serde(default = "default_bootstrap_display_name")]
    pub bootstrap_display_name: String,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_body_size() -> usize {
    4 * 1_048_576
}
fn default_backend() -> StorageBackend {
    StorageBackend::Postgres
}
fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    2
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_rate_limit() -> u32 {
    600
}
fn default_sign_in_attempts() -> u32 {
    10
}
fn default_max_import_rows() -> usize {
    5000
}
fn default_admin_token_expiry() -> i64 {
    28_800 // 8 hours
}
fn default_kiosk_token_expiry() -> i64 {
    43_200 // 12 hours
}
fn default_jwt_leeway() -> u64 {
    shared::jwt::DEFAULT_LEEWAY_SECS
}
fn default_error_delay_ms() -> u64 {
    2000
}
fn default_success_delay_ms() -> u64 {
    5000
}
fn default_search_debounce_ms() -> u64 {
    600
}
fn default_min_search_chars() -> usize {
    2
}
fn default_kiosk_idle_timeout() -> u64 {
    14_400
}
fn default_bootstrap_display_name() -> String {
    "Administrator".to_string()
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Embedded copy of `config/default.toml`, used when building configs in tests.
const DEFAULTS: &str = include_str!("../../../config/default.toml");

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with GC__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("GC").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Builds a configuration from the embedded defaults plus overrides,
    /// without reading config files or the environment. Not validated.
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(DEFAULTS, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.database.backend == StorageBackend::Postgres && self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "GC__DATABASE__URL must be set when the postgres backend is used".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.socket_addr().is_err() {
            return Err(ConfigValidationError::InvalidValue(format!(
                "Invalid listen address {}:{}",
                self.server.host, self.server.port
            )));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigValidationError::InvalidValue(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        if self.jwt.secret.is_empty()
            && (self.jwt.private_key.is_empty() || self.jwt.public_key.is_empty())
        {
            return Err(ConfigValidationError::MissingRequired(
                "GC__JWT__SECRET or both GC__JWT__PRIVATE_KEY and GC__JWT__PUBLIC_KEY must be set"
                    .to_string(),
            ));
        }

        if !self.jwt.secret.is_empty() && self.jwt.secret.len() < 32 {
            return Err(ConfigValidationError::InvalidValue(
                "jwt.secret must be at least 32 bytes".to_string(),
            ));
        }

        if self.kiosk.passcode.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "GC__KIOSK__PASSCODE must be set".to_string(),
            ));
        }

        if !shared::password::is_phc_hash(&self.kiosk.passcode)
            && shared::validation::validate_passcode(&self.kiosk.passcode).is_err()
        {
            return Err(ConfigValidationError::InvalidValue(
                "kiosk.passcode must be 4-12 digits or an Argon2 PHC hash".to_string(),
            ));
        }

        if self.kiosk.min_search_chars == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "kiosk.min_search_chars must be at least 1".to_string(),
            ));
        }

        if self.limits.max_import_rows == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "limits.max_import_rows must be positive".to_string(),
            ));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }
}
