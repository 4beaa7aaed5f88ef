//! Configuration for Cadence

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix for environment overrides, e.g. `CADENCE__DATABASE__URL`
const ENV_PREFIX: &str = "CADENCE";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Scheduling policy defaults
    #[serde(default)]
    pub scheduling: SchedulingConfig,

    /// Automation worker configuration
    #[serde(default)]
    pub automation: AutomationConfig,

    /// Outbound email provider
    #[serde(default)]
    pub outbound: OutboundConfig,

    /// Inbound webhook secrets
    #[serde(default)]
    pub webhooks: WebhookConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database backend: only "postgres" is supported
    #[serde(default = "default_db_backend")]
    pub backend: String,

    /// Database URL
    pub url: Option<String>,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_db_backend() -> String {
    "postgres".to_string()
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    2
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API port
    #[serde(default = "default_api_port")]
    pub port: u16,

    /// Accepted API key hashes (SHA-256 hex or Argon2 PHC strings)
    #[serde(default)]
    pub api_key_hashes: Vec<String>,

    /// CORS allowed origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
            api_key_hashes: Vec::new(),
            cors_origins: Vec::new(),
        }
    }
}

fn default_api_port() -> u16 {
    8080
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Scheduling policy defaults applied when campaign data is incomplete
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// Timezone used when a contact has no resolvable location
    #[serde(default = "default_timezone")]
    pub default_timezone: String,

    /// Business window start hour (local, inclusive)
    #[serde(default = "default_start_hour")]
    pub business_start_hour: u32,

    /// Business window end hour (local, exclusive)
    #[serde(default = "default_end_hour")]
    pub business_end_hour: u32,

    /// Delay used for follow-up steps without `timing_days`
    #[serde(default = "default_follow_up_days")]
    pub default_follow_up_days: i64,

    /// Campaign daily cap when settings omit it
    #[serde(default = "default_daily_contacts_limit")]
    pub default_daily_contacts_limit: i32,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            default_timezone: default_timezone(),
            business_start_hour: default_start_hour(),
            business_end_hour: default_end_hour(),
            default_follow_up_days: default_follow_up_days(),
            default_daily_contacts_limit: default_daily_contacts_limit(),
        }
    }
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_start_hour() -> u32 {
    9
}

fn default_end_hour() -> u32 {
    17
}

fn default_follow_up_days() -> i64 {
    1
}

fn default_daily_contacts_limit() -> i32 {
    35
}

/// Automation worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// Run the interval worker inside the server process
    #[serde(default)]
    pub enabled: bool,

    /// Seconds between passes
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// How long a claimed contact stays locked, in seconds
    #[serde(default = "default_claim_lease")]
    pub claim_lease_secs: i64,

    /// Simulate sends without mutating state
    #[serde(default)]
    pub test_mode: bool,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            poll_interval_secs: default_poll_interval(),
            claim_lease_secs: default_claim_lease(),
            test_mode: false,
        }
    }
}

fn default_poll_interval() -> u64 {
    300
}

fn default_claim_lease() -> i64 {
    600
}

/// Outbound provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundConfig {
    /// Provider: "sendgrid", "smtp" or "log"
    #[serde(default = "default_outbound_provider")]
    pub provider: String,

    /// SendGrid settings
    #[serde(default)]
    pub sendgrid: SendGridConfig,

    /// SMTP relay settings
    #[serde(default)]
    pub smtp: SmtpRelayConfig,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            provider: default_outbound_provider(),
            sendgrid: SendGridConfig::default(),
            smtp: SmtpRelayConfig::default(),
        }
    }
}

fn default_outbound_provider() -> String {
    "log".to_string()
}

/// SendGrid API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendGridConfig {
    /// API key
    pub api_key: Option<String>,

    /// API base URL
    #[serde(default = "default_sendgrid_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for SendGridConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_sendgrid_url(),
            timeout_secs: default_http_timeout(),
        }
    }
}

fn default_sendgrid_url() -> String {
    "https://api.sendgrid.com".to_string()
}

fn default_http_timeout() -> u64 {
    30
}

/// SMTP relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpRelayConfig {
    #[serde(default = "default_smtp_host")]
    pub host: String,

    #[serde(default = "default_smtp_port")]
    pub port: u16,

    pub username: Option<String>,

    pub password: Option<String>,

    /// Implicit TLS
    #[serde(default)]
    pub use_tls: bool,

    #[serde(default = "default_use_starttls")]
    pub use_starttls: bool,
}

impl Default for SmtpRelayConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            username: None,
            password: None,
            use_tls: false,
            use_starttls: default_use_starttls(),
        }
    }
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_use_starttls() -> bool {
    true
}

/// Inbound webhook verification secrets and limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Mailgun webhook signing key
    pub mailgun_signing_key: Option<String>,

    /// MailerSend webhook signing secret
    pub mailersend_secret: Option<String>,

    /// Bearer token expected from the SMTP relay
    pub smtp_token: Option<String>,

    /// Largest accepted webhook body; form posts carry attachments
    #[serde(default = "default_webhook_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            mailgun_signing_key: None,
            mailersend_secret: None,
            smtp_token: None,
            max_body_bytes: default_webhook_body_bytes(),
        }
    }
}

fn default_webhook_body_bytes() -> usize {
    30 * 1024 * 1024
}

impl Config {
    /// Load configuration from a file, with environment overrides
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .and_then(|c| c.try_deserialize::<Config>())
            .map_err(|e| crate::Error::Config(format!("Failed to load config: {}", e)))
    }

    /// Load configuration from the first default location found,
    /// or from the environment alone
    pub fn load() -> crate::Result<Self> {
        let paths = [
            PathBuf::from("./config.toml"),
            PathBuf::from("/etc/cadence/config.toml"),
        ];

        for path in paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .and_then(|c| c.try_deserialize::<Config>())
            .map_err(|e| {
                crate::Error::Config(format!(
                    "No configuration file found and environment is incomplete: {}",
                    e
                ))
            })
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> crate::Result<()> {
        let s = &self.scheduling;
        if s.business_end_hour > 24 || s.business_start_hour >= s.business_end_hour {
            return Err(crate::Error::Config(format!(
                "Invalid business window {}..{}",
                s.business_start_hour, s.business_end_hour
            )));
        }
        match self.outbound.provider.as_str() {
            "sendgrid" | "smtp" | "log" => Ok(()),
            other => Err(crate::Error::Config(format!(
                "Unknown outbound provider: {}",
                other
            ))),
        }
    }
}
