use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_PAGE_LIMIT: u32 = 250;
const DEFAULT_INTEGRATION_NAME: &str = "shopify";
const CONFIG_DIR: &str = "config";

/// How tax detail entries are carried onto a return copy of an invoice.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxSignPolicy {
    /// Sign-invert each per-item `[rate, amount]` pair (the normal return).
    #[default]
    Invert,
    /// Zero the tax detail out entirely.
    Zero,
}

/// Settings for the storefront integration this instance serves.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct IntegrationConfig {
    /// Integration name recorded on every ecommerce link row
    #[serde(default = "default_integration_name")]
    #[validate(length(min = 1))]
    pub integration_name: String,

    /// Base URL of the storefront platform API
    #[serde(default)]
    pub storefront_base_url: String,

    /// Access token for the storefront platform API
    #[serde(default)]
    pub storefront_token: Option<String>,

    /// Warehouse written onto every return-copy line; falls back to the
    /// invoice line's warehouse when unset
    #[serde(default)]
    pub warehouse: Option<String>,

    /// Tax detail sign policy for return copies
    #[serde(default)]
    pub tax_sign_policy: TaxSignPolicy,

    /// Page size requested from the storefront product API
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            integration_name: default_integration_name(),
            storefront_base_url: String::new(),
            storefront_token: None,
            warehouse: None,
            tax_sign_policy: TaxSignPolicy::default(),
            page_limit: default_page_limit(),
        }
    }
}

/// Application configuration with validation.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON-formatted logs
    #[serde(default)]
    pub log_json: bool,

    /// Maximum database connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// Minimum database connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    #[serde(default)]
    #[validate]
    pub integration: IntegrationConfig,
}

impl AppConfig {
    /// Constructs a configuration directly; used by tests and tools.
    pub fn new(database_url: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            database_url: database_url.into(),
            host: host.into(),
            port,
            log_level: default_log_level(),
            log_json: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            integration: IntegrationConfig::default(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_min_connections() -> u32 {
    1
}

fn default_page_limit() -> u32 {
    DEFAULT_PAGE_LIMIT
}

fn default_integration_name() -> String {
    DEFAULT_INTEGRATION_NAME.to_string()
}

/// Loads configuration from `config/default.toml`, an environment-specific
/// overlay, and `COMMERCE_SYNC_*` environment variables, then validates it.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let run_env = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".to_string());

    let cfg: AppConfig = Config::builder()
        .add_source(File::with_name(&format!("{CONFIG_DIR}/default")).required(false))
        .add_source(File::with_name(&format!("{CONFIG_DIR}/{run_env}")).required(false))
        .add_source(Environment::with_prefix("COMMERCE_SYNC").separator("__"))
        .build()?
        .try_deserialize()?;

    cfg.validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {e}")))?;

    info!(environment = %run_env, "configuration loaded");
    Ok(cfg)
}

/// Initializes the global tracing subscriber.
pub fn init_tracing(log_level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
