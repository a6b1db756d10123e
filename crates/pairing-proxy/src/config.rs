//! Configuration for the pairing proxy.

use crate::session::BackoffTable;
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;
use std::time::Duration;

/// Proxy configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Bridge API configuration
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Credential storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Pairing lifecycle configuration
    #[serde(default)]
    pub pairing: PairingConfig,

    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Transport bridge REST API URL
    #[serde(default = "default_bridge_api_url")]
    pub api_url: String,

    /// How often to poll the bridge for session events
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root directory holding one directory per phone number
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,

    /// Credential file name inside each number's directory
    #[serde(default = "default_credential_file")]
    pub credential_file: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PairingConfig {
    /// Retryable disconnects tolerated per attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Keep-alive ping interval while awaiting confirmation
    #[serde(default = "default_keepalive_interval", with = "humantime_serde")]
    pub keepalive_interval: Duration,

    /// Wait before harvesting when no confirmed credential write was seen
    #[serde(default = "default_settle_grace", with = "humantime_serde")]
    pub settle_grace: Duration,

    /// Wait between delivery and closing the transport
    #[serde(default = "default_close_grace", with = "humantime_serde")]
    pub close_grace: Duration,

    /// Cleanup delay after completion
    #[serde(default = "default_completed_cleanup_delay", with = "humantime_serde")]
    pub completed_cleanup_delay: Duration,

    /// Safety-net cleanup delay for sessions that never complete
    #[serde(default = "default_pending_cleanup_delay", with = "humantime_serde")]
    pub pending_cleanup_delay: Duration,

    /// Cleanup delay after the retry cap is reached
    #[serde(default = "default_exhausted_cleanup_delay", with = "humantime_serde")]
    pub exhausted_cleanup_delay: Duration,

    /// Prefix of the delivered credential blob
    #[serde(default = "default_blob_prefix")]
    pub blob_prefix: String,

    /// Delivery recipient when the account's own id is unknown
    #[serde(default = "default_owner")]
    pub default_owner: String,

    /// Optional message sent after the credential blob. Empty disables it.
    #[serde(
        default = "default_delivery_notice",
        deserialize_with = "deserialize_notice"
    )]
    pub delivery_notice: Option<String>,

    /// Reconnect delays per disconnect reason
    #[serde(default)]
    pub backoff: BackoffTable,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

// Default implementations
impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            api_url: default_bridge_api_url(),
            poll_interval: default_poll_interval(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            credential_file: default_credential_file(),
        }
    }
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            keepalive_interval: default_keepalive_interval(),
            settle_grace: default_settle_grace(),
            close_grace: default_close_grace(),
            completed_cleanup_delay: default_completed_cleanup_delay(),
            pending_cleanup_delay: default_pending_cleanup_delay(),
            exhausted_cleanup_delay: default_exhausted_cleanup_delay(),
            blob_prefix: default_blob_prefix(),
            default_owner: default_owner(),
            delivery_notice: default_delivery_notice(),
            backoff: BackoffTable::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            port: default_port(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value functions
fn default_bridge_api_url() -> String {
    "http://pairing-bridge:3000".into()
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("/data/sessions")
}

fn default_credential_file() -> String {
    "creds.json".into()
}

fn default_blob_prefix() -> String {
    "PAIRED~".into()
}

fn default_max_retries() -> u32 {
    3
}

fn default_keepalive_interval() -> Duration {
    Duration::from_millis(1500)
}

fn default_settle_grace() -> Duration {
    Duration::from_secs(10)
}

fn default_close_grace() -> Duration {
    Duration::from_millis(500)
}

fn default_completed_cleanup_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_pending_cleanup_delay() -> Duration {
    Duration::from_secs(300)
}

fn default_exhausted_cleanup_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_owner() -> String {
    "owner".into()
}

fn default_delivery_notice() -> Option<String> {
    Some("Your session has been linked. Keep the message above private.".into())
}

fn deserialize_notice<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let notice = Option::<String>::deserialize(deserializer)?;
    Ok(notice.filter(|n| !n.trim().is_empty()))
}

fn default_listen_addr() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    8081
}

fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(false),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
