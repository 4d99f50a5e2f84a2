use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::websocket::WebSocketConfig;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// State backend configuration
    #[serde(default)]
    pub state: StateConfig,

    /// Search lifecycle configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Admission control and response hardening
    #[serde(default)]
    pub security: SecurityConfig,

    /// Username to group assignments
    #[serde(default)]
    pub users: UsersConfig,

    /// Bundled simulated peer network
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// WebSocket transport configuration
    #[serde(default)]
    pub websocket: WebSocketConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/default.toml".to_string());

        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (prefix: PSM__)
            .add_source(
                config::Environment::with_prefix("PSM")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateConfig {
    /// State backend type
    #[serde(default)]
    pub backend: StateBackend,

    /// Path for the embedded database
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StateBackend {
    #[default]
    Sled,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Minimum spacing between live progress notifications of one search (milliseconds)
    #[serde(default = "default_response_throttle_ms")]
    pub response_throttle_ms: u64,

    /// Lifetime of a finalized search in the hot cache (seconds)
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Maximum number of searches held in the hot cache
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,

    /// Completed searches older than this are pruned (minutes)
    #[serde(default = "default_retention_minutes")]
    pub retention_minutes: u64,

    /// Enable the scheduled prune job
    #[serde(default = "default_true")]
    pub prune_enabled: bool,

    /// Cron expression for the prune job
    #[serde(default = "default_prune_schedule")]
    pub prune_schedule: String,

    /// Search timeout applied when a request does not carry one (seconds)
    #[serde(default = "default_search_timeout")]
    pub default_timeout_secs: u64,

    /// Response limit applied when a request does not carry one
    #[serde(default = "default_response_limit")]
    pub default_response_limit: usize,

    /// File limit applied when a request does not carry one
    #[serde(default = "default_file_limit")]
    pub default_file_limit: usize,
}

impl SearchConfig {
    pub fn response_throttle(&self) -> Duration {
        Duration::from_millis(self.response_throttle_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            response_throttle_ms: default_response_throttle_ms(),
            cache_ttl_secs: default_cache_ttl(),
            cache_capacity: default_cache_capacity(),
            retention_minutes: default_retention_minutes(),
            prune_enabled: default_true(),
            prune_schedule: default_prune_schedule(),
            default_timeout_secs: default_search_timeout(),
            default_response_limit: default_response_limit(),
            default_file_limit: default_file_limit(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    #[serde(default)]
    pub headers: SecurityHeadersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Enable per-address admission control on the search API
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Requests admitted per window and address
    #[serde(default = "default_rate_limit_capacity")]
    pub capacity: u32,

    /// Refill window (seconds)
    #[serde(default = "default_rate_limit_window")]
    pub window_secs: u64,
}

impl RateLimitingConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            capacity: default_rate_limit_capacity(),
            window_secs: default_rate_limit_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityHeadersConfig {
    /// Emit security headers on every response
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Content-Security-Policy value
    pub content_security_policy: Option<String>,

    /// Strict-Transport-Security value
    pub strict_transport_security: Option<String>,

    /// Public-Key-Pins value
    pub public_key_pins: Option<String>,
}

impl Default for SecurityHeadersConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            content_security_policy: Some(default_content_security_policy()),
            strict_transport_security: None,
            public_key_pins: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsersConfig {
    /// Group reported for users not listed in any group
    #[serde(default = "default_group")]
    pub default_group: String,

    /// Group name to member usernames
    #[serde(default)]
    pub groups: HashMap<String, Vec<String>>,
}

impl Default for UsersConfig {
    fn default() -> Self {
        Self {
            default_group: default_group(),
            groups: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Number of distinct peers that answer a search
    #[serde(default = "default_peer_count")]
    pub peer_count: usize,

    /// Delay between consecutive peer responses (milliseconds)
    #[serde(default = "default_response_interval_ms")]
    pub response_interval_ms: u64,

    /// Files offered by each peer
    #[serde(default = "default_files_per_response")]
    pub files_per_response: usize,

    /// Every n-th peer offers its files as locked
    #[serde(default = "default_locked_every")]
    pub locked_every: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            peer_count: default_peer_count(),
            response_interval_ms: default_response_interval_ms(),
            files_per_response: default_files_per_response(),
            locked_every: default_locked_every(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Service name
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            service_name: default_service_name(),
            prometheus_enabled: default_true(),
        }
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_response_throttle_ms() -> u64 {
    250
}

fn default_cache_ttl() -> u64 {
    300 // 5 minutes
}

fn default_cache_capacity() -> u64 {
    1000
}

fn default_retention_minutes() -> u64 {
    60 * 24 * 7
}

fn default_prune_schedule() -> String {
    "0 */15 * * * *".to_string()
}

fn default_search_timeout() -> u64 {
    15
}

fn default_response_limit() -> usize {
    100
}

fn default_file_limit() -> usize {
    10_000
}

fn default_rate_limit_capacity() -> u32 {
    10
}

fn default_rate_limit_window() -> u64 {
    60
}

fn default_content_security_policy() -> String {
    "default-src 'self'; object-src 'none'; frame-ancestors 'none'".to_string()
}

fn default_group() -> String {
    "default".to_string()
}

fn default_peer_count() -> usize {
    20
}

fn default_response_interval_ms() -> u64 {
    50
}

fn default_files_per_response() -> usize {
    3
}

fn default_locked_every() -> usize {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "peer-search-manager".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        assert_eq!(default_http_port(), 8080);
        assert_eq!(default_response_throttle_ms(), 250);
        assert_eq!(default_cache_ttl(), 300);
        assert_eq!(default_rate_limit_capacity(), 10);
        assert_eq!(default_rate_limit_window(), 60);
        assert_eq!(default_log_level(), "info");
        assert!(default_true());
    }

    #[test]
    fn test_state_backend_default() {
        assert_eq!(StateBackend::default(), StateBackend::Sled);
    }

    #[test]
    fn test_embedded_defaults_parse() {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.search.response_throttle(), Duration::from_millis(250));
        assert_eq!(config.search.cache_ttl(), Duration::from_secs(300));
        assert_eq!(config.security.rate_limiting.capacity, 10);
        assert_eq!(config.users.default_group, "default");
    }
}
