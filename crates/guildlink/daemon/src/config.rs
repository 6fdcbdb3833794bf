//! Configuration for guildlink-daemon

use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Discord application, bot and guild
    #[serde(default)]
    pub discord: DiscordConfig,

    /// Validation server
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Key used to sign the OAuth2 state cookie
    #[serde(default)]
    pub session_key: String,

    /// How long to wait for in-flight requests on shutdown
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            session_key: String::new(),
            shutdown_grace_secs: default_shutdown_grace(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (for development/testing)
    #[default]
    Memory,

    /// PostgreSQL storage
    Postgres {
        /// Connection URL
        url: String,

        /// Maximum connections in pool
        #[serde(default = "default_pool_size")]
        max_connections: u32,

        /// Connection timeout in seconds
        #[serde(default = "default_connection_timeout")]
        connect_timeout_secs: u64,
    },
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Validation pass interval in seconds
    #[serde(default = "default_validation_interval")]
    pub validation_interval_secs: u64,

    /// Token refresh pass interval in seconds
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Run a refresh pass as soon as the scheduler starts
    #[serde(default = "default_true")]
    pub refresh_on_startup: bool,
}

impl SchedulerConfig {
    pub fn validation_interval(&self) -> Duration {
        Duration::from_secs(self.validation_interval_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            validation_interval_secs: default_validation_interval(),
            refresh_interval_secs: default_refresh_interval(),
            refresh_on_startup: true,
        }
    }
}

/// Discord application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,

    /// OAuth2 redirect URL, must match the application settings
    #[serde(default)]
    pub redirect_url: String,

    #[serde(default)]
    pub bot_token: String,

    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// REST API base, without trailing slash
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_auth_scopes")]
    pub auth_scopes: Vec<String>,

    #[serde(default)]
    pub guild_id: String,

    /// Role ids granted when a member joins
    #[serde(default)]
    pub guild_roles: Vec<String>,

    /// Evict members whose refresh token was revoked instead of only
    /// flagging the token
    #[serde(default = "default_true")]
    pub evict_on_revoked_token: bool,

    /// Outbound request timeout in seconds
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_url: String::new(),
            bot_token: String::new(),
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            api_base_url: default_api_base_url(),
            auth_scopes: default_auth_scopes(),
            guild_id: String::new(),
            guild_roles: Vec::new(),
            evict_on_revoked_token: true,
            timeout_secs: default_upstream_timeout(),
        }
    }
}

/// Validation server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_validation_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_validation_endpoint(),
            timeout_secs: default_upstream_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8082))
}

fn default_shutdown_grace() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    10
}

fn default_pool_size() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_validation_interval() -> u64 {
    20 * 60
}

fn default_refresh_interval() -> u64 {
    24 * 60 * 60
}

fn default_auth_url() -> String {
    "https://discord.com/api/oauth2/authorize".to_string()
}

fn default_token_url() -> String {
    "https://discord.com/api/oauth2/token".to_string()
}

fn default_api_base_url() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_auth_scopes() -> Vec<String> {
    vec!["identify".to_string(), "guilds.join".to_string()]
}

fn default_validation_endpoint() -> String {
    "http://127.0.0.1:8081/api/validation/discord".to_string()
}

fn default_upstream_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration from defaults, an optional file and the environment.
    ///
    /// Environment variables use the `GUILDLINK_` prefix and `__` between
    /// sections, e.g. `GUILDLINK_DISCORD__GUILD_ID`.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("GUILDLINK")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("discord.guild_roles")
                .with_list_parse_key("discord.auth_scopes")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Configuration written by `guildlinkd init`, with a fresh session key
    pub fn template() -> Self {
        let mut config = Self::default();
        config.server.session_key = random_key(32);
        config
    }

    /// Check the settings `run` cannot work without
    pub fn validate(&self) -> Result<(), String> {
        if self.scheduler.validation_interval_secs == 0 {
            return Err("scheduler.validation_interval_secs must be positive".to_string());
        }
        if self.scheduler.refresh_interval_secs == 0 {
            return Err("scheduler.refresh_interval_secs must be positive".to_string());
        }

        let required = [
            ("discord.client_id", &self.discord.client_id),
            ("discord.client_secret", &self.discord.client_secret),
            ("discord.bot_token", &self.discord.bot_token),
            ("discord.guild_id", &self.discord.guild_id),
            ("server.session_key", &self.server.session_key),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(format!("{} must be set", name));
            }
        }

        Ok(())
    }
}

fn random_key(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> DaemonConfig {
        let mut config = DaemonConfig::template();
        config.discord.client_id = "client".to_string();
        config.discord.client_secret = "secret".to_string();
        config.discord.bot_token = "bot".to_string();
        config.discord.guild_id = "guild".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.server.listen_addr.port(), 8082);
        assert!(matches!(config.storage, StorageConfig::Memory));
        assert!(config.discord.evict_on_revoked_token);
        assert_eq!(config.discord.auth_scopes, vec!["identify", "guilds.join"]);
    }

    #[test]
    fn test_scheduler_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.validation_interval(), Duration::from_secs(1200));
        assert_eq!(config.refresh_interval(), Duration::from_secs(86400));
        assert!(config.refresh_on_startup);
    }

    #[test]
    fn test_template_has_session_key() {
        let a = DaemonConfig::template();
        let b = DaemonConfig::template();
        assert_eq!(a.server.session_key.len(), 32);
        assert_ne!(a.server.session_key, b.server.session_key);
    }

    #[test]
    fn test_validate() {
        assert!(configured().validate().is_ok());

        let mut config = configured();
        config.discord.guild_id.clear();
        assert_eq!(config.validate().unwrap_err(), "discord.guild_id must be set");

        let mut config = configured();
        config.scheduler.validation_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_storage_config_from_json() {
        let config: StorageConfig =
            serde_json::from_str(r#"{"type":"postgres","url":"postgres://localhost/guildlink"}"#)
                .unwrap();
        match config {
            StorageConfig::Postgres {
                url,
                max_connections,
                connect_timeout_secs,
            } => {
                assert_eq!(url, "postgres://localhost/guildlink");
                assert_eq!(max_connections, 10);
                assert_eq!(connect_timeout_secs, 5);
            }
            StorageConfig::Memory => panic!("expected postgres storage"),
        }
    }
}
