//! Configuration Module
//!
//! TOML configuration for mqlink:
//! - Logging level
//! - Server address, keep alive and reconnect policy
//! - CONNECT parameters (client id, clean session, protocol name and level)
//! - Optional credentials
//! - Environment variable overrides (MQLINK__* prefix)

use std::path::Path;
use std::time::Duration;

use config::{Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;

use crate::client::{generate_client_id, ClientOptions, Credentials};
use crate::protocol::{PROTOCOL_LEVEL, PROTOCOL_NAME};
use crate::transport::{ConnectionParams, TransportKind};


/// Substitute environment variables in a string.
/// Supports `${VAR}` and `${VAR:-default}` syntax.
fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
    let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}")
        .map_err(|e| ConfigError::Validation(format!("substitution pattern: {}", e)))?;
    Ok(re
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            std::env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .to_string())
}

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// Config crate error
    Config(config::ConfigError),
    /// Validation error
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Config(e) => write!(f, "Config error: {}", e),
            ConfigError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Config(e)
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,
    /// Where to connect
    pub connection: ConnectionConfig,
    /// CONNECT parameters
    pub client: ClientConfig,
    /// Login sent in CONNECT
    pub credentials: Option<CredentialsConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Server connection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Server host name or address
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Transport protocol
    #[serde(default)]
    pub transport: TransportKind,
    /// Keep alive in seconds (0 disables the keep alive loop)
    #[serde(default = "default_keep_alive")]
    pub keep_alive: u16,
    /// Local address to bind before connecting
    pub bind_address: Option<String>,
    /// Pause between reconnect attempts
    #[serde(default = "default_reconnect_delay", with = "humantime_serde")]
    pub reconnect_delay: Duration,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    ConnectionParams::DEFAULT_PORT
}

fn default_keep_alive() -> u16 {
    ConnectionParams::DEFAULT_KEEP_ALIVE
}

fn default_reconnect_delay() -> Duration {
    ClientOptions::DEFAULT_RECONNECT_DELAY
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportKind::Tcp,
            keep_alive: default_keep_alive(),
            bind_address: None,
            reconnect_delay: default_reconnect_delay(),
        }
    }
}

/// CONNECT parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Client identifier; a random one is generated when empty
    #[serde(default)]
    pub client_id: String,
    #[serde(default = "default_true")]
    pub clean_session: bool,
    #[serde(default = "default_protocol_name")]
    pub protocol_name: String,
    #[serde(default = "default_protocol_level")]
    pub protocol_level: u8,
}

fn default_true() -> bool {
    true
}

fn default_protocol_name() -> String {
    PROTOCOL_NAME.to_string()
}

fn default_protocol_level() -> u8 {
    PROTOCOL_LEVEL
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            clean_session: true,
            protocol_name: default_protocol_name(),
            protocol_level: default_protocol_level(),
        }
    }
}

/// Credentials configuration
#[derive(Clone, Deserialize, Default)]
#[serde(default)]
pub struct CredentialsConfig {
    pub login: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("login", &self.login)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl Config {
    /// Load configuration from a TOML file with environment variable overrides.
    ///
    /// Supports two forms of environment variable usage:
    /// 1. In-file substitution: `${VAR}` or `${VAR:-default}` syntax in the TOML file
    /// 2. Override via env vars: `MQLINK__` prefix with double underscores for nesting:
    ///    - `MQLINK__CONNECTION__HOST=broker.local` overrides `connection.host`
    ///    - `MQLINK__CONNECTION__KEEP_ALIVE=30` overrides `connection.keep_alive`
    ///    - `MQLINK__CLIENT__CLIENT_ID=sensor-1` overrides `client.client_id`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            // Start with defaults
            .set_default("log.level", default_log_level())?
            .set_default("connection.host", default_host())?
            .set_default("connection.port", i64::from(default_port()))?
            .set_default("connection.transport", "tcp")?
            .set_default("connection.keep_alive", i64::from(default_keep_alive()))?
            .set_default("connection.reconnect_delay", "1s")?
            .set_default("client.client_id", "")?
            .set_default("client.clean_session", true)?
            .set_default("client.protocol_name", default_protocol_name())?
            .set_default("client.protocol_level", i64::from(default_protocol_level()))?;

        // Load from file with env var substitution
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let substituted = substitute_env_vars(&content)?;
                builder = builder.add_source(File::from_str(&substituted, FileFormat::Toml));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File doesn't exist, use defaults
            }
            Err(e) => return Err(ConfigError::Io(e)),
        }

        // Override with environment variables (MQLINK__CONNECTION__HOST, etc.)
        // Double underscore separates nested keys, single underscore preserved in field names
        let cfg = builder
            .add_source(
                Environment::with_prefix("MQLINK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = cfg.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides only (no file).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(Path::new(""))
    }

    /// Parse configuration from a string (for testing, no env var support)
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection.host.trim().is_empty() {
            return Err(ConfigError::Validation(
                "connection.host must not be empty".to_string(),
            ));
        }

        if !matches!(self.client.protocol_level, 3 | 4) {
            return Err(ConfigError::Validation(format!(
                "client.protocol_level must be 3 or 4, got {}",
                self.client.protocol_level
            )));
        }

        if let Some(ref credentials) = self.credentials {
            let has_login = credentials
                .login
                .as_ref()
                .map_or(false, |login| !login.is_empty());
            if credentials.password.is_some() && !has_login {
                return Err(ConfigError::Validation(
                    "credentials.password requires credentials.login".to_string(),
                ));
            }
        }

        Ok(())
    }

    pub fn connection_params(&self) -> ConnectionParams {
        ConnectionParams {
            host: self.connection.host.clone(),
            port: self.connection.port,
            transport: self.connection.transport,
            keep_alive: self.connection.keep_alive,
            bind_address: self.connection.bind_address.clone(),
        }
    }

    /// Client options described by this configuration
    pub fn client_options(&self) -> ClientOptions {
        let client_id = if self.client.client_id.is_empty() {
            generate_client_id()
        } else {
            self.client.client_id.clone()
        };

        let credentials = self.credentials.as_ref().and_then(|c| {
            c.login.as_ref().filter(|l| !l.is_empty()).map(|login| Credentials {
                login: login.clone(),
                password: c.password.clone(),
            })
        });

        ClientOptions {
            connection: self.connection_params(),
            client_id,
            clean_session: self.client.clean_session,
            protocol_name: self.client.protocol_name.clone(),
            protocol_level: self.client.protocol_level,
            credentials,
            reconnect_delay: self.connection.reconnect_delay,
        }
    }
}
