use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use thiserror::Error;

/// Environment variable naming the optional TOML config file.
pub const CONFIG_PATH_ENV: &str = "TICKET_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "ticket-dispenser.toml";
const ENV_PREFIX: &str = "TICKET_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Worker threads for the HTTP server; 0 keeps the actix default.
    #[serde(default)]
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: 0,
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Prepended to every queue id to form its storage key.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default)]
    pub redis: RedisConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            key_prefix: default_key_prefix(),
            redis: RedisConfig::default(),
        }
    }
}

fn default_key_prefix() -> String {
    "queue:".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Upper bound for every Redis round trip, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            username: None,
            password: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/".to_string()
}

fn default_timeout_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Config {
    /// Copy safe to log: the Redis password is masked.
    pub fn sanitized(&self) -> Config {
        let mut config = self.clone();
        if config.storage.redis.password.is_some() {
            config.storage.redis.password = Some("***".to_string());
        }
        config
    }
}

fn figment(path: &Path) -> Figment {
    Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Defaults, then the TOML file at `path` if it exists, then `TICKET_*`
/// environment variables (`__` separates nesting levels).
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = figment(path)
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::string(toml_str))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::Invalid("server.port must not be 0".to_string()));
    }
    if config.storage.key_prefix.is_empty() {
        return Err(ConfigError::Invalid(
            "storage.key_prefix must not be empty".to_string(),
        ));
    }
    if config.storage.backend == StorageBackend::Redis {
        if config.storage.redis.url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "storage.redis.url is required for the redis backend".to_string(),
            ));
        }
        if config.storage.redis.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "storage.redis.timeout_ms must be greater than 0".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.storage.key_prefix, "queue:");
        assert_eq!(config.storage.redis.timeout_ms, 2000);
        assert_eq!(config.log.format, LogFormat::Pretty);
    }

    #[test]
    fn test_load_config_from_str() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 9000

[storage]
backend = "redis"
key_prefix = "tickets:"

[storage.redis]
url = "redis://cache:6379/2"
password = "hunter2"
timeout_ms = 250

[log]
format = "json"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.storage.backend, StorageBackend::Redis);
        assert_eq!(config.storage.key_prefix, "tickets:");
        assert_eq!(config.storage.redis.url, "redis://cache:6379/2");
        assert_eq!(config.storage.redis.timeout_ms, 250);
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(
            config.sanitized().storage.redis.password.as_deref(),
            Some("***")
        );
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let result = load_config_from_str("[storage]\nbackend = \"etcd\"\n");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            load_config_from_str("[server]\nport = 0\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            load_config_from_str("[storage]\nkey_prefix = \"\"\n"),
            Err(ConfigError::Invalid(_))
        ));
        let zero_timeout = r#"
[storage]
backend = "redis"

[storage.redis]
timeout_ms = 0
"#;
        assert!(matches!(
            load_config_from_str(zero_timeout),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "ticket-dispenser.toml",
                r#"
[server]
port = 3000

[storage]
backend = "memory"
"#,
            )?;
            jail.set_env("TICKET_STORAGE__BACKEND", "redis");
            jail.set_env("TICKET_STORAGE__REDIS__URL", "redis://env-host:6379/");

            let config = load_config(Path::new("ticket-dispenser.toml")).expect("config loads");
            assert_eq!(config.server.port, 3000);
            assert_eq!(config.storage.backend, StorageBackend::Redis);
            assert_eq!(config.storage.redis.url, "redis://env-host:6379/");
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        Jail::expect_with(|_jail| {
            let config = load_config(Path::new("absent.toml")).expect("config loads");
            assert_eq!(config, Config::default());
            Ok(())
        });
    }
}
