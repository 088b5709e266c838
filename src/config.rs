//! Configuration management

use std::{path::Path, path::PathBuf, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::cache::MAX_TTL;
use crate::{Error, Result};

/// Environment variable prefix; nested keys use `__` (e.g. `COCDB_CACHE__TTL`)
pub const ENV_PREFIX: &str = "COCDB_";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Application settings
    pub app: AppConfig,
    /// Cache configuration
    pub cache: CacheConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Graceful shutdown timeout
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    /// Allowed CORS origins (`*` allows any)
    pub cors_origins: Vec<String>,
    /// Favicon served at `/favicon.ico`
    pub favicon_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            request_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(30),
            cors_origins: vec!["*".to_string()],
            favicon_path: PathBuf::from("static/favicon.ico"),
        }
    }
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Running environment (development, staging, production)
    pub environment: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log format (text, json); json by default in production
    pub log_format: Option<String>,
    /// Root of the JSON data tree
    pub data_dir: PathBuf,
    /// Version reported by `/` and `/health`
    pub version: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            log_level: "info".to_string(),
            log_format: None,
            data_dir: PathBuf::from("data"),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Time-to-live for every cached document
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Reclamation period; half the TTL when unset
    #[serde(with = "humantime_serde::option")]
    pub sweep_interval: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5 * 60),
            sweep_interval: None,
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist, cannot be parsed,
    /// or holds invalid values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        Self::from_figment(&figment)
    }

    /// Extract and validate configuration from a prepared figment
    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.cache.ttl.is_zero() {
            return Err(Error::Config("cache.ttl must be greater than zero".into()));
        }
        if self.cache.ttl > MAX_TTL {
            return Err(Error::Config(format!(
                "cache.ttl must be at most {}",
                humantime_serde::format_duration(MAX_TTL)
            )));
        }
        if self.cache.sweep_interval.is_some_and(|d| d.is_zero()) {
            return Err(Error::Config(
                "cache.sweep_interval must be greater than zero".into(),
            ));
        }
        if self.server.port == 0 {
            return Err(Error::Config("server.port must be non-zero".into()));
        }
        if self.app.data_dir.as_os_str().is_empty() {
            return Err(Error::Config("app.data_dir must not be empty".into()));
        }
        Ok(())
    }

    /// Whether the service runs in production
    #[must_use]
    pub fn is_production(&self) -> bool {
        self.app.environment == "production"
    }

    /// Listen address (e.g. `0.0.0.0:3000`)
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Log format to use, defaulting to json in production
    #[must_use]
    pub fn log_format(&self) -> Option<&str> {
        match self.app.log_format.as_deref() {
            Some(format) => Some(format),
            None if self.is_production() => Some("json"),
            None => None,
        }
    }
}

/// Human-readable serde for `Duration` ("100ms", "30s", "5m", "1h")
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration, keeping millisecond precision when needed
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_duration(*duration))
    }

    /// Deserialize human-readable duration string
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = StringOrNumber::deserialize(deserializer)?.into_string();
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    /// Env providers hand over bare numbers as integers
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(u64),
    }

    impl StringOrNumber {
        fn into_string(self) -> String {
            match self {
                Self::String(s) => s,
                Self::Number(n) => n.to_string(),
            }
        }
    }

    /// Format a duration using the largest exact unit
    #[must_use]
    pub fn format_duration(duration: Duration) -> String {
        if duration.subsec_nanos() != 0 {
            format!("{}ms", duration.as_millis())
        } else {
            format!("{}s", duration.as_secs())
        }
    }

    /// Parse "100ms", "30s", "5m", "2h" or bare seconds
    ///
    /// # Errors
    ///
    /// Returns a message when the number or unit is not recognised.
    pub fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let parse = |n: &str| {
            n.trim()
                .parse::<u64>()
                .map_err(|e| format!("invalid duration {s:?}: {e}"))
        };
        let scaled = |n: u64, unit: u64| {
            n.checked_mul(unit)
                .map(Duration::from_secs)
                .ok_or_else(|| format!("duration {s:?} out of range"))
        };

        if let Some(ms) = s.strip_suffix("ms") {
            parse(ms).map(Duration::from_millis)
        } else if let Some(secs) = s.strip_suffix('s') {
            parse(secs).map(Duration::from_secs)
        } else if let Some(mins) = s.strip_suffix('m') {
            parse(mins).and_then(|m| scaled(m, 60))
        } else if let Some(hours) = s.strip_suffix('h') {
            parse(hours).and_then(|h| scaled(h, 3600))
        } else {
            parse(s).map(Duration::from_secs)
        }
    }

    /// Same format for `Option<Duration>`
    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer};

        /// Serialize an optional duration
        ///
        /// # Errors
        ///
        /// Returns a serialization error if the serializer fails.
        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => serializer.serialize_some(&super::format_duration(*d)),
                None => serializer.serialize_none(),
            }
        }

        /// Deserialize an optional duration
        ///
        /// # Errors
        ///
        /// Returns a deserialization error if the string cannot be parsed as a duration.
        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<super::StringOrNumber>::deserialize(deserializer)?
                .map(|v| super::parse_duration(&v.into_string()))
                .transpose()
                .map_err(serde::de::Error::custom)
        }
    }
}
