//! Configuration loading from environment variables.
//!
//! Parsing is done over a lookup function so it can be exercised without
//! touching the process environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use authgate_auth::{DEFAULT_SUPERUSER_NAMESPACES, KeyFamily, ResolverConfig};
use thiserror::Error;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_ADMIN_PERMISSION: &str = "auth:users:admin";
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Connection settings for the networked state store.
#[derive(Clone, PartialEq, Eq)]
pub struct RedisSettings {
    pub url: String,
    pub password: Option<String>,
    pub db: i64,

    /// Upper bound for a single command, connection setup included.
    pub command_timeout: Duration,
}

impl RedisSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            password: None,
            db: 0,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

impl core::fmt::Debug for RedisSettings {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedisSettings")
            .field("url", &self.url)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("db", &self.db)
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub public_key_path: PathBuf,
    pub issuer: String,
    pub key_family: KeyFamily,
    pub leeway_secs: u64,

    /// `None` runs against the in-process store.
    pub redis: Option<RedisSettings>,

    pub resolver: ResolverConfig,
    pub listen_addr: SocketAddr,

    /// `["*"]` allows any origin.
    pub cors_allowed_origins: Vec<String>,

    /// Defaults to `admin`; `none` disables superuser grants.
    pub superuser_namespaces: Vec<String>,

    /// Permission required by the administrative routes.
    pub admin_permission: String,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |var: &'static str| get(var).ok_or(ConfigError::Missing(var));

        let public_key_path = PathBuf::from(required("AUTH_PUBLIC_KEY_PATH")?);
        let issuer = required("AUTH_ISSUER")?;

        let key_family = match get("AUTH_KEY_ALGORITHM") {
            Some(raw) => raw.parse::<KeyFamily>().map_err(|e| ConfigError::Invalid {
                var: "AUTH_KEY_ALGORITHM",
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => KeyFamily::Rsa,
        };
        let leeway_secs = parse_or("AUTH_LEEWAY_SECS", get("AUTH_LEEWAY_SECS"), 0u64)?;

        let redis = match get("REDIS_URL") {
            Some(url) => Some(RedisSettings {
                url,
                password: get("REDIS_PASSWORD"),
                db: parse_or("REDIS_DB", get("REDIS_DB"), 0i64)?,
                command_timeout: millis_or(
                    "STORE_COMMAND_TIMEOUT_MS",
                    get("STORE_COMMAND_TIMEOUT_MS"),
                    DEFAULT_COMMAND_TIMEOUT,
                )?,
            }),
            None => None,
        };

        let defaults = ResolverConfig::default();
        let resolver = ResolverConfig {
            store_timeout: millis_or("STORE_TIMEOUT_MS", get("STORE_TIMEOUT_MS"), defaults.store_timeout)?,
            concurrent_reads: match get("STORE_CONCURRENT_READS") {
                Some(raw) => parse_bool("STORE_CONCURRENT_READS", &raw)?,
                None => defaults.concurrent_reads,
            },
        };

        let listen_addr = get("LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr = listen_addr
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                var: "LISTEN_ADDR",
                value: listen_addr.clone(),
                reason: e.to_string(),
            })?;

        let mut cors_allowed_origins = split_list(get("CORS_ALLOWED_ORIGINS"));
        if cors_allowed_origins.is_empty() {
            cors_allowed_origins.push("*".to_string());
        }

        Ok(Self {
            public_key_path,
            issuer,
            key_family,
            leeway_secs,
            redis,
            resolver,
            listen_addr,
            cors_allowed_origins,
            superuser_namespaces: superuser_namespaces(get("AUTH_SUPERUSER_NAMESPACES")),
            admin_permission: get("ADMIN_PERMISSION")
                .unwrap_or_else(|| DEFAULT_ADMIN_PERMISSION.to_string()),
        })
    }

    pub fn allows_any_origin(&self) -> bool {
        self.cors_allowed_origins.iter().any(|o| o == "*")
    }
}

fn parse_or<T>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: core::fmt::Display,
{
    match raw {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn millis_or(
    var: &'static str,
    raw: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let millis = parse_or(var, raw.clone(), default.as_millis() as u64)?;
    if millis == 0 {
        return Err(ConfigError::Invalid {
            var,
            value: raw.unwrap_or_default(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(Duration::from_millis(millis))
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: raw.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

fn superuser_namespaces(raw: Option<String>) -> Vec<String> {
    match raw {
        Some(raw) if raw.eq_ignore_ascii_case("none") => Vec::new(),
        Some(raw) => split_list(Some(raw)),
        None => DEFAULT_SUPERUSER_NAMESPACES
            .iter()
            .map(|ns| ns.to_string())
            .collect(),
    }
}

fn split_list(raw: Option<String>) -> Vec<String> {
    raw.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}
