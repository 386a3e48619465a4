//! Configuration management for the mattone service

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use self::file::MattoneConfigFile;
use crate::{Error, Result};

/// Default API port
pub const DEFAULT_PORT: u16 = 8080;

/// Default upper bound for one push write
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Default push channel keep-alive interval
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Service configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Identity provider settings
    pub cognito: CognitoConfig,

    /// HTTP API server configuration
    pub server: ServerConfig,

    /// Path to the `SQLite` database file
    pub database_path: PathBuf,
}

/// HTTP API server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Upper bound for writing one event to a device connection
    pub dispatch_timeout: Duration,

    /// Interval between keep-alive comments on push channels
    pub heartbeat_interval: Duration,

    /// Global request budget per minute (0 disables limiting)
    pub rate_limit_rpm: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            dispatch_timeout: DEFAULT_DISPATCH_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            rate_limit_rpm: 0,
        }
    }
}

/// Cognito user pool the bearer tokens are issued by
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CognitoConfig {
    pub region: String,
    pub user_pool_id: String,
    pub client_id: String,
    /// Explicit key set URL, used instead of the pool's well-known path
    pub jwks_url: Option<String>,
}

impl CognitoConfig {
    /// Expected `iss` claim for tokens minted by this pool
    #[must_use]
    pub fn issuer(&self) -> String {
        format!(
            "https://cognito-idp.{}.amazonaws.com/{}",
            self.region, self.user_pool_id
        )
    }

    /// URL of the pool's public signing keys
    #[must_use]
    pub fn jwks_url(&self) -> String {
        self.jwks_url
            .clone()
            .unwrap_or_else(|| format!("{}/.well-known/jwks.json", self.issuer()))
    }
}

/// Return the default database path, creating its directory if needed
///
/// Uses `~/.local/share/mattone/mattone.db` on Linux
pub fn default_database_path() -> PathBuf {
    let data_dir = directories::ProjectDirs::from("dev", "mattone", "mattone")
        .map_or_else(|| PathBuf::from(".data/mattone"), |d| d.data_dir().to_path_buf());

    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::warn!(
            path = %data_dir.display(),
            error = %e,
            "failed to create data directory"
        );
    }

    data_dir.join("mattone.db")
}

impl Config {
    /// Load configuration from the environment layered over the config file
    ///
    /// # Errors
    ///
    /// Returns error if the identity provider settings are incomplete or a
    /// numeric setting cannot be parsed
    pub fn load() -> Result<Self> {
        let file = file::load_config_file();
        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed config file and an environment lookup
    ///
    /// Environment values win over file values, which win over defaults.
    ///
    /// # Errors
    ///
    /// Returns error if the identity provider settings are incomplete or a
    /// numeric setting cannot be parsed
    pub fn from_sources<F>(file: MattoneConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| env(key).filter(|v| !v.is_empty());

        let required = |key: &str, fallback: Option<String>| {
            var(key)
                .or(fallback)
                .ok_or_else(|| Error::Config(format!("{key} is not set")))
        };

        let cognito = CognitoConfig {
            region: required("COGNITO_REGION", file.cognito.region)?,
            user_pool_id: required("COGNITO_USER_POOL_ID", file.cognito.user_pool_id)?,
            client_id: required("COGNITO_CLIENT_ID", file.cognito.client_id)?,
            jwks_url: var("MATTONE_JWKS_URL").or(file.cognito.jwks_url),
        };

        let defaults = ServerConfig::default();
        let server = ServerConfig {
            port: parse_var(&var, "PORT")?
                .or(file.server.port)
                .unwrap_or(defaults.port),
            dispatch_timeout: parse_var(&var, "MATTONE_DISPATCH_TIMEOUT_SECS")?
                .or(file.server.dispatch_timeout_secs)
                .map_or(defaults.dispatch_timeout, Duration::from_secs),
            heartbeat_interval: parse_var(&var, "MATTONE_HEARTBEAT_SECS")?
                .or(file.server.heartbeat_secs)
                .filter(|secs| *secs > 0)
                .map_or(defaults.heartbeat_interval, Duration::from_secs),
            rate_limit_rpm: parse_var(&var, "MATTONE_RATE_LIMIT_RPM")?
                .or(file.server.rate_limit_rpm)
                .unwrap_or(defaults.rate_limit_rpm),
        };

        let database_path = var("MATTONE_DB_PATH")
            .or(file.database.path)
            .map_or_else(default_database_path, PathBuf::from);

        Ok(Self {
            cognito,
            server,
            database_path,
        })
    }
}

fn parse_var<T, F>(var: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    var(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| Error::Config(format!("invalid {key}: {e}")))
        })
        .transpose()
}
