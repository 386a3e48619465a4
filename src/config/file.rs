//! TOML configuration file loading
//!
//! Supports `~/.config/mattone/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct MattoneConfigFile {
    /// Identity provider settings
    #[serde(default)]
    pub cognito: CognitoFileConfig,

    /// Server/runtime configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Storage configuration
    #[serde(default)]
    pub database: DatabaseFileConfig,
}

/// Cognito user pool settings
#[derive(Debug, Default, Deserialize)]
pub struct CognitoFileConfig {
    /// AWS region of the user pool (e.g. "eu-west-1")
    pub region: Option<String>,

    /// User pool identifier
    pub user_pool_id: Option<String>,

    /// App client identifier expected in `aud` / `client_id`
    pub client_id: Option<String>,

    /// Override for the key set URL (defaults to the pool's well-known path)
    pub jwks_url: Option<String>,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// API server port
    pub port: Option<u16>,

    /// Upper bound for a single push write, in seconds
    pub dispatch_timeout_secs: Option<u64>,

    /// Push channel keep-alive interval, in seconds
    pub heartbeat_secs: Option<u64>,

    /// Global request budget per minute (0 disables limiting)
    pub rate_limit_rpm: Option<u32>,
}

/// Storage configuration
#[derive(Debug, Default, Deserialize)]
pub struct DatabaseFileConfig {
    /// Path to the `SQLite` database file
    pub path: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `MattoneConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> MattoneConfigFile {
    let Some(path) = config_file_path() else {
        return MattoneConfigFile::default();
    };

    if !path.exists() {
        return MattoneConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                MattoneConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            MattoneConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/mattone/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("mattone").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_file() {
        let file: MattoneConfigFile = toml::from_str(
            r#"
            [cognito]
            region = "eu-west-1"

            [server]
            port = 9000
            "#,
        )
        .unwrap();

        assert_eq!(file.cognito.region.as_deref(), Some("eu-west-1"));
        assert!(file.cognito.client_id.is_none());
        assert_eq!(file.server.port, Some(9000));
        assert!(file.database.path.is_none());
    }

    #[test]
    fn empty_file_is_default() {
        let file: MattoneConfigFile = toml::from_str("").unwrap();
        assert!(file.server.port.is_none());
    }
}
