//! Server settings, read from `ServerConfig.json` in the working directory or from the file named by
//! `TIC_TAC_TOE_CONFIG`. Every field has a default, a missing file simply means defaults.

use crate::session::TurnPolicy;
use protocol::{CHANNEL_BUFFER_SIZE, DEFAULT_PORT};
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;

/// The file looked up when no path is given in the environment.
pub const DEFAULT_CONFIG_FILE: &str = "ServerConfig.json";

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_VARIABLE: &str = "TIC_TAC_TOE_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid setting: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Where the game listener binds.
    pub bind_address: String,
    /// Where the operator status endpoint binds, `null` disables it.
    pub status_address: Option<String>,
    /// Upper bound for concurrently served connections.
    pub max_connections: usize,
    /// A connection that sends nothing for this long is closed.
    pub read_timeout_secs: u64,
    /// Queued outbound lines per connection before it counts as lagging.
    pub outbound_buffer: usize,
    /// How long shutdown waits for connection tasks.
    pub shutdown_grace_secs: u64,
    pub turn_policy: TurnPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_address: format!("0.0.0.0:{DEFAULT_PORT}"),
            status_address: Some("127.0.0.1:8080".to_owned()),
            max_connections: 200,
            read_timeout_secs: 600,
            outbound_buffer: CHANNEL_BUFFER_SIZE,
            shutdown_grace_secs: 5,
            turn_policy: TurnPolicy::default(),
        }
    }
}

impl ServerConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Parses and validates a JSON document.
    pub fn from_json(path: &Path, json_content: &str) -> Result<ServerConfig, ConfigError> {
        let config: ServerConfig =
            serde_json::from_str(json_content).map_err(|source| ConfigError::Parse {
                path: path.to_owned(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid("max_connections must be positive"));
        }
        if self.outbound_buffer == 0 {
            return Err(ConfigError::Invalid("outbound_buffer must be positive"));
        }
        if self.read_timeout_secs == 0 {
            return Err(ConfigError::Invalid("read_timeout_secs must be positive"));
        }
        Ok(())
    }
}

/// The config file location, honouring the environment override.
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_PATH_VARIABLE)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Loads the configuration file. A missing file yields the defaults.
pub async fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let json_content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(error) if error.kind() == ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "No config file, using defaults.");
            return Ok(ServerConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_owned(),
                source,
            });
        }
    };
    let config = ServerConfig::from_json(path, &json_content)?;
    tracing::info!(path = %path.display(), ?config, "Config loaded.");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = ServerConfig::from_json(Path::new("test.json"), "{}").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.bind_address, "0.0.0.0:5001");
        assert_eq!(config.turn_policy, TurnPolicy::ServerAuthoritative);
    }

    #[test]
    fn partial_document_overrides_fields() {
        let json = r#"{ "turn_policy": "client_trust", "status_address": null, "max_connections": 4 }"#;
        let config = ServerConfig::from_json(Path::new("test.json"), json).unwrap();
        assert_eq!(config.turn_policy, TurnPolicy::ClientTrust);
        assert_eq!(config.status_address, None);
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.read_timeout(), Duration::from_secs(600));
    }

    #[test]
    fn rejects_unknown_fields_and_bad_values() {
        assert!(matches!(
            ServerConfig::from_json(Path::new("test.json"), r#"{ "port": 1 }"#),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            ServerConfig::from_json(Path::new("test.json"), r#"{ "max_connections": 0 }"#),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn missing_file_gives_defaults() {
        let config = load_config(Path::new("definitely/not/here.json"))
            .await
            .unwrap();
        assert_eq!(config, ServerConfig::default());
    }
}
