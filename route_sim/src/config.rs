use std::{
    env, fs, io,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use route_protocol::cell_index;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const BUILTIN_ENGINE_CONFIG: &str = include_str!("data/engine_config.json");
pub const CONFIG_PATH_ENV: &str = "ROUTE_SIM_CONFIG_PATH";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub step_interval_secs: f32,
    pub max_steps_per_frame: u32,
    pub max_steps_per_command: u32,
    pub history_limit: usize,
    pub rejection_flash_secs: f32,
    pub layout_margin_px: f32,
    pub random_seed: Option<u64>,
    pub exit_cell: Option<[i32; 2]>,
    pub policy: PolicyConfig,
    pub server: ServerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_interval_secs: 0.35,
            max_steps_per_frame: 8,
            max_steps_per_command: 1000,
            history_limit: 2048,
            rejection_flash_secs: 0.65,
            layout_margin_px: 12.0,
            random_seed: None,
            exit_cell: None,
            policy: PolicyConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Embedded defaults. Falls back to [`EngineConfig::default`] if the
    /// embedded document ever fails to parse.
    pub fn builtin() -> Self {
        Self::from_json_str(BUILTIN_ENGINE_CONFIG).unwrap_or_else(|err| {
            tracing::warn!(
                target: "route_sim::config",
                error = %err,
                "engine_config.builtin_invalid"
            );
            Self::default()
        })
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    /// Exit cell as a board index; out-of-range coordinates disable it.
    pub fn exit_index(&self) -> Option<usize> {
        self.exit_cell.and_then(|[x, y]| cell_index(x, y))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse engine config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read engine config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub enabled: bool,
    /// `host:port` of the decision service.
    pub endpoint: String,
    pub path: String,
    pub timeout_ms: u64,
    pub trigger_on_click: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "127.0.0.1:8000".to_string(),
            path: "/get_action".to_string(),
            timeout_ms: 2000,
            trigger_on_click: true,
        }
    }
}

impl PolicyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub command_bind: SocketAddr,
    pub frame_bind: SocketAddr,
    pub frame_rate_hz: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command_bind: SocketAddr::from(([127, 0, 0, 1], 42001)),
            frame_bind: SocketAddr::from(([127, 0, 0, 1], 42000)),
            frame_rate_hz: 60,
        }
    }
}

impl ServerConfig {
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.frame_rate_hz.max(1)))
    }
}

/// Load the config named by `ROUTE_SIM_CONFIG_PATH`, or the builtin document
/// when the variable is unset or the file cannot be used. Returns the path the
/// config was read from, if any.
pub fn load_engine_config_from_env() -> (EngineConfig, Option<PathBuf>) {
    if let Some(path) = env::var_os(CONFIG_PATH_ENV).map(PathBuf::from) {
        match EngineConfig::from_file(&path) {
            Ok(config) => {
                tracing::info!(
                    target: "route_sim::config",
                    path = %path.display(),
                    "engine_config.loaded=file"
                );
                return (config, Some(path));
            }
            Err(err) => {
                tracing::warn!(
                    target: "route_sim::config",
                    path = %path.display(),
                    error = %err,
                    "engine_config.load_failed"
                );
            }
        }
    }

    tracing::info!(target: "route_sim::config", "engine_config.loaded=builtin");
    (EngineConfig::builtin(), None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_matches_defaults() {
        assert_eq!(EngineConfig::builtin(), EngineConfig::default());
    }

    #[test]
    fn partial_documents_keep_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{ "history_limit": 4, "exit_cell": [9, 9], "policy": { "enabled": true } }"#,
        )
        .unwrap();
        assert_eq!(config.history_limit, 4);
        assert_eq!(config.exit_index(), Some(99));
        assert!(config.policy.enabled);
        assert_eq!(config.policy.path, "/get_action");
        assert_eq!(config.step_interval_secs, 0.35);
        assert_eq!(config.max_steps_per_command, 1000);
    }

    #[test]
    fn exit_cell_off_board_is_disabled() {
        let config = EngineConfig {
            exit_cell: Some([10, 0]),
            ..EngineConfig::default()
        };
        assert_eq!(config.exit_index(), None);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = EngineConfig::from_file(Path::new("/nonexistent/engine.json")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFailed { .. }));
    }
}
