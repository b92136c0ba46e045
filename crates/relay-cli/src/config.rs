//! Configuration loading from `~/.relay/config.toml`.

use relay_types::config::RelayConfig;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Load configuration from disk, falling back to defaults.
pub fn load_config(path: Option<&Path>) -> RelayConfig {
    let config_path = path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(default_config_path);

    if !config_path.exists() {
        info!(
            path = %config_path.display(),
            "Config file not found, using defaults"
        );
        return RelayConfig::default();
    }

    match std::fs::read_to_string(&config_path) {
        Ok(contents) => match toml::from_str::<RelayConfig>(&contents) {
            Ok(config) => {
                info!(path = %config_path.display(), "Loaded configuration");
                config
            }
            Err(e) => {
                warn!(
                    error = %e,
                    path = %config_path.display(),
                    "Failed to parse config, using defaults"
                );
                RelayConfig::default()
            }
        },
        Err(e) => {
            warn!(
                error = %e,
                path = %config_path.display(),
                "Failed to read config file, using defaults"
            );
            RelayConfig::default()
        }
    }
}

/// Default config file path.
pub fn default_config_path() -> PathBuf {
    relay_home().join("config.toml")
}

/// Relay home directory.
pub fn relay_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".relay")
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_types::config::{BackoffConfig, RoleConfig, WorkerConfig};
    use std::io::Write;

    #[test]
    fn test_load_config_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join("missing.toml")));
        assert_eq!(config.broker.listen_addr.port(), 8765);
        assert_eq!(config.agent.broker_url, "ws://127.0.0.1:8765");
        assert!(config.agent.role.is_none());
    }

    #[test]
    fn test_load_config_full() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[broker]
listen_addr = "0.0.0.0:9000"
ping_interval_secs = 5

[agent]
broker_url = "ws://10.0.0.2:9000"
name = "planner"

[agent.role]
kind = "responder"
downstream = "reviewer"
fallback = "user"

[agent.backoff]
kind = "exponential"
min_delay_ms = 100
max_delay_ms = 5000

[agent.worker]
kind = "command"
program = "python3"
args = ["planner.py"]
"#
        )
        .unwrap();

        let config = load_config(Some(file.path()));
        assert_eq!(config.broker.listen_addr.port(), 9000);
        assert_eq!(config.broker.ping_interval_secs, 5);
        assert_eq!(config.broker.ping_timeout_secs, 60);
        assert_eq!(config.agent.name.as_deref(), Some("planner"));
        assert_eq!(
            config.agent.role,
            Some(RoleConfig::Responder {
                downstream: "reviewer".to_string(),
                fallback: "user".to_string(),
            })
        );
        assert_eq!(
            config.agent.backoff,
            BackoffConfig::Exponential {
                min_delay_ms: 100,
                max_delay_ms: 5000,
            }
        );
        assert!(matches!(
            config.agent.worker,
            WorkerConfig::Command { ref program, timeout_secs: 120, .. } if program == "python3"
        ));
    }

    #[test]
    fn test_load_config_invalid_falls_back() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[broker\nlisten_addr = ").unwrap();
        let config = load_config(Some(file.path()));
        assert_eq!(config.broker.listen_addr.port(), 8765);
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with(".relay/config.toml"));
    }
}
