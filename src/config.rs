//! Application-level configuration loading: session lifetime, passcode cost,
//! room defaults and external collaborator endpoints.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    credentials::DEFAULT_PASSCODE_ITERATIONS,
    state::settings::{DEFAULT_TICKET_PREFIX, RoomSettings, default_estimate_options},
};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "ESTIMATION_ROOM_CONFIG_PATH";

const DEFAULT_SESSION_TTL_SECS: u64 = 6 * 60 * 60;
const DEFAULT_ROUND_HISTORY_LIMIT: usize = 50;
const DEFAULT_MAILBOX_CAPACITY: usize = 256;
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 10 * 60;
const DEFAULT_SESSION_SWEEP_SECS: u64 = 15 * 60;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Lifetime of a session token.
    pub session_ttl: Duration,
    /// PBKDF2 rounds for newly hashed passcodes.
    pub passcode_iterations: u32,
    /// Prefix of generated ticket ids for new rooms.
    pub default_ticket_prefix: String,
    /// Deck given to new rooms.
    pub default_estimate_options: Vec<String>,
    /// Rounds kept per room.
    pub round_history_limit: usize,
    /// Bounded mailbox size of each room actor.
    pub room_mailbox_capacity: usize,
    /// How long an unused room actor stays alive.
    pub idle_timeout: Duration,
    /// Period of the expired-session sweep.
    pub session_sweep_interval: Duration,
    /// HMAC secret for signed state; generated at startup when absent.
    pub state_secret: Option<String>,
    /// Endpoint of the external strudel code generator.
    pub strudel_endpoint: Option<String>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        session_ttl_secs = app_config.session_ttl.as_secs(),
                        strudel = app_config.strudel_endpoint.is_some(),
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Session lifetime in milliseconds, as compared against token timestamps.
    pub fn session_ttl_ms(&self) -> i64 {
        i64::try_from(self.session_ttl.as_millis()).unwrap_or(i64::MAX)
    }

    /// Settings a freshly initialized room starts from.
    pub fn default_room_settings(&self) -> RoomSettings {
        RoomSettings::with_defaults(
            self.default_estimate_options.clone(),
            self.default_ticket_prefix.clone(),
        )
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    session_ttl_secs: Option<u64>,
    passcode_iterations: Option<u32>,
    default_ticket_prefix: Option<String>,
    default_estimate_options: Option<Vec<String>>,
    round_history_limit: Option<usize>,
    room_mailbox_capacity: Option<usize>,
    idle_timeout_secs: Option<u64>,
    session_sweep_secs: Option<u64>,
    state_secret: Option<String>,
    strudel_endpoint: Option<String>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            session_ttl: Duration::from_secs(
                value.session_ttl_secs.unwrap_or(DEFAULT_SESSION_TTL_SECS),
            ),
            passcode_iterations: value
                .passcode_iterations
                .filter(|rounds| *rounds > 0)
                .unwrap_or(DEFAULT_PASSCODE_ITERATIONS),
            default_ticket_prefix: value
                .default_ticket_prefix
                .filter(|prefix| !prefix.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TICKET_PREFIX.to_string()),
            default_estimate_options: value
                .default_estimate_options
                .filter(|options| !options.is_empty())
                .unwrap_or_else(default_estimate_options),
            round_history_limit: value
                .round_history_limit
                .unwrap_or(DEFAULT_ROUND_HISTORY_LIMIT),
            room_mailbox_capacity: value
                .room_mailbox_capacity
                .filter(|capacity| *capacity > 0)
                .unwrap_or(DEFAULT_MAILBOX_CAPACITY),
            idle_timeout: Duration::from_secs(
                value.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS),
            ),
            session_sweep_interval: Duration::from_secs(
                value
                    .session_sweep_secs
                    .filter(|secs| *secs > 0)
                    .unwrap_or(DEFAULT_SESSION_SWEEP_SECS),
            ),
            state_secret: value.state_secret.filter(|secret| !secret.is_empty()),
            strudel_endpoint: value
                .strudel_endpoint
                .filter(|endpoint| !endpoint.trim().is_empty()),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.session_ttl, Duration::from_secs(21_600));
        assert_eq!(config.session_ttl_ms(), 21_600_000);
        assert_eq!(config.passcode_iterations, 100_000);
        assert_eq!(config.default_ticket_prefix, "TICKET");
        assert_eq!(config.round_history_limit, 50);
        assert_eq!(config.room_mailbox_capacity, 256);
        assert!(config.strudel_endpoint.is_none());
    }

    #[test]
    fn partial_file_overrides_selected_fields() {
        let raw: RawConfig = serde_json::from_str(
            r#"{"session_ttl_secs": 60, "default_ticket_prefix": "PROJ", "strudel_endpoint": ""}"#,
        )
        .unwrap();
        let config: AppConfig = raw.into();
        assert_eq!(config.session_ttl_ms(), 60_000);
        assert_eq!(config.default_room_settings().ticket_prefix, "PROJ");
        assert!(config.strudel_endpoint.is_none());
        assert_eq!(config.passcode_iterations, DEFAULT_PASSCODE_ITERATIONS);
    }
}
