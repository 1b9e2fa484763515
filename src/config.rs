//! Logger configuration
//!
//! Loaded from a TOML file; every field has a default so a partial file (or
//! no file at all) works. Example:
//!
//! ```toml
//! [session]
//! episode_id = "kitchen_run_01"
//! log_directory = "SemLog"
//! start = { mode = "after_delay", delay = 1.5 }
//!
//! [furniture]
//! poll_interval = 0.25
//! drawer = { open = 15.0, closed = 2.0 }
//!
//! [world_state]
//! enabled = true
//! sink = { kind = "sqlite", path = "SemLog/world_state.db" }
//!
//! [knowrob]
//! enabled = false
//! ```

use bevy::log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::error::ConfigError;

/// Path of the config file read by the replay tool when none is given
pub const CONFIG_FILE: &str = "config/semlog.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SemLogConfig {
    pub session: SessionConfig,
    pub furniture: FurnitureConfig,
    pub world_state: WorldStateConfig,
    pub knowrob: KnowRobConfig,
}

/// When the session starts logging
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StartMode {
    /// As soon as the session is created
    #[default]
    AtBeginPlay,
    /// On the first tick after creation
    AtNextTick,
    /// After a delay (seconds of episode time)
    AfterDelay { delay: f64 },
    /// Only when `SemLogSession::start` is called
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Episode tag; generated when empty
    pub episode_id: String,
    /// Namespace prefix of all individuals
    pub namespace: String,
    /// Where documents are written at finish (nothing is written when unset)
    pub log_directory: Option<PathBuf>,
    pub start: StartMode,
    /// Also write the per-participant HTML timeline
    pub write_timelines: bool,
    /// Also write the document as JSON next to the OWL file
    pub write_json: bool,
    /// Use counter-based event ids instead of random ones (reproducible output)
    pub sequential_ids: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            episode_id: String::new(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            log_directory: Some(PathBuf::from(DEFAULT_LOG_DIR)),
            start: StartMode::default(),
            write_timelines: true,
            write_json: false,
            sequential_ids: false,
        }
    }
}

/// Offset bands used to classify furniture state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandThresholds {
    /// Offsets strictly above this are `Open`
    pub open: f32,
    /// Offsets at or below this are `Closed`
    pub closed: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FurnitureConfig {
    /// Classification period (seconds)
    pub poll_interval: f64,
    /// Linear offset bands (cm from the initial location)
    pub drawer: BandThresholds,
    /// Angular offset bands (degrees from the closed angle)
    pub door: BandThresholds,
    /// Push open furniture closed after `close_delay`
    pub auto_close: bool,
    pub close_delay: f64,
    pub close_impulse: f32,
}

impl Default for FurnitureConfig {
    fn default() -> Self {
        Self {
            poll_interval: FURNITURE_POLL_INTERVAL,
            drawer: BandThresholds {
                open: DRAWER_OPEN_THRESHOLD,
                closed: DRAWER_CLOSED_THRESHOLD,
            },
            door: BandThresholds {
                open: DOOR_OPEN_THRESHOLD,
                closed: DOOR_CLOSED_THRESHOLD,
            },
            auto_close: false,
            close_delay: FURNITURE_CLOSE_DELAY,
            close_impulse: FURNITURE_CLOSE_IMPULSE,
        }
    }
}

/// Where world state records go
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorldStateSinkConfig {
    /// Keep records in memory (tests, embedding hosts)
    #[default]
    Memory,
    /// One JSON record per line
    JsonLines { path: PathBuf },
    /// SQLite database, one row per record
    Sqlite { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldStateConfig {
    pub enabled: bool,
    /// Minimum movement before an entity is written again
    pub linear_threshold: f32,
    /// Minimum rotation (radians) before an entity is written again
    pub angular_threshold: f32,
    /// Sampling period in seconds (0 = every tick)
    pub update_rate: f64,
    pub sink: WorldStateSinkConfig,
}

impl Default for WorldStateConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            linear_threshold: WORLD_STATE_LINEAR_THRESHOLD,
            angular_threshold: WORLD_STATE_ANGULAR_THRESHOLD,
            update_rate: WORLD_STATE_UPDATE_RATE,
            sink: WorldStateSinkConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowRobConfig {
    pub enabled: bool,
    /// Host including scheme, e.g. `http://127.0.0.1`
    pub host: String,
    pub port: u16,
    /// Name of the player, sent with every request
    pub game_participant: String,
    /// Send `parent_action_iri`/`additional_event_info` instead of
    /// `parent_action_id`/`additional_info`, as the KnowRob server reads them
    pub iri_keys: bool,
}

impl Default for KnowRobConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::new(),
            port: KNOWROB_DEFAULT_PORT,
            game_participant: String::new(),
            iri_keys: false,
        }
    }
}

impl KnowRobConfig {
    /// Base URL of the REST API (ends with a slash)
    pub fn base_url(&self) -> String {
        format!(
            "{}:{}{}",
            self.host.trim_end_matches('/'),
            self.port,
            KNOWROB_API_PATH
        )
    }
}

impl SemLogConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        config.validate()?;
        info!("Loaded semlog config from {}", path.display());
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            info!("No {} found, using default semlog config", path.display());
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load {}: {}, using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    /// Reject configs that cannot initialize their subsystems
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.namespace.trim().is_empty() {
            return Err(ConfigError::MissingField("session.namespace"));
        }
        if let StartMode::AfterDelay { delay } = self.session.start
            && !(delay >= 0.0 && delay.is_finite())
        {
            return Err(ConfigError::InvalidValue {
                field: "session.start.delay",
                reason: format!("{} is not a non-negative duration", delay),
            });
        }

        let furniture = &self.furniture;
        if !(furniture.poll_interval > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "furniture.poll_interval",
                reason: "must be positive".to_string(),
            });
        }
        let bands = [
            ("furniture.drawer", furniture.drawer),
            ("furniture.door", furniture.door),
        ];
        for (field, bands) in bands {
            if bands.closed > bands.open {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: format!("closed ({}) is above open ({})", bands.closed, bands.open),
                });
            }
        }

        if self.world_state.enabled {
            if self.world_state.update_rate < 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: "world_state.update_rate",
                    reason: "must not be negative".to_string(),
                });
            }
            match &self.world_state.sink {
                WorldStateSinkConfig::JsonLines { path } | WorldStateSinkConfig::Sqlite { path }
                    if path.as_os_str().is_empty() =>
                {
                    return Err(ConfigError::MissingField("world_state.sink.path"));
                }
                _ => {}
            }
        }

        if self.knowrob.enabled && self.knowrob.host.trim().is_empty() {
            return Err(ConfigError::MissingField("knowrob.host"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SemLogConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session.namespace, "log");
        assert!(!config.world_state.enabled);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = SemLogConfig::from_toml_str(
            r#"
            [session]
            episode_id = "run42"
            start = { mode = "after_delay", delay = 1.5 }

            [furniture]
            drawer = { open = 10.0, closed = 1.0 }

            [world_state]
            enabled = true
            sink = { kind = "sqlite", path = "ws.db" }
            "#,
        )
        .unwrap();
        assert_eq!(config.session.episode_id, "run42");
        assert_eq!(config.session.start, StartMode::AfterDelay { delay: 1.5 });
        assert_eq!(config.furniture.drawer.open, 10.0);
        assert_eq!(config.furniture.door.open, DOOR_OPEN_THRESHOLD);
        assert_eq!(
            config.world_state.sink,
            WorldStateSinkConfig::Sqlite { path: PathBuf::from("ws.db") }
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_knowrob_requires_host() {
        let mut config = SemLogConfig::default();
        config.knowrob.enabled = true;
        assert!(matches!(config.validate(), Err(ConfigError::MissingField("knowrob.host"))));
        config.knowrob.host = "http://localhost/".to_string();
        assert!(config.validate().is_ok());
        assert_eq!(config.knowrob.base_url(), "http://localhost:62226/knowrob/api/v1.0/");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = SemLogConfig::default();
        config.furniture.poll_interval = 0.0;
        assert!(config.validate().is_err());

        let mut config = SemLogConfig::default();
        config.furniture.drawer = BandThresholds { open: 1.0, closed: 5.0 };
        assert!(config.validate().is_err());

        let mut config = SemLogConfig::default();
        config.session.namespace = "  ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::MissingField(_))));
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let shipped = SemLogConfig::from_toml_str(include_str!("../config/semlog.toml")).unwrap();
        assert!(shipped.validate().is_ok());
        assert_eq!(shipped.session, SessionConfig::default());
        assert_eq!(shipped.furniture, FurnitureConfig::default());
        assert!(!shipped.knowrob.enabled);
    }

    #[test]
    fn test_bad_toml_is_an_error() {
        assert!(matches!(
            SemLogConfig::from_toml_str("session = 3"),
            Err(ConfigError::Parse(_))
        ));
    }
}
