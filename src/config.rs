//! Application-level configuration loading.

use std::{collections::HashSet, env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, DurationSeconds, serde_as};
use tracing::{info, warn};

use crate::{
    dto::overlay::OverlayPosition,
    engine::{depot::DepotConfig, grace::GraceSettings, score::ScoreRules},
};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "GRACE_TRAIN_CONFIG_PATH";
/// Environment variable providing the Depot bearer token when the file does not.
const DEPOT_TOKEN_ENV: &str = "DEPOT_TOKEN";

/// Immutable runtime configuration shared across the application.
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Buffered events needed before a train starts.
    pub min_train_length: usize,
    /// Events a train needs before it can have a top gracer.
    pub top_gracer_min_events: u32,
    /// Distinct participants a train needs before it can have a top gracer.
    pub top_gracer_min_participants: usize,
    /// User ids that earn the fixed bonus.
    pub special_accounts: HashSet<String>,
    /// Overlay position at startup.
    pub overlay_position: OverlayPosition,
    /// Period of the overlay heartbeat.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "heartbeat_interval_secs")]
    pub heartbeat_interval: Duration,
    /// Chance in `[0, 1]` that a new train gets the easter egg flag.
    pub easter_egg_chance: f64,
    /// Subscription points worth one sub.
    pub sub_points_per_sub: u64,
    /// Depot service settings.
    pub depot: DepotSection,
    /// JSON file used when no CouchDB store is configured.
    pub records_path: PathBuf,
}

/// `depot` section of the configuration file.
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DepotSection {
    /// Base URL of the Depot; absent means every car falls back to a solid color.
    pub base_url: Option<String>,
    /// Bearer token.
    pub token: Option<String>,
    /// Transport timeout of a single attempt.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "timeout_ms")]
    pub timeout: Duration,
}

impl Default for DepotSection {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            timeout: Duration::from_millis(5000),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            min_train_length: 5,
            top_gracer_min_events: 15,
            top_gracer_min_participants: 4,
            special_accounts: HashSet::new(),
            overlay_position: OverlayPosition::Bottom,
            heartbeat_interval: Duration::from_secs(30),
            easter_egg_chance: 0.01,
            sub_points_per_sub: 500,
            depot: DepotSection::default(),
            records_path: PathBuf::from("data/records.json"),
        }
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let mut config = match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(config) => {
                    info!(path = %path.display(), "loaded configuration");
                    config
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
        };

        if config.depot.token.is_none() {
            config.depot.token = env::var(DEPOT_TOKEN_ENV).ok().filter(|t| !t.is_empty());
        }
        config
    }

    /// Parse a configuration document; absent fields take their defaults.
    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        let mut config: Self = serde_json::from_str(contents)?;
        if !(0.0..=1.0).contains(&config.easter_egg_chance) {
            warn!(
                chance = config.easter_egg_chance,
                "easter egg chance outside [0, 1]; clamping"
            );
            config.easter_egg_chance = config.easter_egg_chance.clamp(0.0, 1.0);
        }
        Ok(config)
    }

    /// State machine tunables derived from this configuration.
    pub fn grace_settings(&self) -> GraceSettings {
        GraceSettings {
            min_train_length: self.min_train_length,
            top_gracer_min_events: self.top_gracer_min_events,
            top_gracer_min_participants: self.top_gracer_min_participants,
            easter_egg_chance: self.easter_egg_chance,
            score_rules: ScoreRules {
                special_accounts: self.special_accounts.clone(),
            },
        }
    }

    /// Depot client settings derived from this configuration.
    pub fn depot_config(&self) -> DepotConfig {
        DepotConfig {
            base_url: self.depot.base_url.clone(),
            token: self.depot.token.clone(),
            timeout: self.depot.timeout,
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
    fn empty_document_yields_defaults() {
        let config = AppConfig::from_json("{}").unwrap();
        assert_eq!(config.min_train_length, 5);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.depot.timeout, Duration::from_millis(5000));
        assert_eq!(config.overlay_position, OverlayPosition::Bottom);
    }

    #[test]
    fn partial_document_overrides_only_given_fields() {
        let config = AppConfig::from_json(
            r#"{
                "min_train_length": 3,
                "special_accounts": ["1234"],
                "overlay_position": "top",
                "depot": { "base_url": "http://depot.local", "timeout_ms": 250 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.min_train_length, 3);
        assert!(config.special_accounts.contains("1234"));
        assert_eq!(config.overlay_position, OverlayPosition::Top);
        assert_eq!(config.depot.base_url.as_deref(), Some("http://depot.local"));
        assert_eq!(config.depot.timeout, Duration::from_millis(250));
        assert_eq!(config.top_gracer_min_events, 15);
    }

    #[test]
    fn easter_egg_chance_is_clamped() {
        let config = AppConfig::from_json(r#"{ "easter_egg_chance": 3.5 }"#).unwrap();
        assert_eq!(config.easter_egg_chance, 1.0);
    }
}
