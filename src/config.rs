use figment::{
    providers::{Env, Format, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use strum::Display;
use thiserror::Error;
use validator::Validate;

use crate::domain::{CurveError, CurveMode, DemandCurve, OccupancyKind, Percent, RoomConfig};

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),
    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
    #[error("no rooms configured")]
    NoRooms,
    #[error("duplicate room key '{0}'")]
    DuplicateRoom(String),
    #[error("{context}: unknown demand curve mode '{mode}' (expected 'step' or 'linear')")]
    UnknownCurveMode { context: String, mode: String },
    #[error("{context}: {source}")]
    Curve {
        context: String,
        #[source]
        source: CurveError,
    },
    #[error("fan.min_speed ({min}) exceeds fan.high_speed ({high})")]
    FanRange { min: Percent, high: Percent },
    #[error("hub.token must be set (VENT__HUB__TOKEN or HA_TOKEN) when hub.mode is home_assistant")]
    MissingToken,
}

/// Fully resolved, validated configuration. Read-only once loaded.
#[derive(Debug, Clone)]
pub struct Config {
    pub hub: HubConfig,
    pub controller: ControllerConfig,
    pub fan: FanConfig,
    pub rooms: Vec<RoomConfig>,
}

impl Config {
    /// Load from `VENT_CONFIG` (or the default path) plus environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("VENT_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let file = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Figment::new().merge(Yaml::file(path)),
            _ => Figment::new().merge(Toml::file(path)),
        };
        let figment = file
            .merge(Env::prefixed("VENT__").split("__"))
            .merge(legacy_env());
        Self::from_figment(figment)
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let raw: RawConfig = figment.extract()?;
        raw.resolve()
    }

    pub fn room(&self, key: &str) -> Option<&RoomConfig> {
        self.rooms.iter().find(|r| r.key == key)
    }
}

/// `HA_URL` / `HA_TOKEN` as used by older deployments.
fn legacy_env() -> Env {
    Env::raw().only(&["HA_URL", "HA_TOKEN"]).map(|key| {
        if key.as_str().eq_ignore_ascii_case("ha_url") {
            "hub.url".into()
        } else {
            "hub.token".into()
        }
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HubMode {
    #[default]
    HomeAssistant,
    Simulated,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct HubConfig {
    #[serde(default)]
    pub mode: HubMode,
    #[serde(default = "default_hub_url")]
    #[validate(length(min = 1))]
    pub url: String,
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_timeout_seconds")]
    #[validate(range(min = 1, max = 300))]
    pub timeout_seconds: u64,
}

impl HubConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            mode: HubMode::default(),
            url: default_hub_url(),
            token: String::new(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ControllerConfig {
    /// Seconds between cycles; 0 runs a single cycle and exits.
    #[serde(default)]
    pub tick_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct FanConfig {
    #[validate(length(min = 1))]
    pub entity_id: String,
    #[serde(default = "default_min_fan_speed")]
    #[validate(range(max = 100))]
    pub min_speed: Percent,
    #[serde(default = "default_high_fan_speed")]
    #[validate(range(max = 100))]
    pub high_speed: Percent,
}

/// A complete curve definition (global defaults).
#[derive(Debug, Clone, Deserialize)]
pub struct CurveConfig {
    pub mode: String,
    pub threshold: f64,
    pub max_value: Option<f64>,
}

/// Per-room curve override; unset fields fall back to the global curve.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CurveOverride {
    pub mode: Option<String>,
    pub threshold: Option<f64>,
    pub max_value: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DefaultsConfig {
    #[serde(default = "default_valve_position")]
    #[validate(range(max = 100))]
    pub valve_position: Percent,
    #[serde(default = "default_humidity_curve")]
    pub humidity: CurveConfig,
    #[serde(default = "default_co2_curve")]
    pub co2: CurveConfig,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            valve_position: default_valve_position(),
            humidity: default_humidity_curve(),
            co2: default_co2_curve(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RawRoomConfig {
    #[validate(length(min = 1))]
    pub key: String,
    pub name: Option<String>,
    #[validate(length(min = 1))]
    pub valve_entity: String,
    #[validate(length(min = 1))]
    pub humidity_sensor: String,
    pub co2_sensor: Option<String>,
    pub occupancy_sensor: Option<String>,
    pub occupancy_kind: Option<OccupancyKind>,
    #[serde(default)]
    pub humidity: CurveOverride,
    #[serde(default)]
    pub co2: CurveOverride,
    #[validate(range(max = 100))]
    pub default_valve_position: Option<Percent>,
    #[serde(default)]
    pub skip_when_occupied: bool,
}

/// Configuration as deserialized, before curve resolution.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RawConfig {
    #[serde(default)]
    #[validate(nested)]
    pub hub: HubConfig,
    #[serde(default)]
    #[validate(nested)]
    pub controller: ControllerConfig,
    #[validate(nested)]
    pub fan: FanConfig,
    #[serde(default)]
    #[validate(nested)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    #[validate(nested)]
    pub rooms: Vec<RawRoomConfig>,
}

impl RawConfig {
    /// Validate and resolve every room against the global defaults.
    pub fn resolve(self) -> Result<Config, ConfigError> {
        self.validate()?;

        if self.hub.mode == HubMode::HomeAssistant
            && (self.hub.token.trim().is_empty() || self.hub.token.starts_with("__SET_VIA_ENV"))
        {
            return Err(ConfigError::MissingToken);
        }
        if self.fan.min_speed > self.fan.high_speed {
            return Err(ConfigError::FanRange {
                min: self.fan.min_speed,
                high: self.fan.high_speed,
            });
        }
        if self.rooms.is_empty() {
            return Err(ConfigError::NoRooms);
        }

        let empty = CurveOverride::default();
        // the defaults must stand on their own, even if every room overrides them
        resolve_curve("defaults.humidity", &self.defaults.humidity, &empty)?;
        resolve_curve("defaults.co2", &self.defaults.co2, &empty)?;

        let mut seen = HashSet::new();
        let mut rooms = Vec::with_capacity(self.rooms.len());
        for raw in self.rooms {
            if !seen.insert(raw.key.clone()) {
                return Err(ConfigError::DuplicateRoom(raw.key));
            }
            rooms.push(resolve_room(raw, &self.defaults)?);
        }

        Ok(Config {
            hub: self.hub,
            controller: self.controller,
            fan: self.fan,
            rooms,
        })
    }
}

fn resolve_room(raw: RawRoomConfig, defaults: &DefaultsConfig) -> Result<RoomConfig, ConfigError> {
    let humidity_curve = resolve_curve(
        &format!("rooms.{}.humidity", raw.key),
        &defaults.humidity,
        &raw.humidity,
    )?;
    let co2_curve = resolve_curve(&format!("rooms.{}.co2", raw.key), &defaults.co2, &raw.co2)?;

    let mut room = RoomConfig::new(
        raw.key,
        raw.valve_entity,
        raw.humidity_sensor,
        humidity_curve,
        co2_curve,
    )
    .with_default_valve_position(raw.default_valve_position.unwrap_or(defaults.valve_position))
    .with_skip_when_occupied(raw.skip_when_occupied);

    if let Some(name) = raw.name {
        room = room.with_name(name);
    }
    if let Some(co2) = raw.co2_sensor.filter(|s| !s.is_empty()) {
        room = room.with_co2_sensor(co2);
    }
    if let Some(presence) = raw.occupancy_sensor.filter(|s| !s.is_empty()) {
        room = room.with_occupancy(presence, raw.occupancy_kind);
    }
    Ok(room)
}

fn resolve_curve(
    context: &str,
    global: &CurveConfig,
    over: &CurveOverride,
) -> Result<DemandCurve, ConfigError> {
    let mode_raw = over.mode.as_deref().unwrap_or(&global.mode);
    let mode = CurveMode::from_str(mode_raw).map_err(|_| ConfigError::UnknownCurveMode {
        context: context.to_string(),
        mode: mode_raw.to_string(),
    })?;
    let threshold = over.threshold.unwrap_or(global.threshold);
    let max_value = over.max_value.or(global.max_value);
    DemandCurve::new(mode, threshold, max_value).map_err(|source| ConfigError::Curve {
        context: context.to_string(),
        source,
    })
}

fn default_hub_url() -> String {
    "http://homeassistant.local:8123".to_string()
}

fn default_timeout_seconds() -> u64 {
    10
}

fn default_min_fan_speed() -> Percent {
    30
}

fn default_high_fan_speed() -> Percent {
    100
}

fn default_valve_position() -> Percent {
    10
}

fn default_humidity_curve() -> CurveConfig {
    CurveConfig {
        mode: "step".to_string(),
        threshold: 70.0,
        max_value: Some(85.0),
    }
}

fn default_co2_curve() -> CurveConfig {
    CurveConfig {
        mode: "linear".to_string(),
        threshold: 600.0,
        max_value: Some(1500.0),
    }
}
