use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;

use super::types::Percent;

/// Hub-specific errors
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Communication error: {0}")]
    Transport(String),
    #[error("Hub returned HTTP {status} for {context}")]
    Status { status: u16, context: String },
    #[error("Could not decode hub response: {0}")]
    Decode(String),
    #[error("Entity not found: {0}")]
    NotFound(String),
    #[error("Invalid hub credentials: {0}")]
    Credentials(String),
    #[error("Write rejected for {0}")]
    Rejected(String),
}

/// A sensor state as reported by the hub.
#[derive(Debug, Clone, PartialEq)]
pub enum HubValue {
    Number(f64),
    Text(String),
}

impl HubValue {
    /// Parse a raw state string; "unavailable", "unknown" and "none" mean no value.
    pub fn from_state(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || ["unavailable", "unknown", "none"]
                .iter()
                .any(|s| trimmed.eq_ignore_ascii_case(s))
        {
            return None;
        }
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => Some(Self::Number(n)),
            _ => Some(Self::Text(trimmed.to_string())),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }

    pub fn is_on(&self) -> bool {
        matches!(self, Self::Text(s) if s == "on")
    }
}

/// Read a numeric attribute that may arrive as a JSON number or a numeric string.
pub fn attribute_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Port to the home-automation hub: sensor reads and actuator writes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Hub: Send + Sync {
    /// Current state of an entity; `Ok(None)` when unavailable or unknown.
    async fn get_value(&self, entity_id: &str) -> Result<Option<HubValue>, HubError>;
    /// A single attribute of an entity; `Ok(None)` when absent or null.
    async fn get_attribute(&self, entity_id: &str, attribute: &str)
        -> Result<Option<Value>, HubError>;
    async fn set_fan_speed(&self, entity_id: &str, percentage: Percent) -> Result<(), HubError>;
    async fn set_valve_position(&self, entity_id: &str, position: Percent)
        -> Result<(), HubError>;
}

/// Attribute the hub exposes for a fan's current speed.
pub const FAN_PERCENTAGE: &str = "percentage";
/// Attribute the hub exposes for a valve's current opening.
pub const VALVE_POSITION: &str = "current_position";
/// Attribute used by lights acting as presence sensors.
pub const BRIGHTNESS: &str = "brightness";

/// A write issued against the simulated hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum HubWrite {
    FanSpeed { entity_id: String, percentage: Percent },
    ValvePosition { entity_id: String, position: Percent },
}

#[derive(Debug, Clone, Default)]
struct SimulatedEntity {
    state: Option<String>,
    attributes: serde_json::Map<String, Value>,
}

/// In-memory hub for development and tests.
///
/// Writes update the matching attribute so a later read observes them, and
/// every write is recorded.
#[derive(Debug, Default)]
pub struct SimulatedHub {
    entities: RwLock<HashMap<String, SimulatedEntity>>,
    writes: RwLock<Vec<HubWrite>>,
    fail_writes: AtomicBool,
}

impl SimulatedHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(mut self, entity_id: &str, state: impl Into<String>) -> Self {
        self.entities
            .get_mut()
            .entry(entity_id.to_string())
            .or_default()
            .state = Some(state.into());
        self
    }

    pub fn with_attribute(mut self, entity_id: &str, attribute: &str, value: impl Into<Value>) -> Self {
        self.entities
            .get_mut()
            .entry(entity_id.to_string())
            .or_default()
            .attributes
            .insert(attribute.to_string(), value.into());
        self
    }

    pub async fn set_state(&self, entity_id: &str, state: impl Into<String>) {
        self.entities
            .write()
            .await
            .entry(entity_id.to_string())
            .or_default()
            .state = Some(state.into());
    }

    pub async fn set_attribute(&self, entity_id: &str, attribute: &str, value: impl Into<Value>) {
        self.entities
            .write()
            .await
            .entry(entity_id.to_string())
            .or_default()
            .attributes
            .insert(attribute.to_string(), value.into());
    }

    /// Make every subsequent write fail without touching state.
    pub fn set_write_failures(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn writes(&self) -> Vec<HubWrite> {
        self.writes.read().await.clone()
    }

    pub async fn clear_writes(&self) {
        self.writes.write().await.clear();
    }

    async fn record(&self, entity_id: &str, attribute: &str, value: Percent, write: HubWrite) -> Result<(), HubError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(HubError::Rejected(entity_id.to_string()));
        }
        self.set_attribute(entity_id, attribute, value).await;
        self.writes.write().await.push(write);
        Ok(())
    }
}

#[async_trait]
impl Hub for SimulatedHub {
    async fn get_value(&self, entity_id: &str) -> Result<Option<HubValue>, HubError> {
        let entities = self.entities.read().await;
        let entity = entities
            .get(entity_id)
            .ok_or_else(|| HubError::NotFound(entity_id.to_string()))?;
        Ok(entity.state.as_deref().and_then(HubValue::from_state))
    }

    async fn get_attribute(&self, entity_id: &str, attribute: &str) -> Result<Option<Value>, HubError> {
        let entities = self.entities.read().await;
        let entity = entities
            .get(entity_id)
            .ok_or_else(|| HubError::NotFound(entity_id.to_string()))?;
        Ok(entity.attributes.get(attribute).filter(|v| !v.is_null()).cloned())
    }

    async fn set_fan_speed(&self, entity_id: &str, percentage: Percent) -> Result<(), HubError> {
        let write = HubWrite::FanSpeed {
            entity_id: entity_id.to_string(),
            percentage,
        };
        self.record(entity_id, FAN_PERCENTAGE, percentage, write).await
    }

    async fn set_valve_position(&self, entity_id: &str, position: Percent) -> Result<(), HubError> {
        let write = HubWrite::ValvePosition {
            entity_id: entity_id.to_string(),
            position,
        };
        self.record(entity_id, VALVE_POSITION, position, write).await
    }
}
