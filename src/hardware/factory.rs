use std::sync::Arc;

use crate::config::{Config, HubMode};
use crate::domain::{
    Hub, HubError, OccupancyKind, SimulatedHub, BRIGHTNESS, FAN_PERCENTAGE, VALVE_POSITION,
};

use super::HomeAssistantHub;

/// Factory for the hub implementation selected in configuration
pub struct HubFactory<'a> {
    config: &'a Config,
}

impl<'a> HubFactory<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    pub fn create(&self) -> Result<Arc<dyn Hub>, HubError> {
        match self.config.hub.mode {
            HubMode::HomeAssistant => {
                tracing::info!(url = %self.config.hub.url, "using Home Assistant hub");
                Ok(Arc::new(HomeAssistantHub::new(
                    self.config.hub.url.clone(),
                    &self.config.hub.token,
                    self.config.hub.timeout(),
                )?))
            }
            HubMode::Simulated => {
                tracing::warn!("using simulated hub, no real actuators will move");
                Ok(Arc::new(self.simulated()))
            }
        }
    }

    /// A simulated hub seeded with calm conditions: fan at minimum, valves at default.
    pub fn simulated(&self) -> SimulatedHub {
        let mut hub = SimulatedHub::new().with_attribute(
            &self.config.fan.entity_id,
            FAN_PERCENTAGE,
            self.config.fan.min_speed,
        );
        for room in &self.config.rooms {
            hub = hub
                .with_state(&room.humidity_sensor, "50.0")
                .with_attribute(&room.valve_entity, VALVE_POSITION, room.default_valve_position);
            if let Some(co2) = &room.co2_sensor {
                hub = hub.with_state(co2, "450");
            }
            if let Some(presence) = &room.occupancy {
                hub = hub.with_state(&presence.entity_id, "off");
                if presence.kind == OccupancyKind::Brightness {
                    hub = hub.with_attribute(&presence.entity_id, BRIGHTNESS, 0);
                }
            }
        }
        hub
    }
}

/// Create the configured hub.
pub fn create_hub(config: &Config) -> Result<Arc<dyn Hub>, HubError> {
    HubFactory::new(config).create()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ControllerConfig, FanConfig, HubConfig};
    use crate::domain::{DemandCurve, RoomConfig};

    fn config(mode: HubMode) -> Config {
        Config {
            hub: HubConfig {
                mode,
                token: "secret".into(),
                ..Default::default()
            },
            controller: ControllerConfig::default(),
            fan: FanConfig {
                entity_id: "fan.main".into(),
                min_speed: 30,
                high_speed: 100,
            },
            rooms: vec![RoomConfig::new(
                "bathroom",
                "valve.bathroom",
                "sensor.bathroom_humidity",
                DemandCurve::step(70.0).unwrap(),
                DemandCurve::linear(600.0, 1500.0).unwrap(),
            )
            .with_occupancy("light.spots", None)],
        }
    }

    #[tokio::test]
    async fn test_factory_creates_seeded_simulated_hub() {
        let hub = create_hub(&config(HubMode::Simulated)).unwrap();

        let fan = hub.get_attribute("fan.main", FAN_PERCENTAGE).await.unwrap();
        assert_eq!(fan, Some(serde_json::json!(30)));
        let valve = hub.get_attribute("valve.bathroom", VALVE_POSITION).await.unwrap();
        assert_eq!(valve, Some(serde_json::json!(10)));
        let humidity = hub.get_value("sensor.bathroom_humidity").await.unwrap();
        assert_eq!(humidity.and_then(|v| v.as_f64()), Some(50.0));
    }

    #[test]
    fn test_factory_creates_home_assistant_hub() {
        assert!(create_hub(&config(HubMode::HomeAssistant)).is_ok());
    }
}
