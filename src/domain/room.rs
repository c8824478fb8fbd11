use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::curve::DemandCurve;
use super::types::Percent;

/// How occupancy is read from a presence entity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OccupancyKind {
    /// `brightness` attribute above zero means occupied (lights used as presence).
    Brightness,
    /// Entity state equal to `"on"` means occupied.
    State,
}

impl OccupancyKind {
    /// Lights report presence through brightness, everything else through state.
    pub fn infer(entity_id: &str) -> Self {
        if entity_id.starts_with("light.") {
            Self::Brightness
        } else {
            Self::State
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OccupancySensor {
    pub entity_id: String,
    pub kind: OccupancyKind,
}

/// Immutable per-room configuration with curves already resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomConfig {
    pub key: String,
    pub name: String,
    pub valve_entity: String,
    pub humidity_sensor: String,
    pub co2_sensor: Option<String>,
    pub occupancy: Option<OccupancySensor>,
    pub humidity_curve: DemandCurve,
    pub co2_curve: DemandCurve,
    /// Valve opening when the room has no demand (usually a small leak, not closed).
    pub default_valve_position: Percent,
    /// Do not ventilate while someone is in the room.
    pub skip_when_occupied: bool,
}

impl RoomConfig {
    pub fn new(
        key: impl Into<String>,
        valve_entity: impl Into<String>,
        humidity_sensor: impl Into<String>,
        humidity_curve: DemandCurve,
        co2_curve: DemandCurve,
    ) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            key,
            valve_entity: valve_entity.into(),
            humidity_sensor: humidity_sensor.into(),
            co2_sensor: None,
            occupancy: None,
            humidity_curve,
            co2_curve,
            default_valve_position: 10,
            skip_when_occupied: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_co2_sensor(mut self, entity_id: impl Into<String>) -> Self {
        self.co2_sensor = Some(entity_id.into());
        self
    }

    /// Attach a presence entity; the read strategy is inferred when `kind` is `None`.
    pub fn with_occupancy(mut self, entity_id: impl Into<String>, kind: Option<OccupancyKind>) -> Self {
        let entity_id = entity_id.into();
        let kind = kind.unwrap_or_else(|| OccupancyKind::infer(&entity_id));
        self.occupancy = Some(OccupancySensor { entity_id, kind });
        self
    }

    pub fn with_humidity_curve(mut self, curve: DemandCurve) -> Self {
        self.humidity_curve = curve;
        self
    }

    pub fn with_co2_curve(mut self, curve: DemandCurve) -> Self {
        self.co2_curve = curve;
        self
    }

    pub fn with_default_valve_position(mut self, position: Percent) -> Self {
        self.default_valve_position = position;
        self
    }

    pub fn with_skip_when_occupied(mut self, skip: bool) -> Self {
        self.skip_when_occupied = skip;
        self
    }

    /// Score both signals independently with this room's own curves.
    pub fn demand(&self, humidity: Option<f64>, co2: Option<f64>) -> RoomDemand {
        RoomDemand {
            humidity: self.humidity_curve.score(humidity),
            co2: self.co2_curve.score(co2),
        }
    }

    /// Whether occupancy currently suppresses this room's ventilation.
    pub fn suppressed_by(&self, occupied: bool) -> bool {
        occupied && self.skip_when_occupied
    }
}

/// Per-signal demand for a single room.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RoomDemand {
    pub humidity: Percent,
    pub co2: Percent,
}

impl RoomDemand {
    /// The worse of the two signals drives the room; they are not summed.
    pub fn total(&self) -> Percent {
        self.humidity.max(self.co2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bathroom() -> RoomConfig {
        RoomConfig::new(
            "bathroom",
            "valve.bathroom",
            "sensor.bathroom_humidity",
            DemandCurve::step(65.0).unwrap(),
            DemandCurve::linear(600.0, 1500.0).unwrap(),
        )
    }

    #[test]
    fn test_occupancy_kind_inference() {
        assert_eq!(OccupancyKind::infer("light.spots_badkamer"), OccupancyKind::Brightness);
        assert_eq!(OccupancyKind::infer("input_boolean.shower"), OccupancyKind::State);
        assert_eq!(OccupancyKind::infer("binary_sensor.motion"), OccupancyKind::State);
    }

    #[test]
    fn test_explicit_occupancy_kind_wins() {
        let room = bathroom().with_occupancy("light.mirror", Some(OccupancyKind::State));
        assert_eq!(room.occupancy.unwrap().kind, OccupancyKind::State);
    }

    #[test]
    fn test_room_demand_takes_worse_signal() {
        let room = bathroom().with_co2_sensor("sensor.bathroom_co2");
        let demand = room.demand(Some(55.0), Some(1050.0));
        assert_eq!(demand, RoomDemand { humidity: 0, co2: 50 });
        assert_eq!(demand.total(), 50);

        let demand = room.demand(Some(75.0), Some(1050.0));
        assert_eq!(demand.total(), 100);
    }

    #[test]
    fn test_missing_readings_score_zero() {
        assert_eq!(bathroom().demand(None, None).total(), 0);
    }

    #[test]
    fn test_suppressed_only_when_flag_and_occupied() {
        let room = bathroom();
        assert!(!room.suppressed_by(true));
        let room = room.with_skip_when_occupied(true);
        assert!(room.suppressed_by(true));
        assert!(!room.suppressed_by(false));
    }

    #[test]
    fn test_name_defaults_to_key() {
        assert_eq!(bathroom().name, "bathroom");
        assert_eq!(bathroom().with_name("Bathroom").name, "Bathroom");
    }
}
