use serde::Serialize;

use super::types::Percent;

/// One room as observed (or planned) in a single cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RoomSnapshot {
    pub key: String,
    /// Relative humidity in %, one decimal.
    pub humidity: Option<f64>,
    /// CO2 in ppm, whole numbers.
    pub co2: Option<f64>,
    pub occupied: bool,
    /// `None` when the hub could not report the valve position.
    pub valve_position: Option<Percent>,
    pub demand: Percent,
}

impl RoomSnapshot {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    pub fn with_humidity(mut self, humidity: f64) -> Self {
        self.humidity = Some(humidity);
        self
    }

    pub fn with_co2(mut self, co2: f64) -> Self {
        self.co2 = Some(co2);
        self
    }

    pub fn with_occupied(mut self, occupied: bool) -> Self {
        self.occupied = occupied;
        self
    }

    pub fn with_valve_position(mut self, position: Percent) -> Self {
        self.valve_position = Some(position);
        self
    }

    pub fn with_demand(mut self, demand: Percent) -> Self {
        self.demand = demand;
        self
    }
}

/// Fan plus every room, in configuration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SystemSnapshot {
    /// `None` when the hub could not report the fan percentage.
    pub fan_speed: Option<Percent>,
    pub rooms: Vec<RoomSnapshot>,
}

impl SystemSnapshot {
    pub fn new(fan_speed: Option<Percent>, rooms: Vec<RoomSnapshot>) -> Self {
        Self { fan_speed, rooms }
    }

    pub fn room(&self, key: &str) -> Option<&RoomSnapshot> {
        self.rooms.iter().find(|r| r.key == key)
    }

    /// The first room holding the highest demand, with that demand.
    ///
    /// Ties resolve to the earliest room in iteration order.
    pub fn max_demand_room(&self) -> Option<(&str, Percent)> {
        let mut best: Option<&RoomSnapshot> = None;
        for room in &self.rooms {
            if best.map_or(true, |b| room.demand > b.demand) {
                best = Some(room);
            }
        }
        best.map(|r| (r.key.as_str(), r.demand))
    }
}
