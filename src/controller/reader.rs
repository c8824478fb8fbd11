//! Pulls raw values through the hub and normalises them into snapshots.
//!
//! Nothing here fails: a hub error, an unavailable sensor or a non-numeric
//! reading all become `None` before they reach the demand model.

use serde_json::Value;
use tracing::{info, warn};

use crate::config::Config;
use crate::domain::{
    attribute_as_f64, percent_from_f64, round_to_tenth, Hub, HubValue, OccupancyKind,
    OccupancySensor, Percent, RoomConfig, RoomSnapshot, SystemSnapshot, BRIGHTNESS,
    FAN_PERCENTAGE, VALVE_POSITION,
};

/// Read every configured room, then the shared fan.
pub async fn read_system(hub: &dyn Hub, config: &Config) -> SystemSnapshot {
    let mut rooms = Vec::with_capacity(config.rooms.len());
    for room in &config.rooms {
        rooms.push(read_room(hub, room).await);
    }
    let fan_speed = read_fan_speed(hub, &config.fan.entity_id).await;
    info!(fan_speed = ?fan_speed, "current fan speed");
    SystemSnapshot::new(fan_speed, rooms)
}

pub async fn read_room(hub: &dyn Hub, room: &RoomConfig) -> RoomSnapshot {
    let humidity = read_number(hub, &room.humidity_sensor).await.map(round_to_tenth);

    let co2 = match &room.co2_sensor {
        Some(sensor) => read_number(hub, sensor).await.map(f64::round),
        None => None,
    };

    let occupied = match &room.occupancy {
        Some(sensor) => read_occupancy(hub, sensor).await,
        None => false,
    };

    let valve_position = read_percent_attribute(hub, &room.valve_entity, VALVE_POSITION).await;

    info!(
        room = %room.key,
        humidity = ?humidity,
        co2 = ?co2,
        occupied,
        valve_position = ?valve_position,
        "room conditions"
    );

    RoomSnapshot {
        key: room.key.clone(),
        humidity,
        co2,
        occupied,
        valve_position,
        demand: 0,
    }
}

pub async fn read_fan_speed(hub: &dyn Hub, entity_id: &str) -> Option<Percent> {
    read_percent_attribute(hub, entity_id, FAN_PERCENTAGE).await
}

async fn read_occupancy(hub: &dyn Hub, sensor: &OccupancySensor) -> bool {
    match sensor.kind {
        OccupancyKind::Brightness => read_attribute(hub, &sensor.entity_id, BRIGHTNESS)
            .await
            .as_ref()
            .and_then(attribute_as_f64)
            .is_some_and(|brightness| brightness > 0.0),
        OccupancyKind::State => read_value(hub, &sensor.entity_id)
            .await
            .is_some_and(|v| v.is_on()),
    }
}

async fn read_number(hub: &dyn Hub, entity_id: &str) -> Option<f64> {
    let value = read_value(hub, entity_id).await?;
    let number = value.as_f64();
    if number.is_none() {
        warn!(entity_id, value = ?value, "non-numeric sensor state ignored");
    }
    number
}

async fn read_percent_attribute(hub: &dyn Hub, entity_id: &str, attribute: &str) -> Option<Percent> {
    read_attribute(hub, entity_id, attribute)
        .await
        .as_ref()
        .and_then(attribute_as_f64)
        .and_then(percent_from_f64)
}

async fn read_value(hub: &dyn Hub, entity_id: &str) -> Option<HubValue> {
    match hub.get_value(entity_id).await {
        Ok(value) => value,
        Err(e) => {
            warn!(entity_id, error = %e, "sensor read failed, treating as unavailable");
            None
        }
    }
}

async fn read_attribute(hub: &dyn Hub, entity_id: &str, attribute: &str) -> Option<Value> {
    match hub.get_attribute(entity_id, attribute).await {
        Ok(value) => value,
        Err(e) => {
            warn!(entity_id, attribute, error = %e, "attribute read failed, treating as unavailable");
            None
        }
    }
}
