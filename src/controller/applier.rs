//! Pushes the plan to the hub, writing only what actually changed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::domain::{Hub, Percent, SystemSnapshot};

use super::valves::ValveReason;
use super::VentilationPlan;

#[derive(Debug, Clone, Serialize)]
pub struct FanReport {
    pub before: Option<Percent>,
    pub after: Percent,
    pub total_points: u32,
}

impl FanReport {
    pub fn changed(&self) -> bool {
        self.before != Some(self.after)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomReport {
    pub key: String,
    pub name: String,
    pub demand: Percent,
    pub valve_before: Option<Percent>,
    pub valve_after: Percent,
    pub reason: ValveReason,
}

impl RoomReport {
    pub fn changed(&self) -> bool {
        self.valve_before != Some(self.valve_after)
    }
}

/// State overview of one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub fan: FanReport,
    pub rooms: Vec<RoomReport>,
    pub writes_issued: usize,
    pub writes_failed: usize,
    pub completed_at: DateTime<Utc>,
}

impl CycleReport {
    pub fn changed(&self) -> bool {
        self.writes_issued > 0
    }

    pub fn log(&self) {
        info!(
            fan_before = ?self.fan.before,
            fan_after = self.fan.after,
            fan_changed = self.fan.changed(),
            total_points = self.fan.total_points,
            writes_issued = self.writes_issued,
            writes_failed = self.writes_failed,
            "state overview"
        );
        for room in &self.rooms {
            info!(
                room = %room.key,
                name = %room.name,
                demand = room.demand,
                valve_before = ?room.valve_before,
                valve_after = room.valve_after,
                changed = room.changed(),
                reason = %room.reason,
                "state overview room"
            );
        }
    }
}

#[derive(Default)]
struct WriteTally {
    issued: usize,
    failed: usize,
}

impl WriteTally {
    fn record<E: std::fmt::Display>(&mut self, entity_id: &str, result: Result<(), E>) {
        self.issued += 1;
        if let Err(e) = result {
            self.failed += 1;
            warn!(entity_id, error = %e, "actuator write failed, next cycle will retry");
        }
    }
}

/// Diff `plan` against `current` and issue only the writes that differ.
///
/// Failed writes are logged and counted, never retried here.
pub async fn apply(hub: &dyn Hub, config: &Config, current: &SystemSnapshot, plan: &VentilationPlan) -> CycleReport {
    info!("applying ventilation state");
    let mut tally = WriteTally::default();

    let fan = FanReport {
        before: current.fan_speed,
        after: plan.fan.fan_speed,
        total_points: plan.fan.total_points,
    };
    if fan.changed() {
        info!(from = ?fan.before, to = fan.after, "fan speed change");
        let result = hub.set_fan_speed(&config.fan.entity_id, fan.after).await;
        tally.record(&config.fan.entity_id, result);
    }

    let mut rooms = Vec::with_capacity(plan.valves.len());
    for (key, target) in &plan.valves {
        let Some(room_config) = config.room(key) else {
            warn!(room = %key, "planned room missing from configuration, skipped");
            continue;
        };
        let report = RoomReport {
            key: key.clone(),
            name: room_config.name.clone(),
            demand: plan.target.room(key).map_or(0, |r| r.demand),
            valve_before: current.room(key).and_then(|r| r.valve_position),
            valve_after: target.position,
            reason: target.reason,
        };
        if report.changed() {
            info!(
                room = %key,
                from = ?report.valve_before,
                to = report.valve_after,
                "valve position change"
            );
            let result = hub
                .set_valve_position(&room_config.valve_entity, report.valve_after)
                .await;
            tally.record(&room_config.valve_entity, result);
        }
        rooms.push(report);
    }

    if tally.issued > 0 {
        info!(writes = tally.issued, failed = tally.failed, "applied changes");
    } else {
        info!("no changes needed");
    }

    CycleReport {
        fan,
        rooms,
        writes_issued: tally.issued,
        writes_failed: tally.failed,
        completed_at: Utc::now(),
    }
}
