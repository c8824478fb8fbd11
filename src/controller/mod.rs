pub mod applier;
pub mod demand;
pub mod reader;
pub mod valves;

use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::domain::{Hub, RoomConfig, RoomSnapshot, SystemSnapshot};

pub use applier::{CycleReport, FanReport, RoomReport};
pub use demand::{aggregate, effective_points, fan_speed_for_total, FanDecision, FanLimits};
pub use valves::{distribute, valve_target, ValveReason, ValveTarget};

/// Computed target for one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct VentilationPlan {
    /// Rooms with demand and target valve positions, fan at the target speed.
    pub target: SystemSnapshot,
    pub fan: FanDecision,
    pub valves: Vec<(String, ValveTarget)>,
}

/// Pair each snapshot room with its configuration; unknown rooms are dropped.
fn paired<'a>(
    config: &'a Config,
    rooms: &'a [RoomSnapshot],
) -> impl Iterator<Item = (&'a RoomConfig, &'a RoomSnapshot)> + 'a {
    rooms
        .iter()
        .filter_map(move |room| config.room(&room.key).map(|cfg| (cfg, room)))
}

/// Score every room, aggregate the fan speed and distribute the valves.
///
/// Pure with respect to `current`: the same snapshot always yields the same plan.
pub fn plan(config: &Config, current: &SystemSnapshot) -> VentilationPlan {
    info!("calculating required ventilation state");

    let mut rooms = Vec::with_capacity(current.rooms.len());
    for room in &current.rooms {
        let Some(room_config) = config.room(&room.key) else {
            warn!(room = %room.key, "room not in configuration, ignored");
            continue;
        };
        let demand = room_config.demand(room.humidity, room.co2);
        if demand.humidity > 0 {
            info!(
                room = %room.key,
                humidity = ?room.humidity,
                points = demand.humidity,
                curve = %room_config.humidity_curve,
                "humidity demand"
            );
        }
        if demand.co2 > 0 {
            info!(
                room = %room.key,
                co2 = ?room.co2,
                points = demand.co2,
                curve = %room_config.co2_curve,
                "co2 demand"
            );
        }
        if demand.total() > 0 {
            info!(
                room = %room.key,
                demand = demand.total(),
                humidity_points = demand.humidity,
                co2_points = demand.co2,
                "room demand"
            );
        }
        rooms.push(RoomSnapshot {
            demand: demand.total(),
            valve_position: None,
            ..room.clone()
        });
    }

    let fan = aggregate(paired(config, &rooms), FanLimits::from(&config.fan));

    let mut target = SystemSnapshot::new(Some(fan.fan_speed), rooms);
    let (max_room, max_points) = target
        .max_demand_room()
        .map(|(key, points)| (Some(key.to_string()), points))
        .unwrap_or((None, 0));
    let valves = distribute(paired(config, &target.rooms), max_room.as_deref(), max_points);

    for (key, valve) in &valves {
        if let Some(room) = target.rooms.iter_mut().find(|r| &r.key == key) {
            room.valve_position = Some(valve.position);
        }
    }

    VentilationPlan { target, fan, valves }
}

pub struct VentilationController {
    hub: Arc<dyn Hub>,
    config: Arc<Config>,
}

impl VentilationController {
    pub fn new(hub: Arc<dyn Hub>, config: Arc<Config>) -> Self {
        Self { hub, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn read_current_state(&self) -> SystemSnapshot {
        info!("fetching current conditions from hub");
        reader::read_system(self.hub.as_ref(), &self.config).await
    }

    pub fn calculate_required_state(&self, current: &SystemSnapshot) -> VentilationPlan {
        plan(&self.config, current)
    }

    pub async fn apply_state(&self, current: &SystemSnapshot, plan: &VentilationPlan) -> CycleReport {
        applier::apply(self.hub.as_ref(), &self.config, current, plan).await
    }

    /// Read, compute and apply once.
    pub async fn run_cycle(&self) -> CycleReport {
        let span = info_span!("cycle", cycle_id = %Uuid::new_v4());
        async {
            let current = self.read_current_state().await;
            let plan = self.calculate_required_state(&current);
            let report = self.apply_state(&current, &plan).await;
            report.log();
            info!("ventilation control cycle completed");
            report
        }
        .instrument(span)
        .await
    }

    /// Run a cycle every `tick_seconds` until the future is dropped.
    pub async fn run(&self, tick_seconds: u64) {
        let mut interval = tokio::time::interval(Duration::from_secs(tick_seconds.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let report = self.run_cycle().await;
            if report.writes_failed > 0 {
                warn!(
                    failed = report.writes_failed,
                    issued = report.writes_issued,
                    "cycle finished with failed writes"
                );
            }
        }
    }
}
