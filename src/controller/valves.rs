//! Valve distribution: share airflow between rooms in proportion to demand.

use serde::Serialize;
use strum::Display;
use tracing::info;

use crate::domain::{round_to_nearest_ten, Percent, RoomConfig, RoomSnapshot, FULL};

/// Which rule decided a valve's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ValveReason {
    /// Room has no demand; default (leak) position.
    NoDemand,
    /// Room occupied with `skip_when_occupied`; default position to avoid a draft.
    OccupiedSkip,
    /// Nothing in the system has demand.
    NoSystemDemand,
    /// The room with the highest demand gets the full opening.
    HighestDemand,
    /// Share of the highest demand, snapped to 10 %.
    Proportional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ValveTarget {
    pub position: Percent,
    pub reason: ValveReason,
}

/// Target opening for one room; the first matching rule wins.
pub fn valve_target(
    config: &RoomConfig,
    room: &RoomSnapshot,
    max_room: Option<&str>,
    max_points: Percent,
) -> ValveTarget {
    let default = |reason| ValveTarget {
        position: config.default_valve_position,
        reason,
    };

    if room.demand == 0 {
        return default(ValveReason::NoDemand);
    }
    if config.suppressed_by(room.occupied) {
        return default(ValveReason::OccupiedSkip);
    }
    if max_points == 0 {
        return default(ValveReason::NoSystemDemand);
    }
    if max_room == Some(room.key.as_str()) {
        return ValveTarget {
            position: FULL,
            reason: ValveReason::HighestDemand,
        };
    }
    let share = 100.0 * f64::from(room.demand) / f64::from(max_points);
    ValveTarget {
        position: round_to_nearest_ten(share),
        reason: ValveReason::Proportional,
    }
}

/// Valve targets for every room, in iteration order.
pub fn distribute<'a, I>(rooms: I, max_room: Option<&str>, max_points: Percent) -> Vec<(String, ValveTarget)>
where
    I: IntoIterator<Item = (&'a RoomConfig, &'a RoomSnapshot)>,
{
    rooms
        .into_iter()
        .map(|(config, room)| {
            let target = valve_target(config, room, max_room, max_points);
            info!(
                room = %config.key,
                demand = room.demand,
                max_points,
                position = target.position,
                reason = %target.reason,
                "valve target"
            );
            (config.key.clone(), target)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DemandCurve;
    use rstest::rstest;

    fn room(key: &str) -> RoomConfig {
        RoomConfig::new(
            key,
            format!("valve.{key}"),
            format!("sensor.{key}_humidity"),
            DemandCurve::step(70.0).unwrap(),
            DemandCurve::linear(600.0, 1500.0).unwrap(),
        )
        .with_default_valve_position(20)
    }

    #[rstest]
    #[case(100, 100, 100)]
    #[case(50, 100, 50)]
    #[case(33, 100, 30)]
    #[case(45, 100, 40)]
    #[case(1, 100, 0)]
    #[case(40, 60, 70)]
    fn test_proportional_positions(
        #[case] demand: Percent,
        #[case] max_points: Percent,
        #[case] expected: Percent,
    ) {
        let cfg = room("b");
        let snapshot = RoomSnapshot::new("b").with_demand(demand);
        let target = valve_target(&cfg, &snapshot, Some("a"), max_points);
        assert_eq!(target, ValveTarget { position: expected, reason: ValveReason::Proportional });
    }

    #[test]
    fn test_zero_demand_uses_default() {
        let cfg = room("living").with_default_valve_position(50);
        let snapshot = RoomSnapshot::new("living");
        let target = valve_target(&cfg, &snapshot, Some("bathroom"), 100);
        assert_eq!(target, ValveTarget { position: 50, reason: ValveReason::NoDemand });
    }

    #[test]
    fn test_occupied_skip_beats_highest_demand() {
        let cfg = room("bathroom").with_skip_when_occupied(true);
        let snapshot = RoomSnapshot::new("bathroom").with_demand(100).with_occupied(true);
        let target = valve_target(&cfg, &snapshot, Some("bathroom"), 100);
        assert_eq!(target, ValveTarget { position: 20, reason: ValveReason::OccupiedSkip });
    }

    #[test]
    fn test_no_system_demand_guard() {
        let cfg = room("a");
        let snapshot = RoomSnapshot::new("a").with_demand(40);
        let target = valve_target(&cfg, &snapshot, None, 0);
        assert_eq!(target.reason, ValveReason::NoSystemDemand);
        assert_eq!(target.position, 20);
    }

    #[test]
    fn test_ties_all_open_fully() {
        let (a, b) = (room("a"), room("b"));
        let ra = RoomSnapshot::new("a").with_demand(80);
        let rb = RoomSnapshot::new("b").with_demand(80);

        let targets = distribute([(&a, &ra), (&b, &rb)], Some("a"), 80);

        assert_eq!(targets[0].1, ValveTarget { position: 100, reason: ValveReason::HighestDemand });
        assert_eq!(targets[1].1, ValveTarget { position: 100, reason: ValveReason::Proportional });
    }

    #[test]
    fn test_distribute_keeps_order() {
        let (a, b, c) = (room("a"), room("b"), room("c"));
        let ra = RoomSnapshot::new("a").with_demand(100);
        let rb = RoomSnapshot::new("b").with_demand(50);
        let rc = RoomSnapshot::new("c");

        let targets = distribute([(&a, &ra), (&b, &rb), (&c, &rc)], Some("a"), 100);
        let positions: Vec<_> = targets.iter().map(|(k, t)| (k.as_str(), t.position)).collect();
        assert_eq!(positions, [("a", 100), ("b", 50), ("c", 20)]);
    }
}
