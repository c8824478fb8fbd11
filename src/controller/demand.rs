//! Demand aggregation: per-room scores into one fan speed.
//!
//! Rooms add up (several humid rooms need more air than one), unlike the two
//! signals inside a room where only the worse one counts.

use serde::Serialize;
use tracing::info;

use crate::config::FanConfig;
use crate::domain::{round_to_nearest_ten, Percent, RoomConfig, RoomSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FanLimits {
    pub min_speed: Percent,
    pub high_speed: Percent,
}

impl From<&FanConfig> for FanLimits {
    fn from(cfg: &FanConfig) -> Self {
        Self {
            min_speed: cfg.min_speed,
            high_speed: cfg.high_speed,
        }
    }
}

/// Outcome of aggregation, kept for logging and the cycle report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FanDecision {
    /// Sum of effective points across rooms, before clamping.
    pub total_points: u32,
    pub fan_speed: Percent,
}

/// Points a room contributes to the fan total.
///
/// An occupied room with `skip_when_occupied` keeps its own demand score but
/// contributes nothing.
pub fn effective_points(config: &RoomConfig, room: &RoomSnapshot) -> u32 {
    if config.suppressed_by(room.occupied) {
        0
    } else {
        u32::from(room.demand)
    }
}

/// Clamp the total into the fan limits and snap it to the 10 % grid.
pub fn fan_speed_for_total(total_points: u32, limits: FanLimits) -> Percent {
    if total_points == 0 {
        return limits.min_speed;
    }
    // min after max so a misconfigured min > high still yields min
    let clamped = total_points
        .min(u32::from(limits.high_speed))
        .max(u32::from(limits.min_speed));
    round_to_nearest_ten(f64::from(clamped))
}

/// Sum effective points over all rooms and derive the fan speed.
pub fn aggregate<'a, I>(rooms: I, limits: FanLimits) -> FanDecision
where
    I: IntoIterator<Item = (&'a RoomConfig, &'a RoomSnapshot)>,
{
    let mut total_points = 0u32;
    for (config, room) in rooms {
        if config.suppressed_by(room.occupied) {
            if room.demand > 0 {
                info!(
                    room = %config.key,
                    demand = room.demand,
                    "points ignored: room occupied and skip_when_occupied set"
                );
            }
            continue;
        }
        total_points += effective_points(config, room);
    }

    let fan_speed = fan_speed_for_total(total_points, limits);
    if total_points > 0 {
        info!(
            total_points,
            fan_speed,
            min_speed = limits.min_speed,
            high_speed = limits.high_speed,
            "fan speed from total demand"
        );
    } else {
        info!(fan_speed, "no ventilation demand, fan at minimum speed");
    }

    FanDecision {
        total_points,
        fan_speed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DemandCurve;
    use rstest::rstest;

    const LIMITS: FanLimits = FanLimits {
        min_speed: 30,
        high_speed: 100,
    };

    fn room(key: &str, skip: bool) -> RoomConfig {
        RoomConfig::new(
            key,
            format!("valve.{key}"),
            format!("sensor.{key}_humidity"),
            DemandCurve::step(70.0).unwrap(),
            DemandCurve::linear(600.0, 1500.0).unwrap(),
        )
        .with_skip_when_occupied(skip)
    }

    #[rstest]
    #[case(0, 30)]
    #[case(10, 30)]
    #[case(30, 30)]
    #[case(44, 40)]
    #[case(45, 40)]
    #[case(56, 60)]
    #[case(100, 100)]
    #[case(150, 100)]
    fn test_fan_speed_for_total(#[case] total: u32, #[case] expected: Percent) {
        assert_eq!(fan_speed_for_total(total, LIMITS), expected);
    }

    #[test]
    fn test_zero_total_is_min_speed_without_rounding() {
        let limits = FanLimits {
            min_speed: 25,
            high_speed: 100,
        };
        assert_eq!(fan_speed_for_total(0, limits), 25);
        // clamped to an off-grid minimum still gets rounded
        assert_eq!(fan_speed_for_total(5, limits), 20);
    }

    #[test]
    fn test_demand_is_additive_across_rooms() {
        let (a, b) = (room("a", false), room("b", false));
        let ra = RoomSnapshot::new("a").with_demand(100);
        let rb = RoomSnapshot::new("b").with_demand(50);

        let decision = aggregate([(&a, &ra), (&b, &rb)], LIMITS);

        assert_eq!(decision.total_points, 150);
        assert_eq!(decision.fan_speed, 100);
    }

    #[test]
    fn test_occupied_skip_room_contributes_nothing() {
        let bathroom = room("bathroom", true);
        let snapshot = RoomSnapshot::new("bathroom").with_demand(100).with_occupied(true);

        assert_eq!(effective_points(&bathroom, &snapshot), 0);
        let decision = aggregate([(&bathroom, &snapshot)], LIMITS);
        assert_eq!(decision.total_points, 0);
        assert_eq!(decision.fan_speed, 30);
        // the score itself is left untouched
        assert_eq!(snapshot.demand, 100);
    }

    #[test]
    fn test_occupied_room_without_skip_still_counts() {
        let living = room("living", false);
        let snapshot = RoomSnapshot::new("living").with_demand(60).with_occupied(true);
        assert_eq!(aggregate([(&living, &snapshot)], LIMITS).fan_speed, 60);
    }
}
