//! Check engine: pure scoring of telemetry tables.
//!
//! [`evaluate`] runs a battery of [`CheckSpec`]s against one
//! [`TelemetryTable`] and returns one [`CheckResult`] per check, in order.
//! Every result, pass or fail, carries a concrete value-plus-timestamp
//! message because those messages are fed back verbatim into correction
//! prompts.

use crate::domain::check::{CheckResult, CheckSpec};
use crate::domain::telemetry::{Sample, TelemetryTable};

/// Score `table` against every check, preserving order.
pub fn evaluate(table: &TelemetryTable, checks: &[CheckSpec]) -> Vec<CheckResult> {
    checks
        .iter()
        .map(|check| evaluate_check(table, check))
        .collect()
}

/// Score `table` against a single check.
pub fn evaluate_check(table: &TelemetryTable, check: &CheckSpec) -> CheckResult {
    let name = check.name();
    match *check {
        CheckSpec::DetectCollisions { window_s } => detect_collisions(table, name, window_s),
        CheckSpec::MaxEgoSpeed { limit } => max_ego_speed(table, name, limit),
        CheckSpec::MinEgoSpeed { limit } => min_ego_speed(table, name, limit),
        CheckSpec::SpeedRecovery { min_increase } => speed_recovery(table, name, min_increase),
        CheckSpec::MaxLaneOffset { limit } => max_lane_offset(table, name, limit),
        CheckSpec::MinLaneOffset { limit } => min_lane_offset(table, name, limit),
        CheckSpec::MinForwardGap { distance } => min_forward_gap(table, name, distance),
    }
}

/// Index of the first sample whose value wins under `better`.
fn arg_best(samples: &[Sample], value: impl Fn(&Sample) -> f64, better: fn(f64, f64) -> bool) -> usize {
    let mut best = 0;
    for (idx, sample) in samples.iter().enumerate().skip(1) {
        if better(value(sample), value(&samples[best])) {
            best = idx;
        }
    }
    best
}

fn greater(a: f64, b: f64) -> bool {
    a > b
}

fn less(a: f64, b: f64) -> bool {
    a < b
}

// ---------------------------------------------------------------------------
// Collisions
// ---------------------------------------------------------------------------

/// Group ego collision rows into incidents. Consecutive collision rows less
/// than `window_s` apart belong to the same incident.
fn detect_collisions(table: &TelemetryTable, name: &str, window_s: f64) -> CheckResult {
    let mut messages = Vec::new();
    let mut frames = Vec::new();
    let mut previous: Option<f64> = None;

    for sample in table.samples() {
        let ego = sample.ego();
        let Some(peer) = ego.collision else {
            continue;
        };

        let new_incident = previous.map_or(true, |prev| sample.time - prev >= window_s);
        previous = Some(sample.time);
        if !new_incident {
            continue;
        }

        let peer_name = sample
            .vehicles
            .get(peer)
            .map(|v| v.name.clone())
            .unwrap_or_else(|| format!("object {}", peer));
        frames.push(sample.frame);
        messages.push(format!(
            "Ego was involved in a collision at time: {} s with a speed of {:.2} m/s, colliding with: {}.",
            sample.time, ego.speed, peer_name
        ));
    }

    if frames.is_empty() {
        CheckResult::pass(name, "No collisions were detected.")
    } else {
        CheckResult::fail(name, messages.join("\n")).with_evidence(frames)
    }
}

// ---------------------------------------------------------------------------
// Speed
// ---------------------------------------------------------------------------

fn max_ego_speed(table: &TelemetryTable, name: &str, limit: f64) -> CheckResult {
    let samples = table.samples();
    let idx = arg_best(samples, |s| s.ego().speed, greater);
    let speed = samples[idx].ego().speed;
    let time = samples[idx].time;

    if speed > limit {
        CheckResult::fail(
            name,
            format!(
                "Maximum speed of Ego: {:.2} m/s at time: {} s, which exceeds the limit of {} m/s.",
                speed, time, limit
            ),
        )
    } else {
        CheckResult::pass(
            name,
            format!(
                "Maximum speed of Ego: {:.2} m/s at time: {} s, within the limit of {} m/s.",
                speed, time, limit
            ),
        )
    }
}

fn min_ego_speed(table: &TelemetryTable, name: &str, limit: f64) -> CheckResult {
    let samples = table.samples();
    let idx = arg_best(samples, |s| s.ego().speed, less);
    let speed = samples[idx].ego().speed;
    let time = samples[idx].time;

    if speed < limit {
        CheckResult::fail(
            name,
            format!(
                "Minimum speed of Ego: {:.2} m/s at time: {} s, which is below the minimum limit of {} m/s.",
                speed, time, limit
            ),
        )
    } else {
        CheckResult::pass(
            name,
            format!(
                "Minimum speed of Ego: {:.2} m/s at time: {} s, above the minimum limit of {} m/s.",
                speed, time, limit
            ),
        )
    }
}

fn speed_recovery(table: &TelemetryTable, name: &str, min_increase: f64) -> CheckResult {
    let samples = table.samples();
    let min_idx = arg_best(samples, |s| s.ego().speed, less);

    if min_idx == samples.len() - 1 {
        return CheckResult::fail(
            name,
            "No increase in speed detected after reaching the minimum speed.",
        );
    }

    let max_idx = min_idx + arg_best(&samples[min_idx..], |s| s.ego().speed, greater);
    let increase = samples[max_idx].ego().speed - samples[min_idx].ego().speed;
    let from = samples[min_idx].time;
    let to = samples[max_idx].time;

    if increase < min_increase {
        CheckResult::fail(
            name,
            format!(
                "Greatest speed increase of Ego after reaching its minimum speed is {:.2} m/s, from time: {} s to {} s, which is less than the required increase of {} m/s.",
                increase, from, to, min_increase
            ),
        )
    } else {
        CheckResult::pass(
            name,
            format!(
                "Greatest speed increase of Ego after reaching its minimum speed: {:.2} m/s, from time: {} s to {} s, meeting the required increase of {} m/s.",
                increase, from, to, min_increase
            ),
        )
    }
}

// ---------------------------------------------------------------------------
// Lateral offset
// ---------------------------------------------------------------------------

fn max_lane_offset(table: &TelemetryTable, name: &str, limit: f64) -> CheckResult {
    let samples = table.samples();
    let idx = arg_best(samples, |s| s.ego().t.abs(), greater);
    let offset = samples[idx].ego().t.abs();
    let time = samples[idx].time;

    if offset > limit {
        CheckResult::fail(
            name,
            format!(
                "Greatest absolute lane offset of Ego: {:.2} m at time: {} s, which exceeds the allowed maximum of {} m.",
                offset, time, limit
            ),
        )
    } else {
        CheckResult::pass(
            name,
            format!(
                "Greatest absolute lane offset of Ego: {:.2} m at time: {} s, within the allowed maximum of {} m.",
                offset, time, limit
            ),
        )
    }
}

/// Confirms an evasive maneuver happened: ego must never stay closer to the
/// lane center than `limit`.
fn min_lane_offset(table: &TelemetryTable, name: &str, limit: f64) -> CheckResult {
    let samples = table.samples();
    let idx = arg_best(samples, |s| s.ego().t.abs(), less);
    let offset = samples[idx].ego().t.abs();
    let time = samples[idx].time;

    if offset < limit {
        CheckResult::fail(
            name,
            format!(
                "Smallest absolute lane offset of Ego: {:.2} m at time: {} s, which is below the allowed minimum of {} m.",
                offset, time, limit
            ),
        )
    } else {
        CheckResult::pass(
            name,
            format!(
                "Smallest absolute lane offset of Ego: {:.2} m at time: {} s, above the allowed minimum of {} m.",
                offset, time, limit
            ),
        )
    }
}

// ---------------------------------------------------------------------------
// Proximity
// ---------------------------------------------------------------------------

/// Forward gap from ego to `other` in `sample`, if `other` is ahead in the
/// same lane.
fn forward_gap(sample: &Sample, other: usize) -> Option<f64> {
    let ego = sample.ego();
    let vehicle = &sample.vehicles[other];
    (vehicle.lane_id == ego.lane_id && vehicle.s > ego.s).then(|| vehicle.s - ego.s)
}

struct ClosestApproach {
    gap: f64,
    vehicle: usize,
    sample: usize,
}

fn min_forward_gap(table: &TelemetryTable, name: &str, distance: f64) -> CheckResult {
    let samples = table.samples();
    let mut closest: Option<ClosestApproach> = None;

    for vehicle in 1..table.vehicle_count() {
        for (idx, sample) in samples.iter().enumerate() {
            let Some(gap) = forward_gap(sample, vehicle) else {
                continue;
            };
            if closest.as_ref().map_or(true, |c| gap < c.gap) {
                closest = Some(ClosestApproach {
                    gap,
                    vehicle,
                    sample: idx,
                });
            }
        }
    }

    let Some(closest) = closest else {
        return CheckResult::pass(
            name,
            "No qualifying vehicle was found: no qualifying vehicle was ever ahead of Ego in its lane.",
        );
    };

    let sample = &samples[closest.sample];
    let other = &sample.vehicles[closest.vehicle].name;
    if closest.gap < distance {
        CheckResult::fail(
            name,
            format!(
                "Closest distance Ego comes to any vehicle is {:.2} m to {} (vehicle {}) at time: {} s, which is closer than the allowed minimum of {} m.",
                closest.gap, other, closest.vehicle, sample.time, distance
            ),
        )
    } else {
        CheckResult::pass(
            name,
            format!(
                "Closest distance Ego comes to any vehicle is {:.2} m to {} (vehicle {}) at time: {} s, respecting the minimum allowed distance of {} m.",
                closest.gap, other, closest.vehicle, sample.time, distance
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::TelemetryBuilder;

    fn ego_speeds(speeds: &[f64]) -> TelemetryTable {
        let mut builder = TelemetryBuilder::new(0.1);
        for speed in speeds {
            builder = builder.ego(*speed, -3, 0.0, 0.0);
        }
        builder.build()
    }

    #[test]
    fn test_constant_speed_exceeds_max() {
        let table = ego_speeds(&[50.0; 10]);
        let result = evaluate_check(&table, &CheckSpec::max_ego_speed(45.0));
        assert!(!result.success);
        assert!(result.message.contains("50.00"));
        assert!(result.message.contains("45"));
        assert!(result.message.contains("at time: 0 s"));
    }

    #[test]
    fn test_max_speed_pass_reports_extremum_and_time() {
        let table = ego_speeds(&[10.0, 30.0, 20.0]);
        let result = evaluate_check(&table, &CheckSpec::max_ego_speed(30.0));
        assert!(result.success);
        assert_eq!(
            result.message,
            "Maximum speed of Ego: 30.00 m/s at time: 0.1 s, within the limit of 30 m/s."
        );
    }

    #[test]
    fn test_max_speed_bound_property() {
        let speeds = [3.0, 17.5, 12.25, 17.5, 1.0];
        let table = ego_speeds(&speeds);
        for bound in [0.0, 10.0, 17.4, 17.5, 17.6, 100.0] {
            let result = evaluate_check(&table, &CheckSpec::max_ego_speed(bound));
            assert_eq!(result.success, 17.5 <= bound, "bound {}", bound);
            assert!(result.message.contains("17.50"));
            // first occurrence of the maximum
            assert!(result.message.contains("at time: 0.1 s"));
        }
    }

    #[test]
    fn test_min_speed() {
        let table = ego_speeds(&[30.0, 25.0, 29.0]);
        let fail = evaluate_check(&table, &CheckSpec::min_ego_speed(28.0));
        assert!(!fail.success);
        assert!(fail.message.contains("25.00"));
        assert!(fail.message.contains("below the minimum limit of 28 m/s"));

        let pass = evaluate_check(&table, &CheckSpec::min_ego_speed(20.0));
        assert!(pass.success);
    }

    #[test]
    fn test_speed_recovery() {
        let table = ego_speeds(&[20.0, 5.0, 8.0, 14.0, 12.0]);
        let pass = evaluate_check(&table, &CheckSpec::speed_recovery(9.0));
        assert!(pass.success, "{}", pass.message);
        assert!(pass.message.contains("9.00"));
        assert!(pass.message.contains("from time: 0.1 s to 0.3 s"));

        let fail = evaluate_check(&table, &CheckSpec::speed_recovery(10.0));
        assert!(!fail.success);
    }

    #[test]
    fn test_speed_recovery_minimum_at_end_fails() {
        let table = ego_speeds(&[20.0, 15.0, 5.0]);
        let result = evaluate_check(&table, &CheckSpec::speed_recovery(0.0));
        assert!(!result.success);
        assert_eq!(
            result.message,
            "No increase in speed detected after reaching the minimum speed."
        );
    }

    #[test]
    fn test_lane_offsets_use_magnitude() {
        let table = TelemetryBuilder::new(0.5)
            .ego(10.0, -3, 0.0, 0.5)
            .ego(10.0, -3, 5.0, -4.0)
            .ego(10.0, -3, 10.0, 2.0)
            .build();

        let max = evaluate_check(&table, &CheckSpec::max_lane_offset(3.5));
        assert!(!max.success);
        assert!(max.message.contains("4.00"));
        assert!(max.message.contains("at time: 0.5 s"));

        let min = evaluate_check(&table, &CheckSpec::min_lane_offset(1.0));
        assert!(!min.success);
        assert!(min.message.contains("0.50"));

        let min_ok = evaluate_check(&table, &CheckSpec::min_lane_offset(0.5));
        assert!(min_ok.success);
    }

    #[test]
    fn test_no_collision_markers_passes_without_evidence() {
        let table = ego_speeds(&[10.0, 10.0, 10.0]);
        let result = evaluate_check(&table, &CheckSpec::detect_collisions());
        assert!(result.success);
        assert!(result.evidence_frames.is_empty());
        assert_eq!(result.message, "No collisions were detected.");
    }

    #[test]
    fn test_collisions_half_second_apart_are_one_incident() {
        let table = TelemetryBuilder::new(0.5)
            .with_vehicles(1)
            .ego(10.0, -3, 0.0, 0.0)
            .collision_row(10.0, 1)
            .collision_row(9.0, 1)
            .ego(8.0, -3, 0.0, 0.0)
            .build();
        let result = evaluate_check(&table, &CheckSpec::detect_collisions());
        assert!(!result.success);
        assert_eq!(result.evidence_frames, vec![1]);
        assert_eq!(result.message.lines().count(), 1);
        assert!(result.message.contains("colliding with: Target1"));
    }

    #[test]
    fn test_collisions_one_and_a_half_seconds_apart_are_two_incidents() {
        let table = TelemetryBuilder::new(1.5)
            .with_vehicles(1)
            .collision_row(10.0, 1)
            .collision_row(9.0, 1)
            .build();
        let result = evaluate_check(&table, &CheckSpec::detect_collisions());
        assert!(!result.success);
        assert_eq!(result.evidence_frames, vec![0, 1]);
        assert_eq!(result.message.lines().count(), 2);
    }

    #[test]
    fn test_collisions_with_different_peers_inside_window_are_one_incident() {
        let table = TelemetryBuilder::new(0.5)
            .with_vehicles(2)
            .collision_row(10.0, 1)
            .collision_row(9.0, 2)
            .build();
        let result = evaluate_check(&table, &CheckSpec::detect_collisions());
        assert!(!result.success);
        assert_eq!(result.evidence_frames, vec![0]);
        assert!(result.message.contains("colliding with: Target1"));
        assert!(!result.message.contains("Target2"));
    }

    #[test]
    fn test_collision_window_is_configurable() {
        let table = TelemetryBuilder::new(1.5)
            .with_vehicles(1)
            .collision_row(10.0, 1)
            .collision_row(9.0, 1)
            .build();
        let result = evaluate_check(&table, &CheckSpec::DetectCollisions { window_s: 2.0 });
        assert_eq!(result.evidence_frames, vec![0]);
    }

    #[test]
    fn test_forward_gap_vacuous_pass() {
        // Target is always behind ego.
        let table = TelemetryBuilder::new(0.1)
            .row(&[(20.0, -3, 50.0, 0.0), (20.0, -3, 10.0, 0.0)])
            .row(&[(20.0, -3, 52.0, 0.0), (20.0, -3, 12.0, 0.0)])
            .build();
        let result = evaluate_check(&table, &CheckSpec::min_forward_gap(7.0));
        assert!(result.success);
        assert!(result.message.contains("no qualifying vehicle"));
    }

    #[test]
    fn test_forward_gap_ignores_other_lanes() {
        let table = TelemetryBuilder::new(0.1)
            .row(&[(20.0, -3, 10.0, 0.0), (20.0, -2, 11.0, 0.0)])
            .build();
        let result = evaluate_check(&table, &CheckSpec::min_forward_gap(7.0));
        assert!(result.success);
        assert!(result.message.contains("no qualifying vehicle"));
    }

    #[test]
    fn test_forward_gap_minimum_over_vehicles_and_time() {
        let table = TelemetryBuilder::new(0.1)
            .row(&[
                (20.0, -3, 10.0, 0.0),
                (15.0, -3, 30.0, 0.0),
                (15.0, -2, 12.0, 0.0),
            ])
            .row(&[
                (20.0, -3, 12.0, 0.0),
                (15.0, -3, 17.0, 0.0),
                (15.0, -3, 20.0, 0.0),
            ])
            .build();
        let result = evaluate_check(&table, &CheckSpec::min_forward_gap(7.0));
        assert!(!result.success);
        assert!(result.message.contains("5.00 m to Target1 (vehicle 1) at time: 0.1 s"));
    }

    #[test]
    fn test_evaluate_preserves_order_and_is_deterministic() {
        let table = ego_speeds(&[10.0, 12.0]);
        let checks = vec![
            CheckSpec::min_ego_speed(11.0),
            CheckSpec::detect_collisions(),
            CheckSpec::max_ego_speed(20.0),
        ];
        let first = evaluate(&table, &checks);
        let second = evaluate(&table, &checks);
        assert_eq!(first, second);
        let names: Vec<_> = first.iter().map(|r| r.check.as_str()).collect();
        assert_eq!(
            names,
            vec!["min_ego_speed", "detect_collisions_dynamic", "max_ego_speed"]
        );
        assert_eq!(
            first.iter().map(|r| r.success).collect::<Vec<_>>(),
            vec![false, true, true]
        );
    }
}
