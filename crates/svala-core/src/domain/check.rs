//! Check specifications and their results.

use serde::{Deserialize, Serialize};

/// Default window (seconds) within which consecutive collision rows are
/// merged into one incident.
pub const DEFAULT_COLLISION_WINDOW_S: f64 = 1.0;

fn default_collision_window() -> f64 {
    DEFAULT_COLLISION_WINDOW_S
}

/// A named, parameterized scoring function over a telemetry table.
///
/// Identity is the variant plus its parameters; evaluation carries no hidden
/// state and is deterministic for a given table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckSpec {
    /// Fails if ego was involved in any collision incident.
    DetectCollisions {
        #[serde(default = "default_collision_window")]
        window_s: f64,
    },

    /// Fails if the maximum ego speed exceeds `limit`.
    MaxEgoSpeed { limit: f64 },

    /// Fails if the minimum ego speed falls below `limit`.
    MinEgoSpeed { limit: f64 },

    /// Fails if ego does not regain at least `min_increase` m/s after its
    /// slowest point.
    SpeedRecovery { min_increase: f64 },

    /// Fails if the absolute lateral lane offset ever exceeds `limit`.
    MaxLaneOffset { limit: f64 },

    /// Fails if the smallest absolute lateral lane offset is below `limit`.
    MinLaneOffset { limit: f64 },

    /// Fails if any vehicle ahead of ego in its lane comes closer than
    /// `distance`.
    MinForwardGap { distance: f64 },
}

impl CheckSpec {
    pub fn detect_collisions() -> Self {
        CheckSpec::DetectCollisions {
            window_s: DEFAULT_COLLISION_WINDOW_S,
        }
    }

    pub fn max_ego_speed(limit: f64) -> Self {
        CheckSpec::MaxEgoSpeed { limit }
    }

    pub fn min_ego_speed(limit: f64) -> Self {
        CheckSpec::MinEgoSpeed { limit }
    }

    pub fn speed_recovery(min_increase: f64) -> Self {
        CheckSpec::SpeedRecovery { min_increase }
    }

    pub fn max_lane_offset(limit: f64) -> Self {
        CheckSpec::MaxLaneOffset { limit }
    }

    pub fn min_lane_offset(limit: f64) -> Self {
        CheckSpec::MinLaneOffset { limit }
    }

    pub fn min_forward_gap(distance: f64) -> Self {
        CheckSpec::MinForwardGap { distance }
    }

    /// Stable report name of this check.
    pub fn name(&self) -> &'static str {
        match self {
            CheckSpec::DetectCollisions { .. } => "detect_collisions_dynamic",
            CheckSpec::MaxEgoSpeed { .. } => "max_ego_speed",
            CheckSpec::MinEgoSpeed { .. } => "min_ego_speed",
            CheckSpec::SpeedRecovery { .. } => "greatest_ego_speed_increase",
            CheckSpec::MaxLaneOffset { .. } => "greatest_lane_offset",
            CheckSpec::MinLaneOffset { .. } => "smallest_lane_offset",
            CheckSpec::MinForwardGap { .. } => "closest_distance_to_any_vehicle",
        }
    }

    /// The configured threshold, used for suite validation.
    pub fn threshold(&self) -> f64 {
        match self {
            CheckSpec::DetectCollisions { window_s } => *window_s,
            CheckSpec::MaxEgoSpeed { limit }
            | CheckSpec::MinEgoSpeed { limit }
            | CheckSpec::MaxLaneOffset { limit }
            | CheckSpec::MinLaneOffset { limit } => *limit,
            CheckSpec::SpeedRecovery { min_increase } => *min_increase,
            CheckSpec::MinForwardGap { distance } => *distance,
        }
    }
}

/// Outcome of one check against one telemetry table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Report name of the check that produced this result.
    #[serde(rename = "check_function")]
    pub check: String,

    pub success: bool,

    /// Value-plus-timestamp evidence, embedded verbatim in correction prompts.
    pub message: String,

    /// Frame indices localizing events; only populated by event checks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence_frames: Vec<u64>,
}

impl CheckResult {
    pub fn pass(check: &str, message: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            success: true,
            message: message.into(),
            evidence_frames: Vec::new(),
        }
    }

    pub fn fail(check: &str, message: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            success: false,
            message: message.into(),
            evidence_frames: Vec::new(),
        }
    }

    pub fn with_evidence(mut self, frames: Vec<u64>) -> Self {
        self.evidence_frames = frames;
        self
    }

    /// `Pass: <message>` or `Fail: <message>`.
    pub fn report_line(&self) -> String {
        let label = if self.success { "Pass" } else { "Fail" };
        format!("{}: {}", label, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_spec_toml_shape() {
        #[derive(Deserialize)]
        struct Wrapper {
            checks: Vec<CheckSpec>,
        }
        let parsed: Wrapper = toml::from_str(
            r#"
            checks = [
                { kind = "detect_collisions" },
                { kind = "min_forward_gap", distance = 7.0 },
                { kind = "max_lane_offset", limit = 9.7 },
            ]
            "#,
        )
        .expect("parse checks");

        assert_eq!(
            parsed.checks,
            vec![
                CheckSpec::detect_collisions(),
                CheckSpec::min_forward_gap(7.0),
                CheckSpec::max_lane_offset(9.7),
            ]
        );
    }

    #[test]
    fn test_check_names_are_stable() {
        assert_eq!(CheckSpec::detect_collisions().name(), "detect_collisions_dynamic");
        assert_eq!(CheckSpec::max_ego_speed(1.0).name(), "max_ego_speed");
        assert_eq!(CheckSpec::min_ego_speed(1.0).name(), "min_ego_speed");
        assert_eq!(
            CheckSpec::speed_recovery(1.0).name(),
            "greatest_ego_speed_increase"
        );
        assert_eq!(CheckSpec::max_lane_offset(1.0).name(), "greatest_lane_offset");
        assert_eq!(CheckSpec::min_lane_offset(1.0).name(), "smallest_lane_offset");
        assert_eq!(
            CheckSpec::min_forward_gap(1.0).name(),
            "closest_distance_to_any_vehicle"
        );
    }

    #[test]
    fn test_report_line() {
        assert_eq!(CheckResult::pass("x", "ok").report_line(), "Pass: ok");
        assert_eq!(CheckResult::fail("x", "too fast").report_line(), "Fail: too fast");
    }

    #[test]
    fn test_evidence_frames_omitted_when_empty() {
        let json = serde_json::to_value(CheckResult::pass("x", "ok")).expect("serialize");
        assert!(json.get("evidence_frames").is_none());
        assert_eq!(json["check_function"], "x");
    }
}
