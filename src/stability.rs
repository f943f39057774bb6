//! Release stability metrics
//!
//! Stability is the fraction of users (or sessions) that did not hit an
//! unhandled error. Which of the two is compared against the project's
//! thresholds depends on the project's configured target type.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Default target stability when the project does not report one
pub const DEFAULT_TARGET_STABILITY: f64 = 0.995;
/// Default critical stability when the project does not report one
pub const DEFAULT_CRITICAL_STABILITY: f64 = 0.85;

/// Which ratio a project's targets apply to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StabilityTargetType {
    /// User-based stability
    User,
    /// Session-based stability (also used for unknown types)
    #[default]
    Session,
}

impl<'de> Deserialize<'de> for StabilityTargetType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(match raw.as_deref() {
            Some("user") => Self::User,
            _ => Self::Session,
        })
    }
}

/// Raw usage counters of a release
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StabilityCounters {
    /// Users seen
    pub users_seen: u64,
    /// Users that saw at least one unhandled error
    pub users_with_unhandled: u64,
    /// Sessions
    pub total_sessions: u64,
    /// Sessions with at least one unhandled error
    pub unhandled_sessions: u64,
}

impl StabilityCounters {
    /// Read the counters of a release record.
    ///
    /// Each counter is looked up on its own under its API name, then its
    /// short name. A missing counter, or one that is not a non-negative
    /// integer, counts as 0 without affecting the others.
    #[must_use]
    pub fn from_record(record: &Value) -> Self {
        let counter = |names: [&str; 2]| {
            names
                .iter()
                .find_map(|name| record.get(name).and_then(Value::as_u64))
                .unwrap_or(0)
        };
        Self {
            users_seen: counter(["accumulative_daily_users_seen", "users_seen"]),
            users_with_unhandled: counter([
                "accumulative_daily_users_with_unhandled",
                "users_with_unhandled",
            ]),
            total_sessions: counter(["total_sessions_count", "total_sessions"]),
            unhandled_sessions: counter(["unhandled_sessions_count", "unhandled_sessions"]),
        }
    }
}

/// A project's stability thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityTargets {
    /// Ratio the thresholds apply to
    pub target_type: StabilityTargetType,
    /// Target stability (0-1)
    pub target: f64,
    /// Critical stability (0-1)
    pub critical: f64,
}

impl Default for StabilityTargets {
    fn default() -> Self {
        Self {
            target_type: StabilityTargetType::default(),
            target: DEFAULT_TARGET_STABILITY,
            critical: DEFAULT_CRITICAL_STABILITY,
        }
    }
}

/// Derived stability values
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StabilityMetrics {
    /// `(users_seen - users_with_unhandled) / users_seen`, 0 when no users
    pub user_stability: f64,
    /// `(total_sessions - unhandled_sessions) / total_sessions`, 0 when no sessions
    pub session_stability: f64,
    /// Ratio used for the comparisons
    pub stability_target_type: StabilityTargetType,
    /// Project target
    pub target_stability: f64,
    /// Project critical threshold
    pub critical_stability: f64,
    /// Comparator ≥ target
    pub meets_target_stability: bool,
    /// Comparator ≥ critical
    pub meets_critical_stability: bool,
}

/// Ratio of unaffected units, clamped to `[0, 1]`; 0 when `total` is 0.
#[allow(clippy::cast_precision_loss)]
fn unaffected_ratio(total: u64, affected: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let unaffected = total.saturating_sub(affected);
    (unaffected as f64 / total as f64).clamp(0.0, 1.0)
}

impl StabilityMetrics {
    /// Compute the metrics for `counters` against `targets`
    #[must_use]
    pub fn compute(counters: &StabilityCounters, targets: &StabilityTargets) -> Self {
        let user_stability = unaffected_ratio(counters.users_seen, counters.users_with_unhandled);
        let session_stability =
            unaffected_ratio(counters.total_sessions, counters.unhandled_sessions);

        let comparator = match targets.target_type {
            StabilityTargetType::User => user_stability,
            StabilityTargetType::Session => session_stability,
        };

        Self {
            user_stability,
            session_stability,
            stability_target_type: targets.target_type,
            target_stability: targets.target,
            critical_stability: targets.critical,
            meets_target_stability: comparator >= targets.target,
            meets_critical_stability: comparator >= targets.critical,
        }
    }
}

/// Return a copy of `record` with the stability metrics added.
///
/// Counters are read from the record itself (missing counters count as 0).
/// Non-object records are wrapped as `{"value": record}` first.
#[must_use]
pub fn decorate(record: &Value, targets: &StabilityTargets) -> Value {
    let counters = StabilityCounters::from_record(record);
    let metrics = StabilityMetrics::compute(&counters, targets);

    let mut decorated = match record {
        Value::Object(map) => map.clone(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other.clone());
            map
        }
    };
    if let Ok(Value::Object(derived)) = serde_json::to_value(metrics) {
        decorated.extend(derived);
    }
    Value::Object(decorated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn targets(target_type: StabilityTargetType, target: f64, critical: f64) -> StabilityTargets {
        StabilityTargets {
            target_type,
            target,
            critical,
        }
    }

    #[test]
    fn test_zero_users_never_divides() {
        let counters = StabilityCounters {
            users_seen: 0,
            users_with_unhandled: 0,
            total_sessions: 100,
            unhandled_sessions: 10,
        };
        let metrics = StabilityMetrics::compute(
            &counters,
            &targets(StabilityTargetType::User, 0.99, 0.85),
        );

        assert!(metrics.user_stability.abs() < f64::EPSILON);
        assert!((metrics.session_stability - 0.9).abs() < 1e-9);
        assert!(!metrics.meets_target_stability);
        assert!(!metrics.meets_critical_stability);
    }

    #[test]
    fn test_session_comparator() {
        let counters = StabilityCounters {
            users_seen: 10,
            users_with_unhandled: 5,
            total_sessions: 100,
            unhandled_sessions: 10,
        };
        let metrics = StabilityMetrics::compute(
            &counters,
            &targets(StabilityTargetType::Session, 0.95, 0.9),
        );

        assert!((metrics.user_stability - 0.5).abs() < 1e-9);
        assert!(!metrics.meets_target_stability);
        // inclusive: 0.9 >= 0.9
        assert!(metrics.meets_critical_stability);
    }

    #[test]
    fn test_inclusive_target() {
        let counters = StabilityCounters {
            users_seen: 4,
            users_with_unhandled: 1,
            ..Default::default()
        };
        let metrics = StabilityMetrics::compute(
            &counters,
            &targets(StabilityTargetType::User, 0.75, 0.5),
        );
        assert!(metrics.meets_target_stability);
        assert!(metrics.meets_critical_stability);
    }

    #[test]
    fn test_inconsistent_counters_stay_in_range() {
        let counters = StabilityCounters {
            users_seen: 3,
            users_with_unhandled: 7,
            total_sessions: 0,
            unhandled_sessions: 4,
        };
        let metrics = StabilityMetrics::compute(&counters, &StabilityTargets::default());
        assert!(metrics.user_stability.abs() < f64::EPSILON);
        assert!(metrics.session_stability.abs() < f64::EPSILON);
    }

    #[test]
    fn test_decorate_reads_release_fields_and_preserves_input() {
        let release = json!({
            "id": "r1",
            "app_version": "1.2.0",
            "accumulative_daily_users_seen": 0,
            "accumulative_daily_users_with_unhandled": 0,
            "total_sessions_count": 100,
            "unhandled_sessions_count": 10,
        });
        let before = release.clone();

        let decorated = decorate(&release, &targets(StabilityTargetType::User, 0.99, 0.85));

        assert_eq!(release, before);
        assert_eq!(decorated["id"], "r1");
        assert_eq!(decorated["user_stability"], 0.0);
        assert_eq!(decorated["session_stability"], 0.9);
        assert_eq!(decorated["stability_target_type"], "user");
        assert_eq!(decorated["target_stability"], 0.99);
        assert_eq!(decorated["meets_target_stability"], false);
    }

    #[test]
    fn test_bad_counter_does_not_zero_the_others() {
        let release = json!({
            "accumulative_daily_users_seen": 100,
            "accumulative_daily_users_with_unhandled": 1,
            "total_sessions_count": null,
            "unhandled_sessions_count": -3,
        });

        let decorated = decorate(&release, &targets(StabilityTargetType::User, 0.9, 0.5));

        assert_eq!(decorated["user_stability"], 0.99);
        assert_eq!(decorated["meets_target_stability"], true);
        assert_eq!(decorated["session_stability"], 0.0);
    }

    #[test]
    fn test_counters_prefer_api_names() {
        let counters = StabilityCounters::from_record(&json!({
            "accumulative_daily_users_seen": 50,
            "users_seen": 7,
            "users_with_unhandled": 2.5,
            "total_sessions": 20,
        }));
        assert_eq!(
            counters,
            StabilityCounters {
                users_seen: 50,
                users_with_unhandled: 0,
                total_sessions: 20,
                unhandled_sessions: 0,
            }
        );
    }

    #[test]
    fn test_unknown_target_type_is_session() {
        let parsed: StabilityTargetType = serde_json::from_value(json!("weekly")).unwrap();
        assert_eq!(parsed, StabilityTargetType::Session);
    }
}
