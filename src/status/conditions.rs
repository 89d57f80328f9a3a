// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Condition list maintenance. At most one entry per type, order preserved.

use chrono::{SecondsFormat, Utc};

use crate::types::Condition;

pub const INSTALLING: &str = "Installing";
pub const READY: &str = "Ready";
pub const FAILED: &str = "Failed";
pub const METRICS_DISABLED: &str = "MetricsDisabled";

pub fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn new_condition(
    condition_type: &str,
    reason: &str,
    message: impl Into<String>,
    generation: Option<i64>,
) -> Condition {
    Condition {
        condition_type: condition_type.to_string(),
        status: "True".to_string(),
        reason: reason.to_string(),
        message: message.into(),
        last_transition_time: Some(now()),
        observed_generation: generation,
    }
}

pub fn find<'a>(conditions: &'a [Condition], condition_type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.condition_type == condition_type)
}

pub fn remove(conditions: &mut Vec<Condition>, condition_type: &str) {
    conditions.retain(|c| c.condition_type != condition_type);
}

/// Set or merge `condition` by type. The transition time only moves when the
/// status changes.
pub fn set(conditions: &mut Vec<Condition>, mut condition: Condition) {
    match conditions
        .iter_mut()
        .find(|c| c.condition_type == condition.condition_type)
    {
        Some(existing) => {
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time.clone();
            }
            *existing = condition;
        }
        None => conditions.push(condition),
    }
}

/// Ready and Failed exclude each other, and both end Installing
pub fn set_outcome(conditions: &mut Vec<Condition>, condition: Condition) {
    let other = if condition.condition_type == READY {
        FAILED
    } else {
        READY
    };
    remove(conditions, other);
    remove(conditions, INSTALLING);
    set(conditions, condition);
}

/// Whether two lists carry the same facts, ignoring transition times
pub fn same_facts(a: &[Condition], b: &[Condition]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| {
            x.condition_type == y.condition_type
                && x.status == y.status
                && x.reason == y.reason
                && x.message == y.message
                && x.observed_generation == y.observed_generation
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_time(mut c: Condition, time: &str) -> Condition {
        c.last_transition_time = Some(time.to_string());
        c
    }

    #[test]
    fn test_set_keeps_time_on_message_change() {
        let mut conditions = vec![with_time(
            new_condition(FAILED, "DeploymentNotReady", "query not ready", Some(1)),
            "2026-01-01T00:00:00Z",
        )];

        set(
            &mut conditions,
            new_condition(FAILED, "DeploymentNotReady", "receive not ready", Some(2)),
        );

        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].message, "receive not ready");
        assert_eq!(conditions[0].last_transition_time.as_deref(), Some("2026-01-01T00:00:00Z"));
    }

    #[test]
    fn test_set_moves_time_on_status_change() {
        let mut old = new_condition(METRICS_DISABLED, "MetricsDisabled", "", None);
        old.status = "False".to_string();
        let mut conditions = vec![with_time(old, "2026-01-01T00:00:00Z")];

        set(&mut conditions, new_condition(METRICS_DISABLED, "MetricsDisabled", "", None));

        assert_ne!(conditions[0].last_transition_time.as_deref(), Some("2026-01-01T00:00:00Z"));
    }

    #[test]
    fn test_ready_and_failed_are_exclusive() {
        let mut conditions = vec![new_condition(INSTALLING, "Installing", "", None)];

        set_outcome(&mut conditions, new_condition(FAILED, "ObjectStorageSecretNotFound", "", None));
        set_outcome(&mut conditions, new_condition(READY, "Ready", "", None));
        set_outcome(&mut conditions, new_condition(FAILED, "DeploymentNotReady", "", None));
        set(&mut conditions, new_condition(METRICS_DISABLED, "MetricsDisabled", "", None));

        let types: Vec<&str> = conditions.iter().map(|c| c.condition_type.as_str()).collect();
        assert_eq!(types, vec![FAILED, METRICS_DISABLED]);
    }

    #[test]
    fn test_same_facts_ignores_time() {
        let a = vec![with_time(new_condition(READY, "Ready", "", Some(1)), "t1")];
        let b = vec![with_time(new_condition(READY, "Ready", "", Some(1)), "t2")];
        assert!(same_facts(&a, &b));
        assert!(!same_facts(&a, &[]));
    }
}
