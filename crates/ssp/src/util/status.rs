use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};

pub const CONDITION_AVAILABLE: &str = "Available";
pub const CONDITION_PROGRESSING: &str = "Progressing";
pub const CONDITION_DEGRADED: &str = "Degraded";

fn status_string(status: bool) -> String {
    if status { "True" } else { "False" }.to_string()
}

/// Builds a condition stamped with the current time.
pub fn new_condition(
    condition_type: &str,
    status: bool,
    reason: &str,
    message: impl Into<String>,
    observed_generation: Option<i64>,
) -> Condition {
    Condition {
        type_: condition_type.to_string(),
        status: status_string(status),
        reason: reason.to_string(),
        message: message.into(),
        last_transition_time: Time(Utc::now()),
        observed_generation,
    }
}

/// Sets the corresponding condition in conditions to new_condition and returns
/// a tuple containing the new conditions vector and whether it was changed.
///
/// 1. If the condition of the specified type already exists, all fields of the existing condition
///    are updated to new_condition. LastTransitionTime is only touched when the status flips
/// 2. If a condition of the specified type does not exist, new_condition is appended as is
pub fn set_status_condition(conditions: &[Condition], new_condition: Condition) -> (Vec<Condition>, bool) {
    let mut new_conditions = Vec::from(conditions);
    let mut changed = false;

    if let Some(existing) = new_conditions.iter_mut().find(|c| c.type_ == new_condition.type_) {
        if existing.status != new_condition.status {
            existing.status = new_condition.status;
            existing.last_transition_time = new_condition.last_transition_time;
            changed = true;
        }

        if existing.reason != new_condition.reason {
            existing.reason = new_condition.reason;
            changed = true;
        }

        if existing.message != new_condition.message {
            existing.message = new_condition.message;
            changed = true;
        }

        if existing.observed_generation != new_condition.observed_generation {
            existing.observed_generation = new_condition.observed_generation;
            changed = true;
        }
    } else {
        new_conditions.push(new_condition);
        changed = true;
    }

    (new_conditions, changed)
}

/// Finds the condition_type in conditions.
pub fn find_status_condition<'a>(conditions: &'a [Condition], condition_type: &str) -> Option<&'a Condition> {
    conditions
        .iter()
        .find(|condition| condition.type_ == condition_type)
}

/// Returns true when the condition_type is present and set to `True`
pub fn is_status_condition_true(conditions: &[Condition], condition_type: &str) -> bool {
    find_status_condition(conditions, condition_type).is_some_and(|condition| condition.status == "True")
}
