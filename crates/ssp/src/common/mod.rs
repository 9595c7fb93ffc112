pub mod operand;
pub mod request;
pub mod resource;
pub mod resource_status;
pub mod version_cache;

pub use operand::Operand;
pub use request::Request;
pub use resource::{create_or_update, delete_resource, ManagedResource, Ownership, ReconcileOutcome};
pub use resource_status::ResourceStatus;
pub use version_cache::{ResourceKey, VersionCache, VersionRecord};

use std::collections::BTreeMap;

pub const APP_NAME_LABEL: &str = "app.kubernetes.io/name";
pub const APP_COMPONENT_LABEL: &str = "app.kubernetes.io/component";
pub const APP_MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY: &str = "ssp-operator";

/// Labels put on every resource an operand creates.
pub fn common_labels(name: &str, component: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (APP_NAME_LABEL.to_string(), label_value(name)),
        (APP_COMPONENT_LABEL.to_string(), component.to_string()),
        (APP_MANAGED_BY_LABEL.to_string(), MANAGED_BY.to_string()),
    ])
}

const MAX_LABEL_VALUE_LEN: usize = 63;

fn is_label_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

/// Whether the API server accepts `value` as a label value.
pub fn is_valid_label_value(value: &str) -> bool {
    if value.is_empty() {
        return true;
    }
    value.len() <= MAX_LABEL_VALUE_LEN
        && value.chars().all(is_label_char)
        && value.starts_with(|c: char| c.is_ascii_alphanumeric())
        && value.ends_with(|c: char| c.is_ascii_alphanumeric())
}

/// Maps a resource name to a label value, replacing characters that are not
/// allowed (such as the `:` of RBAC role names) with `-`.
pub fn label_value(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if is_label_char(c) { c } else { '-' })
        .take(MAX_LABEL_VALUE_LEN)
        .collect();
    replaced
        .trim_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_string()
}
