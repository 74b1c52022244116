//! Immutable-field recreate support: the (group, kind) → propagation-policy
//! table and 422-signature detection from `SPEC_FULL.md` §4.4.

use std::collections::HashMap;

use crate::client::DeletionPropagation;

/// `context.globals.k8s.immutable_changes` in the source is a plain mutable
/// mapping; modeled here as a table callers can extend or override per
/// (group, kind) rather than a hardcoded match.
#[derive(Debug, Clone)]
pub struct ImmutableChangeTable {
    policies: HashMap<(String, String), DeletionPropagation>,
}

impl Default for ImmutableChangeTable {
    fn default() -> Self {
        let mut policies = HashMap::new();
        policies.insert(("apps".to_string(), "DaemonSet".to_string()), DeletionPropagation::Background);
        policies.insert(("apps".to_string(), "StatefulSet".to_string()), DeletionPropagation::Orphan);
        policies.insert(("apps".to_string(), "Deployment".to_string()), DeletionPropagation::Orphan);
        policies.insert(
            ("storage.k8s.io".to_string(), "StorageClass".to_string()),
            DeletionPropagation::Orphan,
        );
        policies.insert(("".to_string(), "Pod".to_string()), DeletionPropagation::Background);
        policies.insert(("batch".to_string(), "Job".to_string()), DeletionPropagation::Orphan);
        Self { policies }
    }
}

impl ImmutableChangeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, group: impl Into<String>, kind: impl Into<String>, policy: DeletionPropagation) {
        self.policies.insert((group.into(), kind.into()), policy);
    }

    pub fn get(&self, group: &str, kind: &str) -> Option<DeletionPropagation> {
        self.policies.get(&(group.to_string(), kind.to_string())).copied()
    }
}

/// Whether a server-side-apply dry-run's HTTP 422 response is an
/// immutable-field rejection. `kube::Error::Api`'s `ErrorResponse` carries no
/// structured `details.causes` field, so this matches the two known message
/// signatures directly on the status message text (`SPEC_FULL.md` §4.4).
pub fn is_immutable_field_rejection(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("field is immutable")
        || ((lower.contains("updates to") || lower.contains("pod updates")) && lower.contains("forbidden"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_matches_spec_entries() {
        let table = ImmutableChangeTable::default();
        assert_eq!(table.get("apps", "StatefulSet"), Some(DeletionPropagation::Orphan));
        assert_eq!(table.get("apps", "DaemonSet"), Some(DeletionPropagation::Background));
        assert_eq!(table.get("", "Pod"), Some(DeletionPropagation::Background));
        assert_eq!(table.get("batch", "Job"), Some(DeletionPropagation::Orphan));
        assert_eq!(table.get("example.com", "Widget"), None);
    }

    #[test]
    fn callers_can_override_an_entry() {
        let mut table = ImmutableChangeTable::default();
        table.set("apps", "Deployment", DeletionPropagation::Background);
        assert_eq!(table.get("apps", "Deployment"), Some(DeletionPropagation::Background));
    }

    #[test]
    fn detects_field_is_immutable_signature() {
        assert!(is_immutable_field_rejection(
            "StatefulSet.apps \"sts1\" is invalid: spec: Forbidden: updates to statefulset spec for fields other than 'replicas', 'template', and 'updateStrategy' are forbidden, field is immutable"
        ));
    }

    #[test]
    fn detects_pod_updates_forbidden_signature() {
        assert!(is_immutable_field_rejection(
            "Pod \"p1\" is invalid: spec: Forbidden: pod updates may not change fields other than..."
        ));
    }

    #[test]
    fn unrelated_message_is_not_a_match() {
        assert!(!is_immutable_field_rejection("spec.replicas: Invalid value: -1: must be >= 0"));
    }
}
