//! JSON Patch diff generation between a live object and the post-instruction
//! merged form, with the exclusion filter from `SPEC_FULL.md` §4.4.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;

/// Paths the diff never surfaces: fields the server owns or mutates on every
/// read (`managedFields`, `generation`, `creationTimestamp`, `resourceVersion`).
static EXCLUDED_PATHS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^/metadata/managedFields",
        r"^/metadata/generation",
        r"^/metadata/creationTimestamp",
        r"^/metadata/resourceVersion",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static regex"))
    .collect()
});

fn is_excluded(path: &str) -> bool {
    EXCLUDED_PATHS.iter().any(|re| re.is_match(path))
}

fn op_path(op: &json_patch::PatchOperation) -> String {
    use json_patch::PatchOperation::*;
    match op {
        Add(o) => o.path.to_string(),
        Remove(o) => o.path.to_string(),
        Replace(o) => o.path.to_string(),
        Move(o) => o.path.to_string(),
        Copy(o) => o.path.to_string(),
        Test(o) => o.path.to_string(),
    }
}

/// Diff `live` against `desired`, dropping any operation whose path matches
/// the exclusion set. Returns `None` when nothing remains to patch.
pub fn diff(live: &JsonValue, desired: &JsonValue) -> Option<json_patch::Patch> {
    let json_patch::Patch(ops) = json_patch::diff(live, desired);
    let filtered: Vec<_> = ops.into_iter().filter(|op| !is_excluded(&op_path(op))).collect();
    if filtered.is_empty() {
        None
    } else {
        Some(json_patch::Patch(filtered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn no_diff_when_objects_are_equal() {
        let a = json!({"metadata": {"name": "x"}, "spec": {"replicas": 1}});
        assert!(diff(&a, &a).is_none());
    }

    #[test]
    fn diff_reports_changed_field() {
        let live = json!({"spec": {"replicas": 1}});
        let desired = json!({"spec": {"replicas": 3}});
        let patch = diff(&live, &desired).unwrap();
        assert_eq!(patch.0.len(), 1);
    }

    #[test]
    fn excludes_managed_fields_generation_and_resource_version() {
        let live = json!({
            "metadata": {
                "managedFields": [{"manager": "kubectl"}],
                "generation": 1,
                "resourceVersion": "100",
                "creationTimestamp": "2024-01-01T00:00:00Z"
            },
            "spec": {"replicas": 1}
        });
        let desired = json!({
            "metadata": {
                "managedFields": [{"manager": "kubernator"}],
                "generation": 2,
                "resourceVersion": "101",
                "creationTimestamp": "2024-01-02T00:00:00Z"
            },
            "spec": {"replicas": 1}
        });
        assert!(diff(&live, &desired).is_none());
    }

    #[test]
    fn mixed_diff_keeps_only_non_excluded_ops() {
        let live = json!({"metadata": {"generation": 1}, "spec": {"replicas": 1}});
        let desired = json!({"metadata": {"generation": 2}, "spec": {"replicas": 5}});
        let patch = diff(&live, &desired).unwrap();
        assert_eq!(patch.0.len(), 1);
        assert_eq!(op_path(&patch.0[0]), "/spec/replicas");
    }
}
