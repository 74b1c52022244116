//! The in-tree script contract: `.kubernator.yaml`, a declarative stand-in for
//! the original tool's `exec()`-injected Python script.
//!
//! A script can register plugins (by name, with a config block passed through
//! to the plugin's factory) and assign values into the directory's context
//! frame (`globals`), which descendant directories then inherit through the
//! context tree's normal parent-chain lookup.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::error::{Result, WalkError};

pub const SCRIPT_FILE_NAME: &str = ".kubernator.yaml";

#[derive(Debug, Clone, Deserialize)]
pub struct PluginRegistration {
    pub name: String,
    #[serde(default)]
    pub config: JsonValue,
}

/// The parsed contents of a `.kubernator.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirScript {
    #[serde(default)]
    pub plugins: Vec<PluginRegistration>,
    #[serde(default)]
    pub globals: JsonValue,
}

/// Load and parse the script at `dir`'s `.kubernator.yaml`, if present.
pub fn load(dir: &Path) -> Result<Option<DirScript>> {
    let path = dir.join(SCRIPT_FILE_NAME);
    if !path.is_file() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(&path)?;
    let script: DirScript = serde_yaml::from_str(&text).map_err(|source| WalkError::ScriptParse {
        path: path.display().to_string(),
        source,
    })?;
    Ok(Some(script))
}

/// Apply a script's `globals` block into the directory's context frame, one
/// write per top-level key. A mapping value becomes a nested context frame
/// parented on the corresponding attribute in the ancestor chain, so a
/// child directory's `globals: {k8s: {excludes: [...]}}` inherits sibling
/// keys (e.g. `includes`) a parent directory set under the same `k8s` key
/// instead of shadowing the whole mapping (`SPEC_FULL.md` §4.6).
pub fn apply_globals(ctx: &kubernator_core::Context, globals: &JsonValue) {
    if let JsonValue::Object(map) = globals {
        for (key, value) in map {
            ctx.set_json(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_script_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn parses_plugins_and_globals() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(SCRIPT_FILE_NAME),
            r#"
plugins:
  - name: k8s
    config:
      namespace: team-a
globals:
  output_format: yaml
"#,
        )
        .unwrap();

        let script = load(dir.path()).unwrap().unwrap();
        assert_eq!(script.plugins.len(), 1);
        assert_eq!(script.plugins[0].name, "k8s");
        assert_eq!(
            script.plugins[0].config.get("namespace").and_then(|v| v.as_str()),
            Some("team-a")
        );
        assert_eq!(
            script.globals.get("output_format").and_then(|v| v.as_str()),
            Some("yaml")
        );
    }

    #[test]
    fn apply_globals_nests_mapping_values_as_child_frames() {
        use std::rc::Rc;

        let root = Rc::new(kubernator_core::Context::root());
        apply_globals(&root, &json!({"k8s": {"includes": ["*.yaml"]}}));
        let child = Rc::new(root.child());
        apply_globals(&child, &json!({"k8s": {"excludes": ["secret.yaml"]}}));

        let child_k8s = child.get_map("k8s").unwrap();
        assert_eq!(child_k8s.get_list("includes"), vec![JsonValue::String("*.yaml".into())]);
        assert_eq!(child_k8s.get_list("excludes"), vec![JsonValue::String("secret.yaml".into())]);
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SCRIPT_FILE_NAME), "not: [valid").unwrap();
        let err = load(dir.path()).unwrap_err();
        assert!(matches!(err, WalkError::ScriptParse { .. }));
    }
}
