//! A hierarchical, copy-on-write property tree used to carry configuration down the
//! directory walk.
//!
//! Each directory gets its own `Frame`, chained to its parent. Reading a property walks
//! up the chain until a frame defines it; writing always lands in the innermost frame,
//! so a child's changes never leak back to its parent or siblings. List-valued
//! properties are additionally copy-on-write at the value level: `list_mut` clones the
//! nearest ancestor's list into the local frame on first mutation, so `extend`-style
//! calls on a child don't mutate the parent's list in place.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::RwLock;

use serde_json::Value as JsonValue;

/// A single property value held directly in a frame (as opposed to inherited).
#[derive(Debug, Clone)]
pub enum Value {
    Scalar(JsonValue),
    List(Vec<JsonValue>),
    /// A mapping-valued property, itself a nested context frame parented on
    /// the corresponding attribute in the ancestor chain (`SPEC_FULL.md`
    /// §4.6): reads of keys the child never set fall through to the parent's
    /// nested frame, and mutations stay local, the same copy-on-write
    /// contract as scalars and lists.
    Map(Context),
}

impl Value {
    pub fn as_scalar(&self) -> Option<&JsonValue> {
        match self {
            Value::Scalar(v) => Some(v),
            Value::List(_) | Value::Map(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[JsonValue]> {
        match self {
            Value::List(items) => Some(items),
            Value::Scalar(_) | Value::Map(_) => None,
        }
    }

    pub fn as_map(&self) -> Option<&Context> {
        match self {
            Value::Map(ctx) => Some(ctx),
            Value::Scalar(_) | Value::List(_) => None,
        }
    }
}

#[derive(Debug, Default)]
struct FrameData {
    values: HashMap<String, Value>,
}

/// One node of the context tree. Cheap to clone: cloning a `Context` shares the parent
/// chain and only the local frame's `RwLock` contents differ between clones.
#[derive(Debug, Clone)]
pub struct Context {
    parent: Option<Rc<Context>>,
    frame: Rc<RwLock<FrameData>>,
}

impl Default for Context {
    fn default() -> Self {
        Self::root()
    }
}

impl Context {
    /// A context with no parent; the root of a walk.
    pub fn root() -> Self {
        Self {
            parent: None,
            frame: Rc::new(RwLock::new(FrameData::default())),
        }
    }

    /// Derive a child frame. The child starts empty; reads fall through to `self`
    /// until a local value is set.
    pub fn child(self: &Rc<Self>) -> Self {
        Self {
            parent: Some(Rc::clone(self)),
            frame: Rc::new(RwLock::new(FrameData::default())),
        }
    }

    /// Read a property, walking up the parent chain if not set locally.
    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.frame.read().expect("context lock poisoned").values.get(key) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|p| p.get(key))
    }

    pub fn get_scalar(&self, key: &str) -> Option<JsonValue> {
        self.get(key).and_then(|v| match v {
            Value::Scalar(json) => Some(json),
            Value::List(_) | Value::Map(_) => None,
        })
    }

    /// Write a scalar property into the local frame, shadowing any ancestor value.
    pub fn set(&self, key: impl Into<String>, value: JsonValue) {
        self.frame
            .write()
            .expect("context lock poisoned")
            .values
            .insert(key.into(), Value::Scalar(value));
    }

    /// Read a list property as a plain copy, resolving through the parent chain.
    pub fn get_list(&self, key: &str) -> Vec<JsonValue> {
        match self.get(key) {
            Some(Value::List(items)) => items,
            _ => Vec::new(),
        }
    }

    /// Read a mapping property as a nested frame, walking the parent chain.
    pub fn get_map(&self, key: &str) -> Option<Context> {
        match self.get(key) {
            Some(Value::Map(ctx)) => Some(ctx),
            _ => None,
        }
    }

    /// Build the local frame for a mapping-valued property. The nested
    /// frame's parent is the corresponding nested frame in the ancestor
    /// chain, if one exists (`SPEC_FULL.md` §4.6), so keys the child never
    /// overrides still fall through; keys the child does set land in the
    /// nested frame only, leaving the ancestor's mapping untouched.
    pub fn set_map(&self, key: impl Into<String>, map: &serde_json::Map<String, JsonValue>) -> Context {
        let key = key.into();
        let parent = self.parent.as_ref().and_then(|p| p.get_map(&key)).map(Rc::new);
        let nested = Context {
            parent,
            frame: Rc::new(RwLock::new(FrameData::default())),
        };
        for (k, v) in map {
            nested.set_json(k.clone(), v.clone());
        }
        self.frame
            .write()
            .expect("context lock poisoned")
            .values
            .insert(key, Value::Map(nested.clone()));
        nested
    }

    /// Assign an arbitrary JSON value to a property: objects become nested
    /// map frames (recursively), arrays become copy-on-write lists, and
    /// everything else is a plain scalar.
    pub fn set_json(&self, key: impl Into<String>, value: JsonValue) {
        let key = key.into();
        match value {
            JsonValue::Object(map) => {
                self.set_map(key, &map);
            }
            JsonValue::Array(items) => {
                self.frame
                    .write()
                    .expect("context lock poisoned")
                    .values
                    .insert(key, Value::List(items));
            }
            other => self.set(key, other),
        }
    }

    /// Append items to a list property. If the list isn't already local, it is first
    /// copied down from the nearest ancestor that defines it (or started empty), then
    /// extended locally — the ancestor's list is left untouched.
    pub fn extend_list(&self, key: &str, items: impl IntoIterator<Item = JsonValue>) {
        let mut frame = self.frame.write().expect("context lock poisoned");
        if !frame.values.contains_key(key) {
            let inherited = match self.parent.as_ref().and_then(|p| p.get(key)) {
                Some(Value::List(items)) => items,
                _ => Vec::new(),
            };
            frame.values.insert(key.to_string(), Value::List(inherited));
        }
        match frame.values.get_mut(key).expect("just inserted or already present") {
            Value::List(local) => local.extend(items),
            other => *other = Value::List(items.into_iter().collect()),
        }
    }

    /// Materialize the local-frame-and-ancestors as a single flat map, innermost wins.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        let mut out = self
            .parent
            .as_ref()
            .map(|p| p.snapshot())
            .unwrap_or_default();
        out.extend(
            self.frame
                .read()
                .expect("context lock poisoned")
                .values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn child_reads_fall_through_to_parent() {
        let root = Rc::new(Context::root());
        root.set("namespace", json!("default"));
        let child = Rc::new(root.child());
        assert_eq!(child.get_scalar("namespace"), Some(json!("default")));
    }

    #[test]
    fn child_write_does_not_leak_to_parent() {
        let root = Rc::new(Context::root());
        root.set("namespace", json!("default"));
        let child = Rc::new(root.child());
        child.set("namespace", json!("team-a"));
        assert_eq!(child.get_scalar("namespace"), Some(json!("team-a")));
        assert_eq!(root.get_scalar("namespace"), Some(json!("default")));
    }

    #[test]
    fn list_extend_copies_on_write() {
        let root = Rc::new(Context::root());
        root.extend_list("includes", [json!("*.yaml")]);
        let child = Rc::new(root.child());
        child.extend_list("includes", [json!("*.yml")]);

        assert_eq!(root.get_list("includes"), vec![json!("*.yaml")]);
        assert_eq!(
            child.get_list("includes"),
            vec![json!("*.yaml"), json!("*.yml")]
        );
    }

    #[test]
    fn sibling_frames_are_independent() {
        let root = Rc::new(Context::root());
        root.extend_list("includes", [json!("*.yaml")]);
        let a = Rc::new(root.child());
        let b = Rc::new(root.child());
        a.extend_list("includes", [json!("a-only.yaml")]);

        assert_eq!(a.get_list("includes"), vec![json!("*.yaml"), json!("a-only.yaml")]);
        assert_eq!(b.get_list("includes"), vec![json!("*.yaml")]);
    }

    #[test]
    fn snapshot_flattens_with_innermost_precedence() {
        let root = Rc::new(Context::root());
        root.set("a", json!(1));
        root.set("b", json!(2));
        let child = Rc::new(root.child());
        child.set("b", json!(3));

        let snap = child.snapshot();
        assert_eq!(snap.get("a").unwrap().as_scalar(), Some(&json!(1)));
        assert_eq!(snap.get("b").unwrap().as_scalar(), Some(&json!(3)));
    }

    #[test]
    fn nested_map_inherits_unset_sibling_keys_from_parent() {
        let root = Rc::new(Context::root());
        root.set_json("k8s", json!({"includes": ["*.yaml"]}));
        let child = Rc::new(root.child());
        child.set_json("k8s", json!({"excludes": ["secret.yaml"]}));

        let child_k8s = child.get_map("k8s").unwrap();
        assert_eq!(child_k8s.get_list("includes"), vec![json!("*.yaml")]);
        assert_eq!(child_k8s.get_list("excludes"), vec![json!("secret.yaml")]);

        let root_k8s = root.get_map("k8s").unwrap();
        assert!(root_k8s.get_list("excludes").is_empty());
    }

    #[test]
    fn nested_map_write_does_not_leak_to_parent() {
        let root = Rc::new(Context::root());
        root.set_json("k8s", json!({"includes": ["*.yaml"]}));
        let child = Rc::new(root.child());
        // Establishing the child's own "k8s" frame (e.g. because the child
        // directory's script also assigns under "k8s") is what triggers the
        // copy-on-write promotion; the resulting frame still inherits
        // "includes" from the parent's frame via the parent-chain lookup.
        let child_k8s = child.set_map("k8s", &serde_json::Map::new());
        child_k8s.extend_list("includes", [json!("*.yml")]);

        assert_eq!(
            child.get_map("k8s").unwrap().get_list("includes"),
            vec![json!("*.yaml"), json!("*.yml")]
        );
        assert_eq!(root.get_map("k8s").unwrap().get_list("includes"), vec![json!("*.yaml")]);
    }
}
