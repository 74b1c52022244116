//! The strategic-merge instruction processor: extracts `$patch`/
//! `$deleteFromPrimitiveList/<field>` directives from a manifest into a typed
//! IR, then replays them against a server-merged copy (`SPEC_FULL.md` §4.3,
//! §9's re-architecture note).

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

pub type Path = Vec<String>;

/// A single extracted directive, addressed by the dotted-key path it was
/// found at in the source manifest.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// `$patch: replace` on a dict-valued field: the field's post-extraction
    /// value (its siblings, directive stripped) replaces whatever is at that
    /// path in the merged object.
    ReplaceMap(Path),
    /// `$patch: delete` on a dict-valued field (not a list item): nulls the
    /// field in the merged object.
    DeleteMap(Path),
    /// `$patch: delete` on an item of a list of maps: removes entries of the
    /// list at `Path` whose fields match every key/value pair in the map.
    DeleteListByKey(Path, BTreeMap<String, JsonValue>),
    /// `$deleteFromPrimitiveList/<field>: [...]`: removes the given scalar
    /// values from the primitive list at `Path`.
    DeletePrimitive(Path, Vec<JsonValue>),
}

const PATCH_KEY: &str = "$patch";
const DELETE_PRIMITIVE_PREFIX: &str = "$deleteFromPrimitiveList/";

/// Extract and strip merge instructions from `manifest`, returning them
/// alongside the normalized manifest (`SPEC_FULL.md` §8: the normalized
/// manifest contains no `$patch` key and no `$deleteFromPrimitiveList/*` key
/// anywhere in its tree).
pub fn extract(manifest: &JsonValue) -> (Vec<Instruction>, JsonValue) {
    let mut instructions = Vec::new();
    let mut path = Vec::new();
    let normalized = walk(manifest, &mut path, &mut instructions, false);
    (instructions, normalized)
}

fn walk(value: &JsonValue, path: &mut Path, out: &mut Vec<Instruction>, in_list_item: bool) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let mut replace_here = false;
            let mut delete_here = false;
            let mut delete_primitive: Vec<(String, Vec<JsonValue>)> = Vec::new();

            for (k, v) in map {
                if k == PATCH_KEY {
                    match v.as_str() {
                        Some("replace") => replace_here = true,
                        Some("delete") => delete_here = true,
                        _ => {}
                    }
                } else if let Some(field) = k.strip_prefix(DELETE_PRIMITIVE_PREFIX) {
                    if let Some(values) = v.as_array() {
                        delete_primitive.push((field.to_string(), values.clone()));
                    }
                }
            }

            let mut new_map = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                if k == PATCH_KEY || k.starts_with(DELETE_PRIMITIVE_PREFIX) {
                    continue;
                }
                path.push(k.clone());
                let normalized_v = walk(v, path, out, false);
                path.pop();
                new_map.insert(k.clone(), normalized_v);
            }

            if replace_here {
                out.push(Instruction::ReplaceMap(path.clone()));
            }
            if delete_here {
                if in_list_item {
                    let fields: BTreeMap<String, JsonValue> = new_map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                    out.push(Instruction::DeleteListByKey(path.clone(), fields));
                } else {
                    out.push(Instruction::DeleteMap(path.clone()));
                }
            }
            for (field, values) in delete_primitive {
                let mut field_path = path.clone();
                field_path.push(field);
                out.push(Instruction::DeletePrimitive(field_path, values));
            }

            JsonValue::Object(new_map)
        }
        JsonValue::Array(items) => {
            JsonValue::Array(items.iter().map(|item| walk(item, path, out, true)).collect())
        }
        other => other.clone(),
    }
}

fn get_path<'a>(root: &'a JsonValue, path: &[String]) -> Option<&'a JsonValue> {
    let mut current = root;
    for segment in path {
        current = current.get(segment)?;
    }
    Some(current)
}

fn get_path_mut<'a>(root: &'a mut JsonValue, path: &[String]) -> Option<&'a mut JsonValue> {
    let mut current = root;
    for segment in path {
        current = current.get_mut(segment)?;
    }
    Some(current)
}

fn set_path(root: &mut JsonValue, path: &[String], value: JsonValue) {
    let Some((last, ancestors)) = path.split_last() else {
        return;
    };
    let mut current = root;
    for segment in ancestors {
        if !current.is_object() {
            *current = JsonValue::Object(serde_json::Map::new());
        }
        current = current
            .as_object_mut()
            .expect("just ensured object")
            .entry(segment.clone())
            .or_insert(JsonValue::Null);
    }
    if !current.is_object() {
        *current = JsonValue::Object(serde_json::Map::new());
    }
    current
        .as_object_mut()
        .expect("just ensured object")
        .insert(last.clone(), value);
}

/// Replay extracted instructions against the server-merged form, following
/// the ordering in `SPEC_FULL.md` §4.3: instructions run after the
/// server-side-apply dry-run so user overrides win over server defaulting.
/// Returns one warning string per value a `DeletePrimitive` instruction asked
/// to remove but didn't find.
pub fn apply_instructions(merged: &mut JsonValue, normalized_source: &JsonValue, instructions: &[Instruction]) -> Vec<String> {
    let mut warnings = Vec::new();
    for instruction in instructions {
        match instruction {
            Instruction::ReplaceMap(path) => {
                if let Some(replacement) = get_path(normalized_source, path) {
                    set_path(merged, path, replacement.clone());
                }
            }
            Instruction::DeleteMap(path) => {
                set_path(merged, path, JsonValue::Null);
            }
            Instruction::DeleteListByKey(path, fields) => {
                if let Some(JsonValue::Array(list)) = get_path_mut(merged, path) {
                    list.retain(|item| !fields.iter().all(|(k, v)| item.get(k) == Some(v)));
                }
            }
            Instruction::DeletePrimitive(path, values) => {
                if let Some(JsonValue::Array(list)) = get_path_mut(merged, path) {
                    for value in values {
                        let before = list.len();
                        list.retain(|item| item != value);
                        if list.len() == before {
                            warnings.push(format!(
                                "$deleteFromPrimitiveList: value {value} not found in list at /{}",
                                path.join("/")
                            ));
                        }
                    }
                } else {
                    for value in values {
                        warnings.push(format!(
                            "$deleteFromPrimitiveList: value {value} not found in list at /{}",
                            path.join("/")
                        ));
                    }
                }
            }
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_patch_and_delete_primitive_keys_from_normalized_manifest() {
        let manifest = json!({
            "spec": {
                "template": {
                    "$patch": "replace",
                    "metadata": { "labels": { "app": "x" } }
                },
                "ports": [8080, 9090],
                "$deleteFromPrimitiveList/ports": [9090]
            }
        });
        let (instructions, normalized) = extract(&manifest);
        let dumped = serde_json::to_string(&normalized).unwrap();
        assert!(!dumped.contains("$patch"));
        assert!(!dumped.contains("$deleteFromPrimitiveList"));
        assert_eq!(instructions.len(), 2);
    }

    #[test]
    fn replace_map_drops_merged_siblings() {
        let manifest = json!({
            "spec": { "template": { "$patch": "replace", "a": 1 } }
        });
        let (instructions, normalized) = extract(&manifest);
        let mut merged = json!({
            "spec": { "template": { "a": 1, "b": 2, "extra": true } }
        });
        let warnings = apply_instructions(&mut merged, &normalized, &instructions);
        assert!(warnings.is_empty());
        assert_eq!(merged["spec"]["template"], json!({ "a": 1 }));
    }

    #[test]
    fn delete_map_nulls_the_field() {
        let manifest = json!({ "spec": { "selector": { "$patch": "delete" } } });
        let (instructions, normalized) = extract(&manifest);
        let mut merged = json!({ "spec": { "selector": { "app": "x" } } });
        apply_instructions(&mut merged, &normalized, &instructions);
        assert_eq!(merged["spec"]["selector"], JsonValue::Null);
    }

    #[test]
    fn delete_list_by_key_matches_on_sibling_fields() {
        let manifest = json!({
            "spec": { "containers": [{ "name": "sidecar", "$patch": "delete" }] }
        });
        let (instructions, normalized) = extract(&manifest);
        let mut merged = json!({
            "spec": {
                "containers": [
                    { "name": "main", "image": "app:v1" },
                    { "name": "sidecar", "image": "proxy:v1" }
                ]
            }
        });
        apply_instructions(&mut merged, &normalized, &instructions);
        let remaining = merged["spec"]["containers"].as_array().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0]["name"], "main");
    }

    #[test]
    fn delete_from_primitive_list_removes_present_values() {
        let manifest = json!({ "spec": { "ports": [80, 443], "$deleteFromPrimitiveList/ports": [443] } });
        let (instructions, normalized) = extract(&manifest);
        let mut merged = json!({ "spec": { "ports": [80, 443, 8080] } });
        let warnings = apply_instructions(&mut merged, &normalized, &instructions);
        assert!(warnings.is_empty());
        assert_eq!(merged["spec"]["ports"], json!([80, 8080]));
    }

    #[test]
    fn delete_from_primitive_list_warns_on_missing_value() {
        let manifest = json!({ "spec": { "ports": [80], "$deleteFromPrimitiveList/ports": [9999] } });
        let (instructions, normalized) = extract(&manifest);
        let mut merged = json!({ "spec": { "ports": [80] } });
        let warnings = apply_instructions(&mut merged, &normalized, &instructions);
        assert_eq!(warnings.len(), 1);
        assert_eq!(merged["spec"]["ports"], json!([80]));
    }
}
