//! The schema registry: builds `ResourceDef`s from a cluster's OpenAPI
//! document and from dynamically-added CRDs, and validates manifests against
//! them (`SPEC_FULL.md` §4.1).

use std::collections::HashMap;

use kubernator_core::ResourceDefKey;
use regex::Regex;
use serde_json::{json, Value as JsonValue};

use crate::error::{KubeError, Result};

/// A compiled handle to a (group, version, kind): its OpenAPI schema,
/// pluralization, scope, and whether it came from a CRD.
#[derive(Debug, Clone)]
pub struct ResourceDef {
    pub key: ResourceDefKey,
    pub schema: JsonValue,
    pub singular: String,
    pub plural: String,
    pub namespaced: bool,
    pub custom: bool,
}

impl ResourceDef {
    pub fn api_version(&self) -> String {
        self.key.api_version()
    }
}

fn cluster_scoped_regex() -> Regex {
    Regex::new(r"^/apis?/(?:[^/]+/){1,2}([^/]+)$").expect("static regex")
}

fn namespaced_regex() -> Regex {
    Regex::new(r"^/apis?/(?:[^/]+/){1,2}namespaces/[^/]+/([^/]+)$").expect("static regex")
}

/// Accepts either a single `{group,version,kind}` object (as found on path
/// actions) or an array of them (as found on `definitions` entries, since one
/// schema can in principle back more than one GVK).
fn parse_gvk_list(value: &JsonValue) -> Vec<ResourceDefKey> {
    let items: Vec<&JsonValue> = match value {
        JsonValue::Array(items) => items.iter().collect(),
        single => vec![single],
    };
    items
        .into_iter()
        .filter_map(|item| {
            let group = item.get("group")?.as_str()?.to_string();
            let version = item.get("version")?.as_str()?.to_string();
            let kind = item.get("kind")?.as_str()?.to_string();
            Some(ResourceDefKey::new(group, version, kind))
        })
        .collect()
}

fn resolve_plural_namespaced(
    key: &ResourceDefKey,
    gvk_paths: &HashMap<ResourceDefKey, Vec<String>>,
) -> Option<(String, bool)> {
    let paths = gvk_paths.get(key)?;
    let namespaced_re = namespaced_regex();
    for path in paths {
        if let Some(caps) = namespaced_re.captures(path) {
            return Some((caps[1].to_string(), true));
        }
    }
    let cluster_re = cluster_scoped_regex();
    for path in paths {
        if let Some(caps) = cluster_re.captures(path) {
            return Some((caps[1].to_string(), false));
        }
    }
    None
}

/// `ResourceDefKey → ResourceDef`, built once from the cluster's OpenAPI
/// document and mutated as CRDs are discovered during the walk.
#[derive(Debug, Default, Clone)]
pub struct SchemaRegistry {
    defs: HashMap<ResourceDefKey, ResourceDef>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from a `swagger.json`-shaped OpenAPI v2 document:
    /// unify `x-kubernetes-group-version-kind` across `paths` actions to
    /// learn plural/namespaced-ness via REST path shape, then pair that with
    /// the schema carried by each `definitions` entry exposing the same
    /// extension (`SPEC_FULL.md` §4.1, steps 1-2).
    pub fn from_openapi(doc: &JsonValue) -> Result<Self> {
        let mut gvk_paths: HashMap<ResourceDefKey, Vec<String>> = HashMap::new();

        if let Some(paths) = doc.get("paths").and_then(JsonValue::as_object) {
            for (path, actions) in paths {
                let Some(actions) = actions.as_object() else {
                    continue;
                };
                for (verb, action) in actions {
                    if verb == "parameters" {
                        continue;
                    }
                    let Some(gvk_value) = action.get("x-kubernetes-group-version-kind") else {
                        continue;
                    };
                    for key in parse_gvk_list(gvk_value) {
                        gvk_paths.entry(key).or_default().push(path.clone());
                    }
                }
            }
        }

        let mut defs = HashMap::new();
        if let Some(definitions) = doc.get("definitions").and_then(JsonValue::as_object) {
            for def_schema in definitions.values() {
                let Some(gvk_value) = def_schema.get("x-kubernetes-group-version-kind") else {
                    continue;
                };
                for key in parse_gvk_list(gvk_value) {
                    let (plural, namespaced) = if key.kind == "Namespace" && key.group.is_empty() {
                        ("namespaces".to_string(), false)
                    } else {
                        resolve_plural_namespaced(&key, &gvk_paths).unwrap_or_else(|| {
                            (format!("{}s", key.kind.to_lowercase()), true)
                        })
                    };
                    let singular = key.kind.to_lowercase();
                    defs.insert(
                        key.clone(),
                        ResourceDef {
                            key,
                            schema: def_schema.clone(),
                            singular,
                            plural,
                            namespaced,
                            custom: false,
                        },
                    );
                }
            }
        }

        Ok(Self { defs })
    }

    /// Register one `ResourceDef` per `spec.versions[]` of a CRD manifest
    /// (`SPEC_FULL.md` §4.1, step 3). Reads the schema from
    /// `versions[].schema.openAPIV3Schema` (v1) falling back to
    /// `spec.validation.openAPIV3Schema` (v1beta1, shared across versions).
    pub fn add_crd(&mut self, crd: &JsonValue, source: &str) -> Result<Vec<ResourceDefKey>> {
        let missing = |field: &str| KubeError::InvalidCrd {
            source: source.to_string(),
            field: field.to_string(),
        };
        let spec = crd.get("spec").ok_or_else(|| missing("spec"))?;
        let group = spec
            .get("group")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| missing("spec.group"))?
            .to_string();
        let names = spec.get("names").ok_or_else(|| missing("spec.names"))?;
        let kind = names
            .get("kind")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| missing("spec.names.kind"))?
            .to_string();
        let plural = names
            .get("plural")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| missing("spec.names.plural"))?
            .to_string();
        let singular = names
            .get("singular")
            .and_then(JsonValue::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| kind.to_lowercase());
        // Open question (SPEC_FULL.md §9/DESIGN.md): trusted directly from the
        // manifest rather than cross-checked against the server.
        let namespaced = spec
            .get("scope")
            .and_then(JsonValue::as_str)
            .map(|s| s != "Cluster")
            .unwrap_or(true);
        let fallback_schema = spec
            .get("validation")
            .and_then(|v| v.get("openAPIV3Schema"))
            .cloned();

        let versions = spec
            .get("versions")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| missing("spec.versions"))?;

        let mut keys = Vec::with_capacity(versions.len());
        for version in versions {
            let version_name = version
                .get("name")
                .and_then(JsonValue::as_str)
                .ok_or_else(|| missing("spec.versions[].name"))?
                .to_string();
            let schema = version
                .get("schema")
                .and_then(|s| s.get("openAPIV3Schema"))
                .cloned()
                .or_else(|| fallback_schema.clone())
                .unwrap_or_else(|| json!({}));
            let key = ResourceDefKey::new(group.clone(), version_name, kind.clone());
            self.defs.insert(
                key.clone(),
                ResourceDef {
                    key: key.clone(),
                    schema,
                    singular: singular.clone(),
                    plural: plural.clone(),
                    namespaced,
                    custom: true,
                },
            );
            keys.push(key);
        }
        Ok(keys)
    }

    pub fn get(&self, key: &ResourceDefKey) -> Option<&ResourceDef> {
        self.defs.get(key)
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Validate a manifest against its `ResourceDef`'s OpenAPI schema, with
    /// the `int-or-string`/`byte`/`int32`/`int64`/`float`/`double` extensions
    /// from `SPEC_FULL.md` §4.1 layered on top of structural validation.
    pub fn validate(&self, manifest: &JsonValue, rdef: &ResourceDef, source: &str) -> Result<()> {
        if rdef.schema.as_object().map(|o| o.is_empty()).unwrap_or(true) {
            return Ok(());
        }

        let preprocessed = rewrite_int_or_string(&rdef.schema);
        let validator = jsonschema::validator_for(&preprocessed)
            .map_err(|e| KubeError::MalformedOpenApi(e.to_string()))?;

        let mut errors: Vec<String> = validator.iter_errors(manifest).map(|e| e.to_string()).collect();
        check_extension_formats(&rdef.schema, manifest, "", &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(KubeError::SchemaValidation {
                source: source.to_string(),
                errors,
            })
        }
    }
}

/// `x-kubernetes-int-or-string: true` fields carry no `type` the validator
/// can check structurally; rewrite them into an explicit `anyOf` so plain
/// JSON-Schema validation accepts either shape (`SPEC_FULL.md` §4.1).
fn rewrite_int_or_string(schema: &JsonValue) -> JsonValue {
    match schema {
        JsonValue::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), rewrite_int_or_string(v));
            }
            if out.get("x-kubernetes-int-or-string").and_then(JsonValue::as_bool) == Some(true) {
                out.remove("type");
                out.insert(
                    "anyOf".to_string(),
                    json!([{ "type": "string" }, { "type": "integer" }]),
                );
            }
            JsonValue::Object(out)
        }
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(rewrite_int_or_string).collect()),
        other => other.clone(),
    }
}

/// Walk `schema` and `instance` together, applying the OpenAPI numeric/byte
/// format extensions plain JSON-Schema has no opinion on. Plain JSON-Schema
/// `format` validation only fires when the instance is the format's native
/// type anyway, so a schema/instance type mismatch here is left for the
/// structural validator above to report.
fn check_extension_formats(schema: &JsonValue, instance: &JsonValue, path: &str, errors: &mut Vec<String>) {
    let Some(obj) = schema.as_object() else {
        return;
    };
    if let Some(format) = obj.get("format").and_then(JsonValue::as_str) {
        if let Some(message) = format_violation(format, instance) {
            errors.push(format!("{path}: {message}"));
        }
    }
    if let (Some(props), Some(inst_obj)) = (obj.get("properties").and_then(JsonValue::as_object), instance.as_object())
    {
        for (field, sub_schema) in props {
            if let Some(value) = inst_obj.get(field) {
                check_extension_formats(sub_schema, value, &format!("{path}/{field}"), errors);
            }
        }
    }
    if let (Some(items_schema), Some(items)) = (obj.get("items"), instance.as_array()) {
        for (i, item) in items.iter().enumerate() {
            check_extension_formats(items_schema, item, &format!("{path}[{i}]"), errors);
        }
    }
}

fn format_violation(format: &str, value: &JsonValue) -> Option<String> {
    use base64::Engine;
    match format {
        "byte" => {
            let s = value.as_str()?;
            base64::engine::general_purpose::STANDARD
                .decode(s)
                .err()
                .map(|_| format!("`{s}` is not valid base64 (format: byte)"))
        }
        "int32" => {
            let n = value.as_i64()?;
            (!(i32::MIN as i64..=i32::MAX as i64).contains(&n)).then(|| format!("{n} is out of int32 range"))
        }
        "int64" => value.as_i64().is_none().then(|| format!("{value} is not a valid int64")),
        "float" => {
            let f = value.as_f64()?;
            (f.is_finite() && f.abs() > f32::MAX as f64).then(|| format!("{f} is out of float32 range"))
        }
        // f64 already covers every JSON number; nothing further to enforce.
        "double" => None,
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_openapi() -> JsonValue {
        json!({
            "paths": {
                "/api/v1/namespaces/{namespace}/configmaps": {
                    "get": {
                        "x-kubernetes-group-version-kind": { "group": "", "version": "v1", "kind": "ConfigMap" }
                    }
                },
                "/apis/apps/v1/namespaces/{namespace}/deployments": {
                    "get": {
                        "x-kubernetes-group-version-kind": { "group": "apps", "version": "v1", "kind": "Deployment" }
                    }
                },
                "/api/v1/namespaces": {
                    "get": {
                        "x-kubernetes-group-version-kind": { "group": "", "version": "v1", "kind": "Namespace" }
                    }
                }
            },
            "definitions": {
                "io.k8s.api.core.v1.ConfigMap": {
                    "type": "object",
                    "required": ["metadata"],
                    "properties": { "metadata": { "type": "object" } },
                    "x-kubernetes-group-version-kind": [{ "group": "", "version": "v1", "kind": "ConfigMap" }]
                },
                "io.k8s.api.apps.v1.Deployment": {
                    "type": "object",
                    "x-kubernetes-group-version-kind": [{ "group": "apps", "version": "v1", "kind": "Deployment" }]
                }
            }
        })
    }

    #[test]
    fn builds_namespaced_and_plural_from_paths() {
        let registry = SchemaRegistry::from_openapi(&sample_openapi()).unwrap();
        let cm = registry.get(&ResourceDefKey::new("", "v1", "ConfigMap")).unwrap();
        assert!(cm.namespaced);
        assert_eq!(cm.plural, "configmaps");

        let deploy = registry.get(&ResourceDefKey::new("apps", "v1", "Deployment")).unwrap();
        assert!(deploy.namespaced);
        assert_eq!(deploy.plural, "deployments");
    }

    #[test]
    fn adds_crd_per_version() {
        let mut registry = SchemaRegistry::new();
        let crd = json!({
            "spec": {
                "group": "example.com",
                "scope": "Namespaced",
                "names": { "kind": "Widget", "plural": "widgets" },
                "versions": [
                    { "name": "v1", "schema": { "openAPIV3Schema": { "type": "object" } } }
                ]
            }
        });
        let keys = registry.add_crd(&crd, "widgets-crd.yaml").unwrap();
        assert_eq!(keys.len(), 1);
        let rdef = registry.get(&keys[0]).unwrap();
        assert_eq!(rdef.plural, "widgets");
        assert!(rdef.custom);
        assert!(rdef.namespaced);
    }

    #[test]
    fn validate_reports_missing_required_field() {
        let registry = SchemaRegistry::from_openapi(&sample_openapi()).unwrap();
        let cm = registry.get(&ResourceDefKey::new("", "v1", "ConfigMap")).unwrap();
        let bad = json!({ "apiVersion": "v1", "kind": "ConfigMap" });
        let err = registry.validate(&bad, cm, "cm.yaml").unwrap_err();
        assert!(matches!(err, KubeError::SchemaValidation { .. }));
    }

    #[test]
    fn int_or_string_accepts_both_shapes() {
        let mut registry = SchemaRegistry::new();
        let crd = json!({
            "spec": {
                "group": "example.com",
                "scope": "Namespaced",
                "names": { "kind": "Widget", "plural": "widgets" },
                "versions": [{
                    "name": "v1",
                    "schema": { "openAPIV3Schema": {
                        "type": "object",
                        "properties": {
                            "spec": {
                                "type": "object",
                                "properties": {
                                    "port": { "x-kubernetes-int-or-string": true }
                                }
                            }
                        }
                    }}
                }]
            }
        });
        let keys = registry.add_crd(&crd, "widgets-crd.yaml").unwrap();
        let rdef = registry.get(&keys[0]).unwrap();

        let numeric = json!({ "spec": { "port": 8080 } });
        registry.validate(&numeric, rdef, "w1.yaml").unwrap();
        let stringy = json!({ "spec": { "port": "http" } });
        registry.validate(&stringy, rdef, "w1.yaml").unwrap();
    }

    #[test]
    fn byte_format_rejects_non_base64() {
        let mut registry = SchemaRegistry::new();
        let crd = json!({
            "spec": {
                "group": "example.com",
                "scope": "Namespaced",
                "names": { "kind": "Widget", "plural": "widgets" },
                "versions": [{
                    "name": "v1",
                    "schema": { "openAPIV3Schema": {
                        "type": "object",
                        "properties": {
                            "data": { "type": "string", "format": "byte" }
                        }
                    }}
                }]
            }
        });
        let keys = registry.add_crd(&crd, "widgets-crd.yaml").unwrap();
        let rdef = registry.get(&keys[0]).unwrap();
        let bad = json!({ "data": "not base64!!" });
        let err = registry.validate(&bad, rdef, "w1.yaml").unwrap_err();
        assert!(matches!(err, KubeError::SchemaValidation { .. }));
    }
}
