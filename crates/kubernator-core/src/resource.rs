//! The in-memory resource table entry: a manifest plus its derived identity and provenance.

use serde_json::Value as JsonValue;
use std::fmt;
use std::path::PathBuf;

use crate::error::{CoreError, Result};
use crate::resource_key::{ResourceDefKey, ResourceKey};

/// Where a manifest came from, surfaced in error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    File(PathBuf),
    Url(String),
    Generated {
        file: String,
        line: u32,
        function: String,
    },
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::File(path) => write!(f, "{}", path.display()),
            Source::Url(url) => write!(f, "{}", url),
            Source::Generated { file, line, function } => {
                write!(f, "file {file}, line {line} in function {function}")
            }
        }
    }
}

/// A typed wrapper over a manifest: its derived identity, a handle to its schema
/// definition, and where it came from.
#[derive(Debug, Clone)]
pub struct Resource {
    pub key: ResourceKey,
    pub manifest: JsonValue,
    pub rdef: ResourceDefKey,
    pub source: Source,
}

/// Fields every manifest must carry regardless of its OpenAPI schema.
fn minimal_fields(manifest: &JsonValue) -> Result<(String, String, String)> {
    let api_version = manifest
        .get("apiVersion")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| CoreError::MissingField {
            field: "apiVersion".into(),
        })?
        .to_string();
    let kind = manifest
        .get("kind")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| CoreError::MissingField {
            field: "kind".into(),
        })?
        .to_string();
    let name = manifest
        .pointer("/metadata/name")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| CoreError::MissingField {
            field: "metadata.name".into(),
        })?
        .to_string();
    Ok((api_version, kind, name))
}

impl Resource {
    /// Derive the identity key from a manifest, per the minimal schema
    /// `{apiVersion, kind, metadata.name}` plus an optional `metadata.namespace`.
    pub fn derive_key(manifest: &JsonValue) -> Result<ResourceKey> {
        let (api_version, kind, name) = minimal_fields(manifest)?;
        let rdef = ResourceDefKey::from_api_version(&api_version, &kind);
        let namespace = manifest
            .pointer("/metadata/namespace")
            .and_then(JsonValue::as_str)
            .map(str::to_string);
        Ok(ResourceKey::new(rdef.group, kind, name, namespace))
    }

    /// Construct a resource, validating the minimal schema and deriving its key.
    pub fn new(manifest: JsonValue, source: Source) -> Result<Self> {
        let (api_version, kind, _name) = minimal_fields(&manifest)?;
        let rdef = ResourceDefKey::from_api_version(&api_version, &kind);
        let key = Self::derive_key(&manifest)?;
        Ok(Self {
            key,
            manifest,
            rdef,
            source,
        })
    }

    /// Re-validate after a transformer ran: the manifest's derived key must still match
    /// the resource's recorded key (identity drift is a fatal error), and a namespaced
    /// kind must carry a non-empty namespace.
    pub fn revalidate(&self, namespaced: bool) -> Result<()> {
        let recomputed = Self::derive_key(&self.manifest)?;
        if recomputed != self.key {
            return Err(CoreError::IdentityDrift {
                old: self.key.to_string(),
                new: recomputed.to_string(),
            });
        }
        if namespaced && self.key.namespace.as_deref().unwrap_or("").is_empty() {
            return Err(CoreError::MissingNamespace {
                kind: self.key.kind.clone(),
                name: self.key.name.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cm() -> JsonValue {
        json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": { "name": "cm1", "namespace": "default" }
        })
    }

    #[test]
    fn derives_key_from_manifest() {
        let r = Resource::new(cm(), Source::File("cm.yaml".into())).unwrap();
        assert_eq!(r.key.kind, "ConfigMap");
        assert_eq!(r.key.name, "cm1");
        assert_eq!(r.key.namespace.as_deref(), Some("default"));
    }

    #[test]
    fn missing_name_is_rejected() {
        let bad = json!({ "apiVersion": "v1", "kind": "ConfigMap", "metadata": {} });
        let err = Resource::new(bad, Source::File("cm.yaml".into())).unwrap_err();
        assert!(matches!(err, CoreError::MissingField { .. }));
    }

    #[test]
    fn revalidate_detects_identity_drift() {
        let mut r = Resource::new(cm(), Source::File("cm.yaml".into())).unwrap();
        r.manifest["metadata"]["name"] = json!("renamed");
        let err = r.revalidate(true).unwrap_err();
        assert!(matches!(err, CoreError::IdentityDrift { .. }));
    }

    #[test]
    fn revalidate_requires_namespace_when_namespaced() {
        let manifest = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": { "name": "cm1" }
        });
        let r = Resource::new(manifest, Source::File("cm.yaml".into())).unwrap();
        let err = r.revalidate(true).unwrap_err();
        assert!(matches!(err, CoreError::MissingNamespace { .. }));
    }

    #[test]
    fn cluster_scoped_resource_has_no_namespace_requirement() {
        let manifest = json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": { "name": "team-a" }
        });
        let r = Resource::new(manifest, Source::File("ns.yaml".into())).unwrap();
        r.revalidate(false).unwrap();
    }
}
