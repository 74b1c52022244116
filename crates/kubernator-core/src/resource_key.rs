//! Identity types for Kubernetes resource definitions and resource instances.

use std::fmt;

/// Identifies a (group, version, kind) triple. `group` is empty for the core API group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceDefKey {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl ResourceDefKey {
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// Parse a `group/version` or bare `version` (core API) apiVersion string plus a kind.
    pub fn from_api_version(api_version: &str, kind: &str) -> Self {
        match api_version.split_once('/') {
            Some((group, version)) => Self::new(group, version, kind),
            None => Self::new("", api_version, kind),
        }
    }

    /// Render back to the `apiVersion` string a manifest would carry.
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for ResourceDefKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version(), self.kind)
    }
}

/// The primary key for the in-memory resource table: (group, kind, name, namespace).
///
/// `namespace` is `None` iff the kind is cluster-scoped; two keys with different
/// `namespace` presence are never considered equal even if all other fields match,
/// since that would conflate a cluster-scoped and a namespaced kind of the same name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub group: String,
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
}

impl ResourceKey {
    pub fn new(
        group: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: Option<String>,
    ) -> Self {
        Self {
            group: group.into(),
            kind: kind.into(),
            name: name.into(),
            namespace,
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}.{}", self.kind, self.name, ns),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_api_has_empty_group() {
        let k = ResourceDefKey::from_api_version("v1", "ConfigMap");
        assert_eq!(k.group, "");
        assert_eq!(k.api_version(), "v1");
    }

    #[test]
    fn grouped_api_roundtrips() {
        let k = ResourceDefKey::from_api_version("apps/v1", "Deployment");
        assert_eq!(k.group, "apps");
        assert_eq!(k.version, "v1");
        assert_eq!(k.api_version(), "apps/v1");
    }

    #[test]
    fn display_distinguishes_namespace() {
        let cluster = ResourceKey::new("", "Namespace", "default", None);
        let namespaced = ResourceKey::new("", "ConfigMap", "cm1", Some("default".into()));
        assert_eq!(cluster.to_string(), "Namespace/default");
        assert_eq!(namespaced.to_string(), "ConfigMap/cm1.default");
    }
}
