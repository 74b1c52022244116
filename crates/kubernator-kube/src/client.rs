//! Resource CRUD operations bound against a live cluster (`SPEC_FULL.md`
//! §4.2). Built-in and custom objects share one code path: `kube`'s
//! `DynamicObject` plus an `ApiResource` derived from the `ResourceDef`
//! already carries group/version/kind/plural, so there is no need for the
//! naming-convention binding the source used to reach a typed client.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, ApiResource, DeleteParams, DynamicObject, Patch, PatchParams, PostParams, PropagationPolicy};
use kube::{Client, ResourceExt};
use serde_json::Value as JsonValue;

use crate::error::{KubeError, Result};
use crate::schema::ResourceDef;

/// Deletion cascade mode, bound per (group, kind) via the immutable-changes
/// table (`SPEC_FULL.md` §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionPropagation {
    Background,
    Foreground,
    Orphan,
}

impl From<DeletionPropagation> for PropagationPolicy {
    fn from(value: DeletionPropagation) -> Self {
        match value {
            DeletionPropagation::Background => PropagationPolicy::Background,
            DeletionPropagation::Foreground => PropagationPolicy::Foreground,
            DeletionPropagation::Orphan => PropagationPolicy::Orphan,
        }
    }
}

pub const FIELD_MANAGER: &str = "kubernator";

/// One bound (group, version, kind) endpoint: a `kube::Api<DynamicObject>`
/// plus the namespace this resource lives in, if any.
pub struct ResourceClient {
    api: Api<DynamicObject>,
    name: String,
}

impl ResourceClient {
    /// Bind the four CRUD operations for `rdef` in `namespace` (`None` for
    /// cluster-scoped kinds), mirroring `populate_api`'s lazy binding from
    /// `SPEC_FULL.md` §4.1 without the reflective method-name construction.
    pub fn bind(client: Client, rdef: &ResourceDef, namespace: Option<&str>, name: &str) -> Self {
        let ar = ApiResource {
            group: rdef.key.group.clone(),
            version: rdef.key.version.clone(),
            api_version: rdef.api_version(),
            kind: rdef.key.kind.clone(),
            plural: rdef.plural.clone(),
        };
        let api = match (rdef.namespaced, namespace) {
            (true, Some(ns)) => Api::namespaced_with(client, ns, &ar),
            _ => Api::all_with(client, &ar),
        };
        Self { api, name: name.to_string() }
    }

    /// Read the live object; `kube::Error::Api` with `code == 404` surfaces
    /// as-is so callers can match it against `KubeError::is_not_found`.
    pub async fn get(&self) -> Result<DynamicObject> {
        Ok(self.api.get(&self.name).await?)
    }

    /// `field_manager = "kubernator"`; dry-run is the `dryRun=All` query
    /// parameter kube sets when `PostParams::dry_run` is true.
    pub async fn create(&self, manifest: &JsonValue, dry_run: bool) -> Result<DynamicObject> {
        let object: DynamicObject = serde_json::from_value(manifest.clone())?;
        let params = PostParams {
            dry_run,
            field_manager: Some(FIELD_MANAGER.to_string()),
        };
        Ok(self.api.create(&params, &object).await?)
    }

    /// `patch_type` selects `JSON_PATCH` (a `json_patch::Patch` body) or
    /// `SERVER_SIDE_PATCH` (apply, yaml content-type); both route through
    /// `kube::api::Patch` so the content-type is resolved per call rather
    /// than via a patched shared client (`SPEC_FULL.md` §4.2, §9).
    pub async fn patch_apply(&self, manifest: &JsonValue, dry_run: bool, force: bool) -> Result<DynamicObject> {
        let mut params = PatchParams::apply(FIELD_MANAGER);
        params.force = force;
        params.dry_run = dry_run;
        Ok(self.api.patch(&self.name, &params, &Patch::Apply(manifest)).await?)
    }

    pub async fn patch_json(&self, ops: json_patch::Patch, dry_run: bool) -> Result<DynamicObject> {
        let mut params = PatchParams::default();
        params.dry_run = dry_run;
        Ok(self.api.patch(&self.name, &params, &Patch::Json(ops)).await?)
    }

    pub async fn delete(&self, dry_run: bool, propagation_policy: DeletionPropagation) -> Result<()> {
        let params = DeleteParams {
            propagation_policy: Some(propagation_policy.into()),
            dry_run,
            ..Default::default()
        };
        self.api.delete(&self.name, &params).await?;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Parse a CRD manifest into its typed form purely to validate shape before
/// handing the raw JSON to `SchemaRegistry::add_crd`; kept separate since the
/// registry works off the untyped document to tolerate v1beta1 as well.
pub fn parse_crd(manifest: &JsonValue) -> Result<CustomResourceDefinition> {
    let crd: CustomResourceDefinition = serde_json::from_value(manifest.clone())?;
    Ok(crd)
}

pub fn resource_name(object: &DynamicObject) -> String {
    object.name_any()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deletion_propagation_maps_to_kube_policy() {
        assert!(matches!(
            PropagationPolicy::from(DeletionPropagation::Orphan),
            PropagationPolicy::Orphan
        ));
    }

    #[test]
    fn parse_crd_reads_group_and_kind() {
        let manifest = json!({
            "apiVersion": "apiextensions.k8s.io/v1",
            "kind": "CustomResourceDefinition",
            "metadata": { "name": "widgets.example.com" },
            "spec": {
                "group": "example.com",
                "names": { "kind": "Widget", "plural": "widgets", "singular": "widget" },
                "scope": "Namespaced",
                "versions": [{ "name": "v1", "served": true, "storage": true, "schema": { "openAPIV3Schema": { "type": "object" } } }]
            }
        });
        let crd = parse_crd(&manifest).unwrap();
        assert_eq!(crd.spec.group, "example.com");
        assert_eq!(crd.spec.names.kind, "Widget");
    }
}
