//! The reconciliation engine: per-resource create/patch/recreate/no-op
//! decision combining a server-side-apply dry-run with a JSON Patch diff
//! (`SPEC_FULL.md` §4.4).

use std::time::Duration;

use indexmap::IndexMap;
use kubernator_core::{Resource, ResourceKey};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::client::{DeletionPropagation, ResourceClient};
use crate::diff;
use crate::dump::{DumpPropagation, DumpRecord, ResourceRef};
use crate::error::{KubeError, Result};
use crate::immutable::{is_immutable_field_rejection, ImmutableChangeTable};
use crate::merge;
use crate::schema::SchemaRegistry;

/// How strictly an unrecognized field in a manifest is treated, bound to the
/// server's `fieldValidation` query parameter behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValidationMode {
    Ignore,
    Warn,
    Strict,
}

/// A transformer observes the full resource set and may replace one
/// resource; `None` leaves it unchanged. Transformers run in
/// reverse-registration order (`SPEC_FULL.md` §4.4 step 1).
pub type Transformer = Box<dyn Fn(&[Resource], &Resource) -> Result<Option<Resource>>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub created: usize,
    pub patched: usize,
    pub deleted: usize,
}

pub struct ReconcileOptions {
    /// Issue calls with the server-side dry-run flag set rather than persist them.
    pub dry_run: bool,
    /// Serialize what would have been issued into `records` instead of calling the API.
    pub dump: bool,
    pub field_validation: FieldValidationMode,
    /// Escalate accumulated field-validation warnings to a fatal error after the pass completes.
    pub warn_fatal: bool,
    pub immutable_changes: ImmutableChangeTable,
    /// Delay between recreate retries while waiting for the deleted object to disappear.
    pub conflict_retry_delay: Duration,
    pub max_delete_wait_attempts: u32,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            dump: false,
            field_validation: FieldValidationMode::Warn,
            warn_fatal: false,
            immutable_changes: ImmutableChangeTable::default(),
            conflict_retry_delay: Duration::from_millis(300),
            max_delete_wait_attempts: 20,
        }
    }
}

pub struct ReconcileEngine {
    client: kube::Client,
    schema: SchemaRegistry,
    transformers: Vec<Transformer>,
    options: ReconcileOptions,
    counters: Counters,
    warnings: Vec<String>,
    records: Vec<DumpRecord>,
}

impl ReconcileEngine {
    pub fn new(client: kube::Client, schema: SchemaRegistry, options: ReconcileOptions) -> Self {
        Self {
            client,
            schema,
            transformers: Vec::new(),
            options,
            counters: Counters::default(),
            warnings: Vec::new(),
            records: Vec::new(),
        }
    }

    pub fn register_transformer(&mut self, transformer: Transformer) {
        self.transformers.push(transformer);
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn dump_records(&self) -> &[DumpRecord] {
        &self.records
    }

    /// Run the transformer chain in reverse-registration order over the full
    /// table, re-validating identity after every change that was applied.
    fn transform(&self, table: &IndexMap<ResourceKey, Resource>, resource: &Resource) -> Result<Resource> {
        let all: Vec<Resource> = table.values().cloned().collect();
        let mut current = resource.clone();
        for transformer in self.transformers.iter().rev() {
            if let Some(replacement) = transformer(&all, &current)? {
                replacement.revalidate(current.key.namespace.is_some())?;
                if replacement.key != current.key {
                    return Err(KubeError::IdentityDrift {
                        before: current.key.to_string(),
                        after: replacement.key.to_string(),
                    });
                }
                current = replacement;
            }
        }
        Ok(current)
    }

    /// Reconcile the full table, in insertion order, per `SPEC_FULL.md` §4.4.
    pub async fn run(&mut self, table: IndexMap<ResourceKey, Resource>) -> Result<()> {
        for (key, resource) in table.iter() {
            let transformed = self.transform(&table, resource)?;
            self.reconcile_one(key, &transformed).await?;
        }
        if self.options.warn_fatal && !self.warnings.is_empty() {
            return Err(KubeError::WarnFatal { count: self.warnings.len() });
        }
        Ok(())
    }

    async fn reconcile_one(&mut self, key: &ResourceKey, resource: &Resource) -> Result<()> {
        let rdef = self
            .schema
            .get(&resource.rdef)
            .ok_or_else(|| KubeError::UnknownResourceDef {
                group: resource.rdef.group.clone(),
                version: resource.rdef.version.clone(),
                kind: resource.rdef.kind.clone(),
            })?
            .clone();

        let client = ResourceClient::bind(self.client.clone(), &rdef, resource.key.namespace.as_deref(), &resource.key.name);
        let (instructions, normalized) = merge::extract(&resource.manifest);

        let resource_ref = || ResourceRef {
            api_version: rdef.api_version(),
            kind: rdef.key.kind.clone(),
            name: key.name.clone(),
            namespace: key.namespace.clone(),
        };

        match client.get().await {
            Err(err) if err.is_not_found() => {
                self.create(&client, &normalized, &resource_ref()).await
            }
            Err(err) => Err(err),
            Ok(live) => {
                let live_value = serde_json::to_value(&live)?;
                match client.patch_apply(&normalized, true, true).await {
                    Err(KubeError::Api(kube::Error::Api(resp))) if resp.code == 422 && is_immutable_field_rejection(&resp.message) => {
                        self.recreate(&client, &normalized, &resource_ref(), &rdef).await
                    }
                    Err(KubeError::Api(kube::Error::Api(resp))) if resp.code == 400 => {
                        self.record_strict_decoding_warnings(&resp.message, &resource_ref())?;
                        Ok(())
                    }
                    Err(err) => Err(err),
                    Ok(merged) => {
                        let mut merged_value = serde_json::to_value(&merged)?;
                        let warnings = merge::apply_instructions(&mut merged_value, &normalized, &instructions);
                        for w in warnings {
                            warn!(target: "kubernator_kube::reconcile", resource = %key, "{w}");
                        }
                        self.patch(&client, &live_value, &merged_value, &resource_ref()).await
                    }
                }
            }
        }
    }

    async fn create(&mut self, client: &ResourceClient, normalized: &serde_json::Value, resource_ref: &ResourceRef) -> Result<()> {
        if self.options.dump {
            self.records.push(DumpRecord::Create { body: normalized.clone() });
        } else {
            match client.create(normalized, self.options.dry_run).await {
                Err(KubeError::Api(kube::Error::Api(resp))) if resp.code == 400 => {
                    self.record_strict_decoding_warnings(&resp.message, resource_ref)?;
                    return Ok(());
                }
                Err(err) => return Err(err),
                Ok(_) => {}
            }
        }
        self.counters.created += 1;
        info!(target: "kubernator_kube::reconcile", resource = %client.name(), "created");
        Ok(())
    }

    async fn patch(
        &mut self,
        client: &ResourceClient,
        live: &serde_json::Value,
        merged: &serde_json::Value,
        resource_ref: &ResourceRef,
    ) -> Result<()> {
        let Some(ops) = diff::diff(live, merged) else {
            debug!(target: "kubernator_kube::reconcile", resource = %client.name(), "no-op");
            return Ok(());
        };
        if self.options.dump {
            self.records.push(DumpRecord::Patch {
                resource: resource_ref.clone(),
                body: serde_json::to_value(&ops)?,
            });
        } else {
            client.patch_json(ops, self.options.dry_run).await?;
        }
        self.counters.patched += 1;
        info!(target: "kubernator_kube::reconcile", resource = %client.name(), "patched");
        Ok(())
    }

    async fn recreate(
        &mut self,
        client: &ResourceClient,
        normalized: &serde_json::Value,
        resource_ref: &ResourceRef,
        rdef: &crate::schema::ResourceDef,
    ) -> Result<()> {
        let policy = self
            .options
            .immutable_changes
            .get(&rdef.key.group, &rdef.key.kind)
            .unwrap_or(DeletionPropagation::Background);

        if self.options.dump {
            self.records.push(DumpRecord::Delete {
                resource: resource_ref.clone(),
                propagation_policy: DumpPropagation(policy),
            });
            self.records.push(DumpRecord::Create { body: normalized.clone() });
            self.counters.deleted += 1;
            self.counters.created += 1;
            return Ok(());
        }

        client.delete(self.options.dry_run, policy).await?;
        self.counters.deleted += 1;

        if !self.options.dry_run {
            let mut attempts = 0;
            loop {
                match client.get().await {
                    Err(err) if err.is_not_found() => break,
                    Err(err) => return Err(err),
                    Ok(_) => {
                        attempts += 1;
                        if attempts >= self.options.max_delete_wait_attempts {
                            return Err(KubeError::DeleteNotObserved { resource: client.name().to_string() });
                        }
                        sleep(self.options.conflict_retry_delay).await;
                    }
                }
            }
        }

        client.create(normalized, self.options.dry_run).await?;
        self.counters.created += 1;
        info!(target: "kubernator_kube::reconcile", resource = %client.name(), policy = ?policy, "recreated");
        Ok(())
    }

    /// Parse `strict decoding error: unknown field "a", unknown field "b"`
    /// into one warning per comma-separated field (`SPEC_FULL.md` §8) and
    /// apply the configured `FieldValidationMode` to them.
    fn record_strict_decoding_warnings(&mut self, message: &str, resource_ref: &ResourceRef) -> Result<()> {
        let fields = parse_strict_decoding_fields(message);
        if fields.is_empty() {
            return Ok(());
        }
        let warnings: Vec<String> = fields
            .iter()
            .map(|field| format!("{}/{}: {field}", resource_ref.kind, resource_ref.name))
            .collect();
        let resource = format!("{}/{}", resource_ref.kind, resource_ref.name);
        let to_record = strict_decoding_outcome(self.options.field_validation, resource, warnings)?;
        for w in &to_record {
            warn!(target: "kubernator_kube::reconcile", "{w}");
        }
        self.warnings.extend(to_record);
        Ok(())
    }
}

/// `Ignore` drops the warnings, `Warn` queues them for the end-of-pass
/// `warn_fatal` check in `run()`, and `Strict` fails the apply pass
/// immediately regardless of `warn_fatal` — confirmed against
/// `examples/original_source/src/integrationtest/python/issue_35_tests.py`,
/// which expects a non-zero exit under `validation == "Strict"` even in the
/// `warn_fatal=false` subtest.
fn strict_decoding_outcome(mode: FieldValidationMode, resource: String, warnings: Vec<String>) -> Result<Vec<String>> {
    match mode {
        FieldValidationMode::Ignore => Ok(Vec::new()),
        FieldValidationMode::Warn => Ok(warnings),
        FieldValidationMode::Strict => Err(KubeError::StrictValidation { resource, warnings }),
    }
}

const STRICT_DECODING_MARKER: &str = "strict decoding error:";

fn parse_strict_decoding_fields(message: &str) -> Vec<String> {
    let Some(idx) = message.find(STRICT_DECODING_MARKER) else {
        return Vec::new();
    };
    message[idx + STRICT_DECODING_MARKER.len()..]
        .split(',')
        .map(|s| s.trim().trim_end_matches(['.', '"']).to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_strict_decoding_fields() {
        let msg = r#"ConfigMap in version "v1" cannot be handled as a ConfigMap: strict decoding error: unknown field "spec.foo", unknown field "spec.bar""#;
        let fields = parse_strict_decoding_fields(msg);
        assert_eq!(fields, vec!["unknown field \"spec.foo\"", "unknown field \"spec.bar\""]);
    }

    #[test]
    fn no_marker_yields_no_fields() {
        assert!(parse_strict_decoding_fields("spec.replicas: Invalid value").is_empty());
    }

    #[test]
    fn counters_default_to_zero() {
        assert_eq!(Counters::default(), Counters { created: 0, patched: 0, deleted: 0 });
    }

    #[test]
    fn ignore_mode_drops_strict_decoding_warnings() {
        let result = strict_decoding_outcome(
            FieldValidationMode::Ignore,
            "ConfigMap/cm1".to_string(),
            vec!["unknown field \"spec.foo\"".to_string()],
        );
        assert_eq!(result.unwrap(), Vec::<String>::new());
    }

    #[test]
    fn warn_mode_queues_strict_decoding_warnings() {
        let warnings = vec!["ConfigMap/cm1: unknown field \"spec.foo\"".to_string()];
        let result = strict_decoding_outcome(FieldValidationMode::Warn, "ConfigMap/cm1".to_string(), warnings.clone());
        assert_eq!(result.unwrap(), warnings);
    }

    #[test]
    fn strict_mode_fails_immediately_regardless_of_warn_fatal() {
        let warnings = vec!["ConfigMap/cm1: unknown field \"spec.foo\"".to_string()];
        let err = strict_decoding_outcome(FieldValidationMode::Strict, "ConfigMap/cm1".to_string(), warnings).unwrap_err();
        assert!(matches!(err, KubeError::StrictValidation { .. }));
    }
}
