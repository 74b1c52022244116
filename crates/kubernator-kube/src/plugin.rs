//! `K8sPlugin`: wires the schema registry, resource table and reconciliation
//! engine into the directory-walk plugin lifecycle (`SPEC_FULL.md` §4.5). A
//! directory opts in with `register_plugin("k8s", { ... })` in its
//! `.kubernator.yaml`; `after_dir` scans for manifests, the terminal `apply`
//! phase reconciles everything gathered across the whole walk.

use std::path::Path;
use std::rc::Rc;

use async_trait::async_trait;
use kubernator_core::{Context, Globs, Resource, ResourceKey, Source};
use kubernator_walker::{Plugin, Result as WalkResult, WalkError};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use crate::dump::DumpFormat;
use crate::error::KubeError;
use crate::reconcile::{FieldValidationMode, ReconcileEngine, ReconcileOptions};
use crate::schema::SchemaRegistry;

const PLUGIN_NAME: &str = "k8s";
const DEFAULT_MANIFEST_GLOBS: [&str; 2] = ["*.yaml", "*.yml"];

fn hook_err(hook: &str, message: impl Into<String>) -> WalkError {
    WalkError::PluginHook {
        plugin: PLUGIN_NAME.to_string(),
        hook: hook.to_string(),
        message: message.into(),
    }
}

/// The plugin's per-registration configuration, read from its
/// `register_plugin("k8s", config)` block.
#[derive(Debug, Clone, Default, Deserialize)]
struct PluginConfig {
    #[serde(default)]
    dry_run: bool,
    #[serde(default)]
    dump: bool,
    #[serde(default)]
    output_format: Option<String>,
    #[serde(default)]
    field_validation: Option<String>,
    #[serde(default)]
    warn_fatal: bool,
    #[serde(default)]
    dump_file: Option<String>,
}

fn field_validation_mode(name: Option<&str>) -> FieldValidationMode {
    match name {
        Some("ignore") => FieldValidationMode::Ignore,
        Some("strict") => FieldValidationMode::Strict,
        _ => FieldValidationMode::Warn,
    }
}

fn output_format(name: Option<&str>) -> DumpFormat {
    match name {
        Some("json") => DumpFormat::Json,
        Some("yaml") => DumpFormat::Yaml,
        _ => DumpFormat::JsonPretty,
    }
}

pub struct K8sPlugin {
    client: Option<kube::Client>,
    schema: SchemaRegistry,
    resources: indexmap::IndexMap<ResourceKey, Resource>,
    config: PluginConfig,
}

impl K8sPlugin {
    pub fn new(config: JsonValue) -> WalkResult<Self> {
        let config: PluginConfig = if config.is_null() {
            PluginConfig::default()
        } else {
            serde_json::from_value(config).map_err(|e| hook_err("init", format!("invalid k8s plugin config: {e}")))?
        };
        Ok(Self {
            client: None,
            schema: SchemaRegistry::new(),
            resources: indexmap::IndexMap::new(),
            config,
        })
    }

    fn client(&self) -> WalkResult<&kube::Client> {
        self.client
            .as_ref()
            .ok_or_else(|| hook_err("apply", "k8s plugin used before init connected to the cluster"))
    }

    /// Fetch the cluster's OpenAPI v2 document (`swagger.json`) to seed the
    /// schema registry (`SPEC_FULL.md` §4.1).
    async fn fetch_openapi(client: &kube::Client) -> crate::error::Result<JsonValue> {
        let request = http::Request::builder()
            .uri("/openapi/v2")
            .body(Vec::new())
            .expect("static request is well formed");
        Ok(client.request::<JsonValue>(request).await?)
    }

    /// Read `globals.k8s.includes`/`globals.k8s.excludes` from the nested
    /// `k8s` context frame a `.kubernator.yaml` sets (`SPEC_FULL.md` §4.6),
    /// falling back to the default manifest globs when nothing is configured.
    fn manifest_globs(ctx: &Rc<Context>) -> WalkResult<Globs> {
        let k8s = ctx.get_map(PLUGIN_NAME);
        let includes: Vec<String> = {
            let configured: Vec<String> = k8s
                .as_ref()
                .map(|c| c.get_list("includes"))
                .unwrap_or_default()
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            if configured.is_empty() {
                DEFAULT_MANIFEST_GLOBS.iter().map(|s| s.to_string()).collect()
            } else {
                configured
            }
        };
        let mut globs = Globs::from_patterns(includes).map_err(|e| hook_err("after_dir", e.to_string()))?;
        let excludes = k8s.as_ref().map(|c| c.get_list("excludes")).unwrap_or_default();
        for pattern in excludes.iter().filter_map(|v| v.as_str().map(str::to_string)) {
            globs.discard(&pattern).map_err(|e| hook_err("after_dir", e.to_string()))?;
        }
        Ok(globs)
    }

    fn ingest_document(&mut self, doc: JsonValue, source: Source) -> crate::error::Result<()> {
        let kind = doc.get("kind").and_then(JsonValue::as_str).unwrap_or_default();
        if kind == "CustomResourceDefinition" {
            let keys = self.schema.add_crd(&doc, &source.to_string())?;
            info!(target: "kubernator_kube::plugin", count = keys.len(), "registered CRD versions");
            return Ok(());
        }

        let resource = Resource::new(doc, source)?;
        let rdef = self.schema.get(&resource.rdef).ok_or_else(|| KubeError::UnknownResourceDef {
            group: resource.rdef.group.clone(),
            version: resource.rdef.version.clone(),
            kind: resource.rdef.kind.clone(),
        })?;
        resource.revalidate(rdef.namespaced)?;
        self.schema.validate(&resource.manifest, rdef, &resource.source.to_string())?;

        if let Some(existing) = self.resources.get(&resource.key) {
            if existing.manifest != resource.manifest {
                return Err(KubeError::DuplicateResource {
                    key: resource.key.to_string(),
                    first: existing.source.to_string(),
                    second: resource.source.to_string(),
                });
            }
            return Ok(());
        }
        self.resources.insert(resource.key.clone(), resource);
        Ok(())
    }

    fn scan_dir(&mut self, dir: &Path, globs: &Globs) -> WalkResult<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !globs.matches(&name) {
                continue;
            }
            let path = entry.path();
            let text = std::fs::read_to_string(&path)?;
            for doc in serde_yaml::Deserializer::from_str(&text) {
                let value = JsonValue::deserialize(doc).map_err(|e| hook_err("after_dir", format!("{}: {e}", path.display())))?;
                if value.is_null() {
                    continue;
                }
                self.ingest_document(value, Source::File(path.clone()))
                    .map_err(|e| hook_err("after_dir", e.to_string()))?;
            }
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl Plugin for K8sPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    async fn init(&mut self, _ctx: &Rc<Context>) -> WalkResult<()> {
        let client = kube::Client::try_default().await.map_err(|e| hook_err("init", e.to_string()))?;
        let doc = Self::fetch_openapi(&client).await.map_err(|e| hook_err("init", e.to_string()))?;
        self.schema = SchemaRegistry::from_openapi(&doc).map_err(|e| hook_err("init", e.to_string()))?;
        self.client = Some(client);
        Ok(())
    }

    async fn after_dir(&mut self, ctx: &Rc<Context>, dir: &Path) -> WalkResult<()> {
        let globs = Self::manifest_globs(ctx)?;
        self.scan_dir(dir, &globs)
    }

    async fn apply(&mut self, _ctx: &Rc<Context>) -> WalkResult<()> {
        let client = self.client()?.clone();
        let table = std::mem::take(&mut self.resources);

        let options = ReconcileOptions {
            dry_run: self.config.dry_run,
            dump: self.config.dump,
            field_validation: field_validation_mode(self.config.field_validation.as_deref()),
            warn_fatal: self.config.warn_fatal,
            ..ReconcileOptions::default()
        };

        let mut engine = ReconcileEngine::new(client, std::mem::take(&mut self.schema), options);
        engine.run(table).await.map_err(|e| hook_err("apply", e.to_string()))?;

        let counters = engine.counters();
        info!(
            target: "kubernator_kube::plugin",
            created = counters.created,
            patched = counters.patched,
            deleted = counters.deleted,
            "reconciliation pass complete"
        );

        if self.config.dump {
            let format = output_format(self.config.output_format.as_deref());
            let rendered = crate::dump::render(engine.dump_records(), format).map_err(|e| hook_err("apply", e.to_string()))?;
            match &self.config.dump_file {
                Some(path) => std::fs::write(path, rendered).map_err(|e| hook_err("apply", e.to_string()))?,
                None => println!("{rendered}"),
            }
        }
        Ok(())
    }

    async fn summary(&mut self, _ctx: &Rc<Context>) -> WalkResult<()> {
        if self.resources.is_empty() {
            warn!(target: "kubernator_kube::plugin", "no resources were gathered during the walk");
        }
        Ok(())
    }
}
