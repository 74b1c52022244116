//! Crate-wide error type for the schema registry, resource operations and
//! reconciliation engine (`SPEC_FULL.md` §7).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, KubeError>;

#[derive(Debug, Error)]
pub enum KubeError {
    #[error("resource identity error: {0}")]
    Core(#[from] kubernator_core::CoreError),

    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    #[error("no schema registered for {group}/{version} {kind}")]
    UnknownResourceDef {
        group: String,
        version: String,
        kind: String,
    },

    #[error("{source} failed OpenAPI validation:\n{}", .errors.join("\n"))]
    SchemaValidation { source: String, errors: Vec<String> },

    #[error("CRD manifest at {source} is missing required field `{field}`")]
    InvalidCrd { source: String, field: String },

    #[error("OpenAPI document is malformed: {0}")]
    MalformedOpenApi(String),

    #[error("duplicate resource {key}: sources {first} and {second} disagree")]
    DuplicateResource {
        key: String,
        first: String,
        second: String,
    },

    #[error("transformer changed the identity of {before} to {after}")]
    IdentityDrift { before: String, after: String },

    #[error("{resource} rejected a patch because of immutable fields: {message}")]
    ImmutableField { resource: String, message: String },

    #[error("{resource} was not found after deletion within the retry budget")]
    DeleteNotObserved { resource: String },

    #[error("field validation rejected {resource}: {warnings:?}")]
    StrictValidation {
        resource: String,
        warnings: Vec<String>,
    },

    #[error("field-validation warnings were treated as fatal ({count} warning(s) recorded)")]
    WarnFatal { count: usize },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid regular expression: {0}")]
    Regex(#[from] regex::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl KubeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 404)
    }
}
