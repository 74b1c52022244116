//! Crate-wide error type for resource identity and context-tree operations.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("manifest is missing required field: {field}")]
    MissingField { field: String },

    #[error("namespaced resource {kind}/{name} has no namespace")]
    MissingNamespace { kind: String, name: String },

    #[error(
        "transformer changed the identity of {old} to {new}; transformers must not change a resource's key"
    )]
    IdentityDrift { old: String, new: String },

    #[error(
        "duplicate resource {key}: contributed by both {first_source} and {second_source} with different manifests"
    )]
    DuplicateResource {
        key: String,
        first_source: String,
        second_source: String,
    },

    #[error("invalid glob pattern {pattern}: {message}")]
    InvalidGlob { pattern: String, message: String },

    #[error("glob set is frozen and cannot be mutated")]
    FrozenGlobs,

    #[error("failed to parse manifest: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("failed to parse manifest: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
