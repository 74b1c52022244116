//! The top-level error type the binary renders, carrying the exit-code
//! contract described in `SPEC_FULL.md` §7/§10.2. Every library crate owns
//! its own `thiserror` enum; this one collects them at the CLI boundary.

use kubernator_kube::KubeError;
use kubernator_walker::WalkError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

#[derive(Error, Debug, Diagnostic)]
pub enum AppError {
    #[error("{0}")]
    #[diagnostic(code(kubernator::walk))]
    Walk(#[from] WalkError),

    #[error("{0}")]
    #[diagnostic(code(kubernator::kube))]
    Kube(#[from] KubeError),

    #[error("invalid root configuration at {path}: {source}")]
    #[diagnostic(code(kubernator::config))]
    Config {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{message}")]
    #[diagnostic(code(kubernator::usage))]
    Usage { message: String },

    #[error("io error: {0}")]
    #[diagnostic(code(kubernator::io))]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage { message: message.into() }
    }

    /// The process exit code for this error, per `SPEC_FULL.md` §10.2: fatal
    /// schema/validation errors, identity drift, duplicate resources and
    /// warn-fatal escalation each get a distinct non-zero code.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Walk(_) => exit_codes::WALK_ERROR,
            AppError::Kube(err) => kube_exit_code(err),
            AppError::Config { .. } => exit_codes::USAGE_ERROR,
            AppError::Usage { .. } => exit_codes::USAGE_ERROR,
            AppError::Io(_) => exit_codes::ERROR,
        }
    }

    /// The flat `{code, message}` object emitted for `--log-format json`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "code": self.exit_code(),
            "message": self.to_string(),
        })
    }
}

fn kube_exit_code(err: &KubeError) -> i32 {
    match err {
        KubeError::Core(_)
        | KubeError::UnknownResourceDef { .. }
        | KubeError::SchemaValidation { .. }
        | KubeError::InvalidCrd { .. }
        | KubeError::MalformedOpenApi(_)
        | KubeError::DuplicateResource { .. }
        | KubeError::IdentityDrift { .. } => exit_codes::VALIDATION_ERROR,

        KubeError::WarnFatal { .. } => exit_codes::WARN_FATAL,

        KubeError::Api(_)
        | KubeError::ImmutableField { .. }
        | KubeError::DeleteNotObserved { .. }
        | KubeError::StrictValidation { .. } => exit_codes::RECONCILE_ERROR,

        KubeError::Json(_) | KubeError::Yaml(_) | KubeError::Regex(_) | KubeError::Io(_) => {
            exit_codes::ERROR
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warn_fatal_gets_its_own_exit_code() {
        let err = AppError::Kube(KubeError::WarnFatal { count: 3 });
        assert_eq!(err.exit_code(), exit_codes::WARN_FATAL);
    }

    #[test]
    fn identity_drift_is_a_validation_error() {
        let err = AppError::Kube(KubeError::IdentityDrift {
            before: "a".into(),
            after: "b".into(),
        });
        assert_eq!(err.exit_code(), exit_codes::VALIDATION_ERROR);
    }

    #[test]
    fn usage_error_maps_to_usage_exit_code() {
        let err = AppError::usage("--yes is required to apply without --dump or --dry-run");
        assert_eq!(err.exit_code(), exit_codes::USAGE_ERROR);
    }
}
