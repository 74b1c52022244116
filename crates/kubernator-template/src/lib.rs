//! kubernator-template - MiniJinja-based template engine with custom
//! `{${ ... }$}` delimiters and a double-evaluation finalizer.
//!
//! Provides:
//! - Kubernetes-oriented filters (`toyaml`, `b64encode`, `merge`, ...)
//! - Human-readable error messages with suggestions
//! - `tpl`/`tpl_ctx` for evaluating a string value as a nested template

pub mod engine;
pub mod error;
pub mod filters;
pub mod functions;
pub mod suggestions;

pub use engine::{RenderOutcome, Template, TemplateEngine, DELIM_CLOSE, DELIM_OPEN};
pub use error::{EngineError, Result, TemplateError};

/// Names bound at the top level of the context tree that `tpl_ctx` exposes to
/// a nested render, in addition to whatever explicit context a caller passes
/// to `tpl`.
pub(crate) const TOP_LEVEL_CONTEXT_NAMES: &[&str] = &["values", "globals", "vars"];
