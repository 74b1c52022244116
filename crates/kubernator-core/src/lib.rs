//! kubernator-core - resource identity, context tree and glob primitives shared
//! across the provisioner.
//!
//! This crate provides the foundational types used by the rest of the workspace:
//! - `Resource` / `ResourceKey` / `ResourceDefKey`: resource identity and provenance
//! - `Context`: the hierarchical copy-on-write property tree carried down a directory walk
//! - `Globs`: ordered, freezable glob-pattern sets for include/exclude filtering

pub mod context;
pub mod error;
pub mod globs;
pub mod resource;
pub mod resource_key;

pub use context::{Context, Value as ContextValue};
pub use error::{CoreError, Result};
pub use globs::Globs;
pub use resource::{Resource, Source};
pub use resource_key::{ResourceDefKey, ResourceKey};
