//! kubernator-kube - the schema registry, resource CRUD bindings, strategic
//! merge processor and reconciliation engine for kubernator
//! (`SPEC_FULL.md` §4.1-§4.4), plus the `k8s` directory-walker plugin that
//! wires them into a walk (`SPEC_FULL.md` §4.5).

pub mod client;
pub mod diff;
pub mod dump;
pub mod error;
pub mod immutable;
pub mod merge;
pub mod plugin;
pub mod reconcile;
pub mod schema;

pub use client::{DeletionPropagation, ResourceClient, FIELD_MANAGER};
pub use dump::{DumpFormat, DumpRecord, ResourceRef};
pub use error::{KubeError, Result};
pub use immutable::ImmutableChangeTable;
pub use merge::Instruction;
pub use plugin::K8sPlugin;
pub use reconcile::{Counters, FieldValidationMode, ReconcileEngine, ReconcileOptions, Transformer};
pub use schema::{ResourceDef, SchemaRegistry};
