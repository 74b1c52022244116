//! kubernator-walker - the directory walker, plugin lifecycle and
//! cooperative process runner (`SPEC_FULL.md` §4.5, §6, §9).
//!
//! - `walker`: LIFO directory traversal driving plugin hooks.
//! - `plugin`: the `Plugin` trait and a compile-time `PluginRegistry`.
//! - `script`: the `.kubernator.yaml` in-tree script contract.
//! - `process`: child-process spawning with streamed stdin/stdout/stderr.

pub mod error;
pub mod plugin;
pub mod process;
pub mod script;
pub mod walker;

pub use error::{Result, WalkError};
pub use plugin::{Plugin, PluginFactory, PluginRegistry};
pub use process::{ProcessCommand, ProcessOutput, Stdin, StreamMode};
pub use script::{DirScript, PluginRegistration, SCRIPT_FILE_NAME};
pub use walker::Walker;
