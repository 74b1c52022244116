//! Crate-wide error type for the process runner, directory walker and plugin
//! lifecycle.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WalkError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting on `{command}`: {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with status {status}")]
    NonZeroExit {
        command: String,
        status: i32,
        stdout: Option<String>,
    },

    #[error("`{command}` timed out after {seconds}s")]
    Timeout { command: String, seconds: f64 },

    #[error("unknown plugin `{name}`")]
    UnknownPlugin { name: String },

    #[error("plugin `{name}` is already registered")]
    DuplicatePlugin { name: String },

    #[error("failed to parse {path}: {source}")]
    ScriptParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("plugin `{plugin}` failed during `{hook}`: {message}")]
    PluginHook {
        plugin: String,
        hook: String,
        message: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WalkError>;
