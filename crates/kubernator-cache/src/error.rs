//! Crate-wide error type for the HTTP object cache and Git repository cache.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("failed to determine a cache directory for the application")]
    NoCacheDir,

    #[error("http request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("http {status} fetching {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("exceeded {attempts} retries fetching {url} (last status {status})")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        status: u16,
    },

    #[error("git command `{command}` failed with status {status}: {stderr}")]
    GitCommand {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("failed to spawn `git`: {0}")]
    GitSpawn(#[source] std::io::Error),

    #[error("invalid repository url {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to (de)serialize cache metadata: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;
