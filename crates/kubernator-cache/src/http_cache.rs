//! Content-addressed HTTP object cache.
//!
//! Cache keys are the SHA-256 of the request URL. Each cached payload has an
//! adjacent sidecar file recording the `ETag`/`Last-Modified` response headers
//! seen on the last successful fetch, replayed as `If-None-Match`/
//! `If-Modified-Since` on the next request; a `304 Not Modified` response
//! reuses the cached payload unchanged. A `429 Too Many Requests` response
//! triggers an exponential backoff capped at 2.5 seconds before retrying.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CacheError, Result};

const MAX_BACKOFF: Duration = Duration::from_millis(2500);
const MAX_RETRIES: u32 = 8;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheMeta {
    #[serde(rename = "if-none-match", skip_serializing_if = "Option::is_none")]
    etag: Option<String>,
    #[serde(rename = "if-modified-since", skip_serializing_if = "Option::is_none")]
    last_modified: Option<String>,
}

/// Outcome of a fetch: freshly downloaded bytes, or a cache hit replayed from
/// a prior `304`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Fresh,
    NotModified,
}

pub struct HttpCache {
    root: PathBuf,
    client: reqwest::Client,
}

fn cache_key(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

impl HttpCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            client: reqwest::Client::new(),
        }
    }

    /// `<user-cache>/kubernator/k8s`, created lazily on first use.
    pub fn under_app_cache_dir(subdir: &str) -> Result<Self> {
        let base = dirs::cache_dir().ok_or(CacheError::NoCacheDir)?;
        Ok(Self::new(base.join("kubernator").join(subdir)))
    }

    fn payload_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.cache"))
    }

    fn read_meta(&self, key: &str) -> CacheMeta {
        let path = self.meta_path(key);
        std::fs::read(&path)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default()
    }

    fn write_meta(&self, key: &str, meta: &CacheMeta) -> Result<()> {
        let bytes = serde_json::to_vec(meta)?;
        std::fs::write(self.meta_path(key), bytes)?;
        Ok(())
    }

    /// Fetch `url`, returning the path to the cached payload on disk and
    /// whether it was freshly downloaded or reused from a `304`.
    pub async fn fetch(&self, url: &str) -> Result<(PathBuf, FetchOutcome)> {
        std::fs::create_dir_all(&self.root)?;
        let key = cache_key(url);
        let payload_path = self.payload_path(&key);
        let meta = self.read_meta(&key);

        let mut backoff = Duration::from_millis(100);
        for attempt in 0..MAX_RETRIES {
            let mut request = self.client.get(url);
            if let Some(etag) = &meta.etag {
                request = request.header(reqwest::header::IF_NONE_MATCH, etag);
            }
            if let Some(last_modified) = &meta.last_modified {
                request = request.header(reqwest::header::IF_MODIFIED_SINCE, last_modified);
            }

            let response = request
                .send()
                .await
                .map_err(|source| CacheError::Http {
                    url: url.to_string(),
                    source,
                })?;
            let status = response.status();

            if status == reqwest::StatusCode::NOT_MODIFIED {
                if !payload_path.exists() {
                    return Err(CacheError::HttpStatus {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }
                return Ok((payload_path, FetchOutcome::NotModified));
            }

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                tracing::warn!(url, attempt, backoff_ms = backoff.as_millis() as u64, "429 from remote, backing off");
                tokio::time::sleep(backoff).await;
                backoff = std::cmp::min(backoff * 2, MAX_BACKOFF);
                continue;
            }

            if !status.is_success() {
                return Err(CacheError::HttpStatus {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            let new_etag = response
                .headers()
                .get(reqwest::header::ETAG)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let new_last_modified = response
                .headers()
                .get(reqwest::header::LAST_MODIFIED)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            let bytes = response
                .bytes()
                .await
                .map_err(|source| CacheError::Http {
                    url: url.to_string(),
                    source,
                })?;
            std::fs::write(&payload_path, &bytes)?;
            self.write_meta(
                &key,
                &CacheMeta {
                    etag: new_etag,
                    last_modified: new_last_modified,
                },
            )?;
            return Ok((payload_path, FetchOutcome::Fresh));
        }

        Err(CacheError::RetriesExhausted {
            url: url.to_string(),
            attempts: MAX_RETRIES,
            status: reqwest::StatusCode::TOO_MANY_REQUESTS.as_u16(),
        })
    }

    pub fn key_for(&self, url: &str) -> String {
        cache_key(url)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn cache_key_is_sha256_hex_of_url() {
        let key = cache_key("https://example.com/swagger.json");
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn fresh_fetch_writes_payload_and_meta() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/obj"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"hello".to_vec())
                    .insert_header("ETag", "\"abc\""),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cache = HttpCache::new(dir.path());
        let url = format!("{}/obj", server.uri());
        let (path, outcome) = cache.fetch(&url).await.unwrap();
        assert_eq!(outcome, FetchOutcome::Fresh);
        assert_eq!(std::fs::read(path).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn not_modified_reuses_cached_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/obj"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"v1".to_vec())
                    .insert_header("ETag", "\"abc\""),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/obj"))
            .and(header("If-None-Match", "\"abc\""))
            .respond_with(ResponseTemplate::new(304))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cache = HttpCache::new(dir.path());
        let url = format!("{}/obj", server.uri());

        let (_, first) = cache.fetch(&url).await.unwrap();
        assert_eq!(first, FetchOutcome::Fresh);
        let (path, second) = cache.fetch(&url).await.unwrap();
        assert_eq!(second, FetchOutcome::NotModified);
        assert_eq!(std::fs::read(path).unwrap(), b"v1");
    }

    #[tokio::test]
    async fn retries_on_429_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/obj"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/obj"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cache = HttpCache::new(dir.path());
        let url = format!("{}/obj", server.uri());
        let (path, outcome) = cache.fetch(&url).await.unwrap();
        assert_eq!(outcome, FetchOutcome::Fresh);
        assert_eq!(std::fs::read(path).unwrap(), b"ok");
    }
}
