//! Dereferencing URIs into bytes
//!
//! Rules run synchronously, so [`ResourceFetcher`] is a blocking trait.
//! [`HttpFetcher`] drives the async `reqwest` client on a tokio runtime and
//! must therefore be called from a thread that is not itself running async
//! tasks (a `spawn_blocking` or rayon thread, or a plain thread).

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;
use moka::sync::Cache;
use reqwest::{Client, StatusCode, redirect};
use tokio::runtime::{Handle, Runtime};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{FetchError, FetchResult, ValidationError};

/// Configuration for remote fetches
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Number of retry attempts
    pub retry_attempts: u32,
    /// Initial retry delay in milliseconds
    pub retry_delay_ms: u64,
    /// Maximum retry delay in milliseconds (for exponential backoff cap)
    pub max_retry_delay_ms: u64,
    /// Largest response body accepted, in bytes
    pub max_response_bytes: u64,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            retry_attempts: 3,
            retry_delay_ms: 1000,
            max_retry_delay_ms: 30000,
            max_response_bytes: 64 * 1024 * 1024,
            user_agent: format!("kml-validate/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl FetchConfig {
    /// Delay before retry number `attempt` (0-based), doubling each time
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2_u64.saturating_pow(attempt);
        let delay_ms = self.retry_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay_ms.min(self.max_retry_delay_ms))
    }
}

/// Bytes retrieved for a URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResource {
    /// URI after redirects
    pub uri: Url,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Capability to dereference a URI
pub trait ResourceFetcher: Send + Sync {
    fn fetch(&self, uri: &Url) -> FetchResult<FetchedResource>;
}

impl<T: ResourceFetcher + ?Sized> ResourceFetcher for Arc<T> {
    fn fetch(&self, uri: &Url) -> FetchResult<FetchedResource> {
        (**self).fetch(uri)
    }
}

impl<T: ResourceFetcher + ?Sized> ResourceFetcher for &T {
    fn fetch(&self, uri: &Url) -> FetchResult<FetchedResource> {
        (**self).fetch(uri)
    }
}

/// Media type implied by a file extension
pub fn guess_content_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    Some(match ext.as_str() {
        "kml" => "application/vnd.google-earth.kml+xml",
        "kmz" => "application/vnd.google-earth.kmz",
        "xml" | "xsd" => "application/xml",
        "dae" => "model/vnd.collada+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        _ => return None,
    })
}

/// Reads `file:` URIs from the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FileFetcher;

impl ResourceFetcher for FileFetcher {
    fn fetch(&self, uri: &Url) -> FetchResult<FetchedResource> {
        if uri.scheme() != "file" {
            return Err(FetchError::UnsupportedScheme {
                uri: uri.to_string(),
                scheme: uri.scheme().to_string(),
            });
        }
        let path = uri.to_file_path().map_err(|_| FetchError::NotFound {
            uri: uri.to_string(),
        })?;
        let bytes = std::fs::read(&path).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => FetchError::NotFound {
                uri: uri.to_string(),
            },
            _ => FetchError::Io {
                uri: uri.to_string(),
                source,
            },
        })?;
        if bytes.is_empty() {
            return Err(FetchError::Empty {
                uri: uri.to_string(),
            });
        }
        debug!(uri = %uri, bytes = bytes.len(), "read local resource");
        Ok(FetchedResource {
            uri: uri.clone(),
            content_type: guess_content_type(&path).map(str::to_string),
            bytes,
        })
    }
}

enum RuntimeHandle {
    Shared(Handle),
    Owned(Runtime),
}

impl RuntimeHandle {
    fn block_on<F: std::future::Future>(&self, future: F) -> F::Output {
        match self {
            RuntimeHandle::Shared(handle) => handle.block_on(future),
            RuntimeHandle::Owned(runtime) => runtime.block_on(future),
        }
    }
}

/// Fetches `http:` and `https:` URIs, following at most one redirect
pub struct HttpFetcher {
    client: Client,
    config: FetchConfig,
    runtime: RuntimeHandle,
}

impl HttpFetcher {
    /// Create a fetcher on the ambient tokio runtime, or on a private
    /// current-thread runtime when there is none.
    pub fn new(config: FetchConfig) -> Result<Self, ValidationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent)
            .redirect(redirect::Policy::limited(1))
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(ValidationError::from)?;

        let runtime = match Handle::try_current() {
            Ok(handle) => RuntimeHandle::Shared(handle),
            Err(_) => RuntimeHandle::Owned(
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()?,
            ),
        };

        Ok(Self {
            client,
            config,
            runtime,
        })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    async fn fetch_with_retry(&self, uri: &Url) -> FetchResult<FetchedResource> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(uri).await {
                Ok(resource) => return Ok(resource),
                Err(err) if attempt < self.config.retry_attempts && is_retryable(&err) => {
                    let delay = self.config.backoff_delay(attempt);
                    warn!(uri = %uri, attempt, error = %err, ?delay, "retrying fetch");
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn fetch_once(&self, uri: &Url) -> FetchResult<FetchedResource> {
        let request = self.client.get(uri.clone()).send();
        let response = timeout(Duration::from_secs(self.config.timeout_seconds), request)
            .await
            .map_err(|_| FetchError::Timeout {
                uri: uri.to_string(),
                timeout_seconds: self.config.timeout_seconds,
            })?
            .map_err(|e| self.http_error(uri, &e))?;

        if response.status() != StatusCode::OK {
            return Err(FetchError::HttpStatus {
                uri: uri.to_string(),
                status: response.status().as_u16(),
            });
        }

        let final_uri = response.url().clone();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = TryStreamExt::try_next(&mut stream)
            .await
            .map_err(|e| self.http_error(uri, &e))?
        {
            bytes.extend_from_slice(&chunk);
            if bytes.len() as u64 > self.config.max_response_bytes {
                return Err(FetchError::Http {
                    uri: uri.to_string(),
                    details: format!(
                        "response exceeds {} bytes",
                        self.config.max_response_bytes
                    ),
                });
            }
        }

        if bytes.is_empty() {
            return Err(FetchError::Empty {
                uri: uri.to_string(),
            });
        }

        info!(uri = %uri, final_uri = %final_uri, bytes = bytes.len(), "fetched remote resource");
        Ok(FetchedResource {
            uri: final_uri,
            content_type,
            bytes,
        })
    }

    fn http_error(&self, uri: &Url, err: &reqwest::Error) -> FetchError {
        if err.is_timeout() {
            return FetchError::Timeout {
                uri: uri.to_string(),
                timeout_seconds: self.config.timeout_seconds,
            };
        }
        FetchError::Http {
            uri: uri.to_string(),
            details: err.to_string(),
        }
    }
}

impl ResourceFetcher for HttpFetcher {
    fn fetch(&self, uri: &Url) -> FetchResult<FetchedResource> {
        match uri.scheme() {
            "http" | "https" => self.runtime.block_on(self.fetch_with_retry(uri)),
            scheme => Err(FetchError::UnsupportedScheme {
                uri: uri.to_string(),
                scheme: scheme.to_string(),
            }),
        }
    }
}


/// Server errors, timeouts and transport failures are worth another attempt
fn is_retryable(err: &FetchError) -> bool {
    match err {
        FetchError::HttpStatus { status, .. } => (500..600).contains(status),
        FetchError::Timeout { .. } | FetchError::Http { .. } => true,
        _ => false,
    }
}

/// Dispatches on the URI scheme
pub struct DefaultFetcher {
    file: FileFetcher,
    http: HttpFetcher,
}

impl DefaultFetcher {
    pub fn new(config: FetchConfig) -> Result<Self, ValidationError> {
        Ok(Self {
            file: FileFetcher,
            http: HttpFetcher::new(config)?,
        })
    }
}

impl ResourceFetcher for DefaultFetcher {
    fn fetch(&self, uri: &Url) -> FetchResult<FetchedResource> {
        match uri.scheme() {
            "file" => self.file.fetch(uri),
            "http" | "https" => self.http.fetch(uri),
            scheme => Err(FetchError::UnsupportedScheme {
                uri: uri.to_string(),
                scheme: scheme.to_string(),
            }),
        }
    }
}

/// Remembers successful fetches for the lifetime of a run
pub struct CachingFetcher<F> {
    inner: F,
    cache: Cache<String, Arc<FetchedResource>>,
}

impl<F: ResourceFetcher> CachingFetcher<F> {
    pub fn new(inner: F, max_entries: u64) -> Self {
        Self {
            inner,
            cache: Cache::builder().max_capacity(max_entries).build(),
        }
    }

    pub fn cached_entries(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }
}

impl<F: ResourceFetcher> ResourceFetcher for CachingFetcher<F> {
    fn fetch(&self, uri: &Url) -> FetchResult<FetchedResource> {
        let key = uri.to_string();
        if let Some(hit) = self.cache.get(&key) {
            debug!(uri = %uri, "fetch cache hit");
            return Ok(hit.as_ref().clone());
        }
        let resource = self.inner.fetch(uri)?;
        self.cache.insert(key, Arc::new(resource.clone()));
        Ok(resource)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct CountingFetcher {
        calls: AtomicUsize,
    }

    impl ResourceFetcher for CountingFetcher {
        fn fetch(&self, uri: &Url) -> FetchResult<FetchedResource> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(FetchedResource {
                uri: uri.clone(),
                content_type: Some("image/png".to_string()),
                bytes: vec![1, 2, 3],
            })
        }
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let config = FetchConfig {
            retry_delay_ms: 1000,
            max_retry_delay_ms: 5000,
            ..Default::default()
        };
        assert_eq!(config.backoff_delay(0), Duration::from_millis(1000));
        assert_eq!(config.backoff_delay(1), Duration::from_millis(2000));
        assert_eq!(config.backoff_delay(2), Duration::from_millis(4000));
        assert_eq!(config.backoff_delay(3), Duration::from_millis(5000));
        assert_eq!(config.backoff_delay(40), Duration::from_millis(5000));
    }

    #[test]
    fn test_default_user_agent() {
        assert!(FetchConfig::default().user_agent.starts_with("kml-validate/"));
    }

    #[test]
    fn test_file_fetcher_reads_and_guesses_type() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("icon.png");
        std::fs::write(&path, b"\x89PNG").unwrap();
        let uri = Url::from_file_path(&path).unwrap();

        let resource = FileFetcher.fetch(&uri).unwrap();
        assert_eq!(resource.content_type.as_deref(), Some("image/png"));
        assert_eq!(resource.bytes, b"\x89PNG");
    }

    #[test]
    fn test_file_fetcher_rejects_missing_and_empty() {
        let dir = TempDir::new().unwrap();
        let missing = Url::from_file_path(dir.path().join("nope.kml")).unwrap();
        assert!(matches!(
            FileFetcher.fetch(&missing),
            Err(FetchError::NotFound { .. })
        ));

        let empty_path = dir.path().join("empty.kml");
        std::fs::write(&empty_path, b"").unwrap();
        let empty = Url::from_file_path(&empty_path).unwrap();
        assert!(matches!(
            FileFetcher.fetch(&empty),
            Err(FetchError::Empty { .. })
        ));
    }

    #[test]
    fn test_default_fetcher_rejects_unknown_scheme() {
        let fetcher = DefaultFetcher::new(FetchConfig::default()).unwrap();
        let uri = Url::parse("ftp://example.com/a.kml").unwrap();
        assert!(matches!(
            fetcher.fetch(&uri),
            Err(FetchError::UnsupportedScheme { scheme, .. }) if scheme == "ftp"
        ));
    }

    #[test]
    fn test_caching_fetcher_fetches_once() {
        let inner = CountingFetcher {
            calls: AtomicUsize::new(0),
        };
        let caching = CachingFetcher::new(inner, 16);
        let uri = Url::parse("http://example.com/icon.png").unwrap();

        let first = caching.fetch(&uri).unwrap();
        let second = caching.fetch(&uri).unwrap();
        assert_eq!(first, second);
        assert_eq!(caching.inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(caching.cached_entries(), 1);
    }

    #[test]
    fn test_retryable_errors() {
        assert!(is_retryable(&FetchError::HttpStatus {
            uri: "u".into(),
            status: 503
        }));
        assert!(!is_retryable(&FetchError::HttpStatus {
            uri: "u".into(),
            status: 404
        }));
        assert!(!is_retryable(&FetchError::NotFound { uri: "u".into() }));
    }
}
