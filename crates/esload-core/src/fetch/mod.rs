//! Remote module fetch cache.
//!
//! Fetches `http:`, `https:` and `data:` modules at most once per specifier,
//! following redirects manually and remembering them. Cached modules are
//! never revalidated.

pub(crate) mod data_url;
mod transport;

pub use self::data_url::DataUrl;
pub use transport::{HttpTransport, Transport, TransportResponse};

use crate::error::{codes, LoaderError, Result};
use crate::media_type::{map_content_type, MediaType};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OnceCell;
use tracing::debug;
use url::Url;

/// Maximum number of redirect hops followed for one specifier.
pub const MAX_REDIRECTS: usize = 10;

/// A fetched module, keyed by its final (post-redirect) specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub specifier: String,
    pub media_type: MediaType,
    pub data: Bytes,
}

type InFlight = Arc<OnceCell<Result<()>>>;

/// Deduplicating, redirect-aware cache over a [`Transport`].
pub struct FetchCache {
    transport: Arc<dyn Transport>,
    modules: Mutex<HashMap<String, Arc<Module>>>,
    redirects: Mutex<HashMap<String, String>>,
    ongoing: Mutex<HashMap<String, InFlight>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FetchCache {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            modules: Mutex::new(HashMap::new()),
            redirects: Mutex::new(HashMap::new()),
            ongoing: Mutex::new(HashMap::new()),
        }
    }

    /// Load a remote module, fetching it only if it is not cached.
    ///
    /// Concurrent callers for the same specifier share one underlying fetch
    /// and observe the same outcome.
    ///
    /// # Errors
    /// Returns an error on network failure, a non-success status, an invalid
    /// redirect, or more than [`MAX_REDIRECTS`] hops.
    pub async fn load_remote(&self, specifier: &str) -> Result<Arc<Module>> {
        loop {
            let resolved = self.resolve_redirects(specifier)?;

            if let Some(module) = self.cached(&resolved) {
                return Ok(module);
            }

            let cell = lock(&self.ongoing)
                .entry(resolved.clone())
                .or_default()
                .clone();

            let outcome = cell
                .get_or_init(|| self.fetch_once(&resolved))
                .await
                .clone();

            {
                let mut ongoing = lock(&self.ongoing);
                if ongoing.get(&resolved).is_some_and(|c| Arc::ptr_eq(c, &cell)) {
                    ongoing.remove(&resolved);
                }
            }

            outcome?;
        }
    }

    /// Peek at a cached module without fetching. Redirects are not followed.
    #[must_use]
    pub fn cached(&self, specifier: &str) -> Option<Arc<Module>> {
        lock(&self.modules).get(specifier).cloned()
    }

    /// Number of cached modules.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.modules).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Follow the redirect map from `specifier` to its final target.
    fn resolve_redirects(&self, specifier: &str) -> Result<String> {
        let redirects = lock(&self.redirects);
        let mut current = specifier;
        let mut hops = 0;

        while let Some(next) = redirects.get(current) {
            hops += 1;
            if hops > MAX_REDIRECTS {
                return Err(LoaderError::new(
                    codes::REDIRECT_LIMIT,
                    format!("Too many redirects while fetching {specifier}"),
                ));
            }
            current = next.as_str();
        }

        Ok(current.to_string())
    }

    /// Perform one request. A redirect is recorded, not followed.
    async fn fetch_once(&self, specifier: &str) -> Result<()> {
        let url = Url::parse(specifier)
            .map_err(|e| LoaderError::new(codes::SPECIFIER_INVALID, format!("{specifier}: {e}")))?;

        match url.scheme() {
            "data" => {
                let data = DataUrl::decode(&url)?;
                let media_type = map_content_type(&url, Some(&data.mime_type));
                self.insert(specifier, media_type, data.body);
                Ok(())
            }
            "http" | "https" => self.fetch_http(specifier, &url).await,
            _ => Err(LoaderError::unsupported_scheme(specifier)),
        }
    }

    async fn fetch_http(&self, specifier: &str, url: &Url) -> Result<()> {
        debug!(url = %url, "fetching remote module");
        let response = self.transport.get(url).await?;

        match response.status {
            200..=299 => {
                let media_type = map_content_type(url, response.content_type.as_deref());
                debug!(
                    url = %url,
                    media_type = %media_type,
                    bytes = response.body.len(),
                    "fetched remote module"
                );
                self.insert(specifier, media_type, response.body);
                Ok(())
            }
            300..=399 => {
                let target = redirect_target(url, &response)?;
                debug!(from = %url, to = %target, status = response.status, "redirect");
                lock(&self.redirects).insert(specifier.to_string(), target.to_string());
                Ok(())
            }
            status => Err(LoaderError::fetch_status(status, url.as_str())),
        }
    }

    fn insert(&self, specifier: &str, media_type: MediaType, data: Bytes) {
        let module = Arc::new(Module {
            specifier: specifier.to_string(),
            media_type,
            data,
        });
        lock(&self.modules).insert(specifier.to_string(), module);
    }
}

/// Validate the `Location` of a 3xx response from `url`.
///
/// # Errors
/// Returns `REDIRECT_MISSING_LOCATION` if the header is absent or does not
/// parse, and `REDIRECT_SCHEME_DISALLOWED` if the target is not HTTP(S).
pub(crate) fn redirect_target(url: &Url, response: &TransportResponse) -> Result<Url> {
    let location = response.location.as_deref().ok_or_else(|| {
        LoaderError::new(
            codes::REDIRECT_MISSING_LOCATION,
            format!(
                "Redirect from {url} (status {}) has no Location header",
                response.status
            ),
        )
    })?;

    let target = url.join(location).map_err(|e| {
        LoaderError::new(
            codes::REDIRECT_MISSING_LOCATION,
            format!("Invalid redirect location '{location}' from {url}: {e}"),
        )
    })?;

    if !matches!(target.scheme(), "http" | "https") {
        return Err(LoaderError::new(
            codes::REDIRECT_SCHEME_DISALLOWED,
            format!("Redirect from {url} to non-HTTP URL {target}"),
        ));
    }

    Ok(target)
}

impl std::fmt::Debug for FetchCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchCache")
            .field("modules", &self.len())
            .field("redirects", &lock(&self.redirects).len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Serves canned responses and counts requests per URL.
    #[derive(Default)]
    struct MockTransport {
        responses: HashMap<String, TransportResponse>,
        requests: Mutex<HashMap<String, usize>>,
        total: AtomicUsize,
    }

    impl MockTransport {
        fn with(mut self, url: &str, response: TransportResponse) -> Self {
            self.responses.insert(url.to_string(), response);
            self
        }

        fn count(&self, url: &str) -> usize {
            lock(&self.requests).get(url).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn get(&self, url: &Url) -> Result<TransportResponse> {
            self.total.fetch_add(1, Ordering::SeqCst);
            *lock(&self.requests).entry(url.to_string()).or_default() += 1;
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(self
                .responses
                .get(url.as_str())
                .cloned()
                .unwrap_or_else(|| TransportResponse::status(404)))
        }
    }

    fn cache(mock: MockTransport) -> (FetchCache, Arc<MockTransport>) {
        let mock = Arc::new(mock);
        (FetchCache::new(mock.clone()), mock)
    }

    #[tokio::test]
    async fn test_fetch_and_cache() {
        let (cache, mock) = cache(MockTransport::default().with(
            "https://deno.land/x/mod.ts",
            TransportResponse::ok(Some("application/typescript"), "export const x = 1;"),
        ));

        let first = cache.load_remote("https://deno.land/x/mod.ts").await.unwrap();
        assert_eq!(first.media_type, MediaType::TypeScript);
        assert_eq!(first.data.as_ref(), b"export const x = 1;");

        let second = cache.load_remote("https://deno.land/x/mod.ts").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(mock.count("https://deno.land/x/mod.ts"), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_fetch() {
        let (cache, mock) = cache(MockTransport::default().with(
            "https://x.test/a.js",
            TransportResponse::ok(Some("text/javascript"), "1"),
        ));

        let (a, b) = tokio::join!(
            cache.load_remote("https://x.test/a.js"),
            cache.load_remote("https://x.test/a.js")
        );
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(mock.count("https://x.test/a.js"), 1);
    }

    #[tokio::test]
    async fn test_concurrent_failures_share_one_outcome() {
        let (cache, mock) = cache(MockTransport::default());

        let (a, b) = tokio::join!(
            cache.load_remote("https://x.test/missing.js"),
            cache.load_remote("https://x.test/missing.js")
        );
        let (a, b) = (a.unwrap_err(), b.unwrap_err());
        assert_eq!(a, b);
        assert_eq!(a.code(), codes::FETCH_STATUS);
        assert!(a.message().contains("404"));
        assert!(a.message().contains("https://x.test/missing.js"));
        assert_eq!(mock.count("https://x.test/missing.js"), 1);
    }

    #[tokio::test]
    async fn test_redirect_chain() {
        let (cache, mock) = cache(
            MockTransport::default()
                .with("https://x.test/0", TransportResponse::redirect(301, "/1"))
                .with("https://x.test/1", TransportResponse::redirect(302, "https://x.test/2"))
                .with("https://x.test/2", TransportResponse::redirect(307, "/3.ts"))
                .with(
                    "https://x.test/3.ts",
                    TransportResponse::ok(Some("application/typescript"), "export {}"),
                ),
        );

        let module = cache.load_remote("https://x.test/0").await.unwrap();
        assert_eq!(module.specifier, "https://x.test/3.ts");
        assert_eq!(module.media_type, MediaType::TypeScript);

        // The redirect map answers the second lookup.
        let again = cache.load_remote("https://x.test/0").await.unwrap();
        assert!(Arc::ptr_eq(&module, &again));
        assert_eq!(mock.total.load(Ordering::SeqCst), 4);
        assert!(cache.cached("https://x.test/0").is_none());
    }

    fn chain(len: usize) -> MockTransport {
        let mut mock = MockTransport::default();
        for i in 0..len {
            mock = mock.with(
                &format!("https://x.test/{i}"),
                TransportResponse::redirect(302, &format!("/{}", i + 1)),
            );
        }
        mock.with(
            &format!("https://x.test/{len}"),
            TransportResponse::ok(Some("text/javascript"), "ok"),
        )
    }

    #[tokio::test]
    async fn test_ten_redirects_allowed() {
        let (cache, _) = cache(chain(MAX_REDIRECTS));
        let module = cache.load_remote("https://x.test/0").await.unwrap();
        assert_eq!(module.specifier, "https://x.test/10");
    }

    #[tokio::test]
    async fn test_eleven_redirects_fail() {
        let (cache, _) = cache(chain(MAX_REDIRECTS + 1));
        let err = cache.load_remote("https://x.test/0").await.unwrap_err();
        assert_eq!(err.code(), codes::REDIRECT_LIMIT);
    }

    #[tokio::test]
    async fn test_redirect_loop_fails() {
        let (cache, _) = cache(
            MockTransport::default()
                .with("https://x.test/a", TransportResponse::redirect(302, "/b"))
                .with("https://x.test/b", TransportResponse::redirect(302, "/a")),
        );
        let err = cache.load_remote("https://x.test/a").await.unwrap_err();
        assert_eq!(err.code(), codes::REDIRECT_LIMIT);
    }

    #[tokio::test]
    async fn test_redirect_without_location() {
        let (cache, _) = cache(
            MockTransport::default().with("https://x.test/a", TransportResponse::status(302)),
        );
        let err = cache.load_remote("https://x.test/a").await.unwrap_err();
        assert_eq!(err.code(), codes::REDIRECT_MISSING_LOCATION);
    }

    #[tokio::test]
    async fn test_redirect_to_non_http_scheme() {
        let (cache, _) = cache(MockTransport::default().with(
            "https://x.test/a",
            TransportResponse::redirect(302, "file:///etc/passwd"),
        ));
        let err = cache.load_remote("https://x.test/a").await.unwrap_err();
        assert_eq!(err.code(), codes::REDIRECT_SCHEME_DISALLOWED);
    }

    #[tokio::test]
    async fn test_informational_status_is_an_error() {
        let (cache, _) = cache(
            MockTransport::default().with("https://x.test/a", TransportResponse::status(101)),
        );
        let err = cache.load_remote("https://x.test/a").await.unwrap_err();
        assert_eq!(err.code(), codes::FETCH_STATUS);
    }

    #[tokio::test]
    async fn test_data_url_never_hits_transport() {
        let (cache, mock) = cache(MockTransport::default());
        let module = cache
            .load_remote("data:application/javascript,export%20default%2042")
            .await
            .unwrap();
        assert_eq!(module.media_type, MediaType::JavaScript);
        assert_eq!(module.data.as_ref(), b"export default 42");
        assert_eq!(mock.total.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_content_type_fallback_to_extension() {
        let (cache, _) = cache(
            MockTransport::default()
                .with("https://x.test/a.tsx", TransportResponse::ok(None, "<div/>")),
        );
        let module = cache.load_remote("https://x.test/a.tsx").await.unwrap();
        assert_eq!(module.media_type, MediaType::Tsx);
    }
}
