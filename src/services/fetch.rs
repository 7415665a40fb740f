// src/services/fetch.rs

//! Resilient HTTP fetch layer.
//!
//! Wraps `reqwest` with retry, exponential backoff, randomized request
//! identity, and proxy rotation. reqwest binds a proxy at client
//! construction time, so rotation is implemented by prebuilding one
//! client per outbound route and cycling between them per attempt.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::{Client, Proxy, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::{AppError, Result};
use crate::models::RequestPolicy;
use crate::services::ProxyPool;
use crate::utils::agents::random_user_agent;

/// Shared connection layer: one prebuilt client per outbound route.
///
/// Built once at startup and shared read-only across all monitors.
pub struct HttpSession {
    direct: Client,
    proxied: HashMap<String, Client>,
    pool: Arc<ProxyPool>,
}

impl HttpSession {
    pub fn new(pool: Arc<ProxyPool>) -> Result<Self> {
        let direct = Self::build_client(None)?;
        let mut proxied = HashMap::with_capacity(pool.len());
        for address in pool.addresses() {
            proxied.insert(address.clone(), Self::build_client(Some(address))?);
        }
        Ok(Self {
            direct,
            proxied,
            pool,
        })
    }

    fn build_client(proxy: Option<&str>) -> Result<Client> {
        let mut builder = Client::builder();
        if let Some(address) = proxy {
            builder = builder.proxy(Proxy::all(address)?);
        }
        Ok(builder.build()?)
    }

    pub fn pool(&self) -> &ProxyPool {
        &self.pool
    }

    /// Client for the given route; unknown or absent routes go direct.
    fn client_for(&self, route: Option<&str>) -> &Client {
        route
            .and_then(|address| self.proxied.get(address))
            .unwrap_or(&self.direct)
    }
}

/// Optional per-call knobs for a fetch.
#[derive(Default)]
pub struct FetchOptions<'a> {
    /// Query string parameters appended to the URL
    pub query: &'a [(&'a str, &'a str)],

    /// Header overrides, applied on top of the baseline headers
    pub headers: Option<HeaderMap>,

    /// Pin all attempts to one proxy address instead of rotating
    pub pinned_proxy: Option<&'a str>,
}

/// One logical GET with retry, backoff, and route rotation.
///
/// Response classification:
/// - 403/429: retryable; rotate route and back off, up to the budget
/// - network/timeout errors: retryable on the same budget
/// - any other non-2xx: fatal, no retry
#[derive(Clone)]
pub struct RequestClient {
    session: Arc<HttpSession>,
    policy: RequestPolicy,
}

impl RequestClient {
    pub fn new(session: Arc<HttpSession>, policy: RequestPolicy) -> Self {
        Self {
            session,
            policy: policy.normalized(),
        }
    }

    pub fn policy(&self) -> &RequestPolicy {
        &self.policy
    }

    /// Fetch a URL and return the body as text.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        self.get_text_with(url, &FetchOptions::default()).await
    }

    pub async fn get_text_with(&self, url: &str, options: &FetchOptions<'_>) -> Result<String> {
        let response = self.request(url, options).await?;
        Ok(response.text().await?)
    }

    /// Fetch a URL and decode the body as JSON.
    ///
    /// A 2xx body that fails to decode surfaces as `AppError::Json`, a
    /// soft failure distinct from being blocked.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let text = self.get_text(url).await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn request(&self, url: &str, options: &FetchOptions<'_>) -> Result<reqwest::Response> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let route = match options.pinned_proxy {
                Some(address) => Some(address),
                None => self.session.pool().next_proxy(),
            };

            let mut headers = baseline_headers();
            if let Some(overrides) = &options.headers {
                for (name, value) in overrides {
                    headers.insert(name.clone(), value.clone());
                }
            }

            let mut builder = self
                .session
                .client_for(route)
                .get(url)
                .headers(headers)
                .timeout(self.policy.timeout());
            if !options.query.is_empty() {
                builder = builder.query(options.query);
            }

            match builder.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
                        if attempt >= self.policy.max_retries {
                            return Err(AppError::Blocked {
                                status: status.as_u16(),
                                attempts: attempt,
                            });
                        }
                        log::warn!("Received {} from {}, rotating route", status.as_u16(), url);
                        tokio::time::sleep(self.backoff_delay(attempt)).await;
                        continue;
                    }
                    if !status.is_success() {
                        return Err(AppError::Upstream {
                            status: status.as_u16(),
                        });
                    }
                    return Ok(response);
                }
                Err(error) => {
                    if attempt >= self.policy.max_retries {
                        return Err(AppError::Http(error));
                    }
                    log::warn!("Request error on {url} attempt {attempt}: {error}");
                    tokio::time::sleep(self.backoff_delay(attempt)).await;
                }
            }
        }
    }

    /// Delay before the next attempt.
    ///
    /// Jitter stays below one quarter of the base step, keeping the delay
    /// for attempt k+1 strictly longer than for attempt k.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.policy.backoff_factor * f64::from(attempt);
        let jitter = rand::rng().random_range(0.0..self.policy.backoff_factor / 4.0);
        Duration::from_secs_f64(base + jitter)
    }
}

fn baseline_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(random_user_agent()));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn test_client(policy: RequestPolicy) -> RequestClient {
        let session = HttpSession::new(Arc::new(ProxyPool::new(Vec::new()))).unwrap();
        RequestClient::new(Arc::new(session), policy)
    }

    fn quick_policy(max_retries: u32) -> RequestPolicy {
        RequestPolicy {
            max_retries,
            backoff_factor: 0.1,
            timeout_secs: 2,
        }
    }

    /// Serve a fixed HTTP response and count accepted connections.
    async fn serve_fixed(response: &'static str) -> (std::net::SocketAddr, Arc<AtomicUsize>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 2048];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        (addr, hits)
    }

    #[test]
    fn backoff_grows_strictly_per_attempt() {
        let client = test_client(RequestPolicy {
            max_retries: 5,
            backoff_factor: 1.5,
            timeout_secs: 10,
        });
        let mut previous = Duration::ZERO;
        for attempt in 1..=5 {
            let delay = client.backoff_delay(attempt);
            assert!(delay > previous, "attempt {attempt} did not grow");
            previous = delay;
        }
    }

    #[test]
    fn policy_is_normalized_on_construction() {
        let client = test_client(RequestPolicy {
            max_retries: 0,
            backoff_factor: 0.0,
            timeout_secs: 0,
        });
        assert_eq!(client.policy().max_retries, 1);
    }

    #[tokio::test]
    async fn rate_limited_requests_stop_at_retry_budget() {
        let (addr, hits) = serve_fixed(
            "HTTP/1.1 429 Too Many Requests\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        )
        .await;

        let client = test_client(quick_policy(3));
        let err = client
            .get_text(&format!("http://{addr}/drop"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AppError::Blocked {
                status: 429,
                attempts: 3
            }
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn other_status_codes_fail_without_retry() {
        let (addr, hits) = serve_fixed(
            "HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        )
        .await;

        let client = test_client(quick_policy(3));
        let err = client
            .get_text(&format!("http://{addr}/gone"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Upstream { status: 404 }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn success_returns_body_text() {
        let (addr, _) = serve_fixed(
            "HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok",
        )
        .await;

        let client = test_client(quick_policy(3));
        let body = client.get_text(&format!("http://{addr}/")).await.unwrap();
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn malformed_json_is_a_soft_failure() {
        let (addr, _) = serve_fixed(
            "HTTP/1.1 200 OK\r\ncontent-length: 9\r\nconnection: close\r\n\r\nnot json!",
        )
        .await;

        let client = test_client(quick_policy(3));
        let err = client
            .get_json::<serde_json::Value>(&format!("http://{addr}/"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Json(_)));
    }
}
