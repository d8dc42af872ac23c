//! Retrying HTTP client with proxy rotation.
//!
//! Every attempt picks one transport uniformly at random from the pool,
//! so a single blocked proxy cannot fail all retries of a request.
//! Retries are immediate; there is no backoff and no circuit breaker.

use crate::error::FeedError;
use async_trait::async_trait;
use deals_core::ProxyEndpoint;
use rand::Rng;
use reqwest::header::HeaderMap;
use reqwest::Method;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default per-request timeout for outbound calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// An outbound HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
}

impl HttpRequest {
    /// Create a GET request with the given headers.
    pub fn get(url: impl Into<String>, headers: HeaderMap) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers,
            body: None,
        }
    }

    /// Attach a JSON body.
    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// A fully read HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A single egress path for requests.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Execute a request once.
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, FeedError>;

    /// Label for logs.
    fn label(&self) -> String;
}

/// `reqwest`-backed transport, either direct or through one proxy.
pub struct ReqwestTransport {
    client: reqwest::Client,
    label: String,
}

impl ReqwestTransport {
    /// Transport without a proxy.
    pub fn direct(timeout: Duration) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            label: "direct".to_string(),
        })
    }

    /// Transport that routes every request through `endpoint`.
    pub fn via_proxy(endpoint: &ProxyEndpoint, timeout: Duration) -> Result<Self, FeedError> {
        let proxy = reqwest::Proxy::all(endpoint.url())
            .map_err(|e| FeedError::InvalidProxy(format!("{}: {}", endpoint, e)))?
            .basic_auth(&endpoint.username, &endpoint.password);

        let client = reqwest::Client::builder()
            .proxy(proxy)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            label: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, FeedError> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(HttpResponse { status, body })
    }

    fn label(&self) -> String {
        self.label.clone()
    }
}

/// HTTP client that retries failed requests over randomly chosen transports.
pub struct ProxyRotatedClient {
    transports: Vec<Arc<dyn HttpTransport>>,
    max_retries: u32,
}

impl ProxyRotatedClient {
    /// Retries after the first attempt unless overridden.
    pub const DEFAULT_MAX_RETRIES: u32 = 5;

    /// Create a client over an explicit set of transports.
    pub fn new(transports: Vec<Arc<dyn HttpTransport>>) -> Result<Self, FeedError> {
        if transports.is_empty() {
            return Err(FeedError::NoClients);
        }
        Ok(Self {
            transports,
            max_retries: Self::DEFAULT_MAX_RETRIES,
        })
    }

    /// Build one transport per proxy. An empty list yields a single direct transport.
    pub fn from_proxies(proxies: &[ProxyEndpoint], timeout: Duration) -> Result<Self, FeedError> {
        let transports: Vec<Arc<dyn HttpTransport>> = if proxies.is_empty() {
            vec![Arc::new(ReqwestTransport::direct(timeout)?)]
        } else {
            proxies
                .iter()
                .map(|p| ReqwestTransport::via_proxy(p, timeout).map(|t| Arc::new(t) as Arc<dyn HttpTransport>))
                .collect::<Result<_, _>>()?
        };
        Self::new(transports)
    }

    /// Override the number of retries per request.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Number of transports in the pool.
    pub fn pool_size(&self) -> usize {
        self.transports.len()
    }

    /// Send a request with the client's default retry budget.
    pub async fn request(&self, request: &HttpRequest) -> Result<HttpResponse, FeedError> {
        self.request_with_retries(request, self.max_retries).await
    }

    /// Send a request, retrying up to `max_retries` times after the first attempt.
    ///
    /// Transport errors and non-2xx statuses both count as failures. The
    /// error of the last attempt is returned once retries are exhausted.
    pub async fn request_with_retries(
        &self,
        request: &HttpRequest,
        max_retries: u32,
    ) -> Result<HttpResponse, FeedError> {
        let mut retries_left = max_retries;

        loop {
            let transport = self.pick();
            debug!(url = %request.url, via = %transport.label(), "Sending request");

            let error = match transport.execute(request).await {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) => FeedError::Status {
                    status: response.status,
                    url: request.url.clone(),
                },
                Err(e) => e,
            };

            if retries_left == 0 {
                return Err(error);
            }

            warn!(
                url = %request.url,
                via = %transport.label(),
                attempts_left = retries_left,
                transient = error.is_transient(),
                error = %error,
                "Retrying request"
            );
            retries_left -= 1;
        }
    }

    fn pick(&self) -> Arc<dyn HttpTransport> {
        let index = rand::thread_rng().gen_range(0..self.transports.len());
        Arc::clone(&self.transports[index])
    }
}
