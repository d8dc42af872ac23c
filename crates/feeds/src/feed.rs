//! Deals feed endpoint.

use crate::client::{HttpRequest, ProxyRotatedClient};
use crate::error::FeedError;
use crate::parser::ResponseParser;
use deals_core::{DealRecord, ScheduleTask};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::debug;
use url::Url;

/// Default feed host.
pub const DEFAULT_FEED_URL: &str = "https://saving.deals";

/// Static headers mimicking a same-origin browser request.
const BROWSER_HEADERS: [(&str, &str); 13] = [
    (
        "user-agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:128.0) Gecko/20100101 Firefox/128.0",
    ),
    ("accept", "*/*"),
    ("accept-language", "en-US,en;q=0.5"),
    ("rsc", "1"),
    ("next-url", "/top"),
    ("dnt", "1"),
    ("sec-gpc", "1"),
    ("sec-fetch-dest", "empty"),
    ("sec-fetch-mode", "cors"),
    ("sec-fetch-site", "same-origin"),
    ("priority", "u=0"),
    ("pragma", "no-cache"),
    ("cache-control", "no-cache"),
];

/// Client for the deals feed's `/top` listing.
pub struct DealFeed {
    client: ProxyRotatedClient,
    base_url: Url,
    headers: HeaderMap,
}

impl DealFeed {
    /// Create a feed client for the given host (e.g. [`DEFAULT_FEED_URL`]).
    pub fn new(client: ProxyRotatedClient, base_url: &str) -> Result<Self, FeedError> {
        let base_url = Url::parse(base_url)?;
        let headers = Self::build_headers(&base_url)?;
        Ok(Self {
            client,
            base_url,
            headers,
        })
    }

    fn build_headers(base_url: &Url) -> Result<HeaderMap, FeedError> {
        let mut headers = HeaderMap::new();
        for (name, value) in BROWSER_HEADERS {
            headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
        }

        let referer = base_url.join("top")?;
        let referer = HeaderValue::from_str(referer.as_str())
            .map_err(|e| FeedError::InvalidRequest(e.to_string()))?;
        headers.insert(reqwest::header::REFERER, referer);

        Ok(headers)
    }

    /// Headers sent with every feed request.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// URL of one listing page for a task.
    pub fn page_url(&self, task: &ScheduleTask, page: u32) -> Result<Url, FeedError> {
        let mut url = self.base_url.join("top")?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("age", task.age.as_query())
            .append_pair("off", &task.discount.to_string())
            .append_pair("categories", &task.category);
        Ok(url)
    }

    /// Fetch the raw body of one listing page. `None` when the body is empty.
    pub async fn fetch_page(&self, task: &ScheduleTask, page: u32) -> Result<Option<String>, FeedError> {
        let url = self.page_url(task, page)?;
        debug!(url = %url, "Requesting deals page");

        let request = HttpRequest::get(url.as_str(), self.headers.clone());
        let response = self.client.request(&request).await?;

        if response.body.trim().is_empty() {
            Ok(None)
        } else {
            Ok(Some(response.body))
        }
    }

    /// Fetch and parse the first listing page for a task.
    ///
    /// `Ok(None)` means the feed answered with no body. A body that cannot
    /// be parsed yields `Ok(Some(vec![]))`.
    pub async fn fetch_deals(&self, task: &ScheduleTask) -> Result<Option<Vec<DealRecord>>, FeedError> {
        Ok(self
            .fetch_page(task, 1)
            .await?
            .map(|body| ResponseParser::extract(&body)))
    }
}
