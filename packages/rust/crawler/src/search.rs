//! Search-result providers.
//!
//! A provider returns the top ranked pages for a keyword in its own order.
//! Results are never re-sorted downstream.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, instrument};

use seoscope_shared::{Result, SearchHit, SeoscopeError};

/// The Custom Search JSON API returns at most ten items per request.
const MAX_RESULTS_PER_REQUEST: u32 = 10;

/// Source of ranked search results.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Return up to `count` results for `keyword`, ranked by the provider.
    async fn search(&self, keyword: &str, count: u32) -> Result<Vec<SearchHit>>;

    /// Human-readable provider name for tracing.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Google Custom Search
// ---------------------------------------------------------------------------

/// Settings for [`GoogleCustomSearch`].
#[derive(Debug)]
pub struct GoogleSearchOptions {
    pub endpoint: String,
    pub api_key: SecretString,
    pub cx: String,
    pub language: String,
    pub timeout: Duration,
}

/// Client for the Google Custom Search JSON API.
pub struct GoogleCustomSearch {
    client: Client,
    options: GoogleSearchOptions,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    link: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}

impl GoogleCustomSearch {
    pub fn new(options: GoogleSearchOptions) -> Result<Self> {
        let client = Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| SeoscopeError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, options })
    }
}

#[async_trait]
impl SearchProvider for GoogleCustomSearch {
    #[instrument(skip(self), fields(provider = "google"))]
    async fn search(&self, keyword: &str, count: u32) -> Result<Vec<SearchHit>> {
        let num = count.clamp(1, MAX_RESULTS_PER_REQUEST).to_string();

        let response = self
            .client
            .get(&self.options.endpoint)
            .query(&[
                ("key", self.options.api_key.expose_secret()),
                ("cx", self.options.cx.as_str()),
                ("q", keyword),
                ("num", num.as_str()),
                ("hl", self.options.language.as_str()),
            ])
            .send()
            .await
            .map_err(|e| classify_request_error("search", self.options.timeout, e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SeoscopeError::ProviderRateLimit(format!(
                "search provider returned HTTP {status}"
            )));
        }
        if status.is_server_error() {
            return Err(SeoscopeError::Network(format!(
                "search provider returned HTTP {status}"
            )));
        }
        if !status.is_success() {
            return Err(SeoscopeError::Retrieval(format!(
                "search provider returned HTTP {status}"
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| SeoscopeError::Retrieval(format!("malformed search response: {e}")))?;

        let hits = ranked_hits(body.items, count);
        debug!(keyword, results = hits.len(), "search complete");
        Ok(hits)
    }

    fn name(&self) -> &str {
        "google"
    }
}

/// Assign 1-based ranks in provider order, skipping items without a link.
fn ranked_hits(items: Vec<SearchItem>, count: u32) -> Vec<SearchHit> {
    items
        .into_iter()
        .filter(|item| !item.link.trim().is_empty())
        .take(count as usize)
        .enumerate()
        .map(|(i, item)| SearchHit {
            url: item.link,
            rank: i as u32 + 1,
            snippet: if item.snippet.is_empty() {
                item.title.clone()
            } else {
                item.snippet
            },
            title: item.title,
        })
        .collect()
}

/// Map a `reqwest` send error onto the provider error taxonomy.
pub(crate) fn classify_request_error(
    operation: &str,
    timeout: Duration,
    err: reqwest::Error,
) -> SeoscopeError {
    if err.is_timeout() {
        SeoscopeError::timeout(operation, timeout)
    } else {
        SeoscopeError::Network(format!("{operation}: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn options(server: &MockServer) -> GoogleSearchOptions {
        GoogleSearchOptions {
            endpoint: format!("{}/customsearch/v1", server.uri()),
            api_key: SecretString::from("test-key".to_string()),
            cx: "test-cx".into(),
            language: "en".into(),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn debug_output_hides_api_key() {
        let server = MockServer::start().await;
        let printed = format!("{:?}", options(&server));
        assert!(!printed.contains("test-key"));
        assert!(printed.contains("test-cx"));
    }

    #[tokio::test]
    async fn search_keeps_provider_order() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "items": [
                {"link": "https://b.example.com/", "title": "B", "snippet": "second by name, first by rank"},
                {"link": "https://a.example.com/", "title": "A", "snippet": ""},
                {"link": "", "title": "no link"},
                {"link": "https://c.example.com/", "title": "C", "snippet": "c"}
            ]
        });

        Mock::given(method("GET"))
            .and(path("/customsearch/v1"))
            .and(query_param("key", "test-key"))
            .and(query_param("q", "industrial sensors"))
            .and(query_param("num", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let provider = GoogleCustomSearch::new(options(&server)).unwrap();
        let hits = provider.search("industrial sensors", 3).await.unwrap();

        let urls: Vec<_> = hits.iter().map(|h| h.url.as_str()).collect();
        assert_eq!(
            urls,
            ["https://b.example.com/", "https://a.example.com/", "https://c.example.com/"]
        );
        assert_eq!(hits[0].rank, 1);
        assert_eq!(hits[2].rank, 3);
        // Empty snippet falls back to the title
        assert_eq!(hits[1].snippet, "A");
    }

    #[tokio::test]
    async fn rate_limit_is_reported_as_such() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let provider = GoogleCustomSearch::new(options(&server)).unwrap();
        let err = provider.search("sensors", 10).await.unwrap_err();
        assert!(matches!(err, SeoscopeError::ProviderRateLimit(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn client_errors_are_retrieval_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let provider = GoogleCustomSearch::new(options(&server)).unwrap();
        let err = provider.search("sensors", 10).await.unwrap_err();
        assert!(matches!(err, SeoscopeError::Retrieval(_)));
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"items": []}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let mut opts = options(&server);
        opts.timeout = Duration::from_millis(100);
        let provider = GoogleCustomSearch::new(opts).unwrap();
        let err = provider.search("sensors", 10).await.unwrap_err();
        assert!(matches!(err, SeoscopeError::ProviderTimeout { .. }));
    }

    #[tokio::test]
    async fn empty_result_set_is_not_an_error_here() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let provider = GoogleCustomSearch::new(options(&server)).unwrap();
        let hits = provider.search("sensors", 10).await.unwrap();
        assert!(hits.is_empty());
    }
}
