//! SiteResearcher: search, then fetch the ranked competitor pages and the
//! target page for one keyword.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};
use url::Url;

use seoscope_shared::{PageGap, RawPage, Result, RetryPolicy, SearchHit, SeoscopeError};

use crate::fetcher::PageFetcher;
use crate::search::SearchProvider;

/// Pages retrieved for one keyword.
#[derive(Debug, Clone)]
pub struct ResearchOutput {
    /// Competitor pages in search-provider order.
    pub competitors: Vec<RawPage>,
    /// Competitor pages that could not be fetched.
    pub gaps: Vec<PageGap>,
    pub target: RawPage,
}

/// Retrieves competitor pages for a keyword.
#[derive(Clone)]
pub struct SiteResearcher {
    search: Arc<dyn SearchProvider>,
    fetcher: Arc<dyn PageFetcher>,
    retry: RetryPolicy,
    search_timeout: Duration,
    fetch_timeout: Duration,
}

impl SiteResearcher {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn PageFetcher>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            search,
            fetcher,
            retry,
            search_timeout: Duration::from_secs(15),
            fetch_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeouts(mut self, search_timeout: Duration, fetch_timeout: Duration) -> Self {
        self.search_timeout = search_timeout;
        self.fetch_timeout = fetch_timeout;
        self
    }

    /// Search for `keyword` and fetch up to `count` competitor pages plus the
    /// target page.
    ///
    /// Unreachable competitor pages are skipped and reported in
    /// [`ResearchOutput::gaps`]. Zero search results, zero usable competitor
    /// URLs, or an unreachable target page fail the keyword.
    #[instrument(skip_all, fields(keyword = %keyword, provider = self.search.name()))]
    pub async fn research(
        &self,
        keyword: &str,
        count: u32,
        target_url: &str,
    ) -> Result<ResearchOutput> {
        let hits = self
            .retry
            .run("search", self.search_timeout, || {
                self.search.search(keyword, count)
            })
            .await?;

        if hits.is_empty() {
            return Err(SeoscopeError::Retrieval(format!(
                "no search results for '{keyword}'"
            )));
        }

        let candidates = competitor_hits(hits, target_url, count as usize);
        if candidates.is_empty() {
            return Err(SeoscopeError::Retrieval(format!(
                "no competitor results for '{keyword}' besides the target site"
            )));
        }

        let mut competitors = Vec::with_capacity(candidates.len());
        let mut gaps = Vec::new();
        // Content hash -> rank of the first page with that body.
        let mut bodies: HashMap<Vec<u8>, u32> = HashMap::new();

        for hit in candidates {
            match self.fetch(&hit.url).await {
                Ok(content) => {
                    let digest = Sha256::digest(content.as_bytes()).to_vec();
                    if let Some(first) = bodies.get(&digest) {
                        debug!(url = %hit.url, first_rank = first, "duplicate page body");
                        gaps.push(PageGap {
                            url: hit.url,
                            rank: hit.rank,
                            reason: format!("same content as result #{first}"),
                        });
                        continue;
                    }
                    bodies.insert(digest, hit.rank);
                    competitors.push(RawPage {
                        url: hit.url,
                        rank: hit.rank,
                        content,
                    });
                }
                Err(e) => {
                    warn!(url = %hit.url, rank = hit.rank, error = %e, "skipping unreachable page");
                    gaps.push(PageGap {
                        url: hit.url,
                        rank: hit.rank,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let target_content = self.fetch(target_url).await.map_err(|e| {
            SeoscopeError::Retrieval(format!("target site {target_url} unreachable: {e}"))
        })?;

        info!(
            fetched = competitors.len(),
            skipped = gaps.len(),
            "research complete"
        );

        Ok(ResearchOutput {
            competitors,
            gaps,
            target: RawPage {
                url: target_url.to_string(),
                rank: 0,
                content: target_content,
            },
        })
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        self.retry
            .run("fetch", self.fetch_timeout, || self.fetcher.fetch(url))
            .await
    }
}

/// Drop duplicate URLs and the target site's own page, keeping provider order.
fn competitor_hits(hits: Vec<SearchHit>, target_url: &str, limit: usize) -> Vec<SearchHit> {
    let target = normalize_url(target_url);
    let mut seen = HashSet::new();

    hits.into_iter()
        .filter(|hit| {
            let key = normalize_url(&hit.url);
            key != target && seen.insert(key)
        })
        .take(limit)
        .collect()
}

/// Comparison key for a URL: lowercase host, no fragment, no trailing slash.
fn normalize_url(raw: &str) -> String {
    match Url::parse(raw.trim()) {
        Ok(mut url) => {
            url.set_fragment(None);
            let mut s = url.to_string();
            if s.ends_with('/') {
                s.pop();
            }
            s
        }
        Err(_) => raw.trim().trim_end_matches('/').to_ascii_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    struct FixedSearch(Vec<SearchHit>);

    #[async_trait]
    impl SearchProvider for FixedSearch {
        async fn search(&self, _keyword: &str, _count: u32) -> Result<Vec<SearchHit>> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    /// Serves canned pages; URLs without an entry fail with a network error.
    #[derive(Default)]
    struct MapFetcher {
        pages: HashMap<String, String>,
        requests: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PageFetcher for MapFetcher {
        async fn fetch(&self, url: &str) -> Result<String> {
            self.requests.lock().unwrap().push(url.to_string());
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| SeoscopeError::Network(format!("{url}: connection refused")))
        }
    }

    fn hit(url: &str, rank: u32) -> SearchHit {
        SearchHit {
            url: url.into(),
            rank,
            title: String::new(),
            snippet: String::new(),
        }
    }

    fn fetcher(urls: &[&str]) -> Arc<MapFetcher> {
        Arc::new(MapFetcher {
            pages: urls
                .iter()
                .map(|u| (u.to_string(), format!("<html><title>{u}</title></html>")))
                .collect(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn keeps_provider_order_and_skips_target_and_duplicates() {
        let search = Arc::new(FixedSearch(vec![
            hit("https://c.example.com/", 1),
            hit("https://mine.example.com/", 2),
            hit("https://a.example.com/", 3),
            hit("https://c.example.com/#top", 4),
            hit("https://b.example.com/", 5),
        ]));
        let fetcher = fetcher(&[
            "https://a.example.com/",
            "https://b.example.com/",
            "https://c.example.com/",
            "https://mine.example.com",
        ]);

        let researcher = SiteResearcher::new(search, fetcher, RetryPolicy::none());
        let out = researcher
            .research("sensors", 10, "https://mine.example.com")
            .await
            .unwrap();

        let urls: Vec<_> = out.competitors.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(
            urls,
            ["https://c.example.com/", "https://a.example.com/", "https://b.example.com/"]
        );
        let ranks: Vec<_> = out.competitors.iter().map(|p| p.rank).collect();
        assert_eq!(ranks, [1, 3, 5]);
        assert_eq!(out.target.rank, 0);
        assert!(out.gaps.is_empty());
    }

    #[tokio::test]
    async fn unreachable_page_becomes_a_gap() {
        let search = Arc::new(FixedSearch(vec![
            hit("https://a.example.com/", 1),
            hit("https://down.example.com/", 2),
        ]));
        let fetcher = fetcher(&["https://a.example.com/", "https://mine.example.com/"]);

        let researcher = SiteResearcher::new(search, fetcher.clone(), RetryPolicy::immediate(1));
        let out = researcher
            .research("sensors", 10, "https://mine.example.com/")
            .await
            .unwrap();

        assert_eq!(out.competitors.len(), 1);
        assert_eq!(out.gaps.len(), 1);
        assert_eq!(out.gaps[0].url, "https://down.example.com/");
        assert_eq!(out.gaps[0].rank, 2);

        // Network errors are transient: two attempts for the failing page
        let requests = fetcher.requests.lock().unwrap();
        let down = requests
            .iter()
            .filter(|u| u.as_str() == "https://down.example.com/")
            .count();
        assert_eq!(down, 2);
    }

    #[tokio::test]
    async fn zero_results_is_a_retrieval_error() {
        let researcher = SiteResearcher::new(
            Arc::new(FixedSearch(Vec::new())),
            fetcher(&[]),
            RetryPolicy::none(),
        );
        let err = researcher
            .research("sensors", 10, "https://mine.example.com/")
            .await
            .unwrap_err();
        assert!(matches!(err, SeoscopeError::Retrieval(_)));
    }

    #[tokio::test]
    async fn unreachable_target_fails_the_keyword() {
        let search = Arc::new(FixedSearch(vec![hit("https://a.example.com/", 1)]));
        let researcher =
            SiteResearcher::new(search, fetcher(&["https://a.example.com/"]), RetryPolicy::none());
        let err = researcher
            .research("sensors", 10, "https://mine.example.com/")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("target site"));
    }

    #[tokio::test]
    async fn respects_result_count() {
        let search = Arc::new(FixedSearch(
            (1..=5)
                .map(|i| hit(&format!("https://{i}.example.com/"), i))
                .collect(),
        ));
        let fetcher = fetcher(&[
            "https://1.example.com/",
            "https://2.example.com/",
            "https://mine.example.com/",
        ]);
        let researcher = SiteResearcher::new(search, fetcher, RetryPolicy::none());
        let out = researcher
            .research("sensors", 2, "https://mine.example.com/")
            .await
            .unwrap();
        assert_eq!(out.competitors.len(), 2);
    }

    #[tokio::test]
    async fn mirrored_pages_are_reported_once() {
        let search = Arc::new(FixedSearch(vec![
            hit("https://a.example.com/", 1),
            hit("https://mirror.example.com/", 2),
        ]));
        let body = "<html><title>Sensors</title></html>".to_string();
        let fetcher = Arc::new(MapFetcher {
            pages: HashMap::from([
                ("https://a.example.com/".to_string(), body.clone()),
                ("https://mirror.example.com/".to_string(), body),
                ("https://mine.example.com/".to_string(), "<title>mine</title>".to_string()),
            ]),
            ..Default::default()
        });

        let researcher = SiteResearcher::new(search, fetcher, RetryPolicy::none());
        let out = researcher
            .research("sensors", 10, "https://mine.example.com/")
            .await
            .unwrap();

        assert_eq!(out.competitors.len(), 1);
        assert_eq!(out.gaps[0].url, "https://mirror.example.com/");
        assert_eq!(out.gaps[0].reason, "same content as result #1");
    }

    #[test]
    fn url_normalization() {
        assert_eq!(
            normalize_url("https://Example.com/a/#frag"),
            normalize_url("https://example.com/a")
        );
        assert_ne!(
            normalize_url("https://example.com/a"),
            normalize_url("https://example.com/b")
        );
    }
}
