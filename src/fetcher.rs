use crate::address::AddressRules;
use crate::extract::{contains_keyword, extract_links};
use crate::record::{CrawlRecord, CrawlStatus};
use crate::transport::Transport;
use std::sync::Arc;
use std::time::Duration;

/// Fetch-extract unit: turns one address into exactly one `CrawlRecord`.
/// Holds no crawl state, so many calls can be in flight at once.
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    rules: AddressRules,
    timeout: Duration,
    keyword: Option<String>,
}

impl Fetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        rules: AddressRules,
        timeout: Duration,
        keyword: Option<String>,
    ) -> Self {
        let keyword = keyword
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        Self {
            transport,
            rules,
            timeout,
            keyword,
        }
    }

    pub fn keyword(&self) -> Option<&str> {
        self.keyword.as_deref()
    }

    pub async fn crawl(&self, url: &str) -> CrawlRecord {
        let base = match self.rules.validate(url) {
            Ok(base) if !self.rules.is_skippable(url) => base,
            Ok(_) => {
                log::info!("Skipping non-document: {}", url);
                return CrawlRecord::skipped(url);
            }
            Err(e) => {
                log::info!("Skipping: {}", e);
                return CrawlRecord::skipped(url);
            }
        };

        let response = match self.transport.fetch(url, self.timeout).await {
            Ok(response) => response,
            Err(e) => {
                log::warn!("Error crawling {}: {}", url, e);
                return CrawlRecord::new(url, CrawlStatus::FailedWithError(e.kind().to_string()));
            }
        };

        if response.status != 200 || !response.is_html() {
            log::info!(
                "Non-HTML response: {} (Status: {}, Content-Type: {})",
                url,
                response.status,
                response.content_type.as_deref().unwrap_or("none")
            );
            return CrawlRecord::new(url, CrawlStatus::FailedWithStatus(response.status));
        }

        let links = extract_links(&response.body, &base, &self.rules);
        let keyword_match = self
            .keyword
            .as_deref()
            .map(|k| contains_keyword(&response.body, k))
            .unwrap_or(false);

        if keyword_match {
            log::info!("Keyword match found: {}", url);
        } else {
            log::info!("Crawled: {} ({} links)", url, links.len());
        }

        CrawlRecord {
            keyword_match,
            ..CrawlRecord::success(url, links, response.body)
        }
    }
}
