use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;

/// Terminal outcome of one fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlStatus {
    Success,
    Skipped,
    FailedWithStatus(u16),
    FailedWithError(String),
}

impl CrawlStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, CrawlStatus::Success)
    }
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrawlStatus::Success => write!(f, "success"),
            CrawlStatus::Skipped => write!(f, "skipped"),
            CrawlStatus::FailedWithStatus(code) => write!(f, "failed_with_status_{}", code),
            CrawlStatus::FailedWithError(kind) => write!(f, "failed_with_error_{}", kind),
        }
    }
}

impl Serialize for CrawlStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CrawlRecord {
    pub url: String,
    pub status: CrawlStatus,
    pub links: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub keyword_match: bool,
    pub timestamp: DateTime<Utc>,
}

impl CrawlRecord {
    pub fn new(url: impl Into<String>, status: CrawlStatus) -> Self {
        Self {
            url: url.into(),
            status,
            links: BTreeSet::new(),
            content: None,
            keyword_match: false,
            timestamp: Utc::now(),
        }
    }

    pub fn skipped(url: impl Into<String>) -> Self {
        Self::new(url, CrawlStatus::Skipped)
    }

    pub fn success(url: impl Into<String>, links: BTreeSet<String>, content: String) -> Self {
        Self {
            links,
            content: Some(content),
            ..Self::new(url, CrawlStatus::Success)
        }
    }
}
