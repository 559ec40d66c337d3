pub mod address;
pub mod config;
pub mod crawler;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod filter;
pub mod frontier;
pub mod metrics;
pub mod output;
pub mod record;
pub mod resources;
pub mod transport;

pub use crawler::{CrawlSettings, CrawlSummary, CrawlerEngine, CrawlerState, ShutdownSignal, StopReason};
pub use error::{Error, Result};
pub use fetcher::Fetcher;
pub use metrics::collector::MetricsCollector;
pub use metrics::snapshot::MetricsSnapshot;
pub use record::{CrawlRecord, CrawlStatus};
