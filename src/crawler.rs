use crate::config::{CrawlConfig, ExhaustedPolicy};
use crate::error::Result;
use crate::fetcher::Fetcher;
use crate::filter::ScalableBloomFilter;
use crate::frontier::{Frontier, FrontierStore};
use crate::metrics::collector::MetricsCollector;
use crate::metrics::snapshot::MetricsSnapshot;
use crate::output::{PageArchive, RecordStore};
use crate::record::CrawlRecord;
use crate::resources::ResourceMonitor;
use futures::future::join_all;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlerState {
    Idle,
    Running,
    /// No new batch will start; final state is being persisted.
    Draining,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Deadline,
    Interrupted,
    Exhausted,
}

/// Cooperative stop request, observed only between batches.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Triggers the signal and reports whether it had already been
    /// triggered, so a repeated interrupt can escalate.
    pub fn request(&self) -> bool {
        self.0.swap(true, Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub output_root: PathBuf,
    pub seeds: Vec<String>,
    pub duration: Duration,
    pub filter_capacity: usize,
    pub filter_error_rate: f64,
    pub exhausted_policy: ExhaustedPolicy,
    pub seed_retry_interval: Duration,
    pub save_raw_pages: bool,
    pub store_content: bool,
}

impl CrawlSettings {
    pub fn from_config(config: &CrawlConfig, duration: Duration) -> Self {
        Self {
            output_root: config.output_root(),
            seeds: config.seeds.clone(),
            duration,
            filter_capacity: config.filter_capacity,
            filter_error_rate: config.filter_error_rate,
            exhausted_policy: config.exhausted_policy,
            seed_retry_interval: Duration::from_millis(config.seed_retry_interval_ms),
            save_raw_pages: config.save_raw_pages,
            store_content: config.store_content,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CrawlSummary {
    pub reason: StopReason,
    pub pending: usize,
    pub metrics: MetricsSnapshot,
}

/// Single-owner scheduling loop: pulls a batch off the frontier, fetches it
/// concurrently, merges the results back and persists, then sleeps.
pub struct CrawlerEngine {
    settings: CrawlSettings,
    fetcher: Fetcher,
    monitor: ResourceMonitor,
    records: Box<dyn RecordStore>,
    frontier: Frontier,
    store: FrontierStore,
    archive: PageArchive,
    metrics: Arc<MetricsCollector>,
    shutdown: ShutdownSignal,
    state_watcher: watch::Sender<CrawlerState>,
}

impl CrawlerEngine {
    pub fn new(
        settings: CrawlSettings,
        fetcher: Fetcher,
        monitor: ResourceMonitor,
        records: Box<dyn RecordStore>,
    ) -> Self {
        let (state_tx, _) = watch::channel(CrawlerState::Idle);
        let frontier = Frontier::new(
            Box::new(ScalableBloomFilter::new(settings.filter_capacity, settings.filter_error_rate)),
            Box::new(ScalableBloomFilter::new(settings.filter_capacity, settings.filter_error_rate)),
        );

        Self {
            store: FrontierStore::new(&settings.output_root),
            archive: PageArchive::new(&settings.output_root),
            settings,
            fetcher,
            monitor,
            records,
            frontier,
            metrics: Arc::new(MetricsCollector::new()),
            shutdown: ShutdownSignal::new(),
            state_watcher: state_tx,
        }
    }

    /// Shares an externally owned stop flag (e.g. one set by a Ctrl-C handler).
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    pub fn state(&self) -> CrawlerState {
        *self.state_watcher.borrow()
    }

    /// Loads the persisted queue and visited log. Unreadable files are
    /// logged and treated as empty.
    pub fn restore(&mut self) -> usize {
        let pending = self.store.load().unwrap_or_else(|e| {
            log::error!("Could not read frontier snapshot: {}", e);
            Vec::new()
        });
        let visited = self.store.load_visited().unwrap_or_else(|e| {
            log::error!("Could not read visited log: {}", e);
            Vec::new()
        });

        log::info!(
            "Restored {} queued and {} visited addresses from {}",
            pending.len(),
            visited.len(),
            self.store.root().display()
        );
        self.frontier.restore(pending, visited);
        self.metrics.set_frontier_len(self.frontier.len());
        self.frontier.len()
    }

    pub async fn run(&mut self) -> Result<CrawlSummary> {
        let start = Instant::now();
        self.set_state(CrawlerState::Running);

        let reason = loop {
            if self.shutdown.is_triggered() {
                log::info!("Shutdown requested. Saving progress...");
                break StopReason::Interrupted;
            }
            if start.elapsed() > self.settings.duration {
                log::info!(
                    "Time limit of {} minutes reached. Stopping crawler.",
                    self.settings.duration.as_secs() / 60
                );
                break StopReason::Deadline;
            }

            if self.frontier.is_empty() && !self.inject_seed() {
                match self.settings.exhausted_policy {
                    ExhaustedPolicy::Stop => {
                        log::info!("Frontier and seed list exhausted. No more URLs to crawl.");
                        break StopReason::Exhausted;
                    }
                    ExhaustedPolicy::Wait => {
                        log::debug!("Frontier empty, re-checking seeds in {:?}", self.settings.seed_retry_interval);
                        sleep(self.settings.seed_retry_interval).await;
                        continue;
                    }
                }
            }

            let throttle = self.monitor.sample().await;
            let batch = self.frontier.take_batch(throttle.concurrency);
            self.metrics.start_batch(throttle.concurrency);
            log::debug!("Dispatching batch of {} ({} still queued)", batch.len(), self.frontier.len());

            let fetcher = &self.fetcher;
            let records = join_all(batch.iter().map(|url| fetcher.crawl(url))).await;

            self.merge(&records).await;
            self.persist_frontier();

            sleep(throttle.delay).await;
        };

        self.set_state(CrawlerState::Draining);
        self.persist_frontier();
        if let Err(e) = self.records.close().await {
            log::warn!("Error closing record store: {}", e);
        }
        self.set_state(CrawlerState::Stopped);

        Ok(CrawlSummary {
            reason,
            pending: self.frontier.len(),
            metrics: self.metrics.snapshot(),
        })
    }

    /// Queues the first seed not yet visited or queued.
    fn inject_seed(&mut self) -> bool {
        let seed = self
            .settings
            .seeds
            .iter()
            .find(|seed| !self.frontier.is_known(seed))
            .cloned();

        match seed {
            Some(seed) => {
                log::info!("Frontier empty. Starting with: {}", seed);
                self.frontier.enqueue(&seed)
            }
            None => false,
        }
    }

    async fn merge(&mut self, records: &[CrawlRecord]) {
        for record in records {
            self.metrics.record_page(record);

            let added = record
                .links
                .iter()
                .filter(|link| self.frontier.enqueue(link))
                .count();
            self.metrics.add_links_enqueued(added);
            if added > 0 {
                log::debug!("Found {} new links on {}", added, record.url);
            }

            if self.frontier.mark_visited(&record.url) {
                if let Err(e) = self.store.record_visited(&record.url) {
                    log::error!("Error appending {} to visited log: {}", record.url, e);
                }
            }

            self.save_artifacts(record);

            let result = if self.settings.store_content || record.content.is_none() {
                self.records.upsert(record).await
            } else {
                let stripped = CrawlRecord {
                    content: None,
                    ..record.clone()
                };
                self.records.upsert(&stripped).await
            };
            if let Err(e) = result {
                log::warn!("Error saving record for {}: {}", record.url, e);
            }
        }
        self.metrics.set_frontier_len(self.frontier.len());
    }

    fn save_artifacts(&mut self, record: &CrawlRecord) {
        if !record.status.is_success() {
            return;
        }
        if self.settings.save_raw_pages {
            if let Some(html) = &record.content {
                if let Err(e) = self.archive.save_page(&record.url, html, record.timestamp) {
                    log::warn!("Error saving HTML for {}: {}", record.url, e);
                }
            }
        }
        if record.keyword_match {
            if let Some(keyword) = self.fetcher.keyword() {
                if let Err(e) = self.archive.record_match(&record.url, keyword) {
                    log::warn!("Error saving keyword match {}: {}", record.url, e);
                }
            }
        }
    }

    fn persist_frontier(&self) {
        if let Err(e) = self.store.replace(self.frontier.pending()) {
            log::error!("Error saving frontier snapshot: {}", e);
        }
    }

    pub fn watch_metrics(&self) -> watch::Receiver<MetricsSnapshot> {
        let (tx, rx) = watch::channel(self.metrics.snapshot());
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(500));
            loop {
                interval.tick().await;
                if tx.send(metrics.snapshot()).is_err() {
                    break;
                }
            }
        });
        rx
    }

    fn set_state(&self, state: CrawlerState) {
        self.state_watcher.send_replace(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::AddressRules;
    use crate::output::MemoryStore;
    use crate::resources::{ResourceUsage, StaticProbe, ThrottleLimits};
    use crate::transport::{FetchResponse, Transport, TransportError};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tempfile::tempdir;

    const A: &str = "http://aaaaaaaaaaaaaaaa.onion/";
    const B: &str = "http://bbbbbbbbbbbbbbbb.onion/";
    const C: &str = "http://cccccccccccccccc.onion/";

    struct SiteMap(HashMap<&'static str, &'static str>);

    #[async_trait]
    impl Transport for SiteMap {
        async fn fetch(&self, url: &str, _timeout: Duration) -> std::result::Result<FetchResponse, TransportError> {
            match self.0.get(url) {
                Some(body) => Ok(FetchResponse {
                    status: 200,
                    content_type: Some("text/html".into()),
                    body: body.to_string(),
                }),
                None => Ok(FetchResponse {
                    status: 404,
                    content_type: Some("text/html".into()),
                    body: String::new(),
                }),
            }
        }
    }

    fn engine(root: &std::path::Path, seeds: Vec<&str>, site: SiteMap, keyword: Option<&str>) -> CrawlerEngine {
        let settings = CrawlSettings {
            output_root: root.to_path_buf(),
            seeds: seeds.into_iter().map(str::to_string).collect(),
            duration: Duration::from_secs(600),
            filter_capacity: 1_000,
            filter_error_rate: 0.001,
            exhausted_policy: ExhaustedPolicy::Stop,
            seed_retry_interval: Duration::from_millis(10),
            save_raw_pages: true,
            store_content: false,
        };
        let fetcher = Fetcher::new(
            Arc::new(site),
            AddressRules::new(2048, &[]),
            Duration::from_secs(5),
            keyword.map(str::to_string),
        );
        let monitor = ResourceMonitor::new(
            Box::new(StaticProbe(ResourceUsage {
                memory_percent: 0.0,
                cpu_percent: 0.0,
            })),
            ThrottleLimits {
                max_concurrency: 2,
                min_concurrency: 1,
                base_delay: Duration::ZERO,
                memory_ceiling: 70.0,
                cpu_ceiling: 80.0,
            },
        );
        CrawlerEngine::new(settings, fetcher, monitor, Box::new(MemoryStore::new()))
    }

    #[test]
    fn test_repeated_request_is_reported() {
        let signal = ShutdownSignal::new();
        let handler_copy = signal.clone();
        assert!(!handler_copy.request());
        assert!(signal.is_triggered());
        assert!(handler_copy.request());
    }

    #[tokio::test]
    async fn test_crawls_until_exhausted_without_refetching() {
        let dir = tempdir().unwrap();
        let site = SiteMap(HashMap::from([
            (A, "<a href=\"http://bbbbbbbbbbbbbbbb.onion/\">b</a><a href=\"http://cccccccccccccccc.onion/\">c</a>"),
            (B, "<a href=\"http://aaaaaaaaaaaaaaaa.onion/\">back</a>"),
            (C, "<title>Example Page</title><a href=\"http://bbbbbbbbbbbbbbbb.onion/\">b</a>"),
        ]));
        let mut engine = engine(dir.path(), vec![A], site, Some("example"));

        let summary = engine.run().await.unwrap();

        assert_eq!(summary.reason, StopReason::Exhausted);
        assert_eq!(summary.metrics.pages_attempted, 3);
        assert_eq!(summary.metrics.pages_succeeded, 3);
        assert_eq!(summary.metrics.keyword_matches, 1);
        assert_eq!(engine.state(), CrawlerState::Stopped);

        let visited = std::fs::read_to_string(dir.path().join("visited_links.txt")).unwrap();
        assert_eq!(visited.lines().count(), 3);
        let matches = std::fs::read_to_string(dir.path().join("keyword_matches.txt")).unwrap();
        assert_eq!(matches, format!("1. {} (keyword: example)\n", C));
        let pages = std::fs::read_dir(dir.path().join("raw_pages")).unwrap().count();
        assert_eq!(pages, 3);
    }

    #[tokio::test]
    async fn test_skips_seeds_already_visited() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("visited_links.txt"), format!("1. {}\n", A)).unwrap();
        let mut engine = engine(dir.path(), vec![A, B], SiteMap(HashMap::new()), None);
        engine.restore();

        let summary = engine.run().await.unwrap();

        assert_eq!(summary.metrics.pages_attempted, 1);
        let visited = std::fs::read_to_string(dir.path().join("visited_links.txt")).unwrap();
        assert_eq!(visited, format!("1. {}\n2. {}\n", A, B));
    }

    #[tokio::test]
    async fn test_interrupt_before_start_runs_no_batch() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("queue.txt"), format!("1. {}\n2. {}\n", A, B)).unwrap();
        let mut engine = engine(dir.path(), vec![A], SiteMap(HashMap::new()), None);
        assert_eq!(engine.restore(), 2);
        engine.shutdown_signal().trigger();

        let summary = engine.run().await.unwrap();

        assert_eq!(summary.reason, StopReason::Interrupted);
        assert_eq!(summary.pending, 2);
        assert_eq!(summary.metrics.batches, 0);
        let queue = std::fs::read_to_string(dir.path().join("queue.txt")).unwrap();
        assert_eq!(queue, format!("1. {}\n2. {}\n", A, B));
    }

    #[tokio::test]
    async fn test_batch_takes_fifo_prefix_and_keeps_rest_ahead() {
        struct StopAfterFetch(SiteMap, ShutdownSignal);

        #[async_trait]
        impl Transport for StopAfterFetch {
            async fn fetch(&self, url: &str, timeout: Duration) -> std::result::Result<FetchResponse, TransportError> {
                self.1.trigger();
                self.0.fetch(url, timeout).await
            }
        }

        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("queue.txt"), format!("1. {}\n2. {}\n3. {}\n", A, B, C)).unwrap();
        let shutdown = ShutdownSignal::new();
        let site = StopAfterFetch(
            SiteMap(HashMap::from([(A, "<a href=\"http://dddddddddddddddd.onion/\">d</a>")])),
            shutdown.clone(),
        );
        let mut engine = engine(dir.path(), vec![], SiteMap(HashMap::new()), None);
        engine.fetcher = Fetcher::new(Arc::new(site), AddressRules::new(2048, &[]), Duration::from_secs(5), None);
        let mut engine = engine.with_shutdown(shutdown);
        engine.restore();

        let summary = engine.run().await.unwrap();

        assert_eq!(summary.reason, StopReason::Interrupted);
        assert_eq!(summary.metrics.batches, 1);
        assert_eq!(summary.metrics.pages_attempted, 2);
        assert_eq!(
            engine.frontier().pending().collect::<Vec<_>>(),
            vec![C, "http://dddddddddddddddd.onion/"]
        );
        let queue = std::fs::read_to_string(dir.path().join("queue.txt")).unwrap();
        assert_eq!(queue, format!("1. {}\n2. http://dddddddddddddddd.onion/\n", C));
    }
}
