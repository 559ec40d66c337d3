use async_trait::async_trait;
use onion_crawler::address::AddressRules;
use onion_crawler::config::ExhaustedPolicy;
use onion_crawler::crawler::{CrawlSettings, CrawlerEngine, CrawlerState, ShutdownSignal, StopReason};
use onion_crawler::fetcher::Fetcher;
use onion_crawler::frontier::FrontierStore;
use onion_crawler::output::MemoryStore;
use onion_crawler::resources::{ResourceMonitor, ResourceUsage, StaticProbe, ThrottleLimits};
use onion_crawler::transport::{FetchResponse, Transport, TransportError};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;
use tokio::time::Instant;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz234567";

fn address(mut n: usize) -> String {
    let mut label = [b'a'; 16];
    for slot in label.iter_mut().rev() {
        *slot = ALPHABET[n % 32];
        n /= 32;
    }
    format!("http://{}.onion/", String::from_utf8_lossy(&label))
}

/// Every page takes `latency` and links to two never-seen pages.
struct EndlessWeb {
    latency: Duration,
    next: AtomicUsize,
    started: Instant,
    dispatched: Mutex<Vec<Duration>>,
    stop_after: Option<(usize, ShutdownSignal)>,
    fetched: AtomicUsize,
}

impl EndlessWeb {
    fn new(latency: Duration) -> Self {
        Self {
            latency,
            next: AtomicUsize::new(1_000),
            started: Instant::now(),
            dispatched: Mutex::new(Vec::new()),
            stop_after: None,
            fetched: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Transport for EndlessWeb {
    async fn fetch(&self, _url: &str, _timeout: Duration) -> Result<FetchResponse, TransportError> {
        self.dispatched.lock().unwrap().push(self.started.elapsed());
        tokio::time::sleep(self.latency).await;

        let fetched = self.fetched.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, shutdown)) = &self.stop_after {
            if fetched >= *limit {
                shutdown.trigger();
            }
        }

        let a = address(self.next.fetch_add(1, Ordering::SeqCst));
        let b = address(self.next.fetch_add(1, Ordering::SeqCst));
        Ok(FetchResponse {
            status: 200,
            content_type: Some("text/html".into()),
            body: format!("<a href=\"{}\">a</a><a href=\"{}\">b</a>", a, b),
        })
    }
}

fn settings(root: &Path, duration: Duration, policy: ExhaustedPolicy) -> CrawlSettings {
    CrawlSettings {
        output_root: root.to_path_buf(),
        seeds: vec![address(0)],
        duration,
        filter_capacity: 1_000,
        filter_error_rate: 0.001,
        exhausted_policy: policy,
        seed_retry_interval: Duration::from_secs(5),
        save_raw_pages: false,
        store_content: false,
    }
}

fn engine(settings: CrawlSettings, transport: Arc<dyn Transport>, concurrency: usize) -> CrawlerEngine {
    let fetcher = Fetcher::new(transport, AddressRules::new(2048, &[]), Duration::from_secs(30), None);
    let monitor = ResourceMonitor::new(
        Box::new(StaticProbe(ResourceUsage {
            memory_percent: 10.0,
            cpu_percent: 10.0,
        })),
        ThrottleLimits {
            max_concurrency: concurrency,
            min_concurrency: 1,
            base_delay: Duration::ZERO,
            memory_ceiling: 70.0,
            cpu_ceiling: 80.0,
        },
    );
    CrawlerEngine::new(settings, fetcher, monitor, Box::new(MemoryStore::new()))
}

#[tokio::test(start_paused = true)]
async fn no_batch_starts_after_the_deadline() {
    let dir = tempdir().unwrap();
    let web = Arc::new(EndlessWeb::new(Duration::from_secs(10)));
    let mut engine = engine(
        settings(dir.path(), Duration::from_secs(60), ExhaustedPolicy::Stop),
        web.clone(),
        4,
    );

    let started = Instant::now();
    let summary = engine.run().await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(summary.reason, StopReason::Deadline);
    assert_eq!(engine.state(), CrawlerState::Stopped);

    let dispatched = web.dispatched.lock().unwrap().clone();
    assert!(!dispatched.is_empty());
    assert!(dispatched.iter().all(|at| *at <= Duration::from_secs(60)));
    // Draining waits for at most one in-flight batch.
    assert!(elapsed <= Duration::from_secs(70), "took {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn wait_policy_idles_until_deadline() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("visited_links.txt"), format!("1. {}\n", address(0))).unwrap();
    let web = Arc::new(EndlessWeb::new(Duration::from_secs(1)));
    let mut engine = engine(
        settings(dir.path(), Duration::from_secs(30), ExhaustedPolicy::Wait),
        web.clone(),
        2,
    );
    engine.restore();

    let summary = engine.run().await.unwrap();

    assert_eq!(summary.reason, StopReason::Deadline);
    assert_eq!(web.fetched.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn interrupted_run_resumes_from_snapshot() {
    let dir = tempdir().unwrap();
    let shutdown = ShutdownSignal::new();
    let mut web = EndlessWeb::new(Duration::from_millis(100));
    web.stop_after = Some((3, shutdown.clone()));
    let web = Arc::new(web);

    let mut first = engine(
        settings(dir.path(), Duration::from_secs(600), ExhaustedPolicy::Stop),
        web.clone(),
        2,
    )
    .with_shutdown(shutdown);
    first.restore();
    let summary = first.run().await.unwrap();
    assert_eq!(summary.reason, StopReason::Interrupted);

    let expected: Vec<String> = first.frontier().pending().map(str::to_string).collect();
    assert_eq!(summary.pending, expected.len());
    assert_eq!(FrontierStore::new(dir.path()).load().unwrap(), expected);

    let mut second = engine(
        settings(dir.path(), Duration::from_secs(600), ExhaustedPolicy::Stop),
        web.clone(),
        2,
    );
    assert_eq!(second.restore(), expected.len());
    assert_eq!(second.frontier().pending().collect::<Vec<_>>(), expected);
    // The seed was fetched in the first run and is not queued again.
    assert!(second.frontier().is_visited(&address(0)));
}
