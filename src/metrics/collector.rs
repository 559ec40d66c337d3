use crate::metrics::snapshot::MetricsSnapshot;
use crate::record::{CrawlRecord, CrawlStatus};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Instant;

#[derive(Clone)]
pub struct MetricsCollector {
    pages_attempted: Arc<AtomicU64>,
    pages_succeeded: Arc<AtomicU64>,
    pages_skipped: Arc<AtomicU64>,
    pages_failed: Arc<AtomicU64>,
    links_discovered: Arc<AtomicU64>,
    links_enqueued: Arc<AtomicU64>,
    keyword_matches: Arc<AtomicU64>,
    batches: Arc<AtomicU64>,
    concurrency: Arc<AtomicU64>,
    frontier_len: Arc<AtomicU64>,
    start_time: Arc<Instant>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            pages_attempted: Arc::new(AtomicU64::new(0)),
            pages_succeeded: Arc::new(AtomicU64::new(0)),
            pages_skipped: Arc::new(AtomicU64::new(0)),
            pages_failed: Arc::new(AtomicU64::new(0)),
            links_discovered: Arc::new(AtomicU64::new(0)),
            links_enqueued: Arc::new(AtomicU64::new(0)),
            keyword_matches: Arc::new(AtomicU64::new(0)),
            batches: Arc::new(AtomicU64::new(0)),
            concurrency: Arc::new(AtomicU64::new(0)),
            frontier_len: Arc::new(AtomicU64::new(0)),
            start_time: Arc::new(Instant::now()),
        }
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_page(&self, record: &CrawlRecord) {
        self.pages_attempted.fetch_add(1, Ordering::SeqCst);
        let counter = match record.status {
            CrawlStatus::Success => &self.pages_succeeded,
            CrawlStatus::Skipped => &self.pages_skipped,
            CrawlStatus::FailedWithStatus(_) | CrawlStatus::FailedWithError(_) => &self.pages_failed,
        };
        counter.fetch_add(1, Ordering::SeqCst);
        self.links_discovered
            .fetch_add(record.links.len() as u64, Ordering::SeqCst);
        if record.keyword_match {
            self.keyword_matches.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn add_links_enqueued(&self, count: usize) {
        self.links_enqueued.fetch_add(count as u64, Ordering::SeqCst);
    }

    pub fn start_batch(&self, concurrency: usize) {
        self.batches.fetch_add(1, Ordering::SeqCst);
        self.concurrency.store(concurrency as u64, Ordering::SeqCst);
    }

    pub fn set_frontier_len(&self, len: usize) {
        self.frontier_len.store(len as u64, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let attempted = self.pages_attempted.load(Ordering::SeqCst);
        let succeeded = self.pages_succeeded.load(Ordering::SeqCst);

        let success_rate = if attempted > 0 {
            (succeeded as f64 / attempted as f64) * 100.0
        } else {
            0.0
        };

        let elapsed = self.start_time.elapsed().as_secs_f64();

        MetricsSnapshot {
            pages_attempted: attempted,
            pages_succeeded: succeeded,
            pages_skipped: self.pages_skipped.load(Ordering::SeqCst),
            pages_failed: self.pages_failed.load(Ordering::SeqCst),
            links_discovered: self.links_discovered.load(Ordering::SeqCst),
            links_enqueued: self.links_enqueued.load(Ordering::SeqCst),
            keyword_matches: self.keyword_matches.load(Ordering::SeqCst),
            batches: self.batches.load(Ordering::SeqCst),
            concurrency: self.concurrency.load(Ordering::SeqCst),
            frontier_len: self.frontier_len.load(Ordering::SeqCst),
            success_rate,
            pages_per_second: if elapsed > 0.0 {
                attempted as f64 / elapsed
            } else {
                0.0
            },
            elapsed_seconds: elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_counts_by_outcome() {
        let metrics = MetricsCollector::new();
        let links: BTreeSet<String> = ["a".to_string(), "b".to_string()].into_iter().collect();
        metrics.record_page(&CrawlRecord {
            keyword_match: true,
            ..CrawlRecord::success("u1", links, String::new())
        });
        metrics.record_page(&CrawlRecord::skipped("u2"));
        metrics.record_page(&CrawlRecord::new("u3", CrawlStatus::FailedWithStatus(404)));
        metrics.record_page(&CrawlRecord::new("u4", CrawlStatus::FailedWithError("timeout".into())));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.pages_attempted, 4);
        assert_eq!(snapshot.pages_succeeded, 1);
        assert_eq!(snapshot.pages_skipped, 1);
        assert_eq!(snapshot.pages_failed, 2);
        assert_eq!(snapshot.links_discovered, 2);
        assert_eq!(snapshot.keyword_matches, 1);
        assert!((snapshot.success_rate - 25.0).abs() < 1e-9);
    }
}
