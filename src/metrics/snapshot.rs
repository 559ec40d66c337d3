use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub pages_attempted: u64,
    pub pages_succeeded: u64,
    pub pages_skipped: u64,
    pub pages_failed: u64,
    pub links_discovered: u64,
    pub links_enqueued: u64,
    pub keyword_matches: u64,
    pub batches: u64,
    pub concurrency: u64,
    pub frontier_len: u64,
    pub success_rate: f64,
    pub pages_per_second: f64,
    pub elapsed_seconds: f64,
}
