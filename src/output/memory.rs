use super::RecordStore;
use crate::error::Result;
use crate::record::CrawlRecord;
use async_trait::async_trait;
use std::collections::HashMap;

/// Keeps the latest record per URL in memory. Used when the durable store
/// cannot be opened.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: HashMap<String, CrawlRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &str) -> Option<&CrawlRecord> {
        self.records.get(url)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn upsert(&mut self, record: &CrawlRecord) -> Result<()> {
        self.records.insert(record.url.clone(), record.clone());
        Ok(())
    }
}
