use super::RecordStore;
use crate::error::{Error, Result};
use crate::record::CrawlRecord;
use async_trait::async_trait;
use indicatif::MultiProgress;
use std::sync::Arc;

/// Prints one JSON line per record, without page content.
pub struct ConsoleStore {
    multi: Option<Arc<MultiProgress>>,
}

impl ConsoleStore {
    pub fn new(multi: Option<Arc<MultiProgress>>) -> Self {
        Self { multi }
    }
}

impl Default for ConsoleStore {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl RecordStore for ConsoleStore {
    async fn upsert(&mut self, record: &CrawlRecord) -> Result<()> {
        let line = serde_json::to_string(&CrawlRecord {
            content: None,
            ..record.clone()
        })?;

        if let Some(multi) = &self.multi {
            multi.println(line).map_err(|e| Error::Internal(e.to_string()))?;
        } else {
            println!("{}", line);
        }
        Ok(())
    }
}
