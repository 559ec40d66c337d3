use crate::record::CrawlRecord;
use crate::error::Result;
use async_trait::async_trait;

pub mod archive;
pub mod console;
pub mod memory;
pub mod sqlite;

pub use archive::PageArchive;
pub use console::ConsoleStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Durable trail of crawl records, keyed by URL. Writing the same URL again
/// replaces the earlier record.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn upsert(&mut self, record: &CrawlRecord) -> Result<()>;
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
