use super::RecordStore;
use crate::error::{Error, Result};
use crate::record::CrawlRecord;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use std::path::PathBuf;

pub struct SqliteStore {
    pool: SqlitePool,
    table_name: String,
}

impl SqliteStore {
    pub async fn new(path: PathBuf, table_name: String) -> Result<Self> {
        if table_name.is_empty() || !table_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::Config(format!("invalid table name: {}", table_name)));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn_str = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&conn_str).await?;

        let query = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                url TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                links TEXT NOT NULL,
                content TEXT,
                keyword_match INTEGER NOT NULL,
                timestamp TEXT NOT NULL
            )",
            table_name
        );
        sqlx::query(&query).execute(&pool).await?;

        Ok(Self { pool, table_name })
    }
}

#[cfg(test)]
impl SqliteStore {
    async fn status(&self, url: &str) -> Result<Option<String>> {
        let query = format!("SELECT status FROM {} WHERE url = ?1", self.table_name);
        let row: Option<(String,)> = sqlx::query_as(&query)
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(status,)| status))
    }

    async fn count(&self) -> Result<i64> {
        let query = format!("SELECT COUNT(*) FROM {}", self.table_name);
        let (count,): (i64,) = sqlx::query_as(&query).fetch_one(&self.pool).await?;
        Ok(count)
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn upsert(&mut self, record: &CrawlRecord) -> Result<()> {
        let query = format!(
            "INSERT INTO {} (url, status, links, content, keyword_match, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(url) DO UPDATE SET
                status = excluded.status,
                links = excluded.links,
                content = excluded.content,
                keyword_match = excluded.keyword_match,
                timestamp = excluded.timestamp",
            self.table_name
        );

        sqlx::query(&query)
            .bind(&record.url)
            .bind(record.status.to_string())
            .bind(serde_json::to_string(&record.links)?)
            .bind(record.content.as_deref())
            .bind(record.keyword_match)
            .bind(record.timestamp.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
