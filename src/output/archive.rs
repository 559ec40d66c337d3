//! Per-page artifacts written next to the frontier files: raw HTML
//! snapshots and the numbered keyword-match list.

use crate::error::Result;
use crate::frontier::parse_numbered_line;
use chrono::{DateTime, Utc};
use std::collections::hash_map::DefaultHasher;
use std::fs::{self, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::path::{Path, PathBuf};
use url::Url;

pub const RAW_PAGES_DIR: &str = "raw_pages";
pub const KEYWORD_FILE: &str = "keyword_matches.txt";

pub struct PageArchive {
    root: PathBuf,
    match_count: Option<usize>,
}

impl PageArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            match_count: None,
        }
    }

    pub fn keyword_path(&self) -> PathBuf {
        self.root.join(KEYWORD_FILE)
    }

    pub fn raw_pages_dir(&self) -> PathBuf {
        self.root.join(RAW_PAGES_DIR)
    }

    /// Writes `html` to `raw_pages/<host>_<timestamp>_<url hash>.html`. The
    /// hash keeps same-host pages fetched in one batch apart.
    pub fn save_page(&self, url: &str, html: &str, fetched_at: DateTime<Utc>) -> Result<PathBuf> {
        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string());
        let host: String = host
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
            .collect();

        let dir = self.raw_pages_dir();
        fs::create_dir_all(&dir)?;
        let mut hasher = DefaultHasher::new();
        url.hash(&mut hasher);
        let path = dir.join(format!(
            "{}_{}_{:08x}.html",
            host,
            fetched_at.format("%Y%m%dT%H%M%S_%6f"),
            hasher.finish() as u32
        ));
        fs::write(&path, html)?;
        Ok(path)
    }

    pub fn record_match(&mut self, url: &str, keyword: &str) -> Result<()> {
        let index = match self.match_count {
            Some(count) => count,
            None => count_entries(&self.keyword_path())?,
        } + 1;

        fs::create_dir_all(&self.root)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.keyword_path())?;
        writeln!(file, "{}. {} (keyword: {})", index, url, keyword)?;
        self.match_count = Some(index);
        Ok(())
    }
}

fn count_entries(path: &Path) -> Result<usize> {
    if !path.exists() {
        return Ok(0);
    }
    Ok(fs::read_to_string(path)?
        .lines()
        .filter_map(parse_numbered_line)
        .count())
}
