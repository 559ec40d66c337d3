//! Pending-address queue, its dedup filters and its on-disk mirror.
//!
//! Files are numbered one entry per line (`<index>. <url>`) so a human can
//! inspect or repair them. Loaders also accept bare URL lines.

use crate::error::Result;
use crate::filter::MembershipFilter;
use std::collections::{HashSet, VecDeque};
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const QUEUE_FILE: &str = "queue.txt";
pub const VISITED_FILE: &str = "visited_links.txt";

/// Strips an optional `<index>. ` prefix.
pub fn parse_numbered_line(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match line.split_once(". ") {
        Some((index, rest)) if !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()) => {
            let rest = rest.trim();
            (!rest.is_empty()).then_some(rest)
        }
        _ => Some(line),
    }
}

fn read_entries(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .filter_map(parse_numbered_line)
        .map(str::to_string)
        .collect())
}

pub struct FrontierStore {
    root: PathBuf,
    visited_count: Option<usize>,
}

impl FrontierStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            visited_count: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn queue_path(&self) -> PathBuf {
        self.root.join(QUEUE_FILE)
    }

    pub fn visited_path(&self) -> PathBuf {
        self.root.join(VISITED_FILE)
    }

    /// Pending queue from the last snapshot, empty when none exists.
    pub fn load(&self) -> Result<Vec<String>> {
        read_entries(&self.queue_path())
    }

    /// Rewrites the snapshot through a temp file and rename, so a crash
    /// leaves either the previous or the new queue on disk.
    pub fn replace<'a, I>(&self, urls: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        fs::create_dir_all(&self.root)?;
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            for (i, url) in urls.into_iter().enumerate() {
                writeln!(writer, "{}. {}", i + 1, url)?;
            }
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(self.queue_path()).map_err(|e| e.error)?;
        Ok(())
    }

    pub fn append(&self, urls: &[String]) -> Result<()> {
        let mut pending = self.load()?;
        pending.extend(urls.iter().cloned());
        self.replace(pending.iter().map(String::as_str))
    }

    /// Visited log contents; also primes the running index for appends.
    pub fn load_visited(&mut self) -> Result<Vec<String>> {
        let entries = read_entries(&self.visited_path())?;
        self.visited_count = Some(entries.len());
        Ok(entries)
    }

    pub fn record_visited(&mut self, url: &str) -> Result<()> {
        let index = match self.visited_count {
            Some(count) => count,
            None => read_entries(&self.visited_path())?.len(),
        } + 1;

        fs::create_dir_all(&self.root)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.visited_path())?;
        writeln!(file, "{}. {}", index, url)?;
        self.visited_count = Some(index);
        Ok(())
    }
}

/// FIFO of addresses awaiting fetch. Owns both membership filters: one for
/// addresses already fetched, one for addresses ever enqueued.
pub struct Frontier {
    queue: VecDeque<String>,
    visited: Box<dyn MembershipFilter>,
    queued: Box<dyn MembershipFilter>,
}

impl Frontier {
    pub fn new(visited: Box<dyn MembershipFilter>, queued: Box<dyn MembershipFilter>) -> Self {
        Self {
            queue: VecDeque::new(),
            visited,
            queued,
        }
    }

    /// Warm start from persisted state. Snapshot entries keep their order
    /// even if they also appear in the visited log. The snapshot is exact,
    /// so duplicates are dropped with an exact set, never the filter.
    pub fn restore(&mut self, pending: Vec<String>, visited: Vec<String>) {
        for url in visited {
            self.visited.add(&url);
        }
        let mut seen = HashSet::with_capacity(pending.len());
        for url in pending {
            if seen.insert(url.clone()) {
                self.queued.add(&url);
                self.queue.push_back(url);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_visited(&self, url: &str) -> bool {
        self.visited.contains(url)
    }

    pub fn is_known(&self, url: &str) -> bool {
        self.visited.contains(url) || self.queued.contains(url)
    }

    /// Appends `url` unless it was already fetched or enqueued.
    pub fn enqueue(&mut self, url: &str) -> bool {
        if self.is_known(url) {
            return false;
        }
        self.queued.add(url);
        self.queue.push_back(url.to_string());
        true
    }

    pub fn take_batch(&mut self, size: usize) -> Vec<String> {
        let size = size.min(self.queue.len());
        self.queue.drain(..size).collect()
    }

    /// Returns true the first time `url` is marked.
    pub fn mark_visited(&mut self, url: &str) -> bool {
        if self.visited.contains(url) {
            return false;
        }
        self.visited.add(url);
        true
    }

    pub fn pending(&self) -> impl Iterator<Item = &str> {
        self.queue.iter().map(String::as_str)
    }
}
