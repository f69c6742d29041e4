use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::CacheConfig;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cache entry is corrupt: {0}")]
    Serde(#[from] serde_json::Error),
}

/// One cached service response. Only 2xx and 404 responses are ever stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub status: u16,
    pub payload: String,
    pub written_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub write_failures: u64,
}

/// Deterministic cache key for a request: SHA-256 of the full URL
/// (plus the body for POST requests).
pub fn request_key(url: &str, body: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    if let Some(body) = body {
        hasher.update(b"\n");
        hasher.update(body.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// TTL cache for service responses.
///
/// Entries live in memory and, when a directory is configured, one JSON file
/// per entry. Staleness is purely age-based. Any disk problem degrades to a
/// miss (reads) or is logged and ignored (writes).
pub struct CacheStore {
    ttl: Duration,
    directory: Option<PathBuf>,
    entries: RwLock<HashMap<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    write_failures: AtomicU64,
    tmp_seq: AtomicU64,
}

impl CacheStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            directory: None,
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            tmp_seq: AtomicU64::new(0),
        }
    }

    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        let store = Self::new(config.ttl());
        match &config.directory {
            Some(dir) => store.with_directory(dir.clone()),
            None => store,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns a fresh entry for `key`, or `None` when absent or stale.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let now = Utc::now();

        let cached = self
            .entries
            .read()
            .ok()
            .and_then(|entries| entries.get(key).cloned());

        let entry = match cached {
            Some(entry) => Some(entry),
            None => self.read_from_disk(key),
        };

        match entry {
            Some(entry) if self.is_fresh(&entry, now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %short(key), "cache hit");
                Some(entry)
            }
            Some(_) => {
                debug!(key = %short(key), "cache entry expired");
                self.evict(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores a response written now.
    pub fn put(&self, key: &str, status: u16, payload: &str) {
        self.put_entry(CacheEntry {
            key: key.to_string(),
            status,
            payload: payload.to_string(),
            written_at: Utc::now(),
        });
    }

    pub fn put_entry(&self, entry: CacheEntry) {
        if let Some(dir) = &self.directory {
            if let Err(e) = self.write_to_disk(dir, &entry) {
                self.write_failures.fetch_add(1, Ordering::Relaxed);
                warn!(key = %short(&entry.key), error = %e, "failed to persist cache entry");
            }
        }
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(entry.key.clone(), entry);
            self.writes.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }

    fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        // Entries stamped in the future (clock skew) count as age zero.
        let age = (now - entry.written_at).to_std().unwrap_or(Duration::ZERO);
        age <= self.ttl
    }

    fn evict(&self, key: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(key);
        }
        if let Some(dir) = &self.directory {
            let _ = fs::remove_file(entry_path(dir, key));
        }
    }

    fn read_from_disk(&self, key: &str) -> Option<CacheEntry> {
        let dir = self.directory.as_ref()?;
        let path = entry_path(dir, key);
        if !path.exists() {
            return None;
        }
        match load_entry(&path) {
            Ok(entry) if entry.key == key => Some(entry),
            Ok(_) => {
                warn!(path = %path.display(), "cache entry key mismatch, ignoring");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable cache entry, treating as miss");
                let _ = fs::remove_file(&path);
                None
            }
        }
    }

    fn write_to_disk(&self, dir: &Path, entry: &CacheEntry) -> Result<(), CacheError> {
        fs::create_dir_all(dir)?;
        let data = serde_json::to_vec(entry)?;
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = dir.join(format!(
            "{}.{}-{}.tmp",
            file_stem(&entry.key),
            std::process::id(),
            seq
        ));
        fs::write(&tmp, data)?;
        if let Err(e) = fs::rename(&tmp, entry_path(dir, &entry.key)) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

fn entry_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{}.json", file_stem(key)))
}

/// File name for `key`. Request keys are already hex digests; anything else
/// is hashed so it cannot name a path outside the cache directory.
fn file_stem(key: &str) -> String {
    let is_digest = !key.is_empty()
        && key.len() <= 128
        && key.bytes().all(|b| b.is_ascii_hexdigit());
    if is_digest {
        key.to_string()
    } else {
        hex::encode(Sha256::digest(key.as_bytes()))
    }
}

fn load_entry(path: &Path) -> Result<CacheEntry, CacheError> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

fn short(key: &str) -> String {
    key.chars().take(12).collect()
}
