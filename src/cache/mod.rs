//! Content-addressed artifact cache
//!
//! A read-through key-value store: hex SHA-256 keys, opaque JSON values, an
//! in-memory DashMap layer in front of an append-only directory on disk.
//! Writes are atomic (temp file + rename) and write-or-skip: on a key
//! collision the stored value wins. The cache is never authoritative; every
//! consumer can recompute from inputs alone, so any I/O failure degrades to
//! a recompute.

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::debug;

/// TTL for artifacts written by full scans.
pub const TTL_FULL: Duration = Duration::from_secs(7 * 24 * 3600);
/// TTL for artifacts written by incremental scans.
pub const TTL_INCREMENTAL: Duration = Duration::from_secs(24 * 3600);

/// Hex SHA-256 over NUL-joined key parts.
pub fn cache_key(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([0u8]);
        }
        hasher.update(part.as_bytes());
    }
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Hex SHA-256 of file content, used in extract keys.
pub fn content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Key family: unit features per (content hash, parser, extractor).
pub fn extract_key(file_hash: &str, parser_version: &str, extractor_version: &str) -> String {
    cache_key(&["extract", file_hash, parser_version, extractor_version])
}

/// Key family: evidence per (commit, path, span hash).
pub fn evidence_key(commit: &str, path: &str, span_start: u32, span_end: u32) -> String {
    let span = format!("{}:{}", span_start, span_end);
    cache_key(&["evidence", commit, path, &span])
}

/// Key family: similarity shingles per (unit id, normalizer version).
pub fn similarity_key(unit_id: &str, normalizer_version: &str) -> String {
    cache_key(&["similarity", unit_id, normalizer_version])
}

/// Disk-backed cache with an in-memory layer.
pub struct Cache {
    dir: PathBuf,
    mem: DashMap<String, Arc<Vec<u8>>>,
    ttl: Duration,
    io_failures: AtomicUsize,
}

impl Cache {
    /// Open (and create) a cache directory with the full-scan TTL.
    pub fn open(dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            mem: DashMap::new(),
            ttl: TTL_FULL,
            io_failures: AtomicUsize::new(0),
        })
    }

    /// Same store, incremental-scan TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    /// Look a key up, memory first, then disk (expired entries miss).
    pub fn get(&self, key: &str) -> Option<Arc<Vec<u8>>> {
        if let Some(hit) = self.mem.get(key) {
            return Some(Arc::clone(&hit));
        }
        let path = self.entry_path(key);
        let meta = std::fs::metadata(&path).ok()?;
        let fresh = meta
            .modified()
            .ok()
            .and_then(|m| SystemTime::now().duration_since(m).ok())
            .is_some_and(|age| age < self.ttl);
        if !fresh {
            return None;
        }
        match std::fs::read(&path) {
            Ok(bytes) => {
                let arc = Arc::new(bytes);
                self.mem.insert(key.to_string(), Arc::clone(&arc));
                Some(arc)
            }
            Err(e) => {
                debug!("cache read failed for {key}: {e}");
                self.io_failures.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Write-or-skip: values are immutable once written. The write is
    /// temp-file + rename so readers never observe a partial entry.
    pub fn put(&self, key: &str, bytes: Vec<u8>) {
        if self.mem.contains_key(key) {
            return;
        }
        let path = self.entry_path(key);
        if !path.exists() {
            let tmp = self.dir.join(format!(".{}.tmp-{}", key, std::process::id()));
            let written = std::fs::write(&tmp, &bytes)
                .and_then(|_| std::fs::rename(&tmp, &path));
            if let Err(e) = written {
                debug!("cache write failed for {key}: {e}");
                self.io_failures.fetch_add(1, Ordering::Relaxed);
                let _ = std::fs::remove_file(&tmp);
            }
        }
        self.mem.insert(key.to_string(), Arc::new(bytes));
    }

    /// Typed read-through helper.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.get(key)?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!("cache entry {key} failed to decode: {e}");
                None
            }
        }
    }

    /// Typed write helper.
    pub fn put_json<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.put(key, bytes),
            Err(e) => debug!("cache entry {key} failed to encode: {e}"),
        }
    }

    /// Number of I/O failures absorbed so far; surfaced as a scan warning.
    pub fn io_failures(&self) -> usize {
        self.io_failures.load(Ordering::Relaxed)
    }
}
