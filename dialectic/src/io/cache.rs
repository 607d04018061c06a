//! Response memoization keyed by the exact rendered observation.
//!
//! Purely a convenience layer: a cache hit answers a prompt with whatever
//! the operator said the last time the machine looked exactly like this.
//! Correctness never depends on it.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::warn;

pub trait ResponseCache {
    fn get(&self, observation: &str) -> Option<String>;
    fn put(&mut self, observation: &str, response: &str);
}

/// In-memory cache for a single process lifetime.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: HashMap<String, String>,
}

impl MemoryCache {
    pub fn new() -> MemoryCache {
        MemoryCache::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ResponseCache for MemoryCache {
    fn get(&self, observation: &str) -> Option<String> {
        self.entries.get(observation).cloned()
    }

    fn put(&mut self, observation: &str, response: &str) {
        self.entries
            .insert(observation.to_string(), response.to_string());
    }
}

/// Cache that never hits and never stores, for `--no-cache` runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl ResponseCache for NoCache {
    fn get(&self, _observation: &str) -> Option<String> {
        None
    }

    fn put(&mut self, _observation: &str, _response: &str) {}
}

/// JSON-file-backed cache, persisted write-through so responses survive
/// across sessions.
#[derive(Debug)]
pub struct FileCache {
    path: PathBuf,
    entries: HashMap<String, String>,
}

impl FileCache {
    /// Open (or create) the cache at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<FileCache> {
        let path = path.into();
        let entries = if path.exists() {
            let contents =
                fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
            serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))?
        } else {
            HashMap::new()
        };
        Ok(FileCache { path, entries })
    }

    /// Atomically write the cache to disk (temp file + rename).
    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let mut payload =
            serde_json::to_string_pretty(&self.entries).context("serialize cache")?;
        payload.push('\n');
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, payload)
            .with_context(|| format!("write temp cache {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("replace cache {}", self.path.display()))?;
        Ok(())
    }
}

impl ResponseCache for FileCache {
    fn get(&self, observation: &str) -> Option<String> {
        self.entries.get(observation).cloned()
    }

    fn put(&mut self, observation: &str, response: &str) {
        self.entries
            .insert(observation.to_string(), response.to_string());
        if let Err(err) = self.persist() {
            warn!("failed to persist response cache: {err:#}");
        }
    }
}
