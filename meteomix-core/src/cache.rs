use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs, io,
    path::PathBuf,
    time::{Duration, Instant},
};

/// Contract for the key-value store behind the cache-aside layer.
///
/// Values are opaque UTF-8 JSON payloads; the store owns persisted bytes and
/// is responsible for expiring entries past their TTL. `set` and `clear`
/// report success as a bool rather than an error: cache failures are never
/// fatal to a weather query.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;

    /// Store `value` under `key`; `ttl = None` means the entry never expires.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> bool;

    /// Remove one key. Returns whether the key existed.
    async fn delete(&self, key: &str) -> bool;

    /// Flush the whole store. Not scoped to any key prefix.
    async fn clear(&self) -> bool;

    /// Release the underlying connection. Further calls are undefined.
    async fn close(&self);
}

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// In-process [`CacheStore`] with lazy TTL expiry on read.
///
/// Stands in for an external store (e.g. Redis) in tests and single-node
/// deployments; everything above it depends only on the trait.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock();

        match entries.get(key) {
            Some(entry) if entry.is_expired(Instant::now()) => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> bool {
        let entry = Entry {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.lock().insert(key.to_string(), entry);
        true
    }

    async fn delete(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    async fn clear(&self) -> bool {
        self.entries.lock().clear();
        true
    }

    async fn close(&self) {
        // Nothing to release for the in-process store.
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl PersistedEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// File-backed [`CacheStore`]: one JSON document holding every entry,
/// rewritten on each mutation.
///
/// This is what the CLI's composition root injects, so cached readings
/// survive across process invocations. Deadlines are wall-clock timestamps
/// rather than in-process instants for the same reason.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, PersistedEntry>>,
}

impl FileStore {
    /// Open the store at `path`, starting empty when the file does not exist
    /// yet. A file that no longer parses is discarded, not an error.
    pub fn open(path: PathBuf) -> Result<Self> {
        let entries = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|err| {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "discarding unreadable cache file"
                );
                HashMap::new()
            }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("Failed to read cache file: {}", path.display()));
            }
        };

        Ok(Self { path, entries: Mutex::new(entries) })
    }

    fn persist(&self, entries: &HashMap<String, PersistedEntry>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create cache directory: {}", parent.display())
            })?;
        }

        let json = serde_json::to_string(entries).context("Failed to serialize cache entries")?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write cache file: {}", self.path.display()))?;

        Ok(())
    }

    fn persist_or_warn(&self, entries: &HashMap<String, PersistedEntry>) -> bool {
        match self.persist(entries) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "cache persist failed");
                false
            }
        }
    }
}

#[async_trait]
impl CacheStore for FileStore {
    async fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock();

        match entries.get(key) {
            Some(entry) if entry.is_expired(Utc::now()) => {
                entries.remove(key);
                self.persist_or_warn(&entries);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> bool {
        // A TTL too large for the calendar simply never expires.
        let expires_at = ttl.and_then(|ttl| {
            chrono::Duration::from_std(ttl).ok().and_then(|d| Utc::now().checked_add_signed(d))
        });

        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), PersistedEntry { value: value.to_string(), expires_at });
        self.persist_or_warn(&entries)
    }

    async fn delete(&self, key: &str) -> bool {
        let mut entries = self.entries.lock();
        let existed = entries.remove(key).is_some();
        if existed {
            self.persist_or_warn(&entries);
        }
        existed
    }

    async fn clear(&self) -> bool {
        let mut entries = self.entries.lock();
        entries.clear();
        self.persist_or_warn(&entries)
    }

    async fn close(&self) {
        // Every mutation persists eagerly; nothing left to flush.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete_round_trip() {
        let store = MemoryStore::new();

        assert!(store.set("k", "v", None).await);
        assert_eq!(store.get("k").await.as_deref(), Some("v"));

        assert!(store.delete("k").await);
        assert!(!store.delete("k").await);
        assert_eq!(store.get("k").await, None);
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let store = MemoryStore::new();

        store.set("k", "v", Some(Duration::from_millis(20))).await;
        assert_eq!(store.get("k").await.as_deref(), Some("v"));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("k").await, None);
    }

    #[tokio::test]
    async fn overwrite_replaces_value_and_ttl() {
        let store = MemoryStore::new();

        store.set("k", "old", Some(Duration::from_millis(20))).await;
        store.set("k", "new", None).await;

        tokio::time::sleep(Duration::from_millis(40)).await;
        // The rewrite dropped the old deadline.
        assert_eq!(store.get("k").await.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn clear_flushes_every_key() {
        let store = MemoryStore::new();

        store.set("weather:paris", "{}", None).await;
        store.set("cache:unrelated", "{}", None).await;

        assert!(store.clear().await);
        assert_eq!(store.get("weather:paris").await, None);
        assert_eq!(store.get("cache:unrelated").await, None);
    }

    #[tokio::test]
    async fn file_store_survives_a_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let store = FileStore::open(path.clone()).unwrap();
        assert!(store.set("weather:paris", "{\"t\":1}", None).await);
        drop(store);

        let reopened = FileStore::open(path).unwrap();
        assert_eq!(reopened.get("weather:paris").await.as_deref(), Some("{\"t\":1}"));
    }

    #[tokio::test]
    async fn file_store_expires_entries_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let store = FileStore::open(path.clone()).unwrap();
        store.set("k", "v", Some(Duration::from_millis(20))).await;
        drop(store);

        tokio::time::sleep(Duration::from_millis(40)).await;

        let reopened = FileStore::open(path).unwrap();
        assert_eq!(reopened.get("k").await, None);
    }

    #[tokio::test]
    async fn file_store_clear_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let store = FileStore::open(path.clone()).unwrap();
        store.set("k", "v", None).await;
        assert!(store.clear().await);
        drop(store);

        let reopened = FileStore::open(path).unwrap();
        assert_eq!(reopened.get("k").await, None);
    }

    #[tokio::test]
    async fn file_store_delete_reports_existence() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("cache.json")).unwrap();

        store.set("k", "v", None).await;
        assert!(store.delete("k").await);
        assert!(!store.delete("k").await);
    }

    #[tokio::test]
    async fn unreadable_cache_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "not json at all").unwrap();

        let store = FileStore::open(path).unwrap();
        assert_eq!(store.get("k").await, None);
        assert!(store.set("k", "v", None).await);
        assert_eq!(store.get("k").await.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn file_store_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("cache.json");

        let store = FileStore::open(path.clone()).unwrap();
        assert!(store.set("k", "v", None).await);
        assert!(path.exists());
    }
}
