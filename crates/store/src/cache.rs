//! Cache store contract and in-memory backend.
//!
//! The cache store is a shared key-value service with per-key unordered-set
//! semantics, scalar companion keys (signatures, counters), wildcard key
//! enumeration, and an optimistic transaction: watch a key, then commit a
//! batch of writes conditionally on the watched key being unmodified since.
//!
//! Reads are a single atomic multi-get; no lock is held between a watch and
//! its commit. Contention shows up as an aborted commit the caller retries.

use std::collections::{BTreeSet, HashMap};

use globset::Glob;
use parking_lot::Mutex;
use snafu::{ResultExt, Snafu};

/// Error type for cache store operations.
#[derive(Debug, Snafu)]
pub enum CacheStoreError {
    /// The wildcard pattern did not compile.
    #[snafu(display("invalid key pattern {pattern}: {source}"))]
    Pattern {
        /// The rejected pattern.
        pattern: String,
        /// Glob compile error.
        source: globset::Error,
    },

    /// The backing service rejected an operation.
    #[snafu(display("cache store rejected {operation}: {message}"))]
    Rejected {
        /// Operation name for diagnostics.
        operation: &'static str,
        /// Backend-provided detail.
        message: String,
    },
}

/// Result type for cache store operations.
pub type Result<T> = std::result::Result<T, CacheStoreError>;

/// One atomic multi-read of a cache entry and its companion signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntrySnapshot {
    /// Whether the set key exists at all.
    pub exists: bool,
    /// Set members (empty when absent).
    pub members: BTreeSet<String>,
    /// Companion signature bytes, if present.
    pub signature: Option<Vec<u8>>,
}

/// Observation of a key's modification state, taken by [`CacheStore::watch`].
///
/// A commit conditioned on the token succeeds only if the key has not been
/// modified since the token was taken.
#[derive(Debug, Clone)]
pub struct WatchToken {
    key: String,
    version: u64,
}

impl WatchToken {
    /// The watched key.
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Outcome of a conditional commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The batch was applied.
    Committed,
    /// The watched key changed since the watch; nothing was applied.
    Aborted,
}

/// A single write inside a batch.
#[derive(Debug, Clone)]
enum WriteOp {
    DeleteSet { key: String },
    AddMembers { key: String, members: Vec<String> },
    PutScalar { key: String, value: Vec<u8> },
    DeleteScalar { key: String },
}

/// An ordered batch of writes applied atomically.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deletes a set key.
    #[must_use]
    pub fn delete_set(mut self, key: impl Into<String>) -> Self {
        self.ops.push(WriteOp::DeleteSet { key: key.into() });
        self
    }

    /// Adds members to a set key, creating it when absent.
    #[must_use]
    pub fn add_members(mut self, key: impl Into<String>, members: Vec<String>) -> Self {
        self.ops.push(WriteOp::AddMembers { key: key.into(), members });
        self
    }

    /// Writes a scalar key.
    #[must_use]
    pub fn put_scalar(mut self, key: impl Into<String>, value: Vec<u8>) -> Self {
        self.ops.push(WriteOp::PutScalar { key: key.into(), value });
        self
    }

    /// Deletes a scalar key.
    #[must_use]
    pub fn delete_scalar(mut self, key: impl Into<String>) -> Self {
        self.ops.push(WriteOp::DeleteScalar { key: key.into() });
        self
    }

    /// Whether the batch carries no writes.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Shared cache key-value service.
pub trait CacheStore: Send + Sync {
    /// Atomically reads a set key and its companion signature scalar.
    fn read_entry(&self, key: &str, signature_key: &str) -> Result<CacheEntrySnapshot>;

    /// Observes a key's current modification state.
    fn watch(&self, key: &str) -> Result<WatchToken>;

    /// Applies `batch` if the watched key is unmodified since `token`.
    fn commit(&self, token: &WatchToken, batch: WriteBatch) -> Result<CommitOutcome>;

    /// Applies `batch` unconditionally.
    fn apply(&self, batch: WriteBatch) -> Result<()>;

    /// Enumerates keys (set and scalar) matching a glob pattern.
    fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Reads a scalar key.
    fn read_scalar(&self, key: &str) -> Result<Option<Vec<u8>>>;
}

/// Keyspace state behind the in-memory store's mutex.
#[derive(Debug, Default)]
struct Keyspace {
    sets: HashMap<String, BTreeSet<String>>,
    scalars: HashMap<String, Vec<u8>>,
    /// Per-key modification counters backing watch semantics. Versions are
    /// never removed, so delete + recreate still aborts a stale watcher.
    versions: HashMap<String, u64>,
}

impl Keyspace {
    fn version(&self, key: &str) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    fn touch(&mut self, key: &str) {
        *self.versions.entry(key.to_string()).or_insert(0) += 1;
    }

    fn apply(&mut self, batch: WriteBatch) {
        for op in batch.ops {
            match op {
                WriteOp::DeleteSet { key } => {
                    self.sets.remove(&key);
                    self.touch(&key);
                },
                WriteOp::AddMembers { key, members } => {
                    self.sets.entry(key.clone()).or_default().extend(members);
                    self.touch(&key);
                },
                WriteOp::PutScalar { key, value } => {
                    self.scalars.insert(key.clone(), value);
                    self.touch(&key);
                },
                WriteOp::DeleteScalar { key } => {
                    self.scalars.remove(&key);
                    self.touch(&key);
                },
            }
        }
    }
}

/// In-memory cache store for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryCacheStore {
    inner: Mutex<Keyspace>,
}

impl MemoryCacheStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCacheStore {
    fn read_entry(&self, key: &str, signature_key: &str) -> Result<CacheEntrySnapshot> {
        let inner = self.inner.lock();
        let members = inner.sets.get(key).cloned().unwrap_or_default();
        Ok(CacheEntrySnapshot {
            exists: inner.sets.contains_key(key),
            members,
            signature: inner.scalars.get(signature_key).cloned(),
        })
    }

    fn watch(&self, key: &str) -> Result<WatchToken> {
        let inner = self.inner.lock();
        Ok(WatchToken { key: key.to_string(), version: inner.version(key) })
    }

    fn commit(&self, token: &WatchToken, batch: WriteBatch) -> Result<CommitOutcome> {
        let mut inner = self.inner.lock();
        if inner.version(&token.key) != token.version {
            return Ok(CommitOutcome::Aborted);
        }
        inner.apply(batch);
        Ok(CommitOutcome::Committed)
    }

    fn apply(&self, batch: WriteBatch) -> Result<()> {
        self.inner.lock().apply(batch);
        Ok(())
    }

    fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let matcher = Glob::new(pattern)
            .context(PatternSnafu { pattern: pattern.to_string() })?
            .compile_matcher();
        let inner = self.inner.lock();
        let mut keys: Vec<String> = inner
            .sets
            .keys()
            .chain(inner.scalars.keys())
            .filter(|key| matcher.is_match(key))
            .cloned()
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    fn read_scalar(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.lock().scalars.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_entry_is_empty_for_absent_key() {
        let store = MemoryCacheStore::new();
        let snapshot = store.read_entry("USER:alice", "SIGNATURE:USER:alice").expect("read");
        assert!(!snapshot.exists);
        assert!(snapshot.members.is_empty());
        assert!(snapshot.signature.is_none());
    }

    #[test]
    fn commit_applies_batch_when_key_unmodified() {
        let store = MemoryCacheStore::new();
        let token = store.watch("USER:alice").expect("watch");
        let batch = WriteBatch::new()
            .delete_set("USER:alice")
            .add_members("USER:alice", vec!["1".into(), "2".into()])
            .put_scalar("SIGNATURE:USER:alice", vec![0xAB]);
        assert_eq!(store.commit(&token, batch).expect("commit"), CommitOutcome::Committed);

        let snapshot = store.read_entry("USER:alice", "SIGNATURE:USER:alice").expect("read");
        assert!(snapshot.exists);
        assert_eq!(snapshot.members.len(), 2);
        assert_eq!(snapshot.signature, Some(vec![0xAB]));
    }

    #[test]
    fn commit_aborts_after_concurrent_modification() {
        let store = MemoryCacheStore::new();
        let token = store.watch("USER:alice").expect("watch");

        // A second writer lands between the watch and the commit.
        store
            .apply(WriteBatch::new().add_members("USER:alice", vec!["9".into()]))
            .expect("apply");

        let batch = WriteBatch::new().add_members("USER:alice", vec!["1".into()]);
        assert_eq!(store.commit(&token, batch).expect("commit"), CommitOutcome::Aborted);

        let snapshot = store.read_entry("USER:alice", "SIGNATURE:USER:alice").expect("read");
        assert_eq!(snapshot.members.into_iter().collect::<Vec<_>>(), vec!["9".to_string()]);
    }

    #[test]
    fn delete_and_recreate_still_aborts_stale_watcher() {
        let store = MemoryCacheStore::new();
        store
            .apply(WriteBatch::new().add_members("USER:alice", vec!["1".into()]))
            .expect("apply");
        let token = store.watch("USER:alice").expect("watch");

        store.apply(WriteBatch::new().delete_set("USER:alice")).expect("apply");
        store
            .apply(WriteBatch::new().add_members("USER:alice", vec!["1".into()]))
            .expect("apply");

        let batch = WriteBatch::new().add_members("USER:alice", vec!["2".into()]);
        assert_eq!(store.commit(&token, batch).expect("commit"), CommitOutcome::Aborted);
    }

    #[test]
    fn keys_enumerates_by_glob() {
        let store = MemoryCacheStore::new();
        store
            .apply(
                WriteBatch::new()
                    .add_members("USER:alice", vec!["1".into()])
                    .add_members("USER:alice:appA", vec!["2".into()])
                    .add_members("USER:bob", vec!["3".into()])
                    .put_scalar("SIGNATURE:USER:alice", vec![1]),
            )
            .expect("apply");

        let keys = store.keys("USER:alice*").expect("keys");
        assert_eq!(keys, vec!["USER:alice".to_string(), "USER:alice:appA".to_string()]);
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let store = MemoryCacheStore::new();
        assert!(matches!(store.keys("USER:[alice"), Err(CacheStoreError::Pattern { .. })));
    }
}
