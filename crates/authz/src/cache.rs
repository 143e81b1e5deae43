//! Signature-verified authorization cache.
//!
//! Each cache entry is an unordered set of decimal-encoded vertex indices
//! plus a companion Ed25519 signature under `SIGNATURE:<key>`. Entry status
//! is encoded in-band through sentinel members, so one atomic multi-read
//! yields both data and status:
//!
//! - `-1` (disabled): reads return the empty set without recomputing, until
//!   an explicit update rewrites the entry
//! - `-2` (needs update): the next read recomputes and re-signs the entry
//!
//! Writes use the store's optimistic transaction: watch the key, run the
//! query, then delete + re-add + re-sign in one conditional commit. An
//! aborted commit re-runs the query; after the attempt budget the last
//! computed value is returned and the exhaustion logged; availability over
//! strict freshness.

use std::{collections::BTreeSet, sync::Arc, time::Instant};

use cohort_store::{CacheStore, CacheStoreError, CommitOutcome, WriteBatch};
use cohort_types::{SetSigner, VertexIndex, config::CacheConfig};
use snafu::{ResultExt, Snafu};
use tracing::{debug, warn};

use crate::graph::GraphError;

/// Prefix of the companion signature key.
pub const SIGNATURE_KEY_PREFIX: &str = "SIGNATURE";

/// Entry status codes stored as sentinel members.
///
/// Members >= 0 are real indices; any negative member is a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Entry is disabled: reads return empty without recomputing.
    Disabled,
    /// Entry must be recomputed on the next read.
    NeedsUpdate,
}

impl CacheStatus {
    /// The sentinel member encoding this status.
    pub const fn sentinel(self) -> VertexIndex {
        match self {
            CacheStatus::Disabled => VertexIndex::new(-1),
            CacheStatus::NeedsUpdate => VertexIndex::new(-2),
        }
    }
}

/// Error type for cache operations.
#[derive(Debug, Snafu)]
pub enum CacheError {
    /// The cache store failed.
    #[snafu(display("cache store failure: {source}"))]
    Store {
        /// Underlying store error.
        source: CacheStoreError,
    },

    /// The backing query failed while (re)computing an entry.
    #[snafu(display("cache query failed for {key}: {source}"))]
    Query {
        /// The entry being computed.
        key: String,
        /// Underlying graph error.
        source: GraphError,
    },

    /// A cache key could not be parsed back into a query.
    #[snafu(display("invalid cache key {key}: {reason}"))]
    InvalidKey {
        /// The offending key.
        key: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// A cacheable query over the group graph.
///
/// The seam between the cache layer and the resolver: the cache never knows
/// what it stores, only how to key it, recompute it, and rebind an
/// enumerated key back to a runnable query.
pub trait CacheQuery: Sized {
    /// Canonical cache key for this query.
    fn key(&self) -> String;

    /// Wildcard matching every key variant for this query's principal.
    fn wildcard_key(&self) -> String;

    /// Runs the query against the authoritative graph.
    fn run(&self) -> std::result::Result<BTreeSet<VertexIndex>, GraphError>;

    /// Rebinds this query to an enumerated key.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidKey`] when the key does not parse.
    fn for_key(&self, key: &str) -> Result<Self>;

    /// The value reads observe while the entry is disabled.
    fn disabled_result(&self) -> BTreeSet<VertexIndex> {
        BTreeSet::new()
    }
}

/// Builds the companion signature key.
pub fn signature_key(key: &str) -> String {
    format!("{SIGNATURE_KEY_PREFIX}:{key}")
}

/// Encodes members for storage: decimal strings, one per index.
fn encode_members(ids: &BTreeSet<VertexIndex>) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

/// Decodes stored members. Any unparseable member means the entry cannot be
/// trusted.
fn decode_members(members: &BTreeSet<String>) -> Option<BTreeSet<VertexIndex>> {
    members.iter().map(|member| member.parse().ok()).collect()
}

/// The verified cache over a shared [`CacheStore`].
pub struct AuthorizationCache<S> {
    store: Arc<S>,
    signer: Arc<SetSigner>,
    config: CacheConfig,
}

impl<S: CacheStore> AuthorizationCache<S> {
    /// Creates a cache over `store`, signing entries with `signer`.
    pub fn new(store: Arc<S>, signer: Arc<SetSigner>, config: CacheConfig) -> Self {
        Self { store, signer, config }
    }

    /// Returns the value for `query`, recomputing when required.
    ///
    /// A missing entry, a signature that fails verification, undecodable
    /// members, or the needs-update sentinel all force a recompute; the
    /// disabled sentinel short-circuits to the query's disabled result.
    pub fn get<Q: CacheQuery>(&self, query: &Q) -> Result<BTreeSet<VertexIndex>> {
        let key = query.key();
        let timer = Instant::now();

        let snapshot =
            self.store.read_entry(&key, &signature_key(&key)).context(StoreSnafu)?;
        let result = if !snapshot.exists {
            self.force_update(query)
        } else {
            match decode_members(&snapshot.members) {
                None => {
                    warn!(key = %key, "cache entry has undecodable members; recomputing");
                    self.force_update(query)
                },
                Some(values) => {
                    if !self.signer.verify(&values, &key, snapshot.signature.as_deref()) {
                        warn!(key = %key, "cache entry failed signature verification; recomputing");
                        self.force_update(query)
                    } else if values.contains(&CacheStatus::NeedsUpdate.sentinel()) {
                        self.force_update(query)
                    } else if values.contains(&CacheStatus::Disabled.sentinel()) {
                        Ok(query.disabled_result())
                    } else {
                        Ok(values)
                    }
                },
            }
        };
        self.log_timer("get", &key, timer);
        result
    }

    /// Recomputes and rewrites the entry for `query`.
    ///
    /// Optimistic concurrency: the key is watched while the query runs; the
    /// delete + re-add + re-sign batch commits only if the key stayed
    /// unmodified. An aborted commit re-runs the query. After the configured
    /// attempt budget the last computed value is returned rather than an
    /// error.
    pub fn force_update<Q: CacheQuery>(&self, query: &Q) -> Result<BTreeSet<VertexIndex>> {
        let key = query.key();
        let timer = Instant::now();
        let mut last_value: Option<BTreeSet<VertexIndex>> = None;

        for attempt in 0..self.config.optimistic_attempts {
            let token = self.store.watch(&key).context(StoreSnafu)?;

            let value = query
                .run()
                .context(QuerySnafu { key: key.clone() })?;

            let batch = WriteBatch::new()
                .delete_set(&key)
                .add_members(&key, encode_members(&value))
                .put_scalar(signature_key(&key), self.signer.sign(&value, &key));

            match self.store.commit(&token, batch).context(StoreSnafu)? {
                CommitOutcome::Committed => {
                    self.log_timer("force_update", &key, timer);
                    return Ok(value);
                },
                CommitOutcome::Aborted => {
                    debug!(key = %key, attempt, "optimistic cache write aborted; retrying");
                    last_value = Some(value);
                },
            }
        }

        // Contention exhausted: the entry stays stale but callers get the
        // freshest computed value. Logged, not raised.
        warn!(
            key = %key,
            attempts = self.config.optimistic_attempts,
            "optimistic cache write attempts exhausted; returning last computed value"
        );
        self.log_timer("force_update", &key, timer);
        Ok(last_value.unwrap_or_default())
    }

    /// Rewrites every key matching `pattern` to the disabled sentinel.
    ///
    /// Disabled entries read as empty without recomputation until an
    /// explicit update; nothing is recomputed here.
    pub fn invalidate_all(&self, pattern: &str) -> Result<()> {
        self.set_all_keys_to(pattern, CacheStatus::Disabled)
    }

    /// Rewrites every key matching `pattern` to the needs-update sentinel.
    ///
    /// The next read of each key recomputes and re-signs it, giving lazy
    /// invalidation without a synchronous sweep.
    pub fn mark_all_for_update(&self, pattern: &str) -> Result<()> {
        self.set_all_keys_to(pattern, CacheStatus::NeedsUpdate)
    }

    /// Eagerly recomputes every key matching the query's wildcard.
    ///
    /// The canonical key is computed even when missing from the store. A key
    /// that fails to rebind or recompute is deleted and the sweep continues.
    pub fn update_all<Q: CacheQuery>(&self, query: &Q) -> Result<()> {
        let pattern = query.wildcard_key();
        let timer = Instant::now();
        let keys = self.store.keys(&pattern).context(StoreSnafu)?;

        if !keys.contains(&query.key()) {
            self.force_update(query)?;
        }

        for key in keys {
            let outcome = query.for_key(&key).and_then(|bound| self.force_update(&bound));
            if let Err(err) = outcome {
                warn!(key = %key, error = %err, "failed to update cache entry; deleting");
                self.store
                    .apply(
                        WriteBatch::new().delete_set(&key).delete_scalar(signature_key(&key)),
                    )
                    .context(StoreSnafu)?;
            }
        }
        self.log_timer("update_all", &pattern, timer);
        Ok(())
    }

    /// Bulk sentinel rewrite behind `invalidate_all` / `mark_all_for_update`.
    fn set_all_keys_to(&self, pattern: &str, status: CacheStatus) -> Result<()> {
        let timer = Instant::now();
        let keys = self.store.keys(pattern).context(StoreSnafu)?;

        let sentinel: BTreeSet<VertexIndex> = [status.sentinel()].into_iter().collect();
        let mut batch = WriteBatch::new();
        for key in &keys {
            batch = batch
                .delete_set(key)
                .add_members(key, encode_members(&sentinel))
                .put_scalar(signature_key(key), self.signer.sign(&sentinel, key));
        }
        if !batch.is_empty() {
            self.store.apply(batch).context(StoreSnafu)?;
        }
        self.log_timer("set_all_keys", pattern, timer);
        Ok(())
    }

    fn log_timer(&self, operation: &str, key: &str, timer: Instant) {
        if self.config.log_timers {
            debug!(
                operation,
                key = %key,
                elapsed_ms = timer.elapsed().as_millis() as u64,
                "cache timer"
            );
        }
    }
}
