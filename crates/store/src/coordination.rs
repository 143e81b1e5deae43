//! Coordination store contract and in-memory backend.
//!
//! The coordination store holds the only cluster-shared allocator state: a
//! scalar counter and a single-byte valid flag, both guarded by a
//! distributed read/write lock keyed by a fixed path. Lock acquisition is
//! always bounded; a caller that cannot take the lock within its budget gets
//! a timeout error instead of blocking indefinitely.
//!
//! Backends lacking atomic in-place update implement `replace_counter` as
//! delete + recreate; `increment_counter` maps to an atomic increment where
//! the backing service has one.

use std::time::Duration;

use parking_lot::RwLock;
use snafu::Snafu;

/// Error type for coordination store operations.
#[derive(Debug, Snafu)]
pub enum CoordinationError {
    /// The lock was not acquired within the bounded timeout.
    #[snafu(display("failed to acquire coordination lock within {timeout:?}"))]
    LockTimeout {
        /// The acquire budget that elapsed.
        timeout: Duration,
    },

    /// The counter node is absent.
    #[snafu(display("coordination counter is not present"))]
    CounterMissing,

    /// The backing service rejected an operation.
    #[snafu(display("coordination store rejected {operation}: {message}"))]
    Rejected {
        /// Operation name for diagnostics.
        operation: &'static str,
        /// Backend-provided detail.
        message: String,
    },
}

/// Result type for coordination store operations.
pub type Result<T> = std::result::Result<T, CoordinationError>;

/// Marker for backend guard objects held by [`LockGuard`].
trait GuardHold: Send {}

impl<T: Send> GuardHold for T {}

/// An acquired coordination lock, released on drop.
///
/// The boxed inner guard keeps whatever backend state pins the lock (an
/// in-memory RAII guard, a session handle, ...) alive for the borrow.
pub struct LockGuard<'a> {
    _inner: Box<dyn GuardHold + 'a>,
}

impl std::fmt::Debug for LockGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard").finish_non_exhaustive()
    }
}

impl<'a> LockGuard<'a> {
    /// Wraps a backend guard object.
    pub fn new(inner: impl Send + 'a) -> Self {
        Self { _inner: Box::new(inner) }
    }
}

/// Cluster coordination primitives backing ID allocation.
///
/// Every mutation of the counter or valid flag must happen under the
/// exclusive lock; reads take the shared variant. The contract never blocks
/// past the passed timeout.
pub trait CoordinationStore: Send + Sync {
    /// Acquires the shared (read) lock within `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError::LockTimeout`] when the budget elapses.
    fn lock_read(&self, timeout: Duration) -> Result<LockGuard<'_>>;

    /// Acquires the exclusive (write) lock within `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError::LockTimeout`] when the budget elapses.
    fn lock_write(&self, timeout: Duration) -> Result<LockGuard<'_>>;

    /// Reads the persisted counter. `None` when the counter node is absent.
    fn read_counter(&self) -> Result<Option<i64>>;

    /// Replaces the persisted counter (delete + recreate semantics).
    fn replace_counter(&self, value: i64) -> Result<()>;

    /// Atomically increments the counter and returns the new value.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError::CounterMissing`] when there is no
    /// counter to increment.
    fn increment_counter(&self) -> Result<i64>;

    /// Reads the valid flag. A missing flag node reads as false.
    fn read_valid(&self) -> Result<bool>;

    /// Writes the valid flag (delete + recreate semantics).
    fn write_valid(&self, valid: bool) -> Result<()>;
}

/// Shared allocator state behind the in-memory lock.
#[derive(Debug, Default)]
struct CounterState {
    counter: Option<i64>,
    valid: bool,
}

/// In-memory coordination store.
///
/// Backs tests and single-process deployments. The read/write lock is a
/// `parking_lot::RwLock` with bounded `try_*_for` acquisition, mirroring the
/// bounded acquire of the distributed lock recipe; counter and flag live in
/// a second lock so they stay readable while the main lock is held by the
/// owner performing the mutation.
#[derive(Default)]
pub struct MemoryCoordinationStore {
    lock: RwLock<()>,
    state: parking_lot::Mutex<CounterState>,
}

impl MemoryCoordinationStore {
    /// Creates an empty store: no counter, valid flag unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with a pre-seeded counter, as left by a previous
    /// process generation.
    pub fn with_counter(value: i64, valid: bool) -> Self {
        Self {
            lock: RwLock::new(()),
            state: parking_lot::Mutex::new(CounterState { counter: Some(value), valid }),
        }
    }
}

impl CoordinationStore for MemoryCoordinationStore {
    fn lock_read(&self, timeout: Duration) -> Result<LockGuard<'_>> {
        match self.lock.try_read_for(timeout) {
            Some(guard) => Ok(LockGuard::new(guard)),
            None => Err(CoordinationError::LockTimeout { timeout }),
        }
    }

    fn lock_write(&self, timeout: Duration) -> Result<LockGuard<'_>> {
        match self.lock.try_write_for(timeout) {
            Some(guard) => Ok(LockGuard::new(guard)),
            None => Err(CoordinationError::LockTimeout { timeout }),
        }
    }

    fn read_counter(&self) -> Result<Option<i64>> {
        Ok(self.state.lock().counter)
    }

    fn replace_counter(&self, value: i64) -> Result<()> {
        self.state.lock().counter = Some(value);
        Ok(())
    }

    fn increment_counter(&self) -> Result<i64> {
        let mut state = self.state.lock();
        match state.counter {
            Some(current) => {
                let next = current + 1;
                state.counter = Some(next);
                Ok(next)
            },
            None => Err(CoordinationError::CounterMissing),
        }
    }

    fn read_valid(&self) -> Result<bool> {
        Ok(self.state.lock().valid)
    }

    fn write_valid(&self, valid: bool) -> Result<()> {
        self.state.lock().valid = valid;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_store_has_no_counter_and_invalid_flag() {
        let store = MemoryCoordinationStore::new();
        assert_eq!(store.read_counter().expect("read"), None);
        assert!(!store.read_valid().expect("read"));
    }

    #[test]
    fn increment_requires_a_counter() {
        let store = MemoryCoordinationStore::new();
        assert!(matches!(
            store.increment_counter(),
            Err(CoordinationError::CounterMissing)
        ));

        store.replace_counter(10).expect("replace");
        assert_eq!(store.increment_counter().expect("increment"), 11);
        assert_eq!(store.read_counter().expect("read"), Some(11));
    }

    #[test]
    fn write_lock_blocks_second_writer_until_timeout() {
        let store = MemoryCoordinationStore::new();
        let _held = store.lock_write(Duration::from_millis(50)).expect("first acquire");
        let err = store
            .lock_write(Duration::from_millis(10))
            .expect_err("second acquire should time out");
        assert!(matches!(err, CoordinationError::LockTimeout { .. }));
    }

    #[test]
    fn read_locks_are_shared() {
        let store = MemoryCoordinationStore::new();
        let _first = store.lock_read(Duration::from_millis(10)).expect("first");
        let _second = store.lock_read(Duration::from_millis(10)).expect("second");
    }

    #[test]
    fn lock_release_on_drop_unblocks_writers() {
        let store = MemoryCoordinationStore::new();
        {
            let _held = store.lock_write(Duration::from_millis(10)).expect("acquire");
        }
        store.lock_write(Duration::from_millis(10)).expect("reacquire after drop");
    }
}
