//! Type aliases for shared state passed between the caller, the read loop,
//! and the poll timer.
//!
//! ```rust,ignore
//! use cnclink_core::types::*;
//!
//! // Instead of: Arc<RwLock<CommunicatorState>>
//! let state: ThreadSafeRw<CommunicatorState> = thread_safe_rw(CommunicatorState::Disconnected);
//! ```

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// A thread-safe, mutex-protected wrapper for cross-task sharing.
///
/// Uses `parking_lot::Mutex`; never hold the guard across an `.await`.
pub type ThreadSafe<T> = Arc<Mutex<T>>;

/// A thread-safe reader-writer lock wrapper for read-heavy workloads.
///
/// Snapshots are read far more often than the read loop replaces them.
pub type ThreadSafeRw<T> = Arc<RwLock<T>>;

/// Wrap a value in [`ThreadSafe`].
pub fn thread_safe<T>(value: T) -> ThreadSafe<T> {
    Arc::new(Mutex::new(value))
}

/// Wrap a value in [`ThreadSafeRw`].
pub fn thread_safe_rw<T>(value: T) -> ThreadSafeRw<T> {
    Arc::new(RwLock::new(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helpers_share_state() {
        let counter = thread_safe(0u32);
        let clone = counter.clone();
        *clone.lock() += 1;
        assert_eq!(*counter.lock(), 1);

        let rw = thread_safe_rw(vec![1, 2]);
        rw.write().push(3);
        assert_eq!(rw.read().len(), 3);
    }
}
