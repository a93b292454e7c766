//! Transactions
//!
//! A transaction batches writes: effects depending on anything written
//! inside it run once, after the outermost transaction returns, and see
//! every write at once. Transactions nest.
//!
//! Code inside a transaction runs untracked, so a transaction started from
//! within a memo or effect does not add to that computation's dependencies.

use std::thread;

use super::context::ReactiveContext;
use super::runtime::Runtime;

/// Entry point for batched execution.
pub struct Transaction;

impl Transaction {
    /// Run `f` inside a transaction and return its result.
    ///
    /// The batch closes whatever `f` returns, including an `Err`, so writes
    /// made before a failure are still delivered.
    pub fn run<R>(f: impl FnOnce() -> R) -> R {
        let _batch = BatchGuard::begin();
        let _ctx = ReactiveContext::enter_untracked();
        f()
    }

    /// Whether a transaction is open on this thread.
    pub fn is_active() -> bool {
        Runtime::in_batch()
    }
}

struct BatchGuard;

impl BatchGuard {
    fn begin() -> Self {
        Runtime::begin_batch();
        BatchGuard
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            Runtime::abandon_batch();
        } else {
            Runtime::end_batch();
        }
    }
}
