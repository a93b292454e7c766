//! Reactive Primitives
//!
//! This module implements the reactive engine that stores are built on:
//! signals, memos, computed functions, effects, and transactions.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a memo or effect), the signal is
//! recorded as a dependency of that context. When the signal's value changes,
//! all dependents are notified.
//!
//! ## Memos and computed functions
//!
//! A Memo is a derived value that caches its result. It re-evaluates only when
//! one of its dependencies changes. A computed function is a memo per
//! argument tuple.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its dependencies
//! change.
//!
//! ## Transactions
//!
//! A transaction defers effects until it ends, so a burst of writes produces
//! a single re-run of each affected effect.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to automatically
//! detect dependencies. When a signal is read, we check if there is an active
//! tracking context and, if so, record the dependency.
//!
//! This approach (sometimes called "automatic dependency tracking" or
//! "transparent reactivity") is used by MobX, SolidJS, and Vue 3.

mod computed_fn;
mod context;
mod effect;
mod memo;
mod runtime;
mod signal;
mod subscriber;
mod transaction;

pub use computed_fn::{create_materialization, ComputedFn, ComputedFnOptions};
pub use context::{untracked, ExecutionMode, ReactiveContext};
pub use effect::Effect;
pub use memo::{Memo, MemoState};
pub use runtime::{Reactive, ReactiveHandle, Runtime, Staleness};
pub use signal::Signal;
pub use subscriber::{SourceId, SubscriberId};
pub use transaction::Transaction;
