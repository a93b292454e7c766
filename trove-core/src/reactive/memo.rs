//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. On first access, the memo runs its computation inside a reactive
//!    context and caches the result. Whatever it read becomes its dependency
//!    set.
//!
//! 2. When accessed again, if no dependencies have changed, returns cached value.
//!
//! 3. When a dependency changes, the runtime marks the memo dirty, and
//!    whatever reads the memo possibly stale.
//!
//! 4. On next access, a dirty memo recomputes. A possibly stale memo first
//!    refreshes the memos it reads and recomputes only if one of them
//!    produced a different value; otherwise its cached value stands.
//!
//! 5. A recomputed value equal to the previous one is not a change: readers
//!    that were only possibly stale stay as they are.
//!
//! # Why This Matters
//!
//! This "lazy" approach avoids unnecessary recomputation:
//!
//! - A signal changes
//! - 10 memos depend on it
//! - Only the memos actually accessed will recompute
//! - Memos that are never read stay dirty (no wasted work)
//!
//! # Suspension
//!
//! A memo read by other computations is kept up to date for them. When the
//! last of them stops reading it, the memo drops its cached value and its
//! own dependency edges, and recomputes from scratch if it is read again.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{trace, warn};

use super::context::ReactiveContext;
use super::runtime::{Reactive, ReactiveHandle, Runtime, Staleness};
use super::subscriber::{SourceId, SubscriberId};
use crate::config::EngineConfig;
use crate::error::ReactiveError;

/// Dirty state for a memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoState {
    /// The cached value is up-to-date.
    Clean,

    /// A memo this one reads may have changed.
    Check,

    /// The memo needs to recompute before its value can be used.
    Dirty,
}

type UnobservedHook = Box<dyn Fn() + Send + Sync>;

/// A cached derived value that recomputes only when dependencies change.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value. Recomputed values are compared with
///   the cached one, hence the `PartialEq` bound.
pub struct Memo<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Arc<MemoInner<T>>,
}

struct MemoInner<T> {
    /// Source id under which readers track this memo.
    id: SourceId,

    /// The subscriber ID used for dependency tracking.
    subscriber_id: SubscriberId,

    /// The computation function.
    compute: Box<dyn Fn() -> T + Send + Sync>,

    /// The cached value (None if never computed or suspended).
    value: RwLock<Option<T>>,

    /// Current dirty state.
    state: RwLock<MemoState>,

    /// Set while `compute` runs.
    computing: AtomicBool,

    /// Extra work to do when the memo loses its last reader.
    on_unobserved: RwLock<Option<UnobservedHook>>,

    _handle: ReactiveHandle,
}

impl<T> Memo<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a new memo with the given computation function.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let id = SourceId::new();
        let subscriber_id = SubscriberId::new();

        let inner = Arc::new_cyclic(|weak: &Weak<MemoInner<T>>| {
            let reactive = weak.clone() as Weak<dyn Reactive>;
            MemoInner {
                id,
                subscriber_id,
                compute: Box::new(compute),
                value: RwLock::new(None),
                state: RwLock::new(MemoState::Dirty),
                computing: AtomicBool::new(false),
                on_unobserved: RwLock::new(None),
                _handle: Runtime::register(subscriber_id, reactive),
            }
        });
        Runtime::register_source(id, subscriber_id);

        Self { inner }
    }

    /// Get the memo's unique ID.
    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    /// Get the subscriber ID for this memo.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.subscriber_id
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// This is the main entry point for reading a memo's value. Fails only if
    /// the memo is read from inside its own computation.
    pub fn get(&self) -> Result<T, ReactiveError> {
        if ReactiveContext::is_active() {
            ReactiveContext::track_dependency(self.inner.id);
        } else if EngineConfig::current().computed_requires_reaction && !self.is_observed() {
            warn!(memo = %self.inner.id, "computed value read outside a reactive context");
        }

        self.inner.read()
    }

    /// Mark the memo as definitely needing recomputation.
    pub fn mark_dirty(&self) {
        *self.inner.state.write() = MemoState::Dirty;
    }

    /// Get the current dirty state.
    pub fn state(&self) -> MemoState {
        *self.inner.state.read()
    }

    /// Get the number of computations reading this memo.
    pub fn observer_count(&self) -> usize {
        Runtime::observer_count(self.inner.id)
    }

    /// Whether any computation currently reads this memo.
    pub fn is_observed(&self) -> bool {
        self.observer_count() > 0
    }

    /// Get the number of sources this memo read during its last computation.
    pub fn dependency_count(&self) -> usize {
        Runtime::dependency_count(self.inner.subscriber_id)
    }

    /// Check if the memo has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.read().is_some()
    }

    /// Install a hook run after the memo suspends because nothing reads it.
    pub(crate) fn set_on_unobserved(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.inner.on_unobserved.write() = Some(Box::new(hook));
    }
}

impl<T> MemoInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn state(&self) -> MemoState {
        *self.state.read()
    }

    fn read(&self) -> Result<T, ReactiveError> {
        if self.state() == MemoState::Check {
            self.settle();
        }

        if self.state() == MemoState::Clean {
            if let Some(value) = self.value.read().clone() {
                return Ok(value);
            }
        }

        self.recompute()
    }

    /// Resolve `Check`: dirty if a memo read last time now has a different
    /// value, clean otherwise.
    fn settle(&self) {
        let changed = Runtime::refresh_dependencies(self.subscriber_id, || {
            self.state() == MemoState::Dirty
        });
        if !changed {
            let mut state = self.state.write();
            if *state == MemoState::Check {
                *state = MemoState::Clean;
            }
        }
    }

    /// Recompute the memo's value.
    ///
    /// This runs the computation function within a reactive context to
    /// track dependencies.
    fn recompute(&self) -> Result<T, ReactiveError> {
        if self.computing.swap(true, Ordering::SeqCst) {
            return Err(ReactiveError::CycleDetected {
                subscriber: self.subscriber_id,
            });
        }
        let _computing = ComputingGuard(&self.computing);

        let (new_value, dependencies) = {
            let _ctx = ReactiveContext::enter(self.subscriber_id);
            let value = (self.compute)();
            (value, ReactiveContext::take_dependencies())
        };

        let changed = {
            let mut value = self.value.write();
            let changed = value.as_ref() != Some(&new_value);
            *value = Some(new_value.clone());
            changed
        };
        *self.state.write() = MemoState::Clean;

        Runtime::bind_dependencies(self.subscriber_id, dependencies);
        if changed {
            Runtime::confirm_change(self.id);
        }

        Ok(new_value)
    }
}

impl<T> Reactive for MemoInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    fn mark(&self, staleness: Staleness) -> Option<SourceId> {
        let mut state = self.state.write();
        let was_clean = *state == MemoState::Clean;
        match staleness {
            Staleness::Dirty => *state = MemoState::Dirty,
            Staleness::Check if was_clean => *state = MemoState::Check,
            Staleness::Check => {}
        }
        was_clean.then_some(self.id)
    }

    fn confirm_change(&self) {
        let mut state = self.state.write();
        if *state == MemoState::Check {
            *state = MemoState::Dirty;
        }
    }

    fn refresh(&self) {
        if self.computing.load(Ordering::SeqCst) {
            return;
        }
        if let Err(error) = self.read() {
            trace!(memo = %self.id, %error, "refresh failed");
        }
    }

    fn schedule(&self) {}

    fn is_eager(&self) -> bool {
        false
    }

    fn on_unobserved(&self) {
        *self.state.write() = MemoState::Dirty;
        self.value.write().take();
        Runtime::clear_dependencies(self.subscriber_id);

        if let Some(hook) = self.on_unobserved.read().as_ref() {
            hook();
        }
    }
}

impl<T> Drop for MemoInner<T> {
    fn drop(&mut self) {
        Runtime::forget_source(self.id);
    }
}

struct ComputingGuard<'a>(&'a AtomicBool);

impl Drop for ComputingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<T> Clone for Memo<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Memo<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("has_value", &self.has_value())
            .field("observer_count", &self.observer_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
