//! Effects
//!
//! An effect is the engine's tracked reaction: a closure that is re-run
//! whenever something it read last time changes. Store reactions are built on
//! it.
//!
//! A run records the sources it reads and replaces the previous dependency
//! set with them, so a branch not taken this time stops triggering re-runs.
//! Re-runs never happen inside another run: a change made while the effect
//! (or any other effect) is running queues the effect, and the queue is
//! drained once the outermost run, write, or transaction completes.
//!
//! An effect queued only because a memo it reads might have changed first
//! refreshes its memos, and skips the run if they all kept their values.
//!
//! Unlike a [`Memo`](super::Memo), an effect produces nothing and is eager.
//!
//! An effect lives as long as a handle to it exists, or until
//! [`Effect::dispose`] is called. [`Effect::retain`] hands a reference to the
//! runtime so the effect survives its handles until disposed.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{trace, warn};

use super::context::ReactiveContext;
use super::runtime::{Reactive, ReactiveHandle, Runtime, Staleness};
use super::subscriber::{SourceId, SubscriberId};
use crate::config::EngineConfig;

type EffectFn = Box<dyn FnMut() + Send>;

/// A side-effecting computation that re-runs when its dependencies change.
///
/// ```rust,ignore
/// let count = Signal::new(0);
/// let log = Effect::new(move || tracing::info!(count = count.get(), "count changed"));
///
/// count.set(5); // logs count=5
/// log.dispose();
/// ```
pub struct Effect {
    inner: Arc<EffectInner>,
}

struct EffectInner {
    /// The subscriber ID used for dependency tracking.
    subscriber_id: SubscriberId,

    /// The effect function.
    run: Mutex<EffectFn>,

    /// Why the effect is queued, if it is.
    stale: Mutex<Option<Staleness>>,

    /// Whether the effect has been disposed.
    disposed: AtomicBool,

    /// Number of times the effect has run.
    run_count: AtomicUsize,

    _handle: ReactiveHandle,
}

impl Effect {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish dependencies.
    pub fn new<F>(run: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let effect = Self::new_lazy(run);
        effect.execute();
        effect
    }

    /// Create a new effect without running it immediately.
    ///
    /// It has no dependencies until it is first executed.
    pub fn new_lazy<F>(run: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let subscriber_id = SubscriberId::new();
        let inner = Arc::new_cyclic(|weak: &Weak<EffectInner>| {
            let reactive = weak.clone() as Weak<dyn Reactive>;
            EffectInner {
                subscriber_id,
                run: Mutex::new(Box::new(run)),
                stale: Mutex::new(None),
                disposed: AtomicBool::new(false),
                run_count: AtomicUsize::new(0),
                _handle: Runtime::register(subscriber_id, reactive),
            }
        });

        Self { inner }
    }

    /// Get the subscriber ID for this effect.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.subscriber_id
    }

    /// Execute the effect function.
    ///
    /// This runs the function within a reactive context to track dependencies.
    pub fn execute(&self) {
        self.inner.execute();
    }

    /// Let the runtime keep this effect alive until it is disposed.
    pub fn retain(&self) {
        Runtime::retain(Arc::clone(&self.inner) as Arc<dyn Reactive>);
    }

    /// Dispose of the effect.
    ///
    /// After disposal, the effect will not run again. Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        Runtime::clear_dependencies(self.inner.subscriber_id);
        Runtime::release(self.inner.subscriber_id);
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        Runtime::dependency_count(self.inner.subscriber_id)
    }
}

impl EffectInner {
    fn execute(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        Runtime::exclusive(|| self.run_tracked());
    }

    fn run_tracked(&self) {
        let Some(mut run) = self.run.try_lock() else {
            warn!(subscriber = %self.subscriber_id, "effect triggered itself while running; skipped");
            return;
        };

        *self.stale.lock() = None;

        let dependencies = {
            let _ctx = ReactiveContext::enter(self.subscriber_id);
            (*run)();
            ReactiveContext::take_dependencies()
        };
        drop(run);

        self.run_count.fetch_add(1, Ordering::SeqCst);

        // Disposed from inside its own run.
        if self.disposed.load(Ordering::SeqCst) {
            Runtime::clear_dependencies(self.subscriber_id);
            return;
        }

        if dependencies.is_empty() && EngineConfig::current().reaction_requires_observable {
            warn!(subscriber = %self.subscriber_id, "reaction read no observable state and will never re-run");
        }
        Runtime::bind_dependencies(self.subscriber_id, dependencies);
    }

    fn is_dirty(&self) -> bool {
        *self.stale.lock() == Some(Staleness::Dirty)
    }

    /// Whether a memo this effect read now has a different value.
    fn memos_changed(&self) -> bool {
        Runtime::refresh_dependencies(self.subscriber_id, || self.is_dirty())
    }
}

impl Reactive for EffectInner {
    fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    fn mark(&self, staleness: Staleness) -> Option<SourceId> {
        let mut stale = self.stale.lock();
        if *stale != Some(Staleness::Dirty) {
            *stale = Some(staleness);
        }
        None
    }

    fn confirm_change(&self) {
        let mut stale = self.stale.lock();
        if *stale == Some(Staleness::Check) {
            *stale = Some(Staleness::Dirty);
        }
    }

    fn schedule(&self) {
        let check = *self.stale.lock() == Some(Staleness::Check);
        if check && !self.memos_changed() {
            let mut stale = self.stale.lock();
            if *stale == Some(Staleness::Check) {
                *stale = None;
            }
            trace!(subscriber = %self.subscriber_id, "memos read are unchanged; run skipped");
            return;
        }
        self.execute();
    }

    fn is_eager(&self) -> bool {
        true
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("subscriber_id", &self.inner.subscriber_id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
