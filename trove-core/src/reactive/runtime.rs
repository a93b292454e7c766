//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, memos, and
//! effects. It manages the dependency graph and schedules updates when
//! signals change.
//!
//! # How It Works
//!
//! 1. Memos and effects register with the runtime when created.
//!
//! 2. When a memo or effect finishes evaluating, the sources it read are
//!    bound as its dependencies. Edges that were not read again are dropped.
//!
//! 3. When a source changes, the runtime:
//!    a. Marks direct readers dirty
//!    b. Marks readers of those memos as possibly stale, transitively
//!    c. Queues every effect it reached
//!    d. Runs the queue, unless a batch is open
//!
//! 4. Memos are lazy: a dirty memo recomputes on its next read. A possibly
//!    stale memo or effect first refreshes the memos it reads, and only
//!    recomputes or re-runs if one of them produced a different value.
//!
//! 5. A memo that loses its last observer is told so and suspends.
//!
//! # Threading
//!
//! All runtime state is thread-local. Reactive values created on one thread
//! only ever react to changes made on that thread. Nothing here blocks.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use indexmap::IndexSet;
use tracing::{error, trace};

use super::context::ReactiveContext;
use super::subscriber::{SourceId, SubscriberId};
use crate::config::EngineConfig;

/// How certain a change notification is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// A memo that is read may produce a different value.
    Check,
    /// Something that is read changed.
    Dirty,
}

/// A trait for types that can be notified when dependencies change.
pub trait Reactive: Send + Sync {
    /// Get the subscriber ID for this reactive value.
    fn subscriber_id(&self) -> SubscriberId;

    /// Mark this reactive value as needing, or possibly needing, an update.
    ///
    /// Lazy values return their own source id when they were clean, so
    /// whoever reads them hears that they may be stale.
    fn mark(&self, staleness: Staleness) -> Option<SourceId>;

    /// A memo this value reads recomputed to a different value.
    fn confirm_change(&self);

    /// Bring a lazy value up to date (memos only).
    fn refresh(&self) {}

    /// Re-run this reactive value (effects only).
    fn schedule(&self);

    /// Check if this reactive value is an effect (eager) or memo (lazy).
    fn is_eager(&self) -> bool;

    /// Called when the source owned by this value lost its last observer.
    fn on_unobserved(&self) {}
}

/// Handle to a registered reactive value.
///
/// Dropping this handle unregisters the reactive value from the runtime.
pub struct ReactiveHandle {
    subscriber_id: SubscriberId,
}

impl ReactiveHandle {
    /// The subscriber this handle keeps registered.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }
}

impl Drop for ReactiveHandle {
    fn drop(&mut self) {
        Runtime::unregister(self.subscriber_id);
    }
}

#[derive(Default)]
struct RuntimeState {
    /// Every live memo and effect, held weakly.
    registry: HashMap<SubscriberId, Weak<dyn Reactive>>,
    /// Source -> subscribers that read it during their last evaluation.
    observers: HashMap<SourceId, IndexSet<SubscriberId>>,
    /// Subscriber -> sources it read during its last evaluation.
    observing: HashMap<SubscriberId, IndexSet<SourceId>>,
    /// Memo source ids -> the memo owning them.
    owners: HashMap<SourceId, SubscriberId>,
    /// Effects kept alive until explicitly released.
    retained: HashMap<SubscriberId, Arc<dyn Reactive>>,
    /// Effects waiting to run, in the order they were queued.
    pending: IndexSet<SubscriberId>,
    batch_depth: usize,
    flushing: bool,
}

thread_local! {
    static STATE: RefCell<RuntimeState> = RefCell::new(RuntimeState::default());
}

fn with_state<R>(f: impl FnOnce(&mut RuntimeState) -> R) -> R {
    STATE.with(|state| f(&mut state.borrow_mut()))
}

/// The reactive runtime of the current thread.
pub struct Runtime;

impl Runtime {
    /// Register a reactive value with the runtime.
    ///
    /// Returns a handle that unregisters the value when dropped.
    pub fn register(id: SubscriberId, reactive: Weak<dyn Reactive>) -> ReactiveHandle {
        with_state(|state| {
            state.registry.insert(id, reactive);
        });

        ReactiveHandle { subscriber_id: id }
    }

    /// Declare that `source` belongs to the lazy value `owner`, so the owner
    /// hears about it becoming unobserved.
    pub fn register_source(source: SourceId, owner: SubscriberId) {
        with_state(|state| {
            state.owners.insert(source, owner);
        });
    }

    /// Whether a subscriber is currently registered.
    pub fn is_registered(id: SubscriberId) -> bool {
        with_state(|state| state.registry.contains_key(&id))
    }

    /// Unregister a reactive value.
    fn unregister(id: SubscriberId) {
        // Handles may drop during thread teardown or while the state is borrowed.
        let unobserved = STATE
            .try_with(|cell| match cell.try_borrow_mut() {
                Ok(mut state) => {
                    state.registry.remove(&id);
                    state.pending.shift_remove(&id);
                    state.owners.retain(|_, owner| *owner != id);
                    state.rebind(id, IndexSet::new())
                }
                Err(_) => Vec::new(),
            })
            .unwrap_or_default();

        for reactive in unobserved {
            reactive.on_unobserved();
        }
    }

    /// Drop every edge pointing at a source that no longer exists.
    pub fn forget_source(source: SourceId) {
        let _ = STATE.try_with(|cell| {
            if let Ok(mut state) = cell.try_borrow_mut() {
                state.owners.remove(&source);
                if let Some(subscribers) = state.observers.remove(&source) {
                    for subscriber in subscribers {
                        if let Some(sources) = state.observing.get_mut(&subscriber) {
                            sources.shift_remove(&source);
                        }
                    }
                }
            }
        });
    }

    /// Replace the dependencies of a subscriber with the sources it just read.
    pub fn bind_dependencies(subscriber: SubscriberId, dependencies: Vec<SourceId>) {
        let unobserved =
            with_state(|state| state.rebind(subscriber, dependencies.into_iter().collect()));

        for reactive in unobserved {
            reactive.on_unobserved();
        }
    }

    /// Remove all dependencies of a subscriber.
    pub fn clear_dependencies(subscriber: SubscriberId) {
        Self::bind_dependencies(subscriber, Vec::new());
    }

    /// Number of subscribers currently depending on a source.
    pub fn observer_count(source: SourceId) -> usize {
        with_state(|state| state.observers.get(&source).map_or(0, IndexSet::len))
    }

    /// Number of sources a subscriber currently depends on.
    pub fn dependency_count(subscriber: SubscriberId) -> usize {
        with_state(|state| state.observing.get(&subscriber).map_or(0, IndexSet::len))
    }

    /// Notify all subscribers that a source changed.
    ///
    /// This is the core update propagation mechanism. Outside a batch, queued
    /// effects run before this returns.
    pub fn notify_source_change(source: SourceId) {
        let mut queue = vec![(source, Staleness::Dirty)];

        while let Some((changed, staleness)) = queue.pop() {
            for reactive in Self::observers_of(changed) {
                let next = reactive.mark(staleness);
                if reactive.is_eager() {
                    with_state(|state| {
                        state.pending.insert(reactive.subscriber_id());
                    });
                } else if let Some(next) = next {
                    queue.push((next, Staleness::Check));
                }
            }
        }

        if !Self::in_batch() {
            Self::flush();
        }
    }

    /// Tell the readers of a memo that it recomputed to a different value.
    pub fn confirm_change(source: SourceId) {
        for reactive in Self::observers_of(source) {
            reactive.confirm_change();
        }
    }

    /// Refresh the memos `subscriber` read, in the order it read them, until
    /// `changed` reports that one of them produced a different value.
    ///
    /// Returns the last answer of `changed`.
    pub fn refresh_dependencies(subscriber: SubscriberId, changed: impl Fn() -> bool) -> bool {
        let lazy: Vec<Arc<dyn Reactive>> = with_state(|state| {
            state
                .observing
                .get(&subscriber)
                .map(|sources| {
                    sources
                        .iter()
                        .filter_map(|source| state.owners.get(source))
                        .filter_map(|owner| state.registry.get(owner).and_then(Weak::upgrade))
                        .collect()
                })
                .unwrap_or_default()
        });

        for reactive in lazy {
            reactive.refresh();
            if changed() {
                return true;
            }
        }
        changed()
    }

    fn observers_of(source: SourceId) -> Vec<Arc<dyn Reactive>> {
        with_state(|state| {
            state
                .observers
                .get(&source)
                .map(|subscribers| {
                    subscribers
                        .iter()
                        .filter_map(|id| state.registry.get(id).and_then(Weak::upgrade))
                        .collect()
                })
                .unwrap_or_default()
        })
    }

    /// Open a batch. Effects queued while a batch is open wait for it to close.
    pub fn begin_batch() {
        with_state(|state| state.batch_depth += 1);
    }

    /// Close a batch, running queued effects if it was the outermost one.
    pub fn end_batch() {
        let depth = with_state(|state| {
            state.batch_depth = state.batch_depth.saturating_sub(1);
            state.batch_depth
        });

        if depth == 0 {
            Self::flush();
        }
    }

    /// Close a batch without running anything, used while unwinding.
    pub(crate) fn abandon_batch() {
        let _ = STATE.try_with(|cell| {
            if let Ok(mut state) = cell.try_borrow_mut() {
                state.batch_depth = state.batch_depth.saturating_sub(1);
            }
        });
    }

    /// Whether a batch is currently open.
    pub fn in_batch() -> bool {
        with_state(|state| state.batch_depth > 0)
    }

    /// Run queued effects now, unless a batch is open or a flush is already
    /// in progress further up the stack.
    pub fn flush() {
        Self::exclusive(|| ());
    }

    /// Run `f` as part of a flush. Effects queued while `f` runs are only
    /// started once the outermost flush regains control.
    pub(crate) fn exclusive<R>(f: impl FnOnce() -> R) -> R {
        let outermost = with_state(|state| !std::mem::replace(&mut state.flushing, true));
        let _guard = FlushGuard { outermost };

        let result = f();
        if outermost {
            Self::drain();
        }
        result
    }

    fn drain() {
        let limit = EngineConfig::current().max_reaction_iterations;
        let mut runs: HashMap<SubscriberId, usize> = HashMap::new();

        loop {
            let next = with_state(|state| {
                if state.batch_depth > 0 {
                    return None;
                }
                while let Some(id) = state.pending.shift_remove_index(0) {
                    if let Some(reactive) = state.registry.get(&id).and_then(Weak::upgrade) {
                        return Some((id, reactive));
                    }
                }
                None
            });

            let Some((id, reactive)) = next else {
                break;
            };

            let count = runs.entry(id).or_insert(0);
            *count += 1;
            if *count > limit {
                error!(
                    subscriber = %id,
                    limit,
                    "reaction does not converge; it kept re-triggering itself, abandoning flush"
                );
                with_state(|state| state.pending.clear());
                break;
            }

            trace!(subscriber = %id, "running reaction");
            reactive.schedule();
        }
    }

    /// Keep an effect alive until [`Runtime::release`] is called.
    pub fn retain(reactive: Arc<dyn Reactive>) {
        let id = reactive.subscriber_id();
        let previous = with_state(|state| state.retained.insert(id, reactive));
        drop(previous);
    }

    /// Drop the runtime's reference to a retained effect.
    pub fn release(id: SubscriberId) {
        let released = with_state(|state| {
            state.pending.shift_remove(&id);
            state.retained.remove(&id)
        });
        drop(released);
    }

    /// Get the current subscriber being tracked, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        ReactiveContext::current_subscriber()
    }

    /// Check if we're inside a reactive context.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }
}

impl RuntimeState {
    /// Swap a subscriber's dependency set, returning the owners of sources
    /// that lost their last observer.
    fn rebind(
        &mut self,
        subscriber: SubscriberId,
        dependencies: IndexSet<SourceId>,
    ) -> Vec<Arc<dyn Reactive>> {
        let previous = self.observing.remove(&subscriber).unwrap_or_default();

        for source in dependencies.difference(&previous) {
            self.observers.entry(*source).or_default().insert(subscriber);
        }

        let mut lost = Vec::new();
        for source in previous.difference(&dependencies) {
            if let Some(subscribers) = self.observers.get_mut(source) {
                subscribers.shift_remove(&subscriber);
                if subscribers.is_empty() {
                    self.observers.remove(source);
                    lost.push(*source);
                }
            }
        }

        if !dependencies.is_empty() {
            self.observing.insert(subscriber, dependencies);
        }

        lost.iter()
            .filter_map(|source| self.owners.get(source))
            .filter_map(|owner| self.registry.get(owner).and_then(Weak::upgrade))
            .collect()
    }
}

struct FlushGuard {
    outermost: bool,
}

impl Drop for FlushGuard {
    fn drop(&mut self) {
        if self.outermost {
            let _ = STATE.try_with(|cell| {
                if let Ok(mut state) = cell.try_borrow_mut() {
                    state.flushing = false;
                }
            });
        }
    }
}
