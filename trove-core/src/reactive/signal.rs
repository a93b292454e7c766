//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (memo/effect), the
//!    signal's id is recorded as a dependency of that context.
//!
//! 2. When a signal is set to a value different from its current one, the
//!    runtime is notified.
//!
//! 3. The runtime marks dependent memos dirty and re-runs dependent effects,
//!    immediately or when the enclosing transaction ends.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use super::context::ReactiveContext;
use super::runtime::Runtime;
use super::SourceId;
use crate::config::{EnforceActions, EngineConfig};

/// A reactive signal holding a value of type T.
///
/// # Type Parameters
///
/// - `T`: The type of value stored in the signal. Writes of a value equal to
///   the current one are ignored, hence the `PartialEq` bound.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// ```
pub struct Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Arc<SignalInner<T>>,
}

struct SignalInner<T> {
    /// Unique identifier for this signal.
    id: SourceId,

    /// The current value.
    value: RwLock<T>,
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                id: SourceId::new(),
                value: RwLock::new(value),
            }),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also registers the
    /// current computation as a subscriber.
    pub fn get(&self) -> T {
        self.track_read();
        self.inner.value.read().clone()
    }

    /// Get the current value without tracking dependencies.
    ///
    /// Use this when you need to read the value without establishing
    /// a reactive dependency.
    pub fn get_untracked(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Read the value through a closure without cloning it. Tracks like
    /// [`Signal::get`].
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track_read();
        f(&self.inner.value.read())
    }

    /// Set a new value and notify subscribers.
    ///
    /// Does nothing when `value` equals the current value.
    pub fn set(&self, value: T) {
        {
            let mut guard = self.inner.value.write();
            if *guard == value {
                return;
            }
            *guard = value;
        }

        self.check_enforce_actions();
        Runtime::notify_source_change(self.inner.id);
    }

    /// Update the value using a function.
    ///
    /// This is useful for updates that depend on the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = {
            let guard = self.inner.value.read();
            f(&guard)
        };
        self.set(new_value);
    }

    /// Get the number of computations currently depending on this signal.
    pub fn observer_count(&self) -> usize {
        Runtime::observer_count(self.inner.id)
    }

    /// Whether both handles refer to the same signal.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn track_read(&self) {
        if ReactiveContext::is_active() {
            ReactiveContext::track_dependency(self.inner.id);
        } else if EngineConfig::current().observable_requires_reaction {
            warn!(signal = %self.inner.id, "observable read outside a reactive context");
        }
    }

    fn check_enforce_actions(&self) {
        if Runtime::in_batch() {
            return;
        }
        let report = match EngineConfig::current().enforce_actions {
            EnforceActions::Never => false,
            EnforceActions::Observed => self.observer_count() > 0,
            EnforceActions::Always => true,
        };
        if report {
            warn!(
                signal = %self.inner.id,
                "observable changed outside an action; wrap the write in a store method or Transaction::run"
            );
        }
    }
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        Runtime::forget_source(self.id);
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &self.get_untracked())
            .field("observer_count", &self.observer_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::SubscriberId;

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(0);
        assert_eq!(signal.get(), 0);

        signal.set(42);
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|v| v + 5);
        assert_eq!(signal.get(), 15);
    }

    #[test]
    fn signal_read_is_tracked_only_in_context() {
        let signal = Signal::new(1);
        let id = SubscriberId::new();

        signal.get();
        assert!(ReactiveContext::get_dependencies().is_empty());

        let _ctx = ReactiveContext::enter(id);
        signal.get();
        signal.get_untracked();
        assert_eq!(ReactiveContext::get_dependencies(), vec![signal.id()]);
    }

    #[test]
    fn with_tracks_like_get() {
        let signal = Signal::new(vec![1, 2, 3]);

        assert_eq!(signal.with(Vec::len), 3);
        assert!(ReactiveContext::get_dependencies().is_empty());

        let _ctx = ReactiveContext::enter(SubscriberId::new());
        assert_eq!(signal.with(|v| v[0]), 1);
        assert_eq!(ReactiveContext::get_dependencies(), vec![signal.id()]);
    }

    #[test]
    fn signal_clone_shares_state() {
        let signal1 = Signal::new(0);
        let signal2 = signal1.clone();

        signal1.set(42);
        assert_eq!(signal2.get(), 42);

        signal2.set(100);
        assert_eq!(signal1.get(), 100);
        assert!(signal1.ptr_eq(&signal2));
    }

    #[test]
    fn signal_ids_are_unique() {
        let s1 = Signal::new(0);
        let s2 = Signal::new(0);
        let s3 = Signal::new(0);

        assert_ne!(s1.id(), s2.id());
        assert_ne!(s2.id(), s3.id());
        assert_ne!(s1.id(), s3.id());
    }
}
