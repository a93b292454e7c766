//! Computed Functions
//!
//! A computed function is a family of memos keyed by argument tuple. Calling
//! it with the same arguments from inside a tracked computation returns the
//! cached result until something the call read changes.
//!
//! Arguments are JSON values and are compared by value.
//!
//! An entry only lives as long as some tracked computation reads it. Calls
//! made outside any tracked computation reuse a live entry when there is one
//! and otherwise run the function directly without caching, since nothing
//! would ever invalidate or release such an entry.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde_json::Value as Json;
use tracing::{trace, warn};

use super::context::ReactiveContext;
use super::memo::Memo;
use crate::config::EngineConfig;
use crate::error::ReactiveError;

type ComputeFn<T> = dyn Fn(&[Json]) -> T + Send + Sync;

/// Options for a [`ComputedFn`].
#[derive(Debug, Clone, Default)]
pub struct ComputedFnOptions {
    /// Cache every call, even outside tracked computations, and never evict.
    pub keep_alive: bool,

    /// Name used in diagnostics.
    pub name: Option<String>,
}

/// An argument-keyed memoized function.
pub struct ComputedFn<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Arc<ComputedFnInner<T>>,
}

struct ComputedFnInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    compute: Arc<ComputeFn<T>>,
    entries: RwLock<HashMap<String, Memo<T>>>,
    options: ComputedFnOptions,
}

impl<T> ComputedFn<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a computed function with default options.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn(&[Json]) -> T + Send + Sync + 'static,
    {
        Self::with_options(compute, ComputedFnOptions::default())
    }

    /// Create a computed function with the given options.
    pub fn with_options<F>(compute: F, options: ComputedFnOptions) -> Self
    where
        F: Fn(&[Json]) -> T + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(ComputedFnInner {
                compute: Arc::new(compute),
                entries: RwLock::new(HashMap::new()),
                options,
            }),
        }
    }

    /// Call the function.
    pub fn call(&self, args: &[Json]) -> Result<T, ReactiveError> {
        let key = cache_key(args);
        let tracking = ReactiveContext::is_active();
        let keep_alive = self.inner.options.keep_alive;

        let existing = self.inner.entries.read().get(&key).cloned();
        if let Some(memo) = existing {
            if tracking || keep_alive || memo.is_observed() {
                return memo.get();
            }
        }

        if !tracking && !keep_alive {
            if EngineConfig::current().warn_unmemoized_calls {
                warn!(
                    name = self.name(),
                    "computed function called outside a reactive context; result is not memoized"
                );
            }
            return Ok((self.inner.compute)(args));
        }

        let memo = self.insert_entry(key, args);
        memo.get()
    }

    /// Number of live cache entries.
    pub fn entry_count(&self) -> usize {
        self.inner.entries.read().len()
    }

    /// Whether a live cache entry exists for these arguments.
    pub fn is_cached(&self, args: &[Json]) -> bool {
        self.inner.entries.read().contains_key(&cache_key(args))
    }

    fn name(&self) -> &str {
        self.inner.options.name.as_deref().unwrap_or("<anonymous>")
    }

    fn insert_entry(&self, key: String, args: &[Json]) -> Memo<T> {
        let compute = Arc::clone(&self.inner.compute);
        let captured = args.to_vec();
        let memo = Memo::new(move || compute(&captured));

        if !self.inner.options.keep_alive {
            let owner: Weak<ComputedFnInner<T>> = Arc::downgrade(&self.inner);
            let evicted_key = key.clone();
            let subscriber = memo.subscriber_id();
            memo.set_on_unobserved(move || {
                if let Some(owner) = owner.upgrade() {
                    let mut entries = owner.entries.write();
                    if entries.get(&evicted_key).map(Memo::subscriber_id) == Some(subscriber) {
                        trace!(key = %evicted_key, "evicting unobserved computed entry");
                        entries.remove(&evicted_key);
                    }
                }
            });
        }

        self.inner.entries.write().insert(key, memo.clone());
        memo
    }
}

impl<T> Clone for ComputedFn<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for ComputedFn<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputedFn")
            .field("name", &self.name())
            .field("entries", &self.entry_count())
            .field("keep_alive", &self.inner.options.keep_alive)
            .finish()
    }
}

/// Wrap a function as a computed function.
pub fn create_materialization<T, F>(compute: F) -> ComputedFn<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    F: Fn(&[Json]) -> T + Send + Sync + 'static,
{
    ComputedFn::new(compute)
}

fn cache_key(args: &[Json]) -> String {
    Json::Array(args.to_vec()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Runtime, Signal, SubscriberId};
    use serde_json::json;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn counting(
        signal: &Signal<i64>,
    ) -> (ComputedFn<i64>, Arc<AtomicI32>) {
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();
        let signal = signal.clone();
        let func = ComputedFn::new(move |args: &[Json]| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            signal.get() * args.first().and_then(Json::as_i64).unwrap_or(1)
        });
        (func, calls)
    }

    #[test]
    fn caches_per_argument_tuple_inside_context() {
        let signal = Signal::new(2);
        let (func, calls) = counting(&signal);
        let reader = SubscriberId::new();
        let _ctx = ReactiveContext::enter(reader);

        assert_eq!(func.call(&[json!(3)]), Ok(6));
        assert_eq!(func.call(&[json!(3)]), Ok(6));
        assert_eq!(func.call(&[json!(4)]), Ok(8));

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(func.entry_count(), 2);
        assert!(func.is_cached(&[json!(4)]));
    }

    #[test]
    fn uncached_outside_context() {
        let signal = Signal::new(2);
        let (func, calls) = counting(&signal);

        assert_eq!(func.call(&[json!(3)]), Ok(6));
        assert_eq!(func.call(&[json!(3)]), Ok(6));

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(func.entry_count(), 0);
    }

    #[test]
    fn observed_entry_serves_outside_calls() {
        let signal = Signal::new(2);
        let (func, calls) = counting(&signal);
        let reader = SubscriberId::new();

        {
            let _ctx = ReactiveContext::enter(reader);
            func.call(&[json!(5)]).unwrap();
            Runtime::bind_dependencies(reader, ReactiveContext::take_dependencies());
        }

        assert_eq!(func.call(&[json!(5)]), Ok(10));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        Runtime::clear_dependencies(reader);
        assert_eq!(func.entry_count(), 0);
    }

    #[test]
    fn keep_alive_caches_everywhere() {
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();
        let func = ComputedFn::with_options(
            move |args: &[Json]| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                args.len()
            },
            ComputedFnOptions {
                keep_alive: true,
                name: Some("len".into()),
            },
        );

        assert_eq!(func.call(&[json!(1), json!(2)]), Ok(2));
        assert_eq!(func.call(&[json!(1), json!(2)]), Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(func.entry_count(), 1);
    }

    #[test]
    fn arguments_compare_by_value() {
        let func = create_materialization(|args: &[Json]| args.len());
        let _ctx = ReactiveContext::enter(SubscriberId::new());

        func.call(&[json!({"a": [1, 2]})]).unwrap();
        func.call(&[json!({"a": [1, 2]})]).unwrap();
        assert_eq!(func.entry_count(), 1);
    }
}
