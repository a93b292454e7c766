//! Action/derivation dispatch.
//!
//! Every method of a store is wrapped in a [`Dispatcher`]. All calls go
//! through the method's materialization (an argument-keyed memo family); the
//! execution mode at the call site only decides whether a transaction is
//! opened around it.

use std::fmt;
use std::sync::Arc;

use serde_json::Value as Json;
use tracing::trace;

use super::definition::Method;
use super::WeakStore;
use crate::error::StoreError;
use crate::reactive::{ComputedFn, ComputedFnOptions, ExecutionMode, Transaction};

/// How a call is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Call the materialization directly, inside the calling derivation.
    Materialize,
    /// Call the materialization inside a transaction.
    MaterializeInTransaction,
}

/// The strategy for a call made in `mode`.
pub fn strategy(mode: ExecutionMode) -> Strategy {
    match mode {
        ExecutionMode::Derivation => Strategy::Materialize,
        ExecutionMode::Action => Strategy::MaterializeInTransaction,
    }
}

/// A dispatching wrapper around one store method.
///
/// Cloning shares the wrapper; two dispatchers are equal only when they are
/// the same wrapper.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    name: String,
    materialization: ComputedFn<Result<Json, StoreError>>,
}

impl Dispatcher {
    pub(crate) fn new(name: impl Into<String>, method: Method, store: WeakStore) -> Self {
        let name = name.into();
        let owner = name.clone();
        let materialization = ComputedFn::with_options(
            move |args: &[Json]| {
                let store = store
                    .upgrade()
                    .ok_or_else(|| StoreError::StoreDropped(owner.clone()))?;
                method.invoke(&store, args)
            },
            ComputedFnOptions {
                keep_alive: false,
                name: Some(name.clone()),
            },
        );

        Self {
            inner: Arc::new(DispatcherInner {
                name,
                materialization,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Call the method with `args`, choosing the strategy from the current
    /// execution mode.
    pub fn invoke(&self, args: &[Json]) -> Result<Json, StoreError> {
        let strategy = strategy(ExecutionMode::current());
        trace!(method = %self.inner.name, ?strategy, "dispatching");

        match strategy {
            Strategy::Materialize => self.inner.materialization.call(args)?,
            Strategy::MaterializeInTransaction => {
                Transaction::run(|| self.inner.materialization.call(args))?
            }
        }
    }

    /// Number of argument tuples currently memoized.
    pub fn cached_entries(&self) -> usize {
        self.inner.materialization.entry_count()
    }
}

impl PartialEq for Dispatcher {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("name", &self.inner.name)
            .field("materialization", &self.inner.materialization)
            .finish()
    }
}
