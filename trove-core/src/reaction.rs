//! Reactions with cleanup.
//!
//! [`create_reaction`] registers a tracked computation that runs once right
//! away and again whenever anything it read changes. The computation may hand
//! back a [`Cleanup`]; it runs before the next run and when the reaction is
//! disposed.
//!
//! ```rust,ignore
//! let disposer = create_reaction(move || {
//!     let v = store.get("v")?;
//!     println!("v = {v}");
//!     Ok::<_, StoreError>(Cleanup::new(|| println!("v is about to change")))
//! });
//!
//! disposer.dispose();
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error};

use crate::error::StoreError;
use crate::reactive::{untracked, Effect};

/// A callback run before a reaction's next run, or when it is disposed.
pub struct Cleanup(Box<dyn FnOnce() + Send>);

impl Cleanup {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self(Box::new(f))
    }

    fn run(self) {
        untracked(self.0);
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup(..)")
    }
}

/// What a reaction's tracker may return.
pub trait TrackerOutput {
    fn into_cleanup(self) -> Result<Option<Cleanup>, StoreError>;
}

impl TrackerOutput for () {
    fn into_cleanup(self) -> Result<Option<Cleanup>, StoreError> {
        Ok(None)
    }
}

impl TrackerOutput for Cleanup {
    fn into_cleanup(self) -> Result<Option<Cleanup>, StoreError> {
        Ok(Some(self))
    }
}

impl TrackerOutput for Option<Cleanup> {
    fn into_cleanup(self) -> Result<Option<Cleanup>, StoreError> {
        Ok(self)
    }
}

impl<T: TrackerOutput> TrackerOutput for Result<T, StoreError> {
    fn into_cleanup(self) -> Result<Option<Cleanup>, StoreError> {
        self.and_then(TrackerOutput::into_cleanup)
    }
}

#[derive(Default)]
struct ReactionState {
    pending: Mutex<Option<Cleanup>>,
    disposed: AtomicBool,
}

impl ReactionState {
    fn run_pending(&self) {
        // Taken out first: the cleanup may dispose the reaction.
        let pending = self.pending.lock().take();
        if let Some(cleanup) = pending {
            cleanup.run();
        }
    }
}

/// Register a reaction and run it once.
///
/// The reaction lives until [`Disposer::dispose`] is called, whether or not
/// the disposer is kept. A tracker error is logged; the reaction stays
/// subscribed to what it read before failing.
pub fn create_reaction<F, O>(mut tracker: F) -> Disposer
where
    F: FnMut() -> O + Send + 'static,
    O: TrackerOutput,
{
    let state = Arc::new(ReactionState::default());
    let run_state = Arc::clone(&state);

    let effect = Effect::new_lazy(move || {
        run_state.run_pending();

        match tracker().into_cleanup() {
            Ok(Some(cleanup)) if run_state.disposed.load(Ordering::SeqCst) => cleanup.run(),
            Ok(next) => *run_state.pending.lock() = next,
            Err(error) => error!(%error, "reaction failed"),
        }
    });
    effect.retain();
    debug!(reaction = %effect.subscriber_id(), "reaction registered");
    effect.execute();

    Disposer { effect, state }
}

/// Handle that stops a reaction.
#[derive(Clone)]
pub struct Disposer {
    effect: Effect,
    state: Arc<ReactionState>,
}

impl Disposer {
    /// Stop the reaction and run its pending cleanup. Idempotent.
    pub fn dispose(&self) {
        if self.state.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.effect.dispose();
        self.state.run_pending();
        debug!(reaction = %self.effect.subscriber_id(), "reaction disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.state.disposed.load(Ordering::SeqCst)
    }

    /// Number of times the reaction has run.
    pub fn run_count(&self) -> usize {
        self.effect.run_count()
    }
}

impl fmt::Debug for Disposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposer")
            .field("reaction", &self.effect.subscriber_id())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
