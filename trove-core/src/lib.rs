//! Trove Core
//!
//! Reactive stores built from plain definition records. It implements:
//!
//! - Reactive primitives (signals, memos, computed functions, effects,
//!   transactions)
//! - Store construction: setter synthesis, observable fields, and methods
//!   dispatched either as memoized derivations or as batched actions
//! - Reactions with cleanup callbacks
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives and dependency tracking
//! - `store`: Definitions, setter synthesis, dispatch, and the store handle
//! - `reaction`: Tracked side effects with cleanup
//! - `config`: Engine-wide options, installed once
//!
//! # Example
//!
//! ```rust,ignore
//! use trove_core::{create_reaction, create_store, json, Definition};
//!
//! let store = create_store(
//!     Definition::new()
//!         .value("v", 2)
//!         .method("doubleV", |store, _| {
//!             Ok(json!(store.get("v")?.as_i64().unwrap_or(0) * 2))
//!         }),
//! );
//!
//! let reader = store.clone();
//! let disposer = create_reaction(move || {
//!     println!("doubleV = {}", reader.call("doubleV", &[])?);
//!     Ok::<_, trove_core::StoreError>(())
//! });
//!
//! // Synthesized setter, runs as an action.
//! store.call("setV", &[json!(3)])?;
//! // Reaction prints: "doubleV = 6"
//!
//! disposer.dispose();
//! ```

pub mod config;
pub mod error;
pub mod reaction;
pub mod reactive;
pub mod store;

pub use config::{configure, EngineConfig};
pub use error::{ConfigError, ReactiveError, StoreError};
pub use reaction::{create_reaction, Cleanup, Disposer};
pub use serde_json::{json, Value as Json};
pub use store::{create_store, Definition, Method, Store};
