//! Reactive Stores
//!
//! A store is built from a [`Definition`]: a record of plain values, methods,
//! and accessors. Construction
//!
//! 1. adds a `setX` method for every non-function field `x` that does not
//!    already have one,
//! 2. wraps every method in a [`Dispatcher`], which runs the call as a
//!    memoized derivation when made from inside a tracked computation and as
//!    a batched action otherwise,
//! 3. makes every data field observable, nested objects key by key.
//!
//! # Example
//!
//! ```rust,ignore
//! let store = create_store(
//!     Definition::new()
//!         .value("v", 2)
//!         .method("doubleV", |store, _| Ok(json!(store.get("v")?.as_i64().unwrap_or(0) * 2))),
//! );
//!
//! store.call("setV", &[json!(3)])?;
//! assert_eq!(store.call("doubleV", &[])?, json!(6));
//! ```

mod definition;
mod dispatch;
pub(crate) mod observable;
mod setters;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use serde_json::{Map, Value as Json};
use tracing::debug;

use crate::error::StoreError;
use crate::reactive::{untracked, Signal};
use observable::{register_record, Member, Observed, Slot};

pub use definition::{
    Accessor, Annotation, Definition, Field, FieldRole, Method, StoreDescriptor,
};
pub use dispatch::{strategy, Dispatcher, Strategy};
pub use setters::{add_setters, setter_name, SynthesizedSetter};

/// Construct a store from `definition`.
pub fn create_store(mut definition: Definition) -> Store {
    let synthesized: HashMap<String, String> = add_setters(&mut definition)
        .into_iter()
        .map(|setter| (setter.name, setter.field))
        .collect();

    let inner = Arc::new_cyclic(|weak: &Weak<StoreInner>| {
        let owner = WeakStore(weak.clone());
        let mut descriptor = StoreDescriptor::default();

        let members: IndexMap<String, Member> = definition
            .into_fields()
            .into_iter()
            .map(|(name, field)| {
                let (role, member) = match field {
                    Field::Value(value) => (FieldRole::Data, Member::Value(value)),
                    Field::Accessor(accessor) => (
                        FieldRole::Accessor {
                            writable: accessor.is_writable(),
                        },
                        Member::Accessor(accessor),
                    ),
                    Field::Method(method) => {
                        let role = match synthesized.get(&name) {
                            Some(field) => FieldRole::SynthesizedSetter {
                                field: field.clone(),
                            },
                            None => FieldRole::Method,
                        };
                        let dispatcher = Dispatcher::new(name.clone(), method, owner.clone());
                        (role, Member::Method(dispatcher))
                    }
                };
                descriptor.insert(name.clone(), role);
                (name, member)
            })
            .collect();

        StoreInner {
            slots: register_record(members),
            descriptor,
        }
    });

    debug!(
        fields = inner.slots.len(),
        synthesized_setters = synthesized.len(),
        "store constructed"
    );
    Store { inner }
}

/// A reactive store instance.
///
/// Cloning is cheap and yields another handle to the same store.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    slots: IndexMap<String, Slot>,
    descriptor: StoreDescriptor,
}

/// A non-owning handle to a [`Store`].
#[derive(Clone)]
pub struct WeakStore(Weak<StoreInner>);

impl WeakStore {
    pub fn upgrade(&self) -> Option<Store> {
        self.0.upgrade().map(|inner| Store { inner })
    }
}

impl fmt::Debug for WeakStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakStore(..)")
    }
}

impl Store {
    /// Read a field. Data fields are tracked; accessor fields run their read
    /// accessor.
    pub fn get(&self, field: &str) -> Result<Json, StoreError> {
        match self.slot(field)? {
            Slot::Data(signal) => Ok(signal.get().snapshot()),
            Slot::Accessor(accessor) => accessor.read(self),
            Slot::Method(_) => Err(StoreError::NotData(field.to_string())),
        }
    }

    /// Read a nested field, e.g. `["a", "b"]` for `a.b`. Every step is tracked.
    pub fn get_path(&self, path: &[&str]) -> Result<Json, StoreError> {
        let Some((first, rest)) = path.split_first() else {
            return Err(invalid_path(path));
        };
        if rest.is_empty() {
            return self.get(first);
        }

        let mut current = self.data_signal(first, path)?.get();
        for key in rest {
            let next = match &current {
                Observed::Object(object) => object.field(key).ok_or_else(|| invalid_path(path))?.get(),
                Observed::Plain(_) => return Err(invalid_path(path)),
            };
            current = next;
        }
        Ok(current.snapshot())
    }

    /// Write a field.
    ///
    /// Outside an action each write notifies dependents immediately; call a
    /// store method (or use [`Transaction::run`](crate::reactive::Transaction::run))
    /// to batch several writes.
    pub fn set(&self, field: &str, value: Json) -> Result<(), StoreError> {
        match self.slot(field)? {
            Slot::Data(signal) => {
                signal.set(Observed::from_json(value));
                Ok(())
            }
            Slot::Accessor(accessor) => accessor.write(self, field, value),
            Slot::Method(_) => Err(StoreError::NotData(field.to_string())),
        }
    }

    /// Write a nested field. Only keys that already exist can be written;
    /// to add keys, assign the parent object.
    pub fn set_path(&self, path: &[&str], value: Json) -> Result<(), StoreError> {
        let Some((last, parents)) = path.split_last() else {
            return Err(invalid_path(path));
        };
        let Some((first, middle)) = parents.split_first() else {
            return self.set(last, value);
        };

        let mut current = self.data_signal(first, path)?.get_untracked();
        for key in middle {
            let next = match &current {
                Observed::Object(object) => object
                    .field(key)
                    .ok_or_else(|| invalid_path(path))?
                    .get_untracked(),
                Observed::Plain(_) => return Err(invalid_path(path)),
            };
            current = next;
        }

        match &current {
            Observed::Object(object) => {
                let leaf = object.field(last).ok_or_else(|| invalid_path(path))?;
                leaf.set(Observed::from_json(value));
                Ok(())
            }
            Observed::Plain(_) => Err(invalid_path(path)),
        }
    }

    /// Replace a nested field with `f` applied to its current value. The read
    /// is untracked.
    pub fn update_path<F>(&self, path: &[&str], f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&Json) -> Json,
    {
        let current = untracked(|| self.get_path(path))?;
        self.set_path(path, f(&current))
    }

    /// Call a method.
    pub fn call(&self, method: &str, args: &[Json]) -> Result<Json, StoreError> {
        self.dispatcher(method)?.invoke(args)
    }

    /// The dispatcher currently installed for `method`. The read is tracked,
    /// so a computation that calls a method re-runs when it is replaced.
    pub fn dispatcher(&self, method: &str) -> Result<Dispatcher, StoreError> {
        match self.slot(method)? {
            Slot::Method(signal) => Ok(signal.get()),
            Slot::Data(_) | Slot::Accessor(_) => Err(StoreError::NotAMethod(method.to_string())),
        }
    }

    /// Install a new implementation for an existing method.
    pub fn replace_method(&self, name: &str, method: Method) -> Result<(), StoreError> {
        match self.slot(name)? {
            Slot::Method(signal) => {
                debug!(method = name, "replacing method");
                signal.set(Dispatcher::new(name, method, self.downgrade()));
                Ok(())
            }
            Slot::Data(_) | Slot::Accessor(_) => Err(StoreError::NotAMethod(name.to_string())),
        }
    }

    /// The role of every field.
    pub fn descriptor(&self) -> &StoreDescriptor {
        &self.inner.descriptor
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.inner.slots.contains_key(field)
    }

    /// Field names, in definition order with synthesized setters last.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.inner.slots.keys().map(String::as_str)
    }

    /// Plain copy of all data fields. Tracked.
    pub fn snapshot(&self) -> Json {
        let fields: Map<String, Json> = self
            .inner
            .slots
            .iter()
            .filter_map(|(name, slot)| match slot {
                Slot::Data(signal) => Some((name.clone(), signal.get().snapshot())),
                Slot::Method(_) | Slot::Accessor(_) => None,
            })
            .collect();
        Json::Object(fields)
    }

    pub fn downgrade(&self) -> WeakStore {
        WeakStore(Arc::downgrade(&self.inner))
    }

    /// Whether both handles refer to the same store.
    pub fn ptr_eq(&self, other: &Store) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn slot(&self, field: &str) -> Result<&Slot, StoreError> {
        self.inner
            .slots
            .get(field)
            .ok_or_else(|| StoreError::UnknownField(field.to_string()))
    }

    fn data_signal(&self, field: &str, path: &[&str]) -> Result<&Signal<Observed>, StoreError> {
        match self.slot(field)? {
            Slot::Data(signal) => Ok(signal),
            Slot::Method(_) => Err(StoreError::NotData(field.to_string())),
            Slot::Accessor(_) => Err(invalid_path(path)),
        }
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("descriptor", &self.inner.descriptor)
            .field("data", &untracked(|| self.snapshot()))
            .finish()
    }
}

fn invalid_path(path: &[&str]) -> StoreError {
    StoreError::InvalidPath(path.join("."))
}
