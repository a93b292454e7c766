//! Store definitions and field roles.
//!
//! A [`Definition`] is the record a store is built from: named plain values,
//! methods, and accessors. Construction turns it into a [`StoreDescriptor`]
//! that records, for every field of the resulting store, the role it plays.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value as Json};

use super::Store;
use crate::error::StoreError;

type MethodFn = dyn Fn(&Store, &[Json]) -> Result<Json, StoreError> + Send + Sync;
type ReadFn = dyn Fn(&Store) -> Result<Json, StoreError> + Send + Sync;
type WriteFn = dyn Fn(&Store, Json) -> Result<(), StoreError> + Send + Sync;

/// A store method.
///
/// Methods receive the store they belong to and their arguments. Whether a
/// call runs as a derivation or as an action is decided per call.
#[derive(Clone)]
pub struct Method(Arc<MethodFn>);

impl Method {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Store, &[Json]) -> Result<Json, StoreError> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub(crate) fn invoke(&self, store: &Store, args: &[Json]) -> Result<Json, StoreError> {
        (self.0)(store, args)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Method(..)")
    }
}

/// A computed property: a read accessor and an optional write accessor.
///
/// Accessors are not observable themselves. Reading one runs its read
/// accessor, which is tracked through whatever store state it reads.
#[derive(Clone)]
pub struct Accessor {
    get: Arc<ReadFn>,
    set: Option<Arc<WriteFn>>,
}

impl Accessor {
    /// An accessor with only a read side.
    pub fn getter<F>(get: F) -> Self
    where
        F: Fn(&Store) -> Result<Json, StoreError> + Send + Sync + 'static,
    {
        Self {
            get: Arc::new(get),
            set: None,
        }
    }

    /// Add a write side.
    pub fn with_setter<F>(mut self, set: F) -> Self
    where
        F: Fn(&Store, Json) -> Result<(), StoreError> + Send + Sync + 'static,
    {
        self.set = Some(Arc::new(set));
        self
    }

    /// Whether the accessor has a write side.
    pub fn is_writable(&self) -> bool {
        self.set.is_some()
    }

    pub(crate) fn read(&self, store: &Store) -> Result<Json, StoreError> {
        (self.get)(store)
    }

    pub(crate) fn write(&self, store: &Store, field: &str, value: Json) -> Result<(), StoreError> {
        match &self.set {
            Some(set) => set(store, value),
            None => Err(StoreError::GetterWithoutSetter(field.to_string())),
        }
    }
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessor")
            .field("writable", &self.is_writable())
            .finish()
    }
}

/// One entry of a [`Definition`].
#[derive(Debug, Clone)]
pub enum Field {
    /// Plain data: null, bool, number, string, array, or nested object.
    Value(Json),
    /// A function.
    Method(Method),
    /// A read accessor, possibly paired with a write accessor.
    Accessor(Accessor),
}

impl Field {
    /// Whether the field currently holds a function.
    pub fn is_function(&self) -> bool {
        matches!(self, Field::Method(_))
    }
}

/// The record a store is constructed from.
///
/// ```rust,ignore
/// let definition = Definition::new()
///     .value("v", json!(2))
///     .method("doubleV", |store, _| Ok(json!(store.get("v")?.as_f64().unwrap_or(0.0) * 2.0)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Definition {
    fields: IndexMap<String, Field>,
}

impl Definition {
    pub fn new() -> Self {
        Self::default()
    }

    /// A definition holding only data fields, taken from a JSON object.
    pub fn from_values(values: Map<String, Json>) -> Self {
        values
            .into_iter()
            .map(|(name, value)| (name, Field::Value(value)))
            .collect()
    }

    /// Add a data field.
    pub fn value(mut self, name: impl Into<String>, value: impl Into<Json>) -> Self {
        self.insert(name, Field::Value(value.into()));
        self
    }

    /// Add a method.
    pub fn method<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Store, &[Json]) -> Result<Json, StoreError> + Send + Sync + 'static,
    {
        self.insert(name, Field::Method(Method::new(f)));
        self
    }

    /// Add a field that only has a read accessor.
    pub fn getter<F>(mut self, name: impl Into<String>, get: F) -> Self
    where
        F: Fn(&Store) -> Result<Json, StoreError> + Send + Sync + 'static,
    {
        self.insert(name, Field::Accessor(Accessor::getter(get)));
        self
    }

    /// Add an accessor field.
    pub fn accessor(mut self, name: impl Into<String>, accessor: Accessor) -> Self {
        self.insert(name, Field::Accessor(accessor));
        self
    }

    /// Insert or replace a field, returning the previous one.
    pub fn insert(&mut self, name: impl Into<String>, field: Field) -> Option<Field> {
        self.fields.insert(name.into(), field)
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Field names, in definition order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Construct a store from this definition.
    pub fn build(self) -> Store {
        super::create_store(self)
    }

    pub(crate) fn into_fields(self) -> IndexMap<String, Field> {
        self.fields
    }
}

impl FromIterator<(String, Field)> for Definition {
    fn from_iter<I: IntoIterator<Item = (String, Field)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// How the engine instruments a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Annotation {
    /// Reads are tracked and writes notify.
    Observable,
    /// Left as is.
    Plain,
}

/// The role a field plays in a constructed store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRole {
    /// Observable plain data.
    Data,
    /// Computed property backed by accessors.
    Accessor { writable: bool },
    /// A method from the definition, dispatched as derivation or action.
    Method,
    /// A setter added during construction for the named data field.
    SynthesizedSetter { field: String },
}

impl FieldRole {
    pub fn annotation(&self) -> Annotation {
        match self {
            FieldRole::Accessor { .. } => Annotation::Plain,
            FieldRole::Data | FieldRole::Method | FieldRole::SynthesizedSetter { .. } => {
                Annotation::Observable
            }
        }
    }

    /// Whether calls to the field go through the dispatcher.
    pub fn is_callable(&self) -> bool {
        matches!(self, FieldRole::Method | FieldRole::SynthesizedSetter { .. })
    }
}

/// Field name -> role for every field of a store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreDescriptor {
    roles: IndexMap<String, FieldRole>,
}

impl StoreDescriptor {
    pub(crate) fn insert(&mut self, name: String, role: FieldRole) {
        self.roles.insert(name, role);
    }

    pub fn role(&self, name: &str) -> Option<&FieldRole> {
        self.roles.get(name)
    }

    pub fn annotation(&self, name: &str) -> Option<Annotation> {
        self.roles.get(name).map(FieldRole::annotation)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldRole)> {
        self.roles.iter().map(|(name, role)| (name.as_str(), role))
    }

    /// Names of the setters synthesized during construction.
    pub fn synthesized_setters(&self) -> impl Iterator<Item = &str> {
        self.iter()
            .filter(|(_, role)| matches!(role, FieldRole::SynthesizedSetter { .. }))
            .map(|(name, _)| name)
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}
