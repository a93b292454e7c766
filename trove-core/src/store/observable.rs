//! Observable instrumentation of store fields.
//!
//! Data fields become signals. A nested object becomes one signal per key,
//! recursively, so a computation reading `a.b` is not disturbed by writes to
//! `a.c`. Arrays and scalars are stored whole.
//!
//! Method fields sit in a signal too, holding their dispatcher. Calls read
//! that signal, so replacing a method re-runs whatever called it.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value as Json;

use super::definition::Accessor;
use super::dispatch::Dispatcher;
use crate::reactive::Signal;

/// The observable form of a plain value.
#[derive(Debug, Clone)]
pub(crate) enum Observed {
    Plain(Json),
    Object(Arc<ObservableObject>),
}

/// A nested object with one signal per key.
#[derive(Debug)]
pub(crate) struct ObservableObject {
    fields: IndexMap<String, Signal<Observed>>,
}

impl ObservableObject {
    pub(crate) fn field(&self, key: &str) -> Option<&Signal<Observed>> {
        self.fields.get(key)
    }
}

impl Observed {
    pub(crate) fn from_json(value: Json) -> Self {
        match value {
            Json::Object(map) => Observed::Object(Arc::new(ObservableObject {
                fields: map
                    .into_iter()
                    .map(|(key, value)| (key, Signal::new(Observed::from_json(value))))
                    .collect(),
            })),
            other => Observed::Plain(other),
        }
    }

    /// Plain copy of the value. Reads every nested signal, tracked.
    pub(crate) fn snapshot(&self) -> Json {
        match self {
            Observed::Plain(value) => value.clone(),
            Observed::Object(object) => Json::Object(
                object
                    .fields
                    .iter()
                    .map(|(key, signal)| (key.clone(), signal.get().snapshot()))
                    .collect(),
            ),
        }
    }
}

impl PartialEq for Observed {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Observed::Plain(a), Observed::Plain(b)) => a == b,
            (Observed::Object(a), Observed::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// A field of a constructed store.
pub(crate) enum Slot {
    Data(Signal<Observed>),
    Method(Signal<Dispatcher>),
    Accessor(Accessor),
}

/// A field ready to be registered.
pub(crate) enum Member {
    Value(Json),
    Method(Dispatcher),
    Accessor(Accessor),
}

/// Instrument every member, yielding the store's slots.
pub(crate) fn register_record(members: IndexMap<String, Member>) -> IndexMap<String, Slot> {
    members
        .into_iter()
        .map(|(name, member)| {
            let slot = match member {
                Member::Value(value) => Slot::Data(Signal::new(Observed::from_json(value))),
                Member::Method(dispatcher) => Slot::Method(Signal::new(dispatcher)),
                Member::Accessor(accessor) => Slot::Accessor(accessor),
            };
            (name, slot)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{ReactiveContext, SubscriberId};
    use serde_json::json;

    #[test]
    fn nested_objects_get_a_signal_per_key() {
        let observed = Observed::from_json(json!({ "a": { "b": 1, "c": [1, 2] }, "d": "x" }));

        let Observed::Object(root) = &observed else {
            panic!("expected an object");
        };
        let a = root.field("a").map(Signal::get_untracked);
        assert!(matches!(a, Some(Observed::Object(_))));
        assert!(matches!(
            root.field("d").map(Signal::get_untracked),
            Some(Observed::Plain(Json::String(_)))
        ));
        assert_eq!(observed.snapshot(), json!({ "a": { "b": 1, "c": [1, 2] }, "d": "x" }));
    }

    #[test]
    fn snapshot_tracks_every_leaf() {
        let observed = Observed::from_json(json!({ "a": { "b": 1 }, "c": 2 }));
        let _ctx = ReactiveContext::enter(SubscriberId::new());

        observed.snapshot();

        // a, a.b, c
        assert_eq!(ReactiveContext::get_dependencies().len(), 3);
    }

    #[test]
    fn equality_is_by_value_for_plain_and_identity_for_objects() {
        assert_eq!(Observed::from_json(json!([1, 2])), Observed::from_json(json!([1, 2])));
        assert_ne!(Observed::from_json(json!({})), Observed::from_json(json!({})));

        let object = Observed::from_json(json!({ "k": 1 }));
        assert_eq!(object.clone(), object);
    }
}
