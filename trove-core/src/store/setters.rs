//! Setter synthesis.
//!
//! Every non-function field `foo` of a definition gets a method `setFoo`
//! unless the definition already has a field of that name. A field that only
//! has a read accessor still gets one; calling it fails and names the field.

use serde_json::Value as Json;
use tracing::{debug, trace};

use super::definition::{Definition, Field, Method};
use crate::error::StoreError;

/// Name of the setter for `field`: `"set"` followed by the field name with its
/// first character uppercased.
pub fn setter_name(field: &str) -> String {
    let mut chars = field.chars();
    match chars.next() {
        Some(first) => format!("set{}{}", first.to_uppercase(), chars.as_str()),
        None => "set".to_string(),
    }
}

/// A setter added by [`add_setters`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedSetter {
    /// The setter's field name.
    pub name: String,
    /// The data field it writes.
    pub field: String,
}

/// Add one setter per eligible field, in place.
///
/// Fields are examined as they were on entry: setters added here are never
/// considered for setters of their own.
pub fn add_setters(definition: &mut Definition) -> Vec<SynthesizedSetter> {
    let names: Vec<String> = definition.names().map(str::to_string).collect();
    let mut added = Vec::new();

    for field in names {
        let setter = match definition.get(&field) {
            None | Some(Field::Method(_)) => continue,
            Some(Field::Accessor(accessor)) if !accessor.is_writable() => {
                read_only_setter(field.clone())
            }
            Some(_) => assigning_setter(field.clone()),
        };

        let name = setter_name(&field);
        if definition.contains(&name) {
            trace!(%field, setter = %name, "setter already defined, leaving it alone");
            continue;
        }

        debug!(%field, setter = %name, "synthesized setter");
        definition.insert(name.clone(), Field::Method(setter));
        added.push(SynthesizedSetter { name, field });
    }

    added
}

fn assigning_setter(field: String) -> Method {
    Method::new(move |store, args| {
        let value = args.first().cloned().unwrap_or(Json::Null);
        store.set(&field, value)?;
        Ok(Json::Null)
    })
}

fn read_only_setter(field: String) -> Method {
    Method::new(move |_, _| Err(StoreError::GetterWithoutSetter(field.clone())))
}
