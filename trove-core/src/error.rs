//! Error types.

use thiserror::Error;

use crate::reactive::SubscriberId;

/// Errors raised by the reactive engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReactiveError {
    /// A memo was read while it was computing its own value.
    #[error("cycle detected: {subscriber} read itself while computing")]
    CycleDetected {
        /// The memo that re-entered itself.
        subscriber: SubscriberId,
    },
}

/// Errors raised by stores.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    /// The store has no field with this name.
    #[error("no field named \"{0}\"")]
    UnknownField(String),

    /// The field exists but cannot be called.
    #[error("field \"{0}\" is not a method")]
    NotAMethod(String),

    /// The field is a method and cannot be read or written as data.
    #[error("field \"{0}\" is a method, not a data field")]
    NotData(String),

    /// The field only has a read accessor.
    #[error(
        "property \"{0}\" has a \"get\" accessor but no \"set\" accessor, so it cannot be written, \
         not even by its generated setter"
    )]
    GetterWithoutSetter(String),

    /// A nested path does not lead to an existing field of a nested object.
    #[error("path \"{0}\" does not name a nested field")]
    InvalidPath(String),

    /// A method outlived the store it belongs to.
    #[error("the store owning \"{0}\" has been dropped")]
    StoreDropped(String),

    /// Failure raised by a store method.
    #[error("{0}")]
    Method(String),

    #[error(transparent)]
    Reactive(#[from] ReactiveError),
}

impl StoreError {
    /// Failure raised from inside a store method.
    pub fn method(message: impl Into<String>) -> Self {
        StoreError::Method(message.into())
    }
}

/// Errors raised while installing the engine configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// [`configure`](crate::config::configure) ran after the configuration was
    /// installed or first read.
    #[error("engine already configured; configure once before constructing any store")]
    AlreadyConfigured,

    #[error("invalid engine configuration: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn getter_without_setter_names_the_field() {
        let message = StoreError::GetterWithoutSetter("total".into()).to_string();
        assert!(message.contains("\"total\""));
    }

    #[test]
    fn reactive_errors_convert() {
        let err: StoreError = ReactiveError::CycleDetected {
            subscriber: SubscriberId::new(),
        }
        .into();
        assert!(matches!(err, StoreError::Reactive(ReactiveError::CycleDetected { .. })));
    }
}
