//! Engine Configuration
//!
//! Process-wide switches for the reactive engine. Configuration is installed
//! once with [`configure`], before any store is constructed. The first read of
//! the configuration freezes it: if nothing was installed by then, the
//! defaults are used for the rest of the process.
//!
//! There is no global-state isolation switch: engine state is already private
//! to this crate and per thread. Stores have no property descriptors, so
//! there is no safe-descriptor switch either.
//!
//! ```rust,ignore
//! use trove_core::config::{configure, EngineConfig, EnforceActions};
//!
//! configure(EngineConfig {
//!     enforce_actions: EnforceActions::Observed,
//!     ..EngineConfig::default()
//! })?;
//! ```

use std::sync::OnceLock;

use serde::Deserialize;
use tracing::info;

use crate::error::ConfigError;

static CONFIG: OnceLock<EngineConfig> = OnceLock::new();

/// When writes to observable state outside a transaction are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnforceActions {
    /// Writes are allowed anywhere.
    #[default]
    Never,
    /// Warn when a write outside a transaction hits a value someone observes.
    Observed,
    /// Warn on every write outside a transaction.
    Always,
}

/// Engine-wide options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Report writes made outside of actions.
    pub enforce_actions: EnforceActions,

    /// Warn when a memo is read with no reaction observing it.
    pub computed_requires_reaction: bool,

    /// Warn when observable state is read outside any tracked computation.
    pub observable_requires_reaction: bool,

    /// Warn when a reaction run reads no observable state.
    pub reaction_requires_observable: bool,

    /// Warn when a materialization is called outside a tracked computation
    /// and therefore runs uncached.
    pub warn_unmemoized_calls: bool,

    /// Re-runs of a single reaction allowed within one flush before the
    /// flush is abandoned as non-converging.
    pub max_reaction_iterations: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enforce_actions: EnforceActions::Never,
            computed_requires_reaction: false,
            observable_requires_reaction: false,
            reaction_requires_observable: false,
            warn_unmemoized_calls: false,
            max_reaction_iterations: 100,
        }
    }
}

impl EngineConfig {
    /// The active configuration.
    pub fn current() -> &'static EngineConfig {
        CONFIG.get_or_init(EngineConfig::default)
    }

    /// Parse a configuration from JSON. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

/// Install the engine configuration.
///
/// Fails if a configuration was already installed or already read.
pub fn configure(config: EngineConfig) -> Result<(), ConfigError> {
    CONFIG
        .set(config)
        .map_err(|_| ConfigError::AlreadyConfigured)?;
    info!(config = ?EngineConfig::current(), "reactive engine configured");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_permissive() {
        let config = EngineConfig::default();

        assert_eq!(config.enforce_actions, EnforceActions::Never);
        assert!(!config.computed_requires_reaction);
        assert!(!config.warn_unmemoized_calls);
        assert_eq!(config.max_reaction_iterations, 100);
    }

    #[test]
    fn parses_partial_json() {
        let config =
            EngineConfig::from_json(r#"{ "enforce_actions": "observed", "max_reaction_iterations": 5 }"#)
                .unwrap();

        assert_eq!(config.enforce_actions, EnforceActions::Observed);
        assert_eq!(config.max_reaction_iterations, 5);
        assert!(!config.reaction_requires_observable);
    }

    #[test]
    fn rejects_unknown_keys() {
        // Isolation is not configurable; engine state is always per thread.
        let err = EngineConfig::from_json(r#"{ "isolate": true }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
