//! Plugins
//!
//! A [`Plugin`] is a user object with a lifecycle. Each enabled plugin gets
//! its own [`PluginHost`], the only handle it has on the bus, its data folder
//! and the factory registry. The [`PluginManager`] owns the known plugins and
//! drives their hosts.

mod host;
mod manager;
#[cfg(test)]
pub(crate) mod testing;

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use hub_bus::BusError;
use hub_types::{AsUserObject, ConfigError, ConfigurationFailures, UserObject, UserObjectType, Uuid};

use crate::registry::RegistryError;
use crate::storage::StorageError;

pub use host::{PluginHost, PluginState};
pub use manager::PluginManager;

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Errors raised while enabling or talking to a plugin
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("Object {0} is not a plugin")]
    NotAPlugin(Uuid),

    #[error("Plugin {uuid} cannot be enabled from state {state}")]
    InvalidState { uuid: Uuid, state: PluginState },

    #[error("No configuration description for plugin {0}")]
    MissingConfiguration(Uuid),

    #[error("Configuration rejected ({} failures)", .0.len())]
    ConfigurationRejected(ConfigurationFailures),

    #[error("Plugin reported failure during initialisation")]
    InitialiseFailed,

    #[error("Plugin panicked during {stage}: {message}")]
    Panicked { stage: &'static str, message: String },

    #[error("Expected a {expected}, got {actual}")]
    WrongFactoryType {
        expected: UserObjectType,
        actual: UserObjectType,
    },

    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Bus(#[from] BusError),
}

pub type PluginResult<T> = Result<T, PluginError>;

/// Best-effort text from a panic payload
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Plugin Trait
// ─────────────────────────────────────────────────────────────────────────────

/// An extension module loaded into the server.
///
/// The UUID must be stable across versions; `object_type()` must return
/// [`UserObjectType::Plugin`].
#[async_trait]
pub trait Plugin: UserObject + AsUserObject {
    /// Display-only version string
    fn version(&self) -> &str;

    /// Called once the plugin is registered and configured. Returning
    /// `Ok(false)` or an error rolls the plugin back out of the registry.
    async fn initialise(&self, host: Arc<PluginHost>) -> PluginResult<bool>;

    /// Called when the server stops
    async fn shutdown(&self) -> PluginResult<()> {
        Ok(())
    }
}
