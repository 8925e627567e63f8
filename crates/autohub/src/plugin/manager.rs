//! Plugin Manager
//!
//! Owns every plugin the server knows about and the hosts of those that
//! were enabled successfully.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use hub_bus::MessageBus;
use hub_types::Uuid;
use tracing::{debug, info, warn};

use super::{Plugin, PluginHost};
use crate::registry::ObjectTable;
use crate::storage::{DATA_FOLDER, Folder, StorageResult};

// ─────────────────────────────────────────────────────────────────────────────
// Plugin Manager
// ─────────────────────────────────────────────────────────────────────────────

/// Central registry of plugins
///
/// The PluginManager is responsible for:
/// - Holding the available plugins, one per UUID
/// - Enabling them, each in its own [`PluginHost`]
/// - Shutting the enabled ones down when the server stops
pub struct PluginManager {
    bus: Arc<MessageBus>,
    registry: Arc<ObjectTable>,
    /// `<storage>/data`, parent of every plugin datastore
    data: Folder,
    available: DashMap<Uuid, Arc<dyn Plugin>>,
    enabled: DashMap<Uuid, Arc<PluginHost>>,
}

impl PluginManager {
    pub fn new(
        bus: Arc<MessageBus>,
        registry: Arc<ObjectTable>,
        storage: &Folder,
    ) -> StorageResult<Self> {
        Ok(Self {
            bus,
            registry,
            data: storage.open_folder(DATA_FOLDER, true)?,
            available: DashMap::new(),
            enabled: DashMap::new(),
        })
    }

    /// Make a plugin available. A second plugin with the same UUID is
    /// ignored and `false` returned.
    pub fn add_plugin(&self, plugin: Arc<dyn Plugin>) -> bool {
        let uuid = plugin.uuid();
        match self.available.entry(uuid) {
            Entry::Occupied(existing) => {
                warn!(
                    plugin = %uuid,
                    class = plugin.class_name(),
                    existing = existing.get().class_name(),
                    "Ignoring plugin with duplicate UUID"
                );
                false
            }
            Entry::Vacant(slot) => {
                debug!(plugin = %uuid, class = plugin.class_name(), version = plugin.version(), "Plugin available");
                slot.insert(plugin);
                true
            }
        }
    }

    /// Enable every available plugin that isn't enabled yet.
    ///
    /// A plugin that fails to enable is logged and skipped. Returns the
    /// number of plugins enabled by this call.
    pub async fn initialise_plugins(&self) -> usize {
        let mut pending: Vec<Arc<dyn Plugin>> = self
            .available
            .iter()
            .filter(|entry| !self.enabled.contains_key(entry.key()))
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        pending.sort_by(|a, b| a.class_name().cmp(b.class_name()));

        let mut count = 0;
        for plugin in pending {
            let uuid = plugin.uuid();
            let host = PluginHost::new(
                plugin,
                Arc::clone(&self.bus),
                Arc::clone(&self.registry),
                self.data.clone(),
            );
            if host.enable_plugin().await.is_ok() {
                self.enabled.insert(uuid, host);
                count += 1;
            }
        }

        info!(
            enabled = count,
            available = self.available.len(),
            "Plugins initialised"
        );
        count
    }

    /// Shut down every enabled plugin
    pub async fn shutdown_plugins(&self) {
        let hosts: Vec<Arc<PluginHost>> = self
            .enabled
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        self.enabled.clear();

        info!(count = hosts.len(), "Shutting down plugins");
        for host in hosts {
            host.shutdown_plugin().await;
        }
    }

    pub fn is_enabled(&self, uuid: Uuid) -> bool {
        self.enabled.contains_key(&uuid)
    }

    pub fn host(&self, uuid: Uuid) -> Option<Arc<PluginHost>> {
        self.enabled.get(&uuid).map(|entry| Arc::clone(entry.value()))
    }

    pub fn available_count(&self) -> usize {
        self.available.len()
    }

    pub fn enabled_count(&self) -> usize {
        self.enabled.len()
    }
}
