//! Autohub - in-process automation hub
//!
//! This crate wires the shared crates into a running server:
//! - Object table with persisted configuration via [`registry`] and [`storage`]
//! - Class metadata documents via [`metadata`]
//! - Plugin hosting via [`plugin`]
//! - The server object and RPC method table via [`server`]
//!
//! [`Hub`] owns one of each and is what the binary starts.

// Re-export core crates
pub use hub_bus;
pub use hub_types;

pub mod builtin;
pub mod config;
pub mod error;
pub mod metadata;
pub mod plugin;
pub mod registry;
pub mod server;
pub mod storage;

use std::sync::Arc;

use hub_bus::MessageBus;
use tracing::{info, warn};

pub use config::{Args, HubConfig};
pub use error::{Error, Result};

use plugin::{Plugin, PluginManager};
use registry::ObjectTable;
use server::{MethodTable, RpcContext, SERVER_UUID, ServerObject};
use storage::{Folder, JsonConfigStore, METADATA_FOLDER};

/// A running hub
pub struct Hub {
    storage: Folder,
    bus: Arc<MessageBus>,
    registry: Arc<ObjectTable>,
    server: Arc<ServerObject>,
    plugins: PluginManager,
    methods: MethodTable,
}

impl Hub {
    /// Bring up storage, bus, object table and plugins.
    ///
    /// Only storage and bus failures are fatal; a plugin that fails to
    /// enable is logged and left out.
    pub async fn start(config: &HubConfig, extra_plugins: Vec<Arc<dyn Plugin>>) -> Result<Self> {
        let storage = Folder::open_root(&config.storage)?;
        info!(path = %storage.path().display(), "Opened storage");

        let bus = MessageBus::start(config.bus_config())?;
        let registry = Arc::new(ObjectTable::new(Arc::new(JsonConfigStore::new(&storage)?)));

        builtin::register_metadata(&registry)?;
        metadata::load_folder(&registry, &storage.open_folder(METADATA_FOLDER, true)?)?;

        let server = Arc::new(ServerObject::new());
        registry.add_instance(server.clone())?;
        Self::configure_server(&registry)?;

        let plugins = PluginManager::new(Arc::clone(&bus), Arc::clone(&registry), &storage)?;
        for plugin in builtin::plugins().into_iter().chain(extra_plugins) {
            plugins.add_plugin(plugin);
        }
        plugins.initialise_plugins().await;

        let methods = MethodTable::with_core_methods(RpcContext {
            bus: Arc::clone(&bus),
            registry: Arc::clone(&registry),
            server: Arc::clone(&server),
        });

        Ok(Self {
            storage,
            bus,
            registry,
            server,
            plugins,
            methods,
        })
    }

    /// Apply the stored server configuration, falling back to defaults
    /// when it no longer validates
    fn configure_server(registry: &ObjectTable) -> Result<()> {
        let stored = registry.get_configuration(SERVER_UUID)?;
        if let Err(e) = registry.set_configuration(SERVER_UUID, &stored) {
            warn!(error = %e, "Stored server configuration rejected, using defaults");
            registry.set_configuration(SERVER_UUID, &hub_types::ValueMap::new())?;
        }
        Ok(())
    }

    /// Stop every plugin, then the bus
    pub async fn shutdown(&self) {
        self.plugins.shutdown_plugins().await;
        self.bus.shutdown();
        info!("Hub stopped");
    }

    pub fn storage(&self) -> &Folder {
        &self.storage
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn registry(&self) -> &Arc<ObjectTable> {
        &self.registry
    }

    pub fn server(&self) -> &Arc<ServerObject> {
        &self.server
    }

    pub fn plugins(&self) -> &PluginManager {
        &self.plugins
    }

    pub fn methods(&self) -> &MethodTable {
        &self.methods
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use builtin::NOTIFICATION_LOGGER_UUID;
    use hub_types::{UserObjectType, Value};
    use server::Session;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> HubConfig {
        HubConfig {
            storage: dir.path().to_path_buf(),
            ..HubConfig::default()
        }
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let dir = TempDir::new().unwrap();
        let hub = Hub::start(&config(&dir), Vec::new()).await.unwrap();

        assert!(hub.registry().get_instance(SERVER_UUID).is_some());
        assert!(hub.plugins().is_enabled(NOTIFICATION_LOGGER_UUID));
        assert_eq!(hub.registry().instances_of(UserObjectType::Plugin).len(), 1);
        assert_eq!(hub.server().settings().http_port, 8000);
        // Server defaults are persisted on first start
        assert!(dir.path().join("config").join(format!("{SERVER_UUID}.json")).is_file());

        let (session, _rx) = Session::new();
        let state = hub.methods().dispatch(
            &session,
            &Value::map_from_pairs([("method", "getState")]),
        );
        assert!(matches!(
            state,
            server::ServerFrame::Response { success: true, .. }
        ));

        hub.shutdown().await;
        assert!(!hub.bus().is_running());
        assert!(hub.registry().get_instance(NOTIFICATION_LOGGER_UUID).is_none());
    }

    #[tokio::test]
    async fn test_invalid_stored_server_configuration_falls_back() {
        let dir = TempDir::new().unwrap();
        let config_dir = dir.path().join("config");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(
            config_dir.join(format!("{SERVER_UUID}.json")),
            r#"{"httpPort": 0}"#,
        )
        .unwrap();

        let hub = Hub::start(&config(&dir), Vec::new()).await.unwrap();
        assert_eq!(hub.server().settings().http_port, 8000);
        hub.shutdown().await;
    }

    #[tokio::test]
    async fn test_metadata_folder_is_loaded() {
        let dir = TempDir::new().unwrap();
        let metadata_dir = dir.path().join(METADATA_FOLDER);
        std::fs::create_dir_all(&metadata_dir).unwrap();
        std::fs::write(
            metadata_dir.join("extra.toml"),
            "[[class]]\nname = \"acme.Extra\"\ndisplay_name = \"Extra\"\n",
        )
        .unwrap();

        struct Extra;

        impl hub_types::UserObject for Extra {
            fn uuid(&self) -> hub_types::Uuid {
                hub_types::Uuid::from_u128(42)
            }

            fn object_type(&self) -> UserObjectType {
                UserObjectType::ActionFactory
            }

            fn class_name(&self) -> &str {
                "acme.Extra"
            }
        }

        let hub = Hub::start(&config(&dir), Vec::new()).await.unwrap();
        hub.registry().add_instance(Arc::new(Extra)).unwrap();
        assert_eq!(
            hub.registry().describe(hub_types::Uuid::from_u128(42)).unwrap().display_name,
            "Extra"
        );
        hub.shutdown().await;
    }
}
