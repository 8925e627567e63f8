//! Test doubles shared by the plugin tests

use std::sync::Arc;

use async_trait::async_trait;
use hub_bus::{BusConfig, BusResult, Message, MessageBus, Subscriber, Topic};
use hub_types::{
    ConfigError, Configurable, ConfigurationDescription, ConfigurationFailures,
    ConfigurationValue, ConfigurationValueType, ObjectDescription, UserObject, UserObjectType,
    Uuid, Value, ValueMap,
};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::mpsc;

use super::{Plugin, PluginError, PluginHost, PluginResult};
use crate::registry::ObjectTable;
use crate::storage::{DATA_FOLDER, Folder, JsonConfigStore};

pub const PLUGIN_CLASS: &str = "tests.TestPlugin";
pub const FACTORY_CLASS: &str = "tests.TestFactory";

pub struct Fixture {
    _dir: TempDir,
    pub store: JsonConfigStore,
    pub registry: Arc<ObjectTable>,
    pub bus: Arc<MessageBus>,
    pub data: Folder,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = Folder::open_root(dir.path()).unwrap();
        let store = JsonConfigStore::new(&root).unwrap();
        let registry = Arc::new(ObjectTable::new(Arc::new(store.clone())));
        registry.add_description(PLUGIN_CLASS, ObjectDescription::new("Test Plugin"));
        registry.add_description(FACTORY_CLASS, ObjectDescription::new("Test Factory"));
        registry.add_configuration_description(
            PLUGIN_CLASS,
            ConfigurationDescription::new(vec![
                ConfigurationValue::builder("port", ConfigurationValueType::Numeric, 8000)
                    .build()
                    .unwrap(),
            ])
            .unwrap(),
        );
        Self {
            bus: MessageBus::start(BusConfig::default()).unwrap(),
            data: root.open_folder(DATA_FOLDER, true).unwrap(),
            store,
            registry,
            _dir: dir,
        }
    }

    pub fn config_folder(&self) -> &Folder {
        self.store.folder()
    }

    pub fn host(&self, plugin: Arc<TestPlugin>) -> Arc<PluginHost> {
        PluginHost::new(
            plugin,
            Arc::clone(&self.bus),
            Arc::clone(&self.registry),
            self.data.clone(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Normal,
    InitFalse,
    InitFails,
    InitPanics,
    ApplyFails,
    ApplyPanics,
    ShutdownPanics,
}

pub struct TestPlugin {
    pub uuid: Uuid,
    mode: Mode,
    configurable: bool,
    pub factory: Option<Arc<TestFactory>>,
    pub applied: Mutex<Option<ValueMap>>,
    pub initialised: Mutex<Option<Arc<PluginHost>>>,
    pub shut_down: Mutex<bool>,
}

impl TestPlugin {
    fn build(mode: Mode, configurable: bool) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            mode,
            configurable,
            factory: None,
            applied: Mutex::new(None),
            initialised: Mutex::new(None),
            shut_down: Mutex::new(false),
        }
    }

    pub fn plain(mode: Mode) -> Arc<Self> {
        Arc::new(Self::build(mode, false))
    }

    pub fn configurable(mode: Mode) -> Arc<Self> {
        Arc::new(Self::build(mode, true))
    }

    /// Rebuild with a factory registered during `initialise`
    pub fn with_factory(self: Arc<Self>, factory: Arc<TestFactory>) -> Arc<Self> {
        let mut plugin = Self::build(self.mode, self.configurable);
        plugin.uuid = self.uuid;
        plugin.factory = Some(factory);
        Arc::new(plugin)
    }
}

impl Configurable for TestPlugin {
    fn validate_configuration(
        &self,
        _description: &ConfigurationDescription,
        values: &ValueMap,
        failures: &mut ConfigurationFailures,
    ) -> bool {
        if values.get("port") == Some(&Value::Int(1)) {
            failures.insert("port".into(), "reserved port".into());
            return false;
        }
        true
    }

    fn apply_configuration(
        &self,
        _description: &ConfigurationDescription,
        values: &ValueMap,
    ) -> Result<(), ConfigError> {
        match self.mode {
            Mode::ApplyFails => Err(ConfigError::ApplyFailed("port busy".into())),
            Mode::ApplyPanics => panic!("apply exploded"),
            _ => {
                *self.applied.lock() = Some(values.clone());
                Ok(())
            }
        }
    }
}

impl UserObject for TestPlugin {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn object_type(&self) -> UserObjectType {
        UserObjectType::Plugin
    }

    fn class_name(&self) -> &str {
        PLUGIN_CLASS
    }

    fn configurable(&self) -> Option<&dyn Configurable> {
        if self.configurable { Some(self) } else { None }
    }
}

#[async_trait]
impl Plugin for TestPlugin {
    fn version(&self) -> &str {
        "0.0.1"
    }

    async fn initialise(&self, host: Arc<PluginHost>) -> PluginResult<bool> {
        if let Some(factory) = &self.factory {
            host.register_action_factory(Arc::clone(factory) as Arc<dyn UserObject>)?;
        }
        match self.mode {
            Mode::InitFalse => return Ok(false),
            Mode::InitFails => return Err(PluginError::Failed("no hardware".into())),
            Mode::InitPanics => panic!("initialise exploded"),
            _ => {}
        }
        *self.initialised.lock() = Some(host);
        Ok(true)
    }

    async fn shutdown(&self) -> PluginResult<()> {
        *self.shut_down.lock() = true;
        if self.mode == Mode::ShutdownPanics {
            panic!("shutdown exploded");
        }
        // Break the host <-> plugin cycle
        self.initialised.lock().take();
        Ok(())
    }
}

pub struct TestFactory {
    pub uuid: Uuid,
    object_type: UserObjectType,
}

impl TestFactory {
    pub fn action() -> Arc<Self> {
        Arc::new(Self {
            uuid: Uuid::new_v4(),
            object_type: UserObjectType::ActionFactory,
        })
    }
}

impl UserObject for TestFactory {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn object_type(&self) -> UserObjectType {
        self.object_type
    }

    fn class_name(&self) -> &str {
        FACTORY_CLASS
    }
}

/// Forwards every delivered message to a channel
pub struct Recorder {
    id: Uuid,
    tx: mpsc::UnboundedSender<Arc<Message>>,
}

impl Recorder {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Arc<Message>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                id: Uuid::new_v4(),
                tx,
            }),
            rx,
        )
    }
}

#[async_trait]
impl Subscriber for Recorder {
    fn subscriber_id(&self) -> Uuid {
        self.id
    }

    async fn message_received(
        &self,
        _topic: Arc<Topic>,
        _source: Option<Uuid>,
        message: Arc<Message>,
    ) -> BusResult<()> {
        let _ = self.tx.send(message);
        Ok(())
    }
}
