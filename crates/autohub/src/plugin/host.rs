//! Plugin Host
//!
//! One host per plugin. It drives the plugin through
//! `Unregistered -> Enabled -> Disabled` and is the capability boundary the
//! plugin sees: the public/private bus roots, publish/subscribe, a private
//! data folder and factory registration.

use std::collections::HashSet;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use futures::FutureExt;
use hub_bus::{BusResult, Message, MessageBus, Notification, Subscriber, Topic};
use hub_types::{UserObject, UserObjectType, Uuid};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::{Plugin, PluginError, PluginResult, panic_message};
use crate::registry::{ObjectTable, verify_with_reasons};
use crate::storage::Folder;

// ─────────────────────────────────────────────────────────────────────────────
// Plugin State
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state of a plugin within its host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PluginState {
    /// Host created, plugin not yet enabled
    Unregistered = 0,
    /// Registered, configured and initialised
    Enabled = 1,
    /// Failed to enable or shut down; terminal for this host
    Disabled = 2,
}

impl PluginState {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Unregistered,
            1 => Self::Enabled,
            _ => Self::Disabled,
        }
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginState::Unregistered => write!(f, "unregistered"),
            PluginState::Enabled => write!(f, "enabled"),
            PluginState::Disabled => write!(f, "disabled"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Plugin Host
// ─────────────────────────────────────────────────────────────────────────────

/// The restricted view of the server handed to exactly one plugin
pub struct PluginHost {
    plugin: Arc<dyn Plugin>,
    bus: Arc<MessageBus>,
    registry: Arc<ObjectTable>,
    /// Parent of the plugin's datastore (`<storage>/data`)
    data: Folder,
    datastore: Mutex<Option<Folder>>,
    /// Factories admitted on behalf of the plugin
    factories: Mutex<Vec<Uuid>>,
    /// Subscriber ids the plugin registered through this host
    subscribers: Mutex<HashSet<Uuid>>,
    /// Set when this host inserted the plugin into the registry
    registered: AtomicBool,
    state: AtomicU8,
}

impl PluginHost {
    pub fn new(
        plugin: Arc<dyn Plugin>,
        bus: Arc<MessageBus>,
        registry: Arc<ObjectTable>,
        data: Folder,
    ) -> Arc<Self> {
        Arc::new(Self {
            plugin,
            bus,
            registry,
            data,
            datastore: Mutex::new(None),
            factories: Mutex::new(Vec::new()),
            subscribers: Mutex::new(HashSet::new()),
            registered: AtomicBool::new(false),
            state: AtomicU8::new(PluginState::Unregistered as u8),
        })
    }

    pub fn state(&self) -> PluginState {
        PluginState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn plugin_uuid(&self) -> Uuid {
        self.plugin.uuid()
    }

    pub fn plugin(&self) -> &Arc<dyn Plugin> {
        &self.plugin
    }

    fn set_state(&self, state: PluginState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Register, configure and initialise the plugin.
    ///
    /// On any failure the plugin (and any factory it registered) is
    /// withdrawn from the registry, an error notification is published and
    /// the host ends up `Disabled`.
    pub async fn enable_plugin(self: &Arc<Self>) -> PluginResult<()> {
        let uuid = self.plugin.uuid();
        let state = self.state();
        if state != PluginState::Unregistered {
            return Err(PluginError::InvalidState { uuid, state });
        }
        if self.plugin.object_type() != UserObjectType::Plugin {
            self.set_state(PluginState::Disabled);
            return Err(PluginError::NotAPlugin(uuid));
        }

        match self.try_enable().await {
            Ok(()) => {
                self.set_state(PluginState::Enabled);
                info!(
                    plugin = %uuid,
                    class = self.plugin.class_name(),
                    version = self.plugin.version(),
                    "Initialised plugin"
                );
                Ok(())
            }
            Err(e) => {
                error!(plugin = %uuid, class = self.plugin.class_name(), error = %e, "Failed to enable plugin");
                self.withdraw();
                let text = format!(
                    "Failed to enable plugin {} ({uuid}): {e}",
                    self.plugin.class_name()
                );
                if let Err(notify_err) = self.bus.notify(Notification::Error, text) {
                    debug!(error = %notify_err, "Could not publish plugin failure");
                }
                self.set_state(PluginState::Disabled);
                Err(e)
            }
        }
    }

    async fn try_enable(self: &Arc<Self>) -> PluginResult<()> {
        let uuid = self.plugin.uuid();
        let inserted = self
            .registry
            .admit(Arc::clone(&self.plugin).as_user_object())?;
        self.registered.store(inserted, Ordering::SeqCst);

        if let Some(configurable) = self.plugin.configurable() {
            let description = self
                .registry
                .get_configuration_description(uuid)
                .ok_or(PluginError::MissingConfiguration(uuid))?;
            let stored = self.registry.get_configuration(uuid)?;
            let (merged, mut failures) = verify_with_reasons(&description, &stored);

            let accepted = catch_unwind(AssertUnwindSafe(|| {
                configurable.validate_configuration(&description, &merged, &mut failures)
            }))
            .map_err(|payload| PluginError::Panicked {
                stage: "validate_configuration",
                message: panic_message(payload),
            })?;
            if !accepted || !failures.is_empty() {
                for (name, reason) in &failures {
                    error!(plugin = %uuid, entry = %name, reason = %reason, "Invalid configuration value");
                }
                return Err(PluginError::ConfigurationRejected(failures));
            }

            catch_unwind(AssertUnwindSafe(|| {
                configurable.apply_configuration(&description, &merged)
            }))
            .map_err(|payload| PluginError::Panicked {
                stage: "apply_configuration",
                message: panic_message(payload),
            })??;
        }

        let initialised = AssertUnwindSafe(self.plugin.initialise(Arc::clone(self)))
            .catch_unwind()
            .await
            .map_err(|payload| PluginError::Panicked {
                stage: "initialise",
                message: panic_message(payload),
            })??;
        if !initialised {
            return Err(PluginError::InitialiseFailed);
        }
        Ok(())
    }

    /// Stop the plugin. Never fails; problems are logged.
    pub async fn shutdown_plugin(&self) {
        let uuid = self.plugin.uuid();
        if self.state() != PluginState::Enabled {
            debug!(plugin = %uuid, state = %self.state(), "Plugin not enabled, nothing to shut down");
            return;
        }

        debug!(plugin = %uuid, class = self.plugin.class_name(), "Shutting down plugin");
        match AssertUnwindSafe(self.plugin.shutdown()).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(plugin = %uuid, error = %e, "Failed to shutdown plugin");
            }
            Err(payload) => {
                error!(
                    plugin = %uuid,
                    panic = %panic_message(payload),
                    "Plugin panicked during shutdown"
                );
            }
        }
        self.withdraw();
        self.set_state(PluginState::Disabled);
        info!(plugin = %uuid, "Plugin shut down");
    }

    /// Remove everything this host put in the registry or on the bus.
    ///
    /// The plugin's own entry is only removed when this host inserted it, so
    /// an object already holding that UUID is left alone. Only subscriptions
    /// made through this host are dropped.
    fn withdraw(&self) {
        let uuid = self.plugin.uuid();
        for factory in self.factories.lock().drain(..) {
            self.registry.withdraw_instance(factory);
        }
        if self.registered.swap(false, Ordering::SeqCst) {
            self.registry.withdraw_instance(uuid);
        }
        for subscriber in self.subscribers.lock().drain() {
            self.bus.unsubscribe_all(subscriber);
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Message Bus
    // ─────────────────────────────────────────────────────────────────────

    pub fn public(&self) -> Arc<Topic> {
        Arc::clone(self.bus.public())
    }

    pub fn private(&self) -> Arc<Topic> {
        Arc::clone(self.bus.private())
    }

    /// Create a topic relative to the bus root
    pub fn create(&self, path: &str) -> BusResult<Arc<Topic>> {
        self.bus.create(path)
    }

    pub fn subscribe(&self, topic: &Arc<Topic>, subscriber: Arc<dyn Subscriber>) -> BusResult<()> {
        let id = subscriber.subscriber_id();
        self.bus.subscribe(topic, subscriber)?;
        self.subscribers.lock().insert(id);
        Ok(())
    }

    pub fn unsubscribe(&self, topic: &Arc<Topic>, subscriber: Uuid) {
        self.bus.unsubscribe(topic, subscriber);
    }

    pub fn unsubscribe_all(&self, subscriber: Uuid) {
        self.bus.unsubscribe_all(subscriber);
    }

    pub fn publish(
        &self,
        topic: &Arc<Topic>,
        message: Arc<Message>,
        source: Option<Uuid>,
    ) -> BusResult<()> {
        self.bus.publish(topic, message, source)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Storage
    // ─────────────────────────────────────────────────────────────────────

    /// The plugin's private folder, `<storage>/data/<plugin uuid>/`,
    /// created on first access
    pub fn datastore(&self) -> PluginResult<Folder> {
        let mut datastore = self.datastore.lock();
        if let Some(folder) = datastore.as_ref() {
            return Ok(folder.clone());
        }
        let folder = self
            .data
            .open_folder(&self.plugin.uuid().to_string(), true)?;
        *datastore = Some(folder.clone());
        Ok(folder)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Factories
    // ─────────────────────────────────────────────────────────────────────

    pub fn register_action_factory(&self, factory: Arc<dyn UserObject>) -> PluginResult<()> {
        self.register_factory(factory, UserObjectType::ActionFactory)
    }

    pub fn register_source_factory(&self, factory: Arc<dyn UserObject>) -> PluginResult<()> {
        self.register_factory(factory, UserObjectType::SourceFactory)
    }

    fn register_factory(
        &self,
        factory: Arc<dyn UserObject>,
        expected: UserObjectType,
    ) -> PluginResult<()> {
        let state = self.state();
        if state == PluginState::Disabled {
            return Err(PluginError::InvalidState {
                uuid: self.plugin.uuid(),
                state,
            });
        }
        let actual = factory.object_type();
        if actual != expected {
            warn!(plugin = %self.plugin.uuid(), %expected, %actual, "Refused factory of the wrong type");
            return Err(PluginError::WrongFactoryType { expected, actual });
        }
        let uuid = factory.uuid();
        self.registry.add_instance(factory)?;
        self.factories.lock().push(uuid);
        debug!(plugin = %self.plugin.uuid(), factory = %uuid, "Registered factory");
        Ok(())
    }
}
