//! Object Table
//!
//! The single source of truth for every live user object. An instance is only
//! admitted when the metadata needed to describe it (and, if it is
//! configurable, to configure it) is already registered, so anything the
//! table hands out can be rendered by a client.
//!
//! Lock order for compound operations: instances, descriptions,
//! configuration descriptions, configurations.

use std::collections::HashMap;
use std::sync::Arc;

use hub_types::{
    ConfigError, ConfigurationDescription, ConfigurationFailures, ObjectDescription, UserObject,
    UserObjectType, Uuid, Value, ValueMap,
};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::storage::{ConfigStore, StorageError};

/// Error type for object table operations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("A different object is already registered with UUID {0}")]
    DuplicateInstance(Uuid),

    #[error("Object {0} is user-creatable but has no parent")]
    MissingParent(Uuid),

    #[error("Parent {parent} of object {uuid} is not registered")]
    UnknownParent { uuid: Uuid, parent: Uuid },

    #[error("No description registered for '{key}' (object {uuid})")]
    MissingDescription { uuid: Uuid, key: String },

    #[error("No configuration description registered for '{key}' (object {uuid})")]
    MissingConfigurationDescription { uuid: Uuid, key: String },

    #[error("Object {0} not found")]
    NotFound(Uuid),

    #[error("Objects of type {object_type} cannot be deleted ({uuid})")]
    NotDeletable {
        uuid: Uuid,
        object_type: UserObjectType,
    },

    #[error("Object {0} is not configurable")]
    NotConfigurable(Uuid),

    #[error("Configuration for {uuid} rejected: {}", describe_failures(failures))]
    InvalidConfiguration {
        uuid: Uuid,
        failures: ConfigurationFailures,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

fn describe_failures(failures: &ConfigurationFailures) -> String {
    failures
        .iter()
        .map(|(name, reason)| format!("{name}: {reason}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Verify `values` and give a reason for every failed entry
pub(crate) fn verify_with_reasons(
    description: &ConfigurationDescription,
    values: &ValueMap,
) -> (ValueMap, ConfigurationFailures) {
    let mut failed = Vec::new();
    let merged = description.verify(values, &mut failed).unwrap_or_default();
    let failures = failed
        .into_iter()
        .map(|name| {
            let reason = description
                .get(&name)
                .and_then(|entry| {
                    let value = values.get(&name).unwrap_or(entry.default_value());
                    entry.validate(value).err()
                })
                .map(|e| e.to_string())
                .unwrap_or_else(|| "invalid value".to_string());
            (name, reason)
        })
        .collect();
    (merged, failures)
}

/// Same allocation, regardless of which trait object points at it
fn same_instance(a: &Arc<dyn UserObject>, b: &Arc<dyn UserObject>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

fn configuration_file(uuid: Uuid) -> String {
    format!("{uuid}.json")
}

// ─────────────────────────────────────────────────────────────────────────────
// Object Table
// ─────────────────────────────────────────────────────────────────────────────

/// Registry of live objects, their descriptions and configuration
pub struct ObjectTable {
    instances: RwLock<HashMap<Uuid, Arc<dyn UserObject>>>,
    /// Keyed by class name, or by UUID string for user-creatable instances
    descriptions: RwLock<HashMap<String, ObjectDescription>>,
    /// Keyed by class name
    config_descriptions: RwLock<HashMap<String, Arc<ConfigurationDescription>>>,
    /// Cached configuration values by instance
    configurations: RwLock<HashMap<Uuid, ValueMap>>,
    store: Arc<dyn ConfigStore>,
}

impl ObjectTable {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self {
            instances: RwLock::new(HashMap::new()),
            descriptions: RwLock::new(HashMap::new()),
            config_descriptions: RwLock::new(HashMap::new()),
            configurations: RwLock::new(HashMap::new()),
            store,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Metadata
    // ─────────────────────────────────────────────────────────────────────

    /// Register the description for a class name (or instance UUID string)
    pub fn add_description(&self, key: impl Into<String>, description: ObjectDescription) {
        let key = key.into();
        debug!(key = %key, "Registered description");
        self.descriptions.write().insert(key, description);
    }

    pub fn add_configuration_description(
        &self,
        class_name: impl Into<String>,
        description: ConfigurationDescription,
    ) {
        let class_name = class_name.into();
        debug!(class = %class_name, entries = description.len(), "Registered configuration description");
        self.config_descriptions
            .write()
            .insert(class_name, Arc::new(description));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Instances
    // ─────────────────────────────────────────────────────────────────────

    /// Admit an object.
    ///
    /// Re-adding the same instance is a no-op. The object is refused (and
    /// leaves no trace) when another instance holds its UUID or when its
    /// description or configuration description is missing.
    pub fn add_instance(&self, object: Arc<dyn UserObject>) -> RegistryResult<()> {
        self.admit(object).map(|_| ())
    }

    /// Like [`add_instance`](Self::add_instance), but reports whether this
    /// call inserted the object (`false` when it was already registered)
    pub(crate) fn admit(&self, object: Arc<dyn UserObject>) -> RegistryResult<bool> {
        let uuid = object.uuid();
        let mut instances = self.instances.write();
        if let Some(existing) = instances.get(&uuid) {
            if same_instance(existing, &object) {
                return Ok(false);
            }
            warn!(uuid = %uuid, "Rejected duplicate object registration");
            return Err(RegistryError::DuplicateInstance(uuid));
        }

        if let Err(e) = self.check_admission(&instances, object.as_ref()) {
            warn!(uuid = %uuid, class = object.class_name(), error = %e, "Rejected object");
            return Err(e);
        }

        info!(
            uuid = %uuid,
            object_type = %object.object_type(),
            class = object.class_name(),
            "Registered object"
        );
        instances.insert(uuid, object);
        Ok(true)
    }

    /// Remove a user-deletable object along with its instance-scoped state
    pub fn remove_instance(&self, uuid: Uuid) -> RegistryResult<Arc<dyn UserObject>> {
        let mut instances = self.instances.write();
        let object = instances.get(&uuid).ok_or(RegistryError::NotFound(uuid))?;
        let object_type = object.object_type();
        if !object_type.is_deletable() {
            return Err(RegistryError::NotDeletable { uuid, object_type });
        }
        let removed = instances
            .remove(&uuid)
            .ok_or(RegistryError::NotFound(uuid))?;
        self.descriptions.write().remove(&uuid.to_string());
        self.configurations.write().remove(&uuid);
        info!(uuid = %uuid, "Removed object");
        Ok(removed)
    }

    /// Remove any object, used when undoing a failed plugin start
    pub(crate) fn withdraw_instance(&self, uuid: Uuid) -> Option<Arc<dyn UserObject>> {
        let removed = self.instances.write().remove(&uuid);
        if removed.is_some() {
            self.configurations.write().remove(&uuid);
            debug!(uuid = %uuid, "Withdrew object");
        }
        removed
    }

    pub fn get_instance(&self, uuid: Uuid) -> Option<Arc<dyn UserObject>> {
        self.instances.read().get(&uuid).cloned()
    }

    pub fn contains(&self, uuid: Uuid) -> bool {
        self.instances.read().contains_key(&uuid)
    }

    /// Every live object of the given type
    pub fn instances_of(&self, object_type: UserObjectType) -> Vec<Arc<dyn UserObject>> {
        self.instances
            .read()
            .values()
            .filter(|object| object.object_type() == object_type)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.instances.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.read().is_empty()
    }

    /// The description shown for an object
    pub fn describe(&self, uuid: Uuid) -> Option<ObjectDescription> {
        let instances = self.instances.read();
        let object = instances.get(&uuid)?;
        let key = description_key(object.as_ref());
        self.descriptions.read().get(&key).cloned()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Configuration
    // ─────────────────────────────────────────────────────────────────────

    /// Schema for an object; user-creatable objects share their parent's
    pub fn get_configuration_description(
        &self,
        uuid: Uuid,
    ) -> Option<Arc<ConfigurationDescription>> {
        let instances = self.instances.read();
        let object = instances.get(&uuid)?;
        let key = configuration_key(&instances, object.as_ref())?;
        self.config_descriptions.read().get(&key).cloned()
    }

    /// Stored values for an object, loaded from `<uuid>.json` on first use
    pub fn get_configuration(&self, uuid: Uuid) -> RegistryResult<ValueMap> {
        let description = self
            .get_configuration_description(uuid)
            .ok_or(RegistryError::NotConfigurable(uuid))?;
        if let Some(values) = self.configurations.read().get(&uuid) {
            return Ok(values.clone());
        }
        let values = self.store.load(&configuration_file(uuid), &description)?;
        self.configurations.write().insert(uuid, values.clone());
        Ok(values)
    }

    /// Verify, apply and persist new values for a live object.
    ///
    /// Values are only written to disk once the object has accepted them.
    /// Returns the merged values that were applied.
    pub fn set_configuration(&self, uuid: Uuid, values: &ValueMap) -> RegistryResult<ValueMap> {
        let object = self.get_instance(uuid).ok_or(RegistryError::NotFound(uuid))?;
        let configurable = object
            .configurable()
            .ok_or(RegistryError::NotConfigurable(uuid))?;
        let description = self
            .get_configuration_description(uuid)
            .ok_or(RegistryError::NotConfigurable(uuid))?;

        let (merged, mut failures) = verify_with_reasons(&description, values);
        let accepted = failures.is_empty()
            && configurable.validate_configuration(&description, &merged, &mut failures);
        if !accepted || !failures.is_empty() {
            for (name, reason) in &failures {
                warn!(uuid = %uuid, entry = %name, reason = %reason, "Configuration value rejected");
            }
            return Err(RegistryError::InvalidConfiguration { uuid, failures });
        }

        configurable.apply_configuration(&description, &merged)?;
        self.configurations.write().insert(uuid, merged.clone());
        self.store.save(&configuration_file(uuid), &merged)?;
        info!(uuid = %uuid, "Configuration updated");
        Ok(merged)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Packing
    // ─────────────────────────────────────────────────────────────────────

    /// `{type name: {uuid: description (+ parentUUID)}}`, the state shape
    /// echoed to clients
    pub fn pack(&self) -> Value {
        let instances = self.instances.read();
        let descriptions = self.descriptions.read();
        let mut packed = ValueMap::new();
        for (uuid, object) in instances.iter() {
            let Some(description) = descriptions.get(&description_key(object.as_ref())) else {
                continue;
            };
            let mut entry = description.pack();
            if object.object_type().is_user_creatable() {
                if let Some(parent) = object.parent_uuid() {
                    entry.insert("parentUUID".into(), Value::from(parent));
                }
            }
            let by_type = packed
                .entry(object.object_type().name().to_string())
                .or_insert_with(|| Value::Map(ValueMap::new()));
            if let Some(map) = by_type.as_map_mut() {
                map.insert(uuid.to_string(), Value::Map(entry));
            }
        }
        Value::Map(packed)
    }

    fn check_admission(
        &self,
        instances: &HashMap<Uuid, Arc<dyn UserObject>>,
        object: &dyn UserObject,
    ) -> RegistryResult<()> {
        let uuid = object.uuid();
        if object.object_type().is_user_creatable() {
            let parent = object.parent_uuid().ok_or(RegistryError::MissingParent(uuid))?;
            if !instances.contains_key(&parent) {
                return Err(RegistryError::UnknownParent { uuid, parent });
            }
        }

        let key = description_key(object);
        if !self.descriptions.read().contains_key(&key) {
            return Err(RegistryError::MissingDescription { uuid, key });
        }

        if object.configurable().is_some() {
            let key = configuration_key(instances, object)
                .unwrap_or_else(|| object.class_name().to_string());
            if !self.config_descriptions.read().contains_key(&key) {
                return Err(RegistryError::MissingConfigurationDescription { uuid, key });
            }
        }
        Ok(())
    }
}

/// User-creatable instances are described per instance, everything else per class
fn description_key(object: &dyn UserObject) -> String {
    if object.object_type().is_user_creatable() {
        object.uuid().to_string()
    } else {
        object.class_name().to_string()
    }
}

/// Class name whose schema applies, following parents for user-creatable objects
fn configuration_key(
    instances: &HashMap<Uuid, Arc<dyn UserObject>>,
    object: &dyn UserObject,
) -> Option<String> {
    if !object.object_type().is_user_creatable() {
        return Some(object.class_name().to_string());
    }
    let parent = instances.get(&object.parent_uuid()?)?;
    if parent.uuid() == object.uuid() {
        return None;
    }
    configuration_key(instances, parent.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Folder, JsonConfigStore};
    use hub_types::{Configurable, ConfigurationValue, ConfigurationValueType};
    use parking_lot::Mutex;
    use tempfile::TempDir;

    struct TestObject {
        uuid: Uuid,
        object_type: UserObjectType,
        class_name: &'static str,
        parent: Option<Uuid>,
        configurable: bool,
        applied: Mutex<Option<ValueMap>>,
    }

    impl TestObject {
        fn new(object_type: UserObjectType, class_name: &'static str) -> Self {
            Self {
                uuid: Uuid::new_v4(),
                object_type,
                class_name,
                parent: None,
                configurable: false,
                applied: Mutex::new(None),
            }
        }

        fn with_configuration(mut self) -> Self {
            self.configurable = true;
            self
        }

        fn child_of(mut self, parent: Uuid) -> Self {
            self.parent = Some(parent);
            self
        }
    }

    impl Configurable for TestObject {
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
            if values.get("port") == Some(&Value::Int(13)) {
                return Err(ConfigError::ApplyFailed("port busy".into()));
            }
            *self.applied.lock() = Some(values.clone());
            Ok(())
        }
    }

    impl UserObject for TestObject {
        fn uuid(&self) -> Uuid {
            self.uuid
        }

        fn object_type(&self) -> UserObjectType {
            self.object_type
        }

        fn class_name(&self) -> &str {
            self.class_name
        }

        fn parent_uuid(&self) -> Option<Uuid> {
            self.parent
        }

        fn configurable(&self) -> Option<&dyn Configurable> {
            if self.configurable { Some(self) } else { None }
        }
    }

    fn table() -> (TempDir, ObjectTable) {
        let dir = TempDir::new().unwrap();
        let root = Folder::open_root(dir.path()).unwrap();
        let store = JsonConfigStore::new(&root).unwrap();
        (dir, ObjectTable::new(Arc::new(store)))
    }

    fn port_schema() -> ConfigurationDescription {
        ConfigurationDescription::new(vec![
            ConfigurationValue::builder("port", ConfigurationValueType::Numeric, 8000)
                .build()
                .unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn test_admission_requires_description() {
        let (_dir, table) = table();
        let plugin = Arc::new(TestObject::new(UserObjectType::Plugin, "test::Plugin"));
        let uuid = plugin.uuid;

        assert!(matches!(
            table.add_instance(plugin.clone()),
            Err(RegistryError::MissingDescription { .. })
        ));
        assert!(table.get_instance(uuid).is_none());

        table.add_description("test::Plugin", ObjectDescription::new("Plugin"));
        table.add_instance(plugin).unwrap();
        assert!(table.get_instance(uuid).is_some());
    }

    #[test]
    fn test_admission_requires_configuration_description_when_configurable() {
        let (_dir, table) = table();
        table.add_description("test::Configured", ObjectDescription::new("Configured"));
        let plugin = Arc::new(
            TestObject::new(UserObjectType::Plugin, "test::Configured").with_configuration(),
        );
        let uuid = plugin.uuid;

        assert!(matches!(
            table.add_instance(plugin.clone()),
            Err(RegistryError::MissingConfigurationDescription { .. })
        ));
        assert!(!table.contains(uuid));
        assert!(table.pack().as_map().unwrap().is_empty());

        table.add_configuration_description("test::Configured", port_schema());
        table.add_instance(plugin).unwrap();
        assert!(table.contains(uuid));
    }

    #[test]
    fn test_duplicate_uuid_rejected_but_same_instance_accepted() {
        let (_dir, table) = table();
        table.add_description("test::Plugin", ObjectDescription::new("Plugin"));
        let first = Arc::new(TestObject::new(UserObjectType::Plugin, "test::Plugin"));
        let mut impostor = TestObject::new(UserObjectType::Plugin, "test::Plugin");
        impostor.uuid = first.uuid;

        table.add_instance(first.clone()).unwrap();
        table.add_instance(first.clone()).unwrap();
        assert!(matches!(
            table.add_instance(Arc::new(impostor)),
            Err(RegistryError::DuplicateInstance(_))
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_user_creatable_uses_uuid_description_and_parent_schema() {
        let (_dir, table) = table();
        table.add_description("test::ActionFactory", ObjectDescription::new("Factory"));
        table.add_configuration_description("test::ActionFactory", port_schema());
        let factory = Arc::new(
            TestObject::new(UserObjectType::ActionFactory, "test::ActionFactory").with_configuration(),
        );
        table.add_instance(factory.clone()).unwrap();

        let orphan = Arc::new(TestObject::new(UserObjectType::Action, "test::Action").with_configuration());
        assert!(matches!(
            table.add_instance(orphan),
            Err(RegistryError::MissingParent(_))
        ));

        let action = Arc::new(
            TestObject::new(UserObjectType::Action, "test::Action")
                .with_configuration()
                .child_of(factory.uuid),
        );
        // Described by class name only: not enough for a user-creatable object
        table.add_description("test::Action", ObjectDescription::new("Action class"));
        assert!(matches!(
            table.add_instance(action.clone()),
            Err(RegistryError::MissingDescription { .. })
        ));

        table.add_description(action.uuid.to_string(), ObjectDescription::new("Porch light"));
        table.add_instance(action.clone()).unwrap();

        let schema = table.get_configuration_description(action.uuid).unwrap();
        assert!(schema.contains("port"));
        assert_eq!(
            table.describe(action.uuid).unwrap().display_name,
            "Porch light"
        );
    }

    #[test]
    fn test_remove_instance_respects_deletable_types() {
        let (_dir, table) = table();
        table.add_description("test::SourceFactory", ObjectDescription::new("Factory"));
        let factory = Arc::new(TestObject::new(UserObjectType::SourceFactory, "test::SourceFactory"));
        table.add_instance(factory.clone()).unwrap();

        let source = Arc::new(TestObject::new(UserObjectType::Source, "test::Source").child_of(factory.uuid));
        table.add_description(source.uuid.to_string(), ObjectDescription::new("Sensor"));
        table.add_instance(source.clone()).unwrap();

        assert!(matches!(
            table.remove_instance(factory.uuid),
            Err(RegistryError::NotDeletable { .. })
        ));
        table.remove_instance(source.uuid).unwrap();
        assert!(table.get_instance(source.uuid).is_none());
        assert!(matches!(
            table.remove_instance(source.uuid),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn test_pack_shape() {
        let (_dir, table) = table();
        table.add_description("test::ActionFactory", ObjectDescription::new("Factory"));
        let factory = Arc::new(TestObject::new(UserObjectType::ActionFactory, "test::ActionFactory"));
        table.add_instance(factory.clone()).unwrap();
        let action = Arc::new(TestObject::new(UserObjectType::Action, "test::Action").child_of(factory.uuid));
        table.add_description(action.uuid.to_string(), ObjectDescription::new("Doorbell"));
        table.add_instance(action.clone()).unwrap();

        let packed = table.pack();
        let factory_entry = packed
            .get("ActionFactory")
            .and_then(|m| m.get(&factory.uuid.to_string()))
            .unwrap();
        assert_eq!(factory_entry.get("displayName"), Some(&Value::from("Factory")));
        assert!(factory_entry.get("parentUUID").is_none());

        let action_entry = packed
            .get("Action")
            .and_then(|m| m.get(&action.uuid.to_string()))
            .unwrap();
        assert_eq!(
            action_entry.get("parentUUID"),
            Some(&Value::from(factory.uuid.to_string()))
        );
    }

    #[test]
    fn test_configuration_load_set_and_reject() {
        let (_dir, table) = table();
        table.add_description("test::Configured", ObjectDescription::new("Configured"));
        table.add_configuration_description("test::Configured", port_schema());
        let object = Arc::new(
            TestObject::new(UserObjectType::Plugin, "test::Configured").with_configuration(),
        );
        let uuid = object.uuid;
        table.add_instance(object.clone()).unwrap();

        assert!(table.get_configuration(uuid).unwrap().is_empty());

        let mut values = ValueMap::new();
        values.insert("port".into(), Value::from("9001"));
        let applied = table.set_configuration(uuid, &values).unwrap();
        assert_eq!(applied["port"], Value::Int(9001));
        assert_eq!(object.applied.lock().as_ref(), Some(&applied));
        assert_eq!(table.get_configuration(uuid).unwrap(), applied);

        values.insert("port".into(), Value::from("notanumber"));
        match table.set_configuration(uuid, &values) {
            Err(RegistryError::InvalidConfiguration { failures, .. }) => {
                assert!(failures.contains_key("port"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }

        values.insert("port".into(), Value::Int(1));
        assert!(matches!(
            table.set_configuration(uuid, &values),
            Err(RegistryError::InvalidConfiguration { .. })
        ));
        assert_eq!(table.get_configuration(uuid).unwrap()["port"], Value::Int(9001));
    }

    #[test]
    fn test_failed_apply_is_not_persisted() {
        let (dir, table) = table();
        table.add_description("test::Configured", ObjectDescription::new("Configured"));
        table.add_configuration_description("test::Configured", port_schema());
        let object = Arc::new(
            TestObject::new(UserObjectType::Plugin, "test::Configured").with_configuration(),
        );
        let uuid = object.uuid;
        table.add_instance(object.clone()).unwrap();

        let mut values = ValueMap::new();
        values.insert("port".into(), Value::Int(13));
        assert!(matches!(
            table.set_configuration(uuid, &values),
            Err(RegistryError::Config(ConfigError::ApplyFailed(_)))
        ));
        assert!(object.applied.lock().is_none());
        assert!(!dir.path().join("config").join(format!("{uuid}.json")).exists());
        assert!(table.get_configuration(uuid).unwrap().get("port").is_none());

        // A cold table reads back the last accepted values only
        values.insert("port".into(), Value::Int(9001));
        table.set_configuration(uuid, &values).unwrap();
        values.insert("port".into(), Value::Int(13));
        assert!(table.set_configuration(uuid, &values).is_err());

        let root = Folder::open_root(dir.path()).unwrap();
        let reopened = ObjectTable::new(Arc::new(JsonConfigStore::new(&root).unwrap()));
        reopened.add_description("test::Configured", ObjectDescription::new("Configured"));
        reopened.add_configuration_description("test::Configured", port_schema());
        reopened.add_instance(object.clone()).unwrap();
        assert_eq!(reopened.get_configuration(uuid).unwrap()["port"], Value::Int(9001));
    }

    #[test]
    fn test_admit_reports_insertion() {
        let (_dir, table) = table();
        table.add_description("test::Plugin", ObjectDescription::new("Plugin"));
        let plugin: Arc<dyn UserObject> =
            Arc::new(TestObject::new(UserObjectType::Plugin, "test::Plugin"));
        assert!(table.admit(Arc::clone(&plugin)).unwrap());
        assert!(!table.admit(plugin).unwrap());
    }

    #[test]
    fn test_instances_of_and_withdraw() {
        let (_dir, table) = table();
        table.add_description("test::Plugin", ObjectDescription::new("Plugin"));
        let plugin = Arc::new(TestObject::new(UserObjectType::Plugin, "test::Plugin"));
        table.add_instance(plugin.clone()).unwrap();
        assert_eq!(table.instances_of(UserObjectType::Plugin).len(), 1);
        assert!(table.instances_of(UserObjectType::Server).is_empty());

        assert!(table.withdraw_instance(plugin.uuid).is_some());
        assert!(table.is_empty());
    }
}
