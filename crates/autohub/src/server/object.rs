//! Server Object
//!
//! The hub itself, registered in the object table like any other object so
//! clients can read and change its configuration.

use parking_lot::RwLock;

use hub_types::{
    ConfigError, Configurable, ConfigurationDescription, ConfigurationFailures, UserObject,
    UserObjectType, Uuid, Value, ValueMap,
};
use tracing::info;

/// Fixed identity of the server object
pub const SERVER_UUID: Uuid = Uuid::from_u128(0x377ecfa2_2b36_4bbf_8f3f_66c0582dfed8);

pub const SERVER_CLASS: &str = "autohub.Server";

/// Applied server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub http_port: u16,
    pub log_level: String,
    pub password: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            http_port: 8000,
            log_level: "warn".to_string(),
            password: String::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ServerObject {
    settings: RwLock<ServerSettings>,
}

impl ServerObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn settings(&self) -> ServerSettings {
        self.settings.read().clone()
    }

    /// Whether `password` unlocks authenticated RPC methods
    pub fn check_password(&self, password: &str) -> bool {
        let settings = self.settings.read();
        settings.password.is_empty() || settings.password == password
    }
}

fn text(description: &ConfigurationDescription, values: &ValueMap, name: &str) -> String {
    description
        .applied_value(values, name)
        .map(Value::to_text)
        .unwrap_or_default()
}

impl Configurable for ServerObject {
    fn validate_configuration(
        &self,
        description: &ConfigurationDescription,
        values: &ValueMap,
        failures: &mut ConfigurationFailures,
    ) -> bool {
        let port = description
            .applied_value(values, "httpPort")
            .and_then(Value::as_i64)
            .unwrap_or_default();
        if !(1..=i64::from(u16::MAX)).contains(&port) {
            failures.insert("httpPort".into(), format!("{port} is not a valid port"));
            return false;
        }
        true
    }

    fn apply_configuration(
        &self,
        description: &ConfigurationDescription,
        values: &ValueMap,
    ) -> Result<(), ConfigError> {
        let port = description
            .applied_value(values, "httpPort")
            .cloned()
            .unwrap_or(Value::Null);
        let http_port = u16::try_from(port)
            .map_err(|e| ConfigError::ApplyFailed(format!("httpPort: {e}")))?;

        let settings = ServerSettings {
            http_port,
            log_level: text(description, values, "logLevel"),
            password: text(description, values, "password"),
        };
        info!(http_port, log_level = %settings.log_level, "Applied server configuration");
        *self.settings.write() = settings;
        Ok(())
    }
}

impl UserObject for ServerObject {
    fn uuid(&self) -> Uuid {
        SERVER_UUID
    }

    fn object_type(&self) -> UserObjectType {
        UserObjectType::Server
    }

    fn class_name(&self) -> &str {
        SERVER_CLASS
    }

    fn configurable(&self) -> Option<&dyn Configurable> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin;
    use crate::registry::{ObjectTable, RegistryError};
    use crate::storage::{Folder, JsonConfigStore};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn setup(dir: &TempDir) -> (ObjectTable, Arc<ServerObject>) {
        let root = Folder::open_root(dir.path()).unwrap();
        let registry = ObjectTable::new(Arc::new(JsonConfigStore::new(&root).unwrap()));
        builtin::register_metadata(&registry).unwrap();
        let server = Arc::new(ServerObject::new());
        registry.add_instance(server.clone()).unwrap();
        (registry, server)
    }

    #[test]
    fn test_uuid_is_fixed() {
        assert_eq!(
            SERVER_UUID.to_string(),
            "377ecfa2-2b36-4bbf-8f3f-66c0582dfed8"
        );
    }

    #[test]
    fn test_defaults_apply() {
        let dir = TempDir::new().unwrap();
        let (registry, server) = setup(&dir);
        registry.set_configuration(SERVER_UUID, &ValueMap::new()).unwrap();
        assert_eq!(server.settings(), ServerSettings::default());
        assert!(server.check_password("anything"));
    }

    #[test]
    fn test_configuration_updates_settings() {
        let dir = TempDir::new().unwrap();
        let (registry, server) = setup(&dir);
        let values = Value::map_from_pairs([
            ("httpPort", Value::from("9090")),
            ("logLevel", Value::from("debug")),
            ("password", Value::from("correct horse")),
        ]);
        registry
            .set_configuration(SERVER_UUID, values.as_map().unwrap())
            .unwrap();

        let settings = server.settings();
        assert_eq!(settings.http_port, 9090);
        assert_eq!(settings.log_level, "debug");
        assert!(server.check_password("correct horse"));
        assert!(!server.check_password("wrong"));
    }

    #[test]
    fn test_rejects_bad_values() {
        let dir = TempDir::new().unwrap();
        let (registry, server) = setup(&dir);
        for (name, value) in [
            ("httpPort", Value::Int(70000)),
            ("logLevel", Value::from("verbose")),
            ("password", Value::from("short")),
        ] {
            let mut values = ValueMap::new();
            values.insert(name.into(), value);
            match registry.set_configuration(SERVER_UUID, &values) {
                Err(RegistryError::InvalidConfiguration { failures, .. }) => {
                    assert!(failures.contains_key(name));
                }
                other => panic!("expected {name} to be rejected, got {other:?}"),
            }
        }
        assert_eq!(server.settings(), ServerSettings::default());
    }
}
