//! Class metadata
//!
//! Descriptions and configuration schemas come from TOML documents:
//!
//! ```toml
//! [[class]]
//! name = "autohub.builtin.NotificationLogger"
//! display_name = "Notification Logger"
//! description = "Mirrors server notifications into the log"
//!
//! [[class.configuration]]
//! name = "logHeartbeats"
//! type = "Boolean"
//! default = false
//! ```
//!
//! Loading only ever feeds the object table; nothing reads back.

use hub_types::{
    ConfigError, ConfigurationDescription, ConfigurationValue, ConfigurationValueType,
    ObjectDescription, UserObjectType, Value,
};
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::registry::ObjectTable;
use crate::storage::{Folder, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("Failed to parse metadata in {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration schema for class {class}: {source}")]
    Schema {
        class: String,
        #[source]
        source: ConfigError,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type MetadataResult<T> = Result<T, MetadataError>;

// ─────────────────────────────────────────────────────────────────────────────
// Document
// ─────────────────────────────────────────────────────────────────────────────

/// One metadata file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataDocument {
    #[serde(default, rename = "class")]
    pub classes: Vec<ClassMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassMetadata {
    /// Fully-qualified class name (or instance UUID)
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub detailed_description: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub configuration: Vec<EntryMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntryMetadata {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: ConfigurationValueType,
    pub default: Value,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub detailed_description: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub options: Vec<OptionMetadata>,
    #[serde(default)]
    pub subtype: Option<UserObjectType>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OptionMetadata {
    pub display_name: String,
    #[serde(default)]
    pub description: String,
}

impl ClassMetadata {
    fn description(&self) -> ObjectDescription {
        ObjectDescription::new(&self.display_name)
            .with_description(&self.description)
            .with_detailed_description(&self.detailed_description)
            .with_icon(&self.icon)
    }

    /// `None` when the class declares no configuration
    fn configuration(&self) -> MetadataResult<Option<ConfigurationDescription>> {
        if self.configuration.is_empty() {
            return Ok(None);
        }
        let schema_error = |source| MetadataError::Schema {
            class: self.name.clone(),
            source,
        };
        let entries = self
            .configuration
            .iter()
            .map(EntryMetadata::build)
            .collect::<Result<Vec<_>, _>>()
            .map_err(schema_error)?;
        ConfigurationDescription::new(entries)
            .map(Some)
            .map_err(schema_error)
    }
}

impl EntryMetadata {
    fn build(&self) -> Result<ConfigurationValue, ConfigError> {
        let mut builder =
            ConfigurationValue::builder(&self.name, self.value_type, self.default.clone())
                .description(&self.description)
                .detailed_description(&self.detailed_description)
                .icon(&self.icon)
                .options(self.options.iter().map(|option| {
                    ObjectDescription::new(&option.display_name)
                        .with_description(&option.description)
                }));
        if let Some(subtype) = self.subtype {
            builder = builder.object_subtype(subtype);
        }
        builder.build()
    }
}

impl MetadataDocument {
    pub fn parse(text: &str, origin: &str) -> MetadataResult<Self> {
        toml::from_str(text).map_err(|source| MetadataError::Parse {
            origin: origin.to_string(),
            source,
        })
    }

    /// Feed every class into the object table.
    ///
    /// All schemas are built before anything is registered, so a bad
    /// document leaves the table untouched.
    pub fn register(&self, registry: &ObjectTable) -> MetadataResult<usize> {
        let mut prepared = Vec::with_capacity(self.classes.len());
        for class in &self.classes {
            prepared.push((class, class.configuration()?));
        }
        for (class, configuration) in prepared {
            registry.add_description(&class.name, class.description());
            if let Some(configuration) = configuration {
                registry.add_configuration_description(&class.name, configuration);
            }
        }
        Ok(self.classes.len())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Loading
// ─────────────────────────────────────────────────────────────────────────────

/// Parse one document and register its classes
pub fn load_str(registry: &ObjectTable, text: &str, origin: &str) -> MetadataResult<usize> {
    let count = MetadataDocument::parse(text, origin)?.register(registry)?;
    debug!(origin, classes = count, "Loaded metadata");
    Ok(count)
}

/// Load every `*.toml` document in a folder.
///
/// A broken document is logged and skipped; the others still load.
pub fn load_folder(registry: &ObjectTable, folder: &Folder) -> MetadataResult<usize> {
    let mut total = 0;
    for name in folder.files_with_extension("toml")? {
        let text = folder.read_to_string(&name)?;
        match load_str(registry, &text, &name) {
            Ok(count) => total += count,
            Err(e) => error!(file = %name, error = %e, "Skipping metadata document"),
        }
    }
    info!(path = %folder.path().display(), classes = total, "Loaded class metadata");
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::JsonConfigStore;
    use hub_types::{UserObject, Uuid};
    use std::sync::Arc;
    use tempfile::TempDir;

    const DOCUMENT: &str = r#"
[[class]]
name = "acme.Thermostat"
display_name = "Thermostat"
description = "Keeps the room warm"

[[class.configuration]]
name = "target"
type = "Numeric"
default = 21

[[class.configuration]]
name = "mode"
type = "OptionList"
default = "heat"
options = [{ display_name = "heat" }, { display_name = "cool" }]

[[class.configuration]]
name = "sensor"
type = "ObjectRef"
default = ""
subtype = "Source"

[[class]]
name = "acme.Plain"
display_name = "Plain"
"#;

    struct Plain(Uuid);

    impl UserObject for Plain {
        fn uuid(&self) -> Uuid {
            self.0
        }

        fn object_type(&self) -> UserObjectType {
            UserObjectType::Plugin
        }

        fn class_name(&self) -> &str {
            "acme.Plain"
        }
    }

    fn table(dir: &TempDir) -> ObjectTable {
        let root = Folder::open_root(dir.path()).unwrap();
        ObjectTable::new(Arc::new(JsonConfigStore::new(&root).unwrap()))
    }

    #[test]
    fn test_parse_document() {
        let document = MetadataDocument::parse(DOCUMENT, "inline").unwrap();
        assert_eq!(document.classes.len(), 2);
        let thermostat = &document.classes[0];
        assert_eq!(thermostat.configuration.len(), 3);
        assert_eq!(thermostat.configuration[0].default, Value::Int(21));
        assert_eq!(thermostat.configuration[2].subtype, Some(UserObjectType::Source));

        let schema = thermostat.configuration().unwrap().unwrap();
        assert_eq!(schema.get("mode").unwrap().options().len(), 2);
        assert!(document.classes[1].configuration().unwrap().is_none());
    }

    #[test]
    fn test_register_feeds_registry() {
        let dir = TempDir::new().unwrap();
        let registry = table(&dir);
        assert_eq!(load_str(&registry, DOCUMENT, "inline").unwrap(), 2);

        let uuid = Uuid::new_v4();
        registry.add_instance(Arc::new(Plain(uuid))).unwrap();
        assert_eq!(registry.describe(uuid).unwrap().display_name, "Plain");
    }

    #[test]
    fn test_bad_schema_registers_nothing() {
        let dir = TempDir::new().unwrap();
        let registry = table(&dir);
        let text = r#"
[[class]]
name = "acme.Plain"
display_name = "Plain"

[[class]]
name = "acme.Broken"
display_name = "Broken"

[[class.configuration]]
name = "choice"
type = "OptionList"
default = "a"
"#;
        assert!(matches!(
            load_str(&registry, text, "broken.toml"),
            Err(MetadataError::Schema { .. })
        ));
        assert!(registry.add_instance(Arc::new(Plain(Uuid::new_v4()))).is_err());
    }

    #[test]
    fn test_load_folder_skips_broken_documents() {
        let dir = TempDir::new().unwrap();
        let registry = table(&dir);
        let root = Folder::open_root(dir.path()).unwrap();
        let metadata = root.open_folder("metadata", true).unwrap();
        metadata.write("acme.toml", DOCUMENT).unwrap();
        metadata.write("broken.toml", "[[class]\nname =").unwrap();
        metadata.write("notes.txt", "ignored").unwrap();

        assert_eq!(load_folder(&registry, &metadata).unwrap(), 2);
    }
}
