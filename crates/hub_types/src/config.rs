//! Configuration schema
//!
//! A [`ConfigurationDescription`] is the ordered list of typed entries an
//! object accepts. Each [`ConfigurationValue`] knows how to validate (and
//! coerce) an incoming value; the same check runs on the declared default when
//! the entry is built, so a schema with a bad default never exists.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::object::{ObjectDescription, UserObjectType};
use crate::value::{Value, ValueMap};
use crate::is_valid_topic_path;

/// Minimum length of a non-empty password
pub const MIN_PASSWORD_LENGTH: usize = 8;

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Why a single value was refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("'{0}' is not a whole number")]
    NotANumber(String),

    #[error("Passwords must be empty or at least 8 characters")]
    PasswordTooShort,

    #[error("'{0}' is not one of the available options")]
    UnknownOption(String),

    #[error("'{0}' is not a valid topic path")]
    InvalidTopic(String),
}

/// Errors raised while building or applying configuration
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("Default for '{name}' is invalid: {source}")]
    InvalidDefault {
        name: String,
        #[source]
        source: ValidationError,
    },

    #[error("Option list '{0}' declares no options")]
    MissingOptions(String),

    #[error("Object field '{0}' requires an object subtype")]
    MissingSubtype(String),

    #[error("Configuration entry '{0}' is declared more than once")]
    DuplicateEntry(String),

    #[error("Unknown configuration entry '{0}'")]
    UnknownEntry(String),

    #[error("Invalid value for '{name}': {source}")]
    InvalidValue {
        name: String,
        #[source]
        source: ValidationError,
    },

    #[error("Failed to apply configuration: {0}")]
    ApplyFailed(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Value Type
// ─────────────────────────────────────────────────────────────────────────────

/// The types a configuration entry may have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfigurationValueType {
    Boolean,
    Numeric,
    Date,
    Time,
    String,
    Topic,
    Text,
    Password,
    Script,
    ObjectRef,
    ObjectList,
    OptionList,
}

impl fmt::Display for ConfigurationValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration Value
// ─────────────────────────────────────────────────────────────────────────────

/// A single typed configuration entry
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationValue {
    description: ObjectDescription,
    value_type: ConfigurationValueType,
    default_value: Value,
    options: Vec<ObjectDescription>,
    object_subtype: Option<UserObjectType>,
}

impl ConfigurationValue {
    /// Start building an entry. `name` is the entry's display name and key.
    pub fn builder(
        name: impl Into<String>,
        value_type: ConfigurationValueType,
        default_value: impl Into<Value>,
    ) -> ConfigurationValueBuilder {
        ConfigurationValueBuilder {
            description: ObjectDescription::new(name),
            value_type,
            default_value: default_value.into(),
            options: Vec::new(),
            object_subtype: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.description.display_name
    }

    pub fn description(&self) -> &ObjectDescription {
        &self.description
    }

    pub fn value_type(&self) -> ConfigurationValueType {
        self.value_type
    }

    pub fn default_value(&self) -> &Value {
        &self.default_value
    }

    pub fn options(&self) -> &[ObjectDescription] {
        &self.options
    }

    pub fn object_subtype(&self) -> Option<UserObjectType> {
        self.object_subtype
    }

    /// Validate a value for this entry, returning the value to store.
    ///
    /// The returned value may differ from the input (numbers parsed from
    /// strings, strings coerced from scalars).
    pub fn validate(&self, value: &Value) -> Result<Value, ValidationError> {
        match self.value_type {
            ConfigurationValueType::String
            | ConfigurationValueType::Text
            | ConfigurationValueType::Script => Ok(Value::String(value.to_text())),
            ConfigurationValueType::Topic => {
                let text = value.to_text();
                if text.is_empty() || is_valid_topic_path(&text) {
                    Ok(Value::String(text))
                } else {
                    Err(ValidationError::InvalidTopic(text))
                }
            }
            ConfigurationValueType::Password => {
                let text = value.to_text();
                if text.is_empty() || text.chars().count() >= MIN_PASSWORD_LENGTH {
                    Ok(Value::String(text))
                } else {
                    Err(ValidationError::PasswordTooShort)
                }
            }
            ConfigurationValueType::Boolean => match value {
                Value::Bool(b) => Ok(Value::Bool(*b)),
                other => Ok(Value::Bool(other.to_text().eq_ignore_ascii_case("true"))),
            },
            ConfigurationValueType::Numeric => match value {
                Value::Int(i) => Ok(Value::Int(*i)),
                other => {
                    let text = other.to_text();
                    text.trim()
                        .parse::<i64>()
                        .map(Value::Int)
                        .map_err(|_| ValidationError::NotANumber(text))
                }
            },
            ConfigurationValueType::OptionList => {
                let text = value.to_text();
                if self.options.iter().any(|o| o.display_name == text) {
                    Ok(Value::String(text))
                } else {
                    Err(ValidationError::UnknownOption(text))
                }
            }
            // Checked by the code that resolves object references and dates.
            ConfigurationValueType::ObjectRef
            | ConfigurationValueType::ObjectList
            | ConfigurationValueType::Date
            | ConfigurationValueType::Time => Ok(value.clone()),
        }
    }

    /// Pack into the map shape sent to clients
    pub fn pack(&self) -> ValueMap {
        let mut packed = self.description.pack();
        packed.insert("type".into(), Value::from(self.value_type.to_string()));
        packed.insert("defaultValue".into(), self.default_value.clone());
        if !self.options.is_empty() {
            packed.insert(
                "options".into(),
                Value::List(self.options.iter().map(|o| Value::Map(o.pack())).collect()),
            );
        }
        if let Some(subtype) = self.object_subtype {
            packed.insert("subtype".into(), Value::from(subtype.name()));
        }
        packed
    }
}

/// Builder for [`ConfigurationValue`]; `build` validates the default
pub struct ConfigurationValueBuilder {
    description: ObjectDescription,
    value_type: ConfigurationValueType,
    default_value: Value,
    options: Vec<ObjectDescription>,
    object_subtype: Option<UserObjectType>,
}

impl ConfigurationValueBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description.description = description.into();
        self
    }

    pub fn detailed_description(mut self, detail: impl Into<String>) -> Self {
        self.description.detailed_description = detail.into();
        self
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.description.icon = icon.into();
        self
    }

    /// Add a selectable option (OptionList entries)
    pub fn option(mut self, option: ObjectDescription) -> Self {
        self.options.push(option);
        self
    }

    pub fn options(mut self, options: impl IntoIterator<Item = ObjectDescription>) -> Self {
        self.options.extend(options);
        self
    }

    /// Object type accepted by ObjectRef/ObjectList entries
    pub fn object_subtype(mut self, subtype: UserObjectType) -> Self {
        self.object_subtype = Some(subtype);
        self
    }

    pub fn build(self) -> Result<ConfigurationValue, ConfigError> {
        let name = self.description.display_name.clone();
        match self.value_type {
            ConfigurationValueType::OptionList if self.options.is_empty() => {
                return Err(ConfigError::MissingOptions(name));
            }
            ConfigurationValueType::ObjectRef | ConfigurationValueType::ObjectList
                if self.object_subtype.is_none() =>
            {
                return Err(ConfigError::MissingSubtype(name));
            }
            _ => {}
        }

        let mut value = ConfigurationValue {
            description: self.description,
            value_type: self.value_type,
            default_value: Value::Null,
            options: self.options,
            object_subtype: self.object_subtype,
        };
        value.default_value = value
            .validate(&self.default_value)
            .map_err(|source| ConfigError::InvalidDefault { name, source })?;
        Ok(value)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration Description
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered, immutable set of configuration entries with a name index
#[derive(Debug, Clone, Default)]
pub struct ConfigurationDescription {
    entries: Vec<ConfigurationValue>,
    index: HashMap<String, usize>,
}

impl ConfigurationDescription {
    pub fn new(entries: Vec<ConfigurationValue>) -> Result<Self, ConfigError> {
        let mut index = HashMap::with_capacity(entries.len());
        for (position, entry) in entries.iter().enumerate() {
            if index.insert(entry.name().to_string(), position).is_some() {
                return Err(ConfigError::DuplicateEntry(entry.name().to_string()));
            }
        }
        Ok(Self { entries, index })
    }

    pub fn get(&self, name: &str) -> Option<&ConfigurationValue> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigurationValue> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge caller values with defaults and validate every declared entry.
    ///
    /// Entries that fail validation are pushed onto `failures` and left out of
    /// the merged map. A failure does not abort the merge: the map is still
    /// returned, and callers decide whether recorded failures are fatal.
    pub fn verify(&self, values: &ValueMap, failures: &mut Vec<String>) -> Option<ValueMap> {
        let mut merged = ValueMap::new();
        for entry in &self.entries {
            let source = values.get(entry.name()).unwrap_or(entry.default_value());
            match entry.validate(source) {
                Ok(adjusted) => {
                    merged.insert(entry.name().to_string(), adjusted);
                }
                Err(_) => failures.push(entry.name().to_string()),
            }
        }
        Some(merged)
    }

    /// The explicit value for `name` if present, otherwise its default
    pub fn applied_value<'a>(&'a self, values: &'a ValueMap, name: &str) -> Option<&'a Value> {
        let entry = self.get(name)?;
        Some(values.get(name).unwrap_or(entry.default_value()))
    }

    /// Pack into the list shape sent to clients
    pub fn pack(&self) -> Value {
        Value::List(self.entries.iter().map(|e| Value::Map(e.pack())).collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
