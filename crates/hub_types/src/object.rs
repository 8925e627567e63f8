//! User objects
//!
//! Every entity the object table tracks is a [`UserObject`]: it has a UUID, a
//! type and a fully-qualified class name used to find its description.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{ConfigError, ConfigurationDescription};
use crate::value::{Value, ValueMap};

// ─────────────────────────────────────────────────────────────────────────────
// Object Type
// ─────────────────────────────────────────────────────────────────────────────

/// The kinds of user object the server knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UserObjectType {
    Server,
    Plugin,
    Trigger,
    Filter,
    Action,
    Source,
    TriggerFactory,
    FilterFactory,
    ActionFactory,
    SourceFactory,
}

impl UserObjectType {
    pub fn is_factory(&self) -> bool {
        matches!(
            self,
            UserObjectType::TriggerFactory
                | UserObjectType::FilterFactory
                | UserObjectType::ActionFactory
                | UserObjectType::SourceFactory
        )
    }

    /// Objects a user may create through a factory. These always have a parent.
    pub fn is_user_creatable(&self) -> bool {
        matches!(
            self,
            UserObjectType::Trigger
                | UserObjectType::Filter
                | UserObjectType::Action
                | UserObjectType::Source
        )
    }

    /// Factories, the server and plugins can never be deleted by the user
    pub fn is_deletable(&self) -> bool {
        !(self.is_factory() || matches!(self, UserObjectType::Server | UserObjectType::Plugin))
    }

    pub fn name(&self) -> &'static str {
        match self {
            UserObjectType::Server => "Server",
            UserObjectType::Plugin => "Plugin",
            UserObjectType::Trigger => "Trigger",
            UserObjectType::Filter => "Filter",
            UserObjectType::Action => "Action",
            UserObjectType::Source => "Source",
            UserObjectType::TriggerFactory => "TriggerFactory",
            UserObjectType::FilterFactory => "FilterFactory",
            UserObjectType::ActionFactory => "ActionFactory",
            UserObjectType::SourceFactory => "SourceFactory",
        }
    }
}

impl fmt::Display for UserObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Object Description
// ─────────────────────────────────────────────────────────────────────────────

/// Human-readable description of a class, an instance or a configuration option
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDescription {
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub detailed_description: String,
    #[serde(default)]
    pub icon: String,
}

impl ObjectDescription {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_detailed_description(mut self, detail: impl Into<String>) -> Self {
        self.detailed_description = detail.into();
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    /// Pack into the map shape sent to clients
    pub fn pack(&self) -> ValueMap {
        let mut packed = ValueMap::new();
        packed.insert("displayName".into(), Value::from(self.display_name.as_str()));
        packed.insert("description".into(), Value::from(self.description.as_str()));
        packed.insert(
            "detailedDescription".into(),
            Value::from(self.detailed_description.as_str()),
        );
        packed.insert("icon".into(), Value::from(self.icon.as_str()));
        packed
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Object Traits
// ─────────────────────────────────────────────────────────────────────────────

/// Failure reasons keyed by configuration entry name
pub type ConfigurationFailures = BTreeMap<String, String>;

/// Objects that accept configuration
pub trait Configurable: Send + Sync {
    /// Check a merged set of values before it is applied.
    ///
    /// Add a reason to `failures` for every value that is not acceptable and
    /// return `false` to reject the configuration.
    fn validate_configuration(
        &self,
        _description: &ConfigurationDescription,
        _values: &ValueMap,
        _failures: &mut ConfigurationFailures,
    ) -> bool {
        true
    }

    /// Apply a validated configuration
    fn apply_configuration(
        &self,
        description: &ConfigurationDescription,
        values: &ValueMap,
    ) -> Result<(), ConfigError>;
}

/// An addressable object tracked by the object table
pub trait UserObject: Send + Sync + 'static {
    fn uuid(&self) -> Uuid;

    fn object_type(&self) -> UserObjectType;

    /// Fully-qualified class name, the key for class-level metadata
    fn class_name(&self) -> &str;

    /// The factory that created this object (user-creatable objects only)
    fn parent_uuid(&self) -> Option<Uuid> {
        None
    }

    fn configurable(&self) -> Option<&dyn Configurable> {
        None
    }
}

/// Upcast for trait objects layered on top of [`UserObject`]
pub trait AsUserObject {
    fn as_user_object(self: Arc<Self>) -> Arc<dyn UserObject>;
}

impl<T: UserObject> AsUserObject for T {
    fn as_user_object(self: Arc<Self>) -> Arc<dyn UserObject> {
        self
    }
}
