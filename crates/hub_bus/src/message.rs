//! Messages
//!
//! A [`Message`] is an immutable snapshot of a payload plus optional
//! attachments. Messages are assembled with a [`MessageBuilder`], which may be
//! reused: every call to [`MessageBuilder::create_message`] hands out the
//! accumulated state and starts over with an empty builder.

use std::collections::BTreeMap;
use std::sync::Arc;

use hub_types::{Uuid, Value, ValueMap};
use serde::Serialize;
use url::Url;

// ─────────────────────────────────────────────────────────────────────────────
// Message
// ─────────────────────────────────────────────────────────────────────────────

/// An immutable message travelling over the bus
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<Uuid>,
    payload: ValueMap,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    attachments: BTreeMap<String, Url>,
}

impl Message {
    pub fn builder() -> MessageBuilder {
        MessageBuilder::new()
    }

    /// Convenience for a message that only carries a payload
    pub fn from_payload(payload: ValueMap) -> Arc<Self> {
        Arc::new(Self {
            payload,
            ..Default::default()
        })
    }

    /// The object that created this message, if recorded
    pub fn source(&self) -> Option<Uuid> {
        self.source
    }

    /// The object this message is meant for, if any
    pub fn target(&self) -> Option<Uuid> {
        self.target
    }

    pub fn payload(&self) -> &ValueMap {
        &self.payload
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.payload.get(name)
    }

    pub fn attachments(&self) -> &BTreeMap<String, Url> {
        &self.attachments
    }

    pub fn attachment(&self, name: &str) -> Option<&Url> {
        self.attachments.get(name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Message Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Mutable accumulator for message contents
#[derive(Debug, Default)]
pub struct MessageBuilder {
    source: Option<Uuid>,
    target: Option<Uuid>,
    payload: ValueMap,
    attachments: BTreeMap<String, Url>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a payload value. Adding the same name twice keeps the last value.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.payload.insert(name.into(), value.into());
        self
    }

    /// Attach a named resource reference
    pub fn attach(&mut self, name: impl Into<String>, location: Url) -> &mut Self {
        self.attachments.insert(name.into(), location);
        self
    }

    pub fn source(&mut self, source: Uuid) -> &mut Self {
        self.source = Some(source);
        self
    }

    pub fn target(&mut self, target: Uuid) -> &mut Self {
        self.target = Some(target);
        self
    }

    /// Start from the contents of an existing message
    pub fn copy_from(&mut self, message: &Message) -> &mut Self {
        self.source = message.source;
        self.target = message.target;
        self.payload = message.payload.clone();
        self.attachments = message.attachments.clone();
        self
    }

    /// Discard everything added so far
    pub fn clear(&mut self) -> &mut Self {
        *self = Self::default();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty() && self.attachments.is_empty()
    }

    /// Produce an immutable message and reset the builder
    pub fn create_message(&mut self) -> Arc<Message> {
        let built = std::mem::take(self);
        Arc::new(Message {
            source: built.source,
            target: built.target,
            payload: built.payload,
            attachments: built.attachments,
        })
    }
}
