//! Notification Logger
//!
//! Mirrors everything published under `private/server/notifications` into
//! the log, so warnings and errors raised on the bus show up on the console.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use hub_bus::topics::{
    HEARTBEAT_HANDLED, HEARTBEAT_RECEIVED, NOTIFICATION_MESSAGE, SERVER_ERRORS, SERVER_HEARTBEAT,
    SERVER_NOTIFICATIONS, SERVER_WARNINGS,
};
use hub_bus::{BusResult, Message, Subscriber, Topic};
use hub_types::{
    ConfigError, Configurable, ConfigurationDescription, UserObject, UserObjectType, Uuid, Value,
    ValueMap,
};
use tracing::{debug, error, info, warn};

use crate::plugin::{Plugin, PluginHost, PluginResult};

pub const NOTIFICATION_LOGGER_UUID: Uuid =
    Uuid::from_u128(0x5c0f4d1e_8a61_4f7e_9d4b_2b7e6f1a9c30);

const CLASS_NAME: &str = "autohub.builtin.NotificationLogger";

#[derive(Debug, Default)]
struct LoggerState {
    log_heartbeats: AtomicBool,
    seen: AtomicU64,
}

#[derive(Debug, Default)]
pub struct NotificationLogger {
    state: Arc<LoggerState>,
}

impl NotificationLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications received since the plugin was enabled
    pub fn notifications_seen(&self) -> u64 {
        self.state.seen.load(Ordering::Relaxed)
    }
}

impl Configurable for NotificationLogger {
    fn apply_configuration(
        &self,
        description: &ConfigurationDescription,
        values: &ValueMap,
    ) -> Result<(), ConfigError> {
        let enabled = description
            .applied_value(values, "logHeartbeats")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        self.state.log_heartbeats.store(enabled, Ordering::Relaxed);
        Ok(())
    }
}

impl UserObject for NotificationLogger {
    fn uuid(&self) -> Uuid {
        NOTIFICATION_LOGGER_UUID
    }

    fn object_type(&self) -> UserObjectType {
        UserObjectType::Plugin
    }

    fn class_name(&self) -> &str {
        CLASS_NAME
    }

    fn configurable(&self) -> Option<&dyn Configurable> {
        Some(self)
    }
}

#[async_trait]
impl Plugin for NotificationLogger {
    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    async fn initialise(&self, host: Arc<PluginHost>) -> PluginResult<bool> {
        let topic = host.create(SERVER_NOTIFICATIONS)?;
        host.subscribe(
            &topic,
            Arc::new(NotificationSink {
                state: Arc::clone(&self.state),
            }),
        )?;
        Ok(true)
    }
}

/// Bus side of the logger; shares the plugin UUID so the host's cleanup
/// removes its subscription
struct NotificationSink {
    state: Arc<LoggerState>,
}

#[async_trait]
impl Subscriber for NotificationSink {
    fn subscriber_id(&self) -> Uuid {
        NOTIFICATION_LOGGER_UUID
    }

    async fn message_received(
        &self,
        topic: Arc<Topic>,
        source: Option<Uuid>,
        message: Arc<Message>,
    ) -> BusResult<()> {
        self.state.seen.fetch_add(1, Ordering::Relaxed);
        let text = message
            .get(NOTIFICATION_MESSAGE)
            .map(Value::to_text)
            .unwrap_or_default();

        match topic.qualified_name() {
            SERVER_HEARTBEAT => {
                let received = message.get(HEARTBEAT_RECEIVED).and_then(Value::as_i64);
                let handled = message.get(HEARTBEAT_HANDLED).and_then(Value::as_i64);
                if self.state.log_heartbeats.load(Ordering::Relaxed) {
                    info!(?received, ?handled, "Heartbeat");
                } else {
                    debug!(?received, ?handled, "Heartbeat");
                }
            }
            SERVER_ERRORS => error!(source = ?source, "{text}"),
            SERVER_WARNINGS => warn!(source = ?source, "{text}"),
            other => info!(topic = other, source = ?source, "{text}"),
        }
        Ok(())
    }
}
