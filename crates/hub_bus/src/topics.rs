//! Well-known topics
//!
//! Paths are relative to the bus root.

/// Root for all server notifications; subscribe here to capture every one
pub const SERVER_NOTIFICATIONS: &str = "private/server/notifications";

/// Periodic liveness message with `messagesReceived` / `messagesHandled`
pub const SERVER_HEARTBEAT: &str = "private/server/notifications/heartbeat";

/// Errors raised while the server is running, payload `{message}`
pub const SERVER_ERRORS: &str = "private/server/notifications/errors";

/// Warnings raised while the server is running, payload `{message}`
pub const SERVER_WARNINGS: &str = "private/server/notifications/warnings";

/// Heartbeat payload field: messages published since the previous heartbeat
pub const HEARTBEAT_RECEIVED: &str = "messagesReceived";

/// Heartbeat payload field: deliveries completed since the previous heartbeat
pub const HEARTBEAT_HANDLED: &str = "messagesHandled";

/// Notification payload field carrying the text
pub const NOTIFICATION_MESSAGE: &str = "message";
