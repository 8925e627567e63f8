//! In-process hierarchical publish/subscribe bus
//!
//! - [`Topic`] - lazily created, memoized nodes of the `/` separated namespace
//! - [`Message`] / [`MessageBuilder`] - immutable payloads and their builder
//! - [`Subscriber`] - the delivery callback contract
//! - [`MessageBus`] - the namespace root with subscription bookkeeping, the
//!   dispatcher task, per-subscriber delivery lanes and the heartbeat

mod bus;
mod message;
mod subscriber;
mod topic;
pub mod topics;

pub use bus::{BusConfig, BusStats, MessageBus, Notification};
pub use message::{Message, MessageBuilder};
pub use subscriber::Subscriber;
pub use topic::{TOPIC_SEPARATOR, Topic, TopicError};

/// Errors raised by the message bus
#[derive(Debug, Clone, thiserror::Error)]
pub enum BusError {
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    #[error("Topic '{0}' does not belong to this message bus")]
    ForeignTopic(String),

    #[error("Message bus needs a running tokio runtime")]
    NoRuntime,

    #[error("Message bus has been shut down")]
    Stopped,

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Result type for bus operations
pub type BusResult<T> = Result<T, BusError>;
