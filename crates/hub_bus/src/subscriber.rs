//! Subscriber contract

use std::sync::Arc;

use async_trait::async_trait;
use hub_types::Uuid;

use crate::{BusResult, Message, Topic};

/// Receives messages published on the topics it is subscribed to.
///
/// Deliveries to one subscriber happen one at a time, in the order the bus
/// dequeued them. Errors and panics are logged by the bus and never reach
/// the publisher.
#[async_trait]
pub trait Subscriber: Send + Sync + 'static {
    /// Stable identity used for subscription bookkeeping and self-echo
    /// suppression. Publishing with `source == subscriber_id()` skips this
    /// subscriber.
    fn subscriber_id(&self) -> Uuid;

    /// Called with the topic the message was published on (which may be a
    /// descendant of the subscribed topic)
    async fn message_received(
        &self,
        topic: Arc<Topic>,
        source: Option<Uuid>,
        message: Arc<Message>,
    ) -> BusResult<()>;
}
