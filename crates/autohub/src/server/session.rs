//! RPC Sessions
//!
//! A [`Session`] is one connected client. Frames for it go into an
//! unbounded channel the transport drains; [`RemoteSubscriber`] lets the
//! session take part in the bus like any other subscriber.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use hub_bus::{BusError, BusResult, Message, Subscriber, Topic};
use hub_types::Uuid;
use tokio::sync::mpsc;
use tracing::trace;

use super::protocol::ServerFrame;

pub struct Session {
    id: Uuid,
    authenticated: AtomicBool,
    outbound: mpsc::UnboundedSender<ServerFrame>,
}

impl Session {
    /// New session and the receiving end of its outbound frames
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerFrame>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            id: Uuid::new_v4(),
            authenticated: AtomicBool::new(false),
            outbound,
        });
        (session, rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.store(authenticated, Ordering::SeqCst);
    }

    /// Queue a frame; `false` once the client has gone away
    pub fn send(&self, frame: ServerFrame) -> bool {
        self.outbound.send(frame).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

/// Forwards bus deliveries to a session as `message` frames
pub struct RemoteSubscriber {
    session: Arc<Session>,
}

impl RemoteSubscriber {
    pub fn new(session: Arc<Session>) -> Arc<Self> {
        Arc::new(Self { session })
    }
}

#[async_trait]
impl Subscriber for RemoteSubscriber {
    fn subscriber_id(&self) -> Uuid {
        self.session.id()
    }

    async fn message_received(
        &self,
        topic: Arc<Topic>,
        source: Option<Uuid>,
        message: Arc<Message>,
    ) -> BusResult<()> {
        trace!(session = %self.session.id(), topic = %topic, "Forwarding message");
        let frame = ServerFrame::Message {
            topic: topic.qualified_name().to_string(),
            source,
            payload: message.payload().clone(),
        };
        if self.session.send(frame) {
            Ok(())
        } else {
            Err(BusError::Delivery(format!(
                "session {} is closed",
                self.session.id()
            )))
        }
    }
}
