//! Message Bus
//!
//! The bus is the root of the topic namespace. Publishing snapshots the set
//! of interested subscribers (those on the topic and on every ancestor) and
//! queues a job for the dispatcher task, returning immediately.
//!
//! The dispatcher fans each job out to per-subscriber delivery lanes. A lane
//! delivers one message at a time, so a given subscriber sees messages in the
//! order they were dequeued, while a slow or failing subscriber only holds up
//! its own lane. Callback execution is bounded by a shared semaphore.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use hub_types::Uuid;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};

use crate::topics::{
    HEARTBEAT_HANDLED, HEARTBEAT_RECEIVED, NOTIFICATION_MESSAGE, SERVER_ERRORS, SERVER_HEARTBEAT,
    SERVER_WARNINGS,
};
use crate::{BusError, BusResult, Message, MessageBuilder, Subscriber, Topic};

const MIN_HEARTBEAT_PERIOD: Duration = Duration::from_millis(10);

// ─────────────────────────────────────────────────────────────────────────────
// Configuration & Stats
// ─────────────────────────────────────────────────────────────────────────────

/// Tunables for a message bus
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Interval between heartbeat messages
    pub heartbeat_period: Duration,
    /// Maximum number of subscriber callbacks running at once
    pub max_concurrent_deliveries: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            heartbeat_period: Duration::from_secs(60),
            max_concurrent_deliveries: 64,
        }
    }
}

/// Throughput counters since the last heartbeat
#[derive(Debug, Default)]
pub struct BusStats {
    received: AtomicU64,
    handled: AtomicU64,
}

impl BusStats {
    /// Messages published
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::SeqCst)
    }

    /// Deliveries a subscriber completed without error
    pub fn handled(&self) -> u64 {
        self.handled.load(Ordering::SeqCst)
    }

    fn take(&self) -> (u64, u64) {
        (
            self.received.swap(0, Ordering::SeqCst),
            self.handled.swap(0, Ordering::SeqCst),
        )
    }
}

/// Kinds of server notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    Error,
    Warning,
}

impl Notification {
    pub fn topic_path(&self) -> &'static str {
        match self {
            Notification::Error => SERVER_ERRORS,
            Notification::Warning => SERVER_WARNINGS,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Subscription Table
// ─────────────────────────────────────────────────────────────────────────────

/// Both directions of the topic/subscriber relation, always updated together
#[derive(Default)]
struct SubscriptionTable {
    by_topic: HashMap<String, HashSet<Uuid>>,
    by_subscriber: HashMap<Uuid, HashMap<String, Arc<Topic>>>,
    subscribers: HashMap<Uuid, Arc<dyn Subscriber>>,
}

impl SubscriptionTable {
    fn insert(&mut self, topic: &Arc<Topic>, subscriber: Arc<dyn Subscriber>) {
        let id = subscriber.subscriber_id();
        let name = topic.qualified_name().to_string();
        self.by_topic.entry(name.clone()).or_default().insert(id);
        self.by_subscriber
            .entry(id)
            .or_default()
            .insert(name, Arc::clone(topic));
        self.subscribers.insert(id, subscriber);
    }

    /// Remove one pair. Returns true when the subscriber has no topics left.
    fn remove(&mut self, topic_name: &str, id: Uuid) -> bool {
        if let Some(ids) = self.by_topic.get_mut(topic_name) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_topic.remove(topic_name);
            }
        }
        let Some(topics) = self.by_subscriber.get_mut(&id) else {
            return false;
        };
        topics.remove(topic_name);
        if topics.is_empty() {
            self.by_subscriber.remove(&id);
            self.subscribers.remove(&id);
            return true;
        }
        false
    }

    fn remove_all(&mut self, id: Uuid) -> usize {
        let Some(topics) = self.by_subscriber.remove(&id) else {
            return 0;
        };
        for name in topics.keys() {
            if let Some(ids) = self.by_topic.get_mut(name) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.by_topic.remove(name);
                }
            }
        }
        self.subscribers.remove(&id);
        topics.len()
    }

    /// Subscribers on `topic` and on every ancestor, each at most once
    fn collect(&self, topic: &Arc<Topic>) -> Vec<Arc<dyn Subscriber>> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        let mut current = Some(Arc::clone(topic));
        while let Some(node) = current {
            if let Some(ids) = self.by_topic.get(node.qualified_name()) {
                for id in ids {
                    if seen.insert(*id) {
                        if let Some(subscriber) = self.subscribers.get(id) {
                            found.push(Arc::clone(subscriber));
                        }
                    }
                }
            }
            current = node.parent();
        }
        found
    }

    fn topics_of(&self, id: Uuid) -> Vec<Arc<Topic>> {
        self.by_subscriber
            .get(&id)
            .map(|topics| topics.values().cloned().collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        let forward = self
            .by_topic
            .iter()
            .all(|(name, ids)| {
                !ids.is_empty()
                    && ids.iter().all(|id| {
                        self.by_subscriber
                            .get(id)
                            .is_some_and(|topics| topics.contains_key(name))
                    })
            });
        let backward = self.by_subscriber.iter().all(|(id, topics)| {
            !topics.is_empty()
                && self.subscribers.contains_key(id)
                && topics.keys().all(|name| {
                    self.by_topic
                        .get(name)
                        .is_some_and(|ids| ids.contains(id))
                })
        });
        forward && backward && self.subscribers.len() == self.by_subscriber.len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Queue Items
// ─────────────────────────────────────────────────────────────────────────────

/// A published message waiting for the dispatcher
struct QueuedMessage {
    topic: Arc<Topic>,
    subscribers: Vec<Arc<dyn Subscriber>>,
    source: Option<Uuid>,
    message: Arc<Message>,
}

/// One message bound for one subscriber lane
struct Delivery {
    topic: Arc<Topic>,
    source: Option<Uuid>,
    message: Arc<Message>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Message Bus
// ─────────────────────────────────────────────────────────────────────────────

/// Root of the topic namespace plus subscription bookkeeping and delivery
pub struct MessageBus {
    root: Arc<Topic>,
    public: Arc<Topic>,
    private: Arc<Topic>,
    heartbeat: Arc<Topic>,

    /// Single bus-wide lock for subscription bookkeeping
    subscriptions: Mutex<SubscriptionTable>,

    queue_tx: mpsc::UnboundedSender<QueuedMessage>,

    /// Delivery lanes indexed by subscriber id
    lanes: DashMap<Uuid, mpsc::UnboundedSender<Delivery>>,

    workers: Arc<Semaphore>,
    stats: Arc<BusStats>,
    runtime: Handle,
    shutdown_tx: watch::Sender<bool>,
}

impl MessageBus {
    /// Build the bus and spawn its dispatcher on the current tokio runtime
    pub fn start(config: BusConfig) -> BusResult<Arc<Self>> {
        let runtime = Handle::try_current().map_err(|_| BusError::NoRuntime)?;

        let root = Topic::root();
        let public = root.create("public")?;
        let private = root.create("private")?;
        let heartbeat = root.create(SERVER_HEARTBEAT)?;

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let bus = Arc::new(Self {
            root,
            public,
            private,
            heartbeat,
            subscriptions: Mutex::new(SubscriptionTable::default()),
            queue_tx,
            lanes: DashMap::new(),
            workers: Arc::new(Semaphore::new(config.max_concurrent_deliveries.max(1))),
            stats: Arc::new(BusStats::default()),
            runtime: runtime.clone(),
            shutdown_tx,
        });

        let period = config.heartbeat_period.max(MIN_HEARTBEAT_PERIOD);
        runtime.spawn(run_dispatcher(
            Arc::downgrade(&bus),
            queue_rx,
            shutdown_rx,
            period,
        ));

        tracing::info!(
            heartbeat_secs = period.as_secs_f64(),
            workers = config.max_concurrent_deliveries,
            "Message bus started"
        );
        Ok(bus)
    }

    /// The namespace root (the empty topic)
    pub fn root(&self) -> &Arc<Topic> {
        &self.root
    }

    /// Root for topics visible to remote clients
    pub fn public(&self) -> &Arc<Topic> {
        &self.public
    }

    /// Root for server and plugin internal topics
    pub fn private(&self) -> &Arc<Topic> {
        &self.private
    }

    /// Create (or acquire) a topic relative to the root
    pub fn create(&self, path: &str) -> BusResult<Arc<Topic>> {
        Ok(self.root.create(path)?)
    }

    pub fn stats(&self) -> &BusStats {
        &self.stats
    }

    pub fn is_running(&self) -> bool {
        !*self.shutdown_tx.borrow()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Subscriptions
    // ─────────────────────────────────────────────────────────────────────

    pub fn subscribe(&self, topic: &Arc<Topic>, subscriber: Arc<dyn Subscriber>) -> BusResult<()> {
        self.ensure_owned(topic)?;
        let id = subscriber.subscriber_id();
        self.subscriptions.lock().insert(topic, subscriber);
        tracing::debug!(subscriber = %id, topic = %topic, "Subscribed");
        Ok(())
    }

    pub fn unsubscribe(&self, topic: &Arc<Topic>, subscriber: Uuid) {
        let mut table = self.subscriptions.lock();
        if table.remove(topic.qualified_name(), subscriber) {
            self.lanes.remove(&subscriber);
        }
        tracing::debug!(subscriber = %subscriber, topic = %topic, "Unsubscribed");
    }

    /// Drop every subscription held by `subscriber`
    pub fn unsubscribe_all(&self, subscriber: Uuid) {
        let mut table = self.subscriptions.lock();
        let removed = table.remove_all(subscriber);
        self.lanes.remove(&subscriber);
        tracing::debug!(subscriber = %subscriber, removed, "Unsubscribed from all topics");
    }

    /// Topics `subscriber` is currently attached to
    pub fn subscriptions_of(&self, subscriber: Uuid) -> Vec<Arc<Topic>> {
        self.subscriptions.lock().topics_of(subscriber)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Publishing
    // ─────────────────────────────────────────────────────────────────────

    /// Queue `message` for every subscriber of `topic` or one of its ancestors.
    ///
    /// Never waits for delivery. A subscriber whose id equals `source` is
    /// skipped.
    pub fn publish(
        &self,
        topic: &Arc<Topic>,
        message: Arc<Message>,
        source: Option<Uuid>,
    ) -> BusResult<()> {
        if !self.is_running() {
            return Err(BusError::Stopped);
        }
        self.ensure_owned(topic)?;
        self.stats.received.fetch_add(1, Ordering::SeqCst);
        self.enqueue(topic, message, source)
    }

    /// Publish `{message: text}` to the errors or warnings topic
    pub fn notify(&self, kind: Notification, text: impl Into<String>) -> BusResult<()> {
        let topic = self.create(kind.topic_path())?;
        let mut builder = MessageBuilder::new();
        builder.add(NOTIFICATION_MESSAGE, text.into());
        self.publish(&topic, builder.create_message(), None)
    }

    /// Publish the heartbeat and reset the counters.
    ///
    /// The heartbeat itself is not counted as a received message.
    pub fn emit_heartbeat(&self) {
        let (received, handled) = self.stats.take();
        tracing::info!(
            received,
            handled,
            "Received {received} messages, {handled} dispatched to subscribers"
        );
        let mut builder = MessageBuilder::new();
        builder
            .add(HEARTBEAT_RECEIVED, received)
            .add(HEARTBEAT_HANDLED, handled);
        let heartbeat = Arc::clone(&self.heartbeat);
        if let Err(e) = self.enqueue(&heartbeat, builder.create_message(), None) {
            tracing::debug!(error = %e, "Heartbeat not delivered");
        }
    }

    /// Stop the dispatcher and all delivery lanes. Later publishes fail.
    pub fn shutdown(&self) {
        if self.shutdown_tx.send_replace(true) {
            return;
        }
        self.workers.close();
        self.lanes.clear();
        tracing::info!("Message bus stopped");
    }

    fn ensure_owned(&self, topic: &Arc<Topic>) -> BusResult<()> {
        if self.root.is_ancestor_of(topic) {
            Ok(())
        } else {
            Err(BusError::ForeignTopic(topic.to_string()))
        }
    }

    fn enqueue(&self, topic: &Arc<Topic>, message: Arc<Message>, source: Option<Uuid>) -> BusResult<()> {
        let subscribers = self.subscriptions.lock().collect(topic);
        if subscribers.is_empty() {
            return Ok(());
        }
        self.queue_tx
            .send(QueuedMessage {
                topic: Arc::clone(topic),
                subscribers,
                source,
                message,
            })
            .map_err(|_| BusError::Stopped)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Dispatch
    // ─────────────────────────────────────────────────────────────────────

    /// Hand a dequeued job to each recipient's lane
    fn dispatch(&self, queued: QueuedMessage) {
        for subscriber in queued.subscribers {
            let id = subscriber.subscriber_id();
            if queued.source == Some(id) {
                continue;
            }
            let Some(lane) = self.lane_for(subscriber) else {
                tracing::trace!(subscriber = %id, "Skipping delivery to departed subscriber");
                continue;
            };
            let delivery = Delivery {
                topic: Arc::clone(&queued.topic),
                source: queued.source,
                message: Arc::clone(&queued.message),
            };
            if lane.send(delivery).is_err() {
                tracing::warn!(subscriber = %id, "Delivery lane closed");
            }
        }
    }

    /// Existing lane, or a new one while the subscriber is still registered
    fn lane_for(&self, subscriber: Arc<dyn Subscriber>) -> Option<mpsc::UnboundedSender<Delivery>> {
        let id = subscriber.subscriber_id();
        if let Some(lane) = self.lanes.get(&id) {
            return Some(lane.clone());
        }
        let table = self.subscriptions.lock();
        if !table.subscribers.contains_key(&id) {
            return None;
        }
        let lane = self
            .lanes
            .entry(id)
            .or_insert_with(|| {
                let (tx, rx) = mpsc::unbounded_channel();
                self.runtime.spawn(run_lane(
                    subscriber,
                    rx,
                    Arc::clone(&self.workers),
                    Arc::clone(&self.stats),
                ));
                tx
            })
            .clone();
        Some(lane)
    }

    #[cfg(test)]
    fn subscriptions_consistent(&self) -> bool {
        self.subscriptions.lock().is_consistent()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Background Tasks
// ─────────────────────────────────────────────────────────────────────────────

/// Dispatcher loop: drains the queue and fires the heartbeat
async fn run_dispatcher(
    bus: Weak<MessageBus>,
    mut queue_rx: mpsc::UnboundedReceiver<QueuedMessage>,
    mut shutdown_rx: watch::Receiver<bool>,
    period: Duration,
) {
    let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }

            queued = queue_rx.recv() => {
                let Some(queued) = queued else { break };
                let Some(bus) = bus.upgrade() else { break };
                bus.dispatch(queued);
            }

            _ = heartbeat.tick() => {
                let Some(bus) = bus.upgrade() else { break };
                bus.emit_heartbeat();
            }
        }
    }

    tracing::debug!("Message bus dispatcher stopped");
}

/// Deliver to one subscriber, one message at a time
async fn run_lane(
    subscriber: Arc<dyn Subscriber>,
    mut rx: mpsc::UnboundedReceiver<Delivery>,
    workers: Arc<Semaphore>,
    stats: Arc<BusStats>,
) {
    let id = subscriber.subscriber_id();
    while let Some(delivery) = rx.recv().await {
        let Ok(permit) = Arc::clone(&workers).acquire_owned().await else {
            break;
        };
        let topic_name = delivery.topic.to_string();
        let target = Arc::clone(&subscriber);
        let task = tokio::spawn(async move {
            let _permit = permit;
            target
                .message_received(delivery.topic, delivery.source, delivery.message)
                .await
        });

        match task.await {
            Ok(Ok(())) => {
                stats.handled.fetch_add(1, Ordering::SeqCst);
            }
            Ok(Err(e)) => {
                tracing::error!(
                    subscriber = %id,
                    topic = %topic_name,
                    error = %e,
                    "Failed to dispatch message to subscriber"
                );
            }
            Err(e) if e.is_panic() => {
                tracing::error!(
                    subscriber = %id,
                    topic = %topic_name,
                    "Subscriber panicked while handling message"
                );
            }
            Err(e) => {
                tracing::warn!(subscriber = %id, error = %e, "Delivery cancelled");
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
