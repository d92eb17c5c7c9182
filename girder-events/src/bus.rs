//! Queue-based event bus.
//!
//! Dispatch enqueues the message; a single consumer task drains the queue in
//! FIFO order and spawns one task per matching subscriber. Queue order is
//! therefore a delivery-order guarantee (message N fans out before message
//! N+1), not a completion-order guarantee.

use crate::event::{AnyEventHandler, DynEventHandler, Event, EventHandler, FnEventHandler, TypedEventHandler};
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// What dispatch does when a bounded queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Wait for queue space.
    Block,
    /// Drop the message being dispatched and log it.
    DropNewest,
}

/// Bus queue configuration.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Queue capacity; `None` is unbounded.
    pub capacity: Option<usize>,
    /// Overflow policy for bounded queues.
    pub overflow: OverflowPolicy,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: None,
            overflow: OverflowPolicy::Block,
        }
    }
}

enum QueueSender {
    Unbounded(mpsc::UnboundedSender<Arc<dyn Event>>),
    Bounded(mpsc::Sender<Arc<dyn Event>>),
}

/// In-process asynchronous publish/subscribe bus.
///
/// Subscribers are matched by the message's dynamic type: typed subscribers
/// receive exactly the messages of their declared type, catch-all
/// subscribers receive everything. Each delivery runs in its own task.
#[derive(Clone)]
pub struct EventBus {
    subscriptions: Arc<RwLock<Vec<Arc<dyn DynEventHandler>>>>,
    sender: Arc<QueueSender>,
    config: BusConfig,
}

impl EventBus {
    /// Create a bus with an unbounded queue and start its consumer task.
    /// Must be called inside a tokio runtime.
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    pub fn with_config(config: BusConfig) -> Self {
        let subscriptions: Arc<RwLock<Vec<Arc<dyn DynEventHandler>>>> =
            Arc::new(RwLock::new(Vec::new()));

        let sender = match config.capacity {
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                tokio::spawn(consume_unbounded(rx, subscriptions.clone()));
                QueueSender::Unbounded(tx)
            }
            Some(capacity) => {
                let (tx, rx) = mpsc::channel(capacity);
                tokio::spawn(consume_bounded(rx, subscriptions.clone()));
                QueueSender::Bounded(tx)
            }
        };

        info!(capacity = ?config.capacity, "Event bus started");
        Self {
            subscriptions,
            sender: Arc::new(sender),
            config,
        }
    }

    /// Subscribe a typed handler.
    pub fn subscribe<E, H>(&self, handler: H)
    where
        E: Event,
        H: EventHandler<E> + 'static,
    {
        self.add_subscription(Arc::new(TypedEventHandler::new(handler)));
    }

    /// Subscribe a typed async closure. The closure's declared parameter
    /// type is the subscription key.
    pub fn subscribe_fn<E, F, Fut>(&self, f: F)
    where
        E: Event,
        F: Fn(Arc<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.add_subscription(Arc::new(FnEventHandler::new(f)));
    }

    /// Subscribe a catch-all closure receiving every message.
    pub fn subscribe_any<F, Fut>(&self, f: F)
    where
        F: Fn(Arc<dyn Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.add_subscription(Arc::new(AnyEventHandler::new(f)));
    }

    fn add_subscription(&self, handler: Arc<dyn DynEventHandler>) {
        let mut subscriptions = self.subscriptions.write();
        subscriptions.push(handler);
        debug!(total = subscriptions.len(), "Subscriber added");
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Enqueue a message for delivery. Returns once the message is queued;
    /// subscribers run asynchronously afterwards.
    pub async fn dispatch<E: Event>(&self, event: E) {
        let name = event.event_name().to_string();
        let event: Arc<dyn Event> = Arc::new(event);
        match &*self.sender {
            QueueSender::Unbounded(tx) => {
                if tx.send(event).is_err() {
                    error!(event = %name, "Event bus consumer is gone; message dropped");
                }
            }
            QueueSender::Bounded(tx) => match self.config.overflow {
                OverflowPolicy::Block => {
                    if tx.send(event).await.is_err() {
                        error!(event = %name, "Event bus consumer is gone; message dropped");
                    }
                }
                OverflowPolicy::DropNewest => {
                    if let Err(err) = tx.try_send(event) {
                        match err {
                            mpsc::error::TrySendError::Full(_) => {
                                warn!(event = %name, "Event bus queue full; message dropped");
                            }
                            mpsc::error::TrySendError::Closed(_) => {
                                error!(event = %name, "Event bus consumer is gone; message dropped");
                            }
                        }
                    }
                }
            },
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

async fn consume_unbounded(
    mut rx: mpsc::UnboundedReceiver<Arc<dyn Event>>,
    subscriptions: Arc<RwLock<Vec<Arc<dyn DynEventHandler>>>>,
) {
    while let Some(event) = rx.recv().await {
        fan_out(event, &subscriptions);
    }
}

async fn consume_bounded(
    mut rx: mpsc::Receiver<Arc<dyn Event>>,
    subscriptions: Arc<RwLock<Vec<Arc<dyn DynEventHandler>>>>,
) {
    while let Some(event) = rx.recv().await {
        fan_out(event, &subscriptions);
    }
}

/// Deliver one message: spawn a task per matching subscriber. The consumer
/// never awaits handlers, so a slow subscriber cannot stall the queue.
fn fan_out(event: Arc<dyn Event>, subscriptions: &RwLock<Vec<Arc<dyn DynEventHandler>>>) {
    let matching: Vec<Arc<dyn DynEventHandler>> = subscriptions
        .read()
        .iter()
        .filter(|handler| handler.matches(event.as_ref()))
        .cloned()
        .collect();

    debug!(event = %event.event_name(), subscribers = matching.len(), "Delivering event");
    for handler in matching {
        let event = event.clone();
        tokio::spawn(async move {
            if let Err(err) = handler.handle_dyn(event.clone()).await {
                error!(event = %event.event_name(), error = %err, "Event handler failed");
            }
        });
    }
}

/// A named subscription from a controller's subscription table, registered
/// against the bus at startup.
#[derive(Clone)]
pub struct SubscriptionDef {
    name: &'static str,
    registrar: Arc<dyn Fn(&EventBus) + Send + Sync>,
}

impl SubscriptionDef {
    /// Define a named typed subscription.
    pub fn new<E, F, Fut>(name: &'static str, f: F) -> Self
    where
        E: Event,
        F: Fn(Arc<E>) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            name,
            registrar: Arc::new(move |bus| bus.subscribe_fn(f.clone())),
        }
    }

    /// Define a named catch-all subscription.
    pub fn new_any<F, Fut>(name: &'static str, f: F) -> Self
    where
        F: Fn(Arc<dyn Event>) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            name,
            registrar: Arc::new(move |bus| bus.subscribe_any(f.clone())),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn register(&self, bus: &EventBus) {
        debug!(subscription = self.name, "Registering subscription");
        (self.registrar)(bus);
    }
}

impl std::fmt::Debug for SubscriptionDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionDef")
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventMetadata;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::any::Any;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Notify;
    use uuid::Uuid;

    #[derive(Debug, Clone)]
    struct UserCreated {
        metadata: EventMetadata,
        user: String,
    }

    impl UserCreated {
        fn new(user: &str) -> Self {
            Self {
                metadata: EventMetadata::new("user_created"),
                user: user.to_string(),
            }
        }
    }

    impl Event for UserCreated {
        fn event_name(&self) -> &str {
            &self.metadata.name
        }

        fn event_id(&self) -> Uuid {
            self.metadata.id
        }

        fn timestamp(&self) -> DateTime<Utc> {
            self.metadata.timestamp
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    #[derive(Debug, Clone)]
    struct UserDeleted {
        metadata: EventMetadata,
    }

    impl UserDeleted {
        fn new() -> Self {
            Self {
                metadata: EventMetadata::new("user_deleted"),
            }
        }
    }

    impl Event for UserDeleted {
        fn event_name(&self) -> &str {
            &self.metadata.name
        }

        fn event_id(&self) -> Uuid {
            self.metadata.id
        }

        fn timestamp(&self) -> DateTime<Utc> {
            self.metadata.timestamp
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    // Completion signaling uses an mpsc channel: unlike Notify, every
    // handler invocation is observed even when they finish before the
    // test starts waiting.
    #[derive(Clone)]
    struct CountingHandler {
        counter: Arc<AtomicU32>,
        done: mpsc::UnboundedSender<()>,
    }

    #[async_trait]
    impl EventHandler<UserCreated> for CountingHandler {
        async fn handle(&self, _event: &UserCreated) -> Result<(), crate::EventHandlerError> {
            self.counter.fetch_add(1, Ordering::SeqCst);
            let _ = self.done.send(());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_typed_delivery() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicU32::new(0));
        let (done, mut completed) = mpsc::unbounded_channel();
        bus.subscribe(CountingHandler {
            counter: counter.clone(),
            done,
        });

        bus.dispatch(UserCreated::new("alice")).await;
        completed.recv().await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exactly_once_per_dispatch() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicU32::new(0));
        let (done, mut completed) = mpsc::unbounded_channel();
        bus.subscribe(CountingHandler {
            counter: counter.clone(),
            done,
        });

        bus.dispatch(UserCreated::new("a")).await;
        bus.dispatch(UserCreated::new("b")).await;
        completed.recv().await.unwrap();
        completed.recv().await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_delivery_for_other_types() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicU32::new(0));
        let done = Arc::new(Notify::new());

        let c = counter.clone();
        bus.subscribe_fn(move |_e: Arc<UserDeleted>| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        // Catch-all sees everything; use it as a completion signal.
        let d = done.clone();
        bus.subscribe_any(move |_e: Arc<dyn Event>| {
            let d = d.clone();
            async move {
                d.notify_one();
            }
        });

        bus.dispatch(UserCreated::new("alice")).await;
        done.notified().await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_catch_all_receives_all_types() {
        let bus = EventBus::new();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let done = Arc::new(Notify::new());

        let s = seen.clone();
        let d = done.clone();
        bus.subscribe_any(move |e: Arc<dyn Event>| {
            let s = s.clone();
            let d = d.clone();
            async move {
                s.lock().unwrap().push(e.event_name().to_string());
                d.notify_one();
            }
        });

        bus.dispatch(UserCreated::new("alice")).await;
        done.notified().await;
        bus.dispatch(UserDeleted::new()).await;
        done.notified().await;

        let names = seen.lock().unwrap().clone();
        assert_eq!(names, vec!["user_created".to_string(), "user_deleted".to_string()]);
    }

    #[tokio::test]
    async fn test_multiple_subscribers_fan_out() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicU32::new(0));
        let (done, mut completed) = mpsc::unbounded_channel();

        for _ in 0..3 {
            bus.subscribe(CountingHandler {
                counter: counter.clone(),
                done: done.clone(),
            });
        }

        bus.dispatch(UserCreated::new("alice")).await;
        for _ in 0..3 {
            completed.recv().await.unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_dispatch_does_not_wait_for_handlers() {
        let bus = EventBus::new();
        let release = Arc::new(Notify::new());
        let finished = Arc::new(AtomicU32::new(0));

        let r = release.clone();
        let f = finished.clone();
        bus.subscribe_fn(move |_e: Arc<UserCreated>| {
            let r = r.clone();
            let f = f.clone();
            async move {
                r.notified().await;
                f.fetch_add(1, Ordering::SeqCst);
            }
        });

        // Returns even though the handler is parked.
        bus.dispatch(UserCreated::new("alice")).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
        release.notify_one();
    }

    #[tokio::test]
    async fn test_bounded_bus_delivers() {
        let bus = EventBus::with_config(BusConfig {
            capacity: Some(4),
            overflow: OverflowPolicy::Block,
        });
        let counter = Arc::new(AtomicU32::new(0));
        let (done, mut completed) = mpsc::unbounded_channel();
        bus.subscribe(CountingHandler {
            counter: counter.clone(),
            done,
        });

        bus.dispatch(UserCreated::new("alice")).await;
        completed.recv().await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_subscription_def_registers_by_name() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicU32::new(0));
        let done = Arc::new(Notify::new());

        let c = counter.clone();
        let d = done.clone();
        let def = SubscriptionDef::new("OnUserCreated", move |_e: Arc<UserCreated>| {
            let c = c.clone();
            let d = d.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                d.notify_one();
            }
        });
        assert_eq!(def.name(), "OnUserCreated");

        def.register(&bus);
        assert_eq!(bus.subscription_count(), 1);

        bus.dispatch(UserCreated::new("alice")).await;
        done.notified().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
