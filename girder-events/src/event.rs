//! Event definitions and handler traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

/// A message published through the event bus.
///
/// The message's concrete type is its subscription key: typed subscribers
/// receive only messages of their declared type, while [`crate::EventBus::subscribe_any`]
/// subscribers receive every message through this trait object.
pub trait Event: Send + Sync + Debug + 'static {
    /// Stable event name for logging.
    fn event_name(&self) -> &str;

    /// Unique event ID.
    fn event_id(&self) -> Uuid;

    /// When the event was created.
    fn timestamp(&self) -> DateTime<Utc>;

    /// Cast to `Any` for typed delivery.
    fn as_any(&self) -> &dyn Any;

    /// Convert a shared event into a shared `Any` for typed delivery.
    /// Implementations are always `fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> { self }`.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Base event metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    pub id: Uuid,
    pub name: String,
    pub timestamp: DateTime<Utc>,
}

impl EventMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A typed event subscriber.
#[async_trait]
pub trait EventHandler<E: Event>: Send + Sync {
    async fn handle(&self, event: &E) -> Result<(), EventHandlerError>;
}

/// Event handler error
#[derive(Debug, thiserror::Error)]
pub enum EventHandlerError {
    #[error("handler failed: {0}")]
    HandlerFailed(String),

    #[error("event processing error: {0}")]
    ProcessingError(String),
}

/// Type-erased subscriber held by the bus.
///
/// `matches` decides delivery against the message's dynamic type;
/// `handle_dyn` receives the shared message for a spawned invocation.
#[async_trait]
pub trait DynEventHandler: Send + Sync {
    fn matches(&self, event: &dyn Event) -> bool;

    async fn handle_dyn(&self, event: Arc<dyn Event>) -> Result<(), EventHandlerError>;
}

/// Adapter binding an [`EventHandler`] to its declared event type.
pub struct TypedEventHandler<E: Event, H: EventHandler<E>> {
    handler: H,
    _phantom: std::marker::PhantomData<fn(E)>,
}

impl<E: Event, H: EventHandler<E>> TypedEventHandler<E, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _phantom: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<E: Event, H: EventHandler<E> + 'static> DynEventHandler for TypedEventHandler<E, H> {
    fn matches(&self, event: &dyn Event) -> bool {
        event.as_any().is::<E>()
    }

    async fn handle_dyn(&self, event: Arc<dyn Event>) -> Result<(), EventHandlerError> {
        match event.as_any().downcast_ref::<E>() {
            Some(typed) => self.handler.handle(typed).await,
            None => Err(EventHandlerError::ProcessingError(format!(
                "subscriber received event of unexpected type: {}",
                event.event_name()
            ))),
        }
    }
}

/// Adapter for a typed closure subscriber.
pub struct FnEventHandler<E, F> {
    f: F,
    _phantom: std::marker::PhantomData<fn(E)>,
}

impl<E, F, Fut> FnEventHandler<E, F>
where
    E: Event,
    F: Fn(Arc<E>) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<E, F, Fut> DynEventHandler for FnEventHandler<E, F>
where
    E: Event,
    F: Fn(Arc<E>) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    fn matches(&self, event: &dyn Event) -> bool {
        event.as_any().is::<E>()
    }

    async fn handle_dyn(&self, event: Arc<dyn Event>) -> Result<(), EventHandlerError> {
        let typed = downcast_arc::<E>(event)?;
        (self.f)(typed).await;
        Ok(())
    }
}

/// Catch-all subscriber receiving every message as a trait object.
pub struct AnyEventHandler<F> {
    f: F,
}

impl<F, Fut> AnyEventHandler<F>
where
    F: Fn(Arc<dyn Event>) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> DynEventHandler for AnyEventHandler<F>
where
    F: Fn(Arc<dyn Event>) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    fn matches(&self, _event: &dyn Event) -> bool {
        true
    }

    async fn handle_dyn(&self, event: Arc<dyn Event>) -> Result<(), EventHandlerError> {
        (self.f)(event).await;
        Ok(())
    }
}

fn downcast_arc<E: Event>(event: Arc<dyn Event>) -> Result<Arc<E>, EventHandlerError> {
    // Arc<dyn Event> cannot be downcast directly; go through Any.
    event.into_any().downcast::<E>().map_err(|_| {
        EventHandlerError::ProcessingError(
            "subscriber received event of unexpected type".to_string(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Ping {
        metadata: EventMetadata,
    }

    impl Ping {
        fn new() -> Self {
            Self {
                metadata: EventMetadata::new("ping"),
            }
        }
    }

    impl Event for Ping {
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
    struct Pong {
        metadata: EventMetadata,
    }

    impl Event for Pong {
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

    #[test]
    fn test_typed_handler_matches_only_its_type() {
        let handler = FnEventHandler::new(|_: Arc<Ping>| async {});
        assert!(handler.matches(&Ping::new()));
        assert!(!handler.matches(&Pong {
            metadata: EventMetadata::new("pong"),
        }));
    }

    #[test]
    fn test_any_handler_matches_everything() {
        let handler = AnyEventHandler::new(|_: Arc<dyn Event>| async {});
        assert!(handler.matches(&Ping::new()));
        assert!(handler.matches(&Pong {
            metadata: EventMetadata::new("pong"),
        }));
    }

    #[tokio::test]
    async fn test_fn_handler_receives_typed_event() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let handler = FnEventHandler::new(move |e: Arc<Ping>| {
            let seen = seen2.clone();
            async move {
                seen.lock().unwrap().push(e.event_name().to_string());
            }
        });

        let event: Arc<dyn Event> = Arc::new(Ping::new());
        handler.handle_dyn(event).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["ping".to_string()]);
    }

    #[test]
    fn test_metadata() {
        let metadata = EventMetadata::new("ping");
        assert_eq!(metadata.name, "ping");
    }
}
