//! Asynchronous type-matching publish/subscribe for Girder.
//!
//! Messages dispatched to the [`EventBus`] are queued and fanned out to
//! every subscriber whose declared parameter type matches the message's
//! concrete type; catch-all subscribers receive every message. Each
//! delivery runs in its own task.
//!
//! ```rust,ignore
//! use girder_events::*;
//! use std::sync::Arc;
//!
//! #[derive(Debug, Clone)]
//! struct UserCreated {
//!     metadata: EventMetadata,
//!     email: String,
//! }
//!
//! impl Event for UserCreated {
//!     fn event_name(&self) -> &str { &self.metadata.name }
//!     fn event_id(&self) -> uuid::Uuid { self.metadata.id }
//!     fn timestamp(&self) -> chrono::DateTime<chrono::Utc> { self.metadata.timestamp }
//!     fn as_any(&self) -> &dyn std::any::Any { self }
//!     fn into_any(self: Arc<Self>) -> Arc<dyn std::any::Any + Send + Sync> { self }
//! }
//!
//! # async fn run() {
//! let bus = EventBus::new();
//! bus.subscribe_fn(|event: Arc<UserCreated>| async move {
//!     println!("welcome {}", event.email);
//! });
//!
//! bus.dispatch(UserCreated {
//!     metadata: EventMetadata::new("user_created"),
//!     email: "alice@example.com".to_string(),
//! }).await;
//! # }
//! ```

pub mod bus;
pub mod event;

pub use bus::{BusConfig, EventBus, OverflowPolicy, SubscriptionDef};
pub use event::{
    AnyEventHandler, DynEventHandler, Event, EventHandler, EventHandlerError, EventMetadata,
    FnEventHandler, TypedEventHandler,
};
