// Girder - a small server-side framework for Rust
//
// Services are plain structs wired through a dependency container; routes
// and pub/sub subscriptions are declared in configuration and bound to
// controller handler tables at startup; request bodies are negotiated
// between JSON, XML, and SOAP; domain events fan out over an async bus.

// Re-export core functionality
pub use girder_core::*;

// Re-export the event bus and configuration crates
pub use girder_config;
pub use girder_events;

pub use girder_events::{
    BusConfig, Event, EventBus, EventHandler, EventMetadata, OverflowPolicy, SubscriptionDef,
};

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Application, Binding, Container, Context, Controller, Error, HandlerEntry, HttpMethod,
        HttpRequest, HttpResponse, Middleware, ParamKind, PathArgs, Route, RouteSpec, Router,
    };
    pub use girder_events::{Event, EventBus, EventMetadata, SubscriptionDef};
}
