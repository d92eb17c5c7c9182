// Core traits for the Girder framework

use crate::routing::{ParamKind, PathArgs};
use crate::{Context, Error};
use girder_events::SubscriptionDef;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Future returned by a bound route handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), Error>> + Send>>;

/// A route handler bound to its controller instance.
///
/// The handler receives the per-request [`Context`] plus the coerced path
/// arguments, writes its response through the context, and returns an error
/// value for central translation. It never touches HTTP status codes
/// directly.
pub type RouteHandlerFn = Arc<dyn Fn(Context, PathArgs) -> HandlerFuture + Send + Sync>;

/// One named entry in a controller's handler table.
///
/// `params` declares the kinds of the path parameters in placeholder order;
/// the dispatcher coerces raw path values against it before invoking.
#[derive(Clone)]
pub struct HandlerEntry {
    pub name: &'static str,
    pub params: Vec<ParamKind>,
    pub handler: RouteHandlerFn,
}

impl HandlerEntry {
    pub fn new<F, Fut>(name: &'static str, params: &[ParamKind], f: F) -> Self
    where
        F: Fn(Context, PathArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        Self {
            name,
            params: params.to_vec(),
            handler: Arc::new(move |ctx, args| Box::pin(f(ctx, args))),
        }
    }
}

impl std::fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

/// A dependency-injected struct exposing request-handling or
/// message-handling methods.
///
/// Controllers replace string-described `package.Type::Method` reflection
/// with compile-time tables: configuration refers to entries by name and
/// binding resolves them at startup, failing fast on a miss.
pub trait Controller: Send + Sync + 'static {
    /// The service name configuration refers to, e.g. `"controller.UserController"`.
    fn name(&self) -> &'static str;

    /// Named request handlers with their declared path-parameter kinds.
    fn handlers(self: Arc<Self>) -> Vec<HandlerEntry>;

    /// Named event subscriptions for pub/sub bindings.
    fn subscriptions(self: Arc<Self>) -> Vec<SubscriptionDef> {
        Vec::new()
    }
}
