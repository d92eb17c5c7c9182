// Middleware chain invoked ahead of route dispatch

use crate::{HttpRequest, HttpResponse};
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{error, info};

/// The rest of the chain, ending at the dispatcher.
pub type Next =
    Box<dyn FnOnce(HttpRequest) -> Pin<Box<dyn Future<Output = HttpResponse> + Send>> + Send>;

/// Terminal function at the end of the chain, normally the router's
/// dispatch.
pub type TerminalFn =
    Arc<dyn Fn(HttpRequest) -> Pin<Box<dyn Future<Output = HttpResponse> + Send>> + Send + Sync>;

/// A middleware sees the request before the dispatcher and the response
/// after it. It may short-circuit by not calling `next`, or mutate the
/// request (attach auth claims through `request.extensions`) before passing
/// it on.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, req: HttpRequest, next: Next) -> HttpResponse;
}

/// Ordered middleware chain.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Arc<Vec<Arc<dyn Middleware>>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware. Middlewares run in registration order.
    pub fn push<M: Middleware + 'static>(&mut self, middleware: M) {
        let mut middlewares = (*self.middlewares).clone();
        middlewares.push(Arc::new(middleware));
        self.middlewares = Arc::new(middlewares);
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Run the chain, ending at `terminal`.
    pub async fn apply(&self, req: HttpRequest, terminal: TerminalFn) -> HttpResponse {
        self.run_from(0, req, terminal).await
    }

    fn run_from(
        &self,
        index: usize,
        req: HttpRequest,
        terminal: TerminalFn,
    ) -> Pin<Box<dyn Future<Output = HttpResponse> + Send>> {
        if index >= self.middlewares.len() {
            return terminal(req);
        }

        let middleware = self.middlewares[index].clone();
        let chain = self.clone();
        Box::pin(async move {
            middleware
                .handle(
                    req,
                    Box::new(move |req| chain.run_from(index + 1, req, terminal)),
                )
                .await
        })
    }
}

/// Logs every request with its matched outcome and latency.
pub struct RequestLog;

#[async_trait]
impl Middleware for RequestLog {
    async fn handle(&self, req: HttpRequest, next: Next) -> HttpResponse {
        let start = std::time::Instant::now();
        let method = req.method.to_uppercase();
        let path = req.path.clone();

        let response = next(req).await;
        let elapsed = start.elapsed();

        if response.status >= 500 {
            error!(%method, %path, status = response.status, elapsed_ms = elapsed.as_millis() as u64, "Request completed");
        } else {
            info!(%method, %path, status = response.status, elapsed_ms = elapsed.as_millis() as u64, "Request completed");
        }
        response
    }
}

/// Cross-origin resource sharing headers, with preflight short-circuit.
///
/// The request's `Origin` header is echoed back rather than configured:
/// responses allow credentials, and a wildcard origin is invalid alongside
/// `access-control-allow-credentials`.
pub struct Cors {
    pub allow_methods: String,
    pub allow_headers: String,
    pub max_age: u32,
}

impl Cors {
    pub fn new() -> Self {
        Self {
            allow_methods: "GET, POST, PUT, DELETE, PATCH, OPTIONS".to_string(),
            allow_headers: "Content-Type, Accept, Authorization, X-Api-Key".to_string(),
            max_age: 86_400,
        }
    }

    fn decorate(&self, response: HttpResponse, origin: &str) -> HttpResponse {
        response
            .with_header("access-control-allow-origin", origin)
            .with_header("access-control-allow-credentials", "true")
            .with_header("access-control-allow-methods", self.allow_methods.clone())
            .with_header("access-control-allow-headers", self.allow_headers.clone())
    }
}

impl Default for Cors {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for Cors {
    async fn handle(&self, req: HttpRequest, next: Next) -> HttpResponse {
        let origin = req.header("origin").unwrap_or("").to_string();
        // Preflight never reaches the dispatcher.
        if req.method.eq_ignore_ascii_case("OPTIONS") {
            return self
                .decorate(HttpResponse::ok(), &origin)
                .with_header("access-control-max-age", self.max_age.to_string());
        }
        self.decorate(next(req).await, &origin)
    }
}
