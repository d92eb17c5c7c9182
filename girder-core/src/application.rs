// Application bootstrapper and HTTP server

use crate::binding::Binding;
use crate::middleware::{Middleware, MiddlewareChain, TerminalFn};
use crate::routing::{RouteSpec, Router};
use crate::{Container, Error, HttpRequest, HttpResponse};
use girder_events::{BusConfig, EventBus};
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, body::Incoming as IncomingBody};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// The assembled application: container, router, middleware chain, and
/// event bus, plus the HTTP server loop.
///
/// Wiring order: register services and controllers on the container, bind
/// the configured routes, register the configured subscriptions, then
/// `listen`. Every wiring step is fallible and startup-fatal; request-time
/// failures never are.
pub struct Application {
    container: Container,
    router: Arc<Router>,
    middleware: MiddlewareChain,
    bus: EventBus,
}

impl Application {
    /// Create an application with an unbounded event bus. Must be called
    /// inside a tokio runtime (the bus starts its consumer task).
    pub fn new() -> Self {
        Self::with_bus_config(BusConfig::default())
    }

    pub fn with_bus_config(config: BusConfig) -> Self {
        let container = Container::new();
        let bus = EventBus::with_config(config);
        // The bus is itself a service; handlers resolve it to dispatch.
        container.register_instance(bus.clone());

        Self {
            container,
            router: Arc::new(Router::new()),
            middleware: MiddlewareChain::new(),
            bus,
        }
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Append a middleware. Middlewares run in registration order, ahead of
    /// route dispatch.
    pub fn use_middleware<M: Middleware + 'static>(&mut self, middleware: M) {
        self.middleware.push(middleware);
    }

    /// Bind configured routes against registered controllers.
    pub fn bind_routes(&mut self, specs: &[RouteSpec]) -> Result<(), Error> {
        let router = Arc::get_mut(&mut self.router)
            .ok_or_else(|| Error::Internal("cannot bind routes while serving".to_string()))?;
        for spec in specs {
            router.bind(spec, &self.container)?;
        }
        Ok(())
    }

    /// Register configured `package.Type::Method` subscriptions with the
    /// bus. A binding that names no known subscription is startup-fatal.
    pub fn init_subscriptions(&self, handlers: &[String]) -> Result<(), Error> {
        for def in handlers {
            let binding = Binding::parse(def)?;
            let subscription = self
                .container
                .subscription(&binding.service(), &binding.method)?;
            subscription.register(&self.bus);
            info!(subscription = %binding, "Subscription registered");
        }
        Ok(())
    }

    /// Run one request through the middleware chain and the dispatcher.
    pub async fn handle(&self, request: HttpRequest) -> HttpResponse {
        let router = self.router.clone();
        let terminal: TerminalFn = Arc::new(move |req| {
            let router = router.clone();
            Box::pin(async move { router.dispatch(req).await })
        });
        self.middleware.apply(request, terminal).await
    }

    /// Start the HTTP server on the specified port. Blocks for the life of
    /// the process.
    pub async fn listen(self, port: u16) -> Result<(), Error> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "Server listening");

        let app = Arc::new(self);
        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let app = app.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<IncomingBody>| {
                    let app = app.clone();
                    async move { serve_one(req, app).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!(error = %err, "Error serving connection");
                }
            });
        }
    }
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

async fn serve_one(
    req: Request<IncomingBody>,
    app: Arc<Application>,
) -> Result<Response<Full<bytes::Bytes>>, hyper::Error> {
    let method = req.method().to_string();
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let mut request = HttpRequest::new(method, path);
    for (name, value) in req.headers() {
        if let Ok(value) = value.to_str() {
            request.set_header(name.as_str(), value);
        }
    }
    request.body = req.collect().await?.to_bytes().to_vec();

    let response = app.handle(request).await;
    Ok(into_hyper(response))
}

fn into_hyper(response: HttpResponse) -> Response<Full<bytes::Bytes>> {
    let mut builder = Response::builder().status(response.status);
    for (name, value) in &response.headers {
        builder = builder.header(name, value);
    }

    builder
        .body(Full::new(bytes::Bytes::from(response.body)))
        .unwrap_or_else(|err| {
            error!(error = %err, "Failed to build response");
            Response::new(Full::new(bytes::Bytes::new()))
        })
}
