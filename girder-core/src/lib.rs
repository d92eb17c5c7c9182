// Core library for the Girder framework: dependency container, routing and
// dispatch, content-negotiating request context, and the HTTP server glue.

pub mod application;
pub mod binding;
pub mod container;
pub mod context;
pub mod error;
pub mod extensions;
pub mod http;
pub mod middleware;
pub mod routing;
pub mod soap;
pub mod traits;

pub use application::Application;
pub use binding::Binding;
pub use container::{Container, GROUP_CONTROLLER};
pub use context::{
    CONTENT_TYPE_JSON, CONTENT_TYPE_TEXT_XML, CONTENT_TYPE_XML, Context, Format, HEADER_ACCEPT,
    HEADER_CONTENT_TYPE, HEADER_REQUEST_ID, HEADER_SOAP_ACTION, XML_DECLARATION,
};
pub use error::Error;
pub use extensions::Extensions;
pub use http::{HttpMethod, HttpRequest, HttpResponse, HttpStatus};
pub use middleware::{Cors, Middleware, MiddlewareChain, Next, RequestLog, TerminalFn};
pub use routing::{ParamKind, PathArg, PathArgs, Route, RouteSpec, Router};
pub use traits::{Controller, HandlerEntry, HandlerFuture, RouteHandlerFn};
