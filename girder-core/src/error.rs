// Error types for the Girder framework

use crate::HttpStatus;
use thiserror::Error;

/// Framework-wide error taxonomy.
///
/// Business handlers return these as values; the request context translates
/// them centrally into HTTP responses. Wiring errors (`Resolution`,
/// `CircularDependency`, `RouteBinding`) are startup-time conditions and are
/// never produced during request dispatch.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    /// Malformed request body for the negotiated content type.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Response body serialization failure.
    #[error("Encode error: {0}")]
    Encode(String),

    /// Path parameter could not be coerced to the declared type.
    #[error("Conversion error: {0}")]
    Conversion(String),

    /// No constructor registered for a requested service.
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// Constructor graph refers back to a type already being resolved.
    #[error("Circular dependency: {0}")]
    CircularDependency(String),

    /// Declared route could not be bound to a controller method.
    #[error("Route binding error: {0}")]
    RouteBinding(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the HTTP status code for this error.
    ///
    /// The mapping is the single place HTTP concerns touch the taxonomy;
    /// anything unlisted is an internal server error.
    pub fn status_code(&self) -> u16 {
        self.http_status().code()
    }

    /// Get the `HttpStatus` for this error.
    pub fn http_status(&self) -> HttpStatus {
        match self {
            Error::BadRequest(_) | Error::Decode(_) | Error::Conversion(_) => {
                HttpStatus::BadRequest
            }
            Error::Unauthorized(_) => HttpStatus::Unauthorized,
            Error::Forbidden(_) => HttpStatus::Forbidden,
            Error::NotFound(_) => HttpStatus::NotFound,
            _ => HttpStatus::InternalServerError,
        }
    }

    /// Check if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        let code = self.status_code();
        (400..500).contains(&code)
    }
}
