// Per-request context: content negotiation, body binding, response helpers

use crate::{Error, Extensions, HttpRequest, HttpResponse, soap};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

/// Name of the Content-Type HTTP header.
pub const HEADER_CONTENT_TYPE: &str = "content-type";

/// Name of the Accept HTTP header.
pub const HEADER_ACCEPT: &str = "accept";

/// The SOAPAction HTTP header, indicating a SOAP call over XML.
pub const HEADER_SOAP_ACTION: &str = "soapaction";

/// Response header carrying the request identifier for log correlation.
pub const HEADER_REQUEST_ID: &str = "x-request-id";

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_XML: &str = "application/xml";

/// The content type required for SOAP 1.2 messages.
pub const CONTENT_TYPE_TEXT_XML: &str = "text/xml";

/// XML declaration emitted before every XML/SOAP response body.
pub const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

/// Wire format selected for one side of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Xml,
    Soap,
}

/// Canonical error body: `{"error": msg}` in JSON, `<error>msg</error>` in
/// XML. SOAP errors become a structured Fault instead.
#[derive(Debug, Serialize)]
#[serde(rename = "error")]
struct XmlErrorBody<'a> {
    #[serde(rename = "$text")]
    message: &'a str,
}

struct ContextInner {
    request: HttpRequest,
    id: String,
    decoder: Format,
    encoder: Format,
    response_type: String,
    values: Mutex<Extensions>,
    response: Mutex<Option<HttpResponse>>,
}

/// Per-request façade over the transport request/response.
///
/// Created fresh for every inbound request and destroyed when it completes.
/// The decoder is fixed from the `Content-Type` header, the encoder from
/// `Accept`, both defaulting to JSON; a SOAPAction header on a `text/xml`
/// request routes both through the SOAP codec.
///
/// Cloning is cheap and shares the same request state, so the dispatcher
/// can hand a clone to the handler and collect the written response
/// afterwards.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    pub fn new(request: HttpRequest) -> Self {
        let id = Uuid::new_v4().to_string();

        let content_type = essence(request.header(HEADER_CONTENT_TYPE).unwrap_or(CONTENT_TYPE_JSON));
        let is_soap =
            content_type == CONTENT_TYPE_TEXT_XML && request.header(HEADER_SOAP_ACTION).is_some();
        let is_xml = content_type == CONTENT_TYPE_XML || content_type == CONTENT_TYPE_TEXT_XML;

        let (decoder, encoder, response_type) = if is_soap {
            (Format::Soap, Format::Soap, CONTENT_TYPE_TEXT_XML.to_string())
        } else {
            let decoder = if is_xml { Format::Xml } else { Format::Json };
            // An absent Accept header inherits the request's content type.
            let accept = request
                .header(HEADER_ACCEPT)
                .map(essence)
                .unwrap_or_else(|| content_type.clone());
            if accept == CONTENT_TYPE_XML || accept == CONTENT_TYPE_TEXT_XML {
                (decoder, Format::Xml, accept)
            } else {
                (decoder, Format::Json, CONTENT_TYPE_JSON.to_string())
            }
        };

        let values = Mutex::new(request.extensions.clone());
        Self {
            inner: Arc::new(ContextInner {
                request,
                id,
                decoder,
                encoder,
                response_type,
                values,
                response: Mutex::new(None),
            }),
        }
    }

    /// The underlying HTTP request.
    pub fn request(&self) -> &HttpRequest {
        &self.inner.request
    }

    /// Opaque request identifier, unique per request.
    pub fn request_id(&self) -> &str {
        &self.inner.id
    }

    /// The effective request content type (JSON when absent).
    pub fn content_type(&self) -> String {
        essence(
            self.inner
                .request
                .header(HEADER_CONTENT_TYPE)
                .unwrap_or(CONTENT_TYPE_JSON),
        )
    }

    /// The negotiated response content type.
    pub fn response_type(&self) -> &str {
        &self.inner.response_type
    }

    pub fn decoder(&self) -> Format {
        self.inner.decoder
    }

    pub fn encoder(&self) -> Format {
        self.inner.encoder
    }

    /// Attach a request-scoped typed value (auth middleware writes claims
    /// through this) for downstream handlers.
    pub fn add_value<T: Send + Sync + 'static>(&self, value: T) {
        self.inner.values.lock().insert(value);
    }

    /// Read a request-scoped typed value. Absent keys read as `None`.
    pub fn get_value<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.inner.values.lock().get::<T>()
    }

    /// Decode the request body into `T` with the selected decoder.
    pub fn bind<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let body = &self.inner.request.body;
        match self.inner.decoder {
            Format::Json => {
                serde_json::from_slice(body).map_err(|e| Error::Decode(e.to_string()))
            }
            Format::Xml => {
                let text =
                    std::str::from_utf8(body).map_err(|e| Error::Decode(e.to_string()))?;
                quick_xml::de::from_str(text).map_err(|e| Error::Decode(e.to_string()))
            }
            Format::Soap => soap::decode(body),
        }
    }

    /// Write the response: request-id and content-type headers, the status
    /// line, and the encoded body.
    pub fn respond<T: Serialize>(&self, status: u16, body: &T) -> Result<(), Error> {
        let encoded = self.encode(body)?;
        self.store_response(status, encoded);
        Ok(())
    }

    /// Respond with a 200 status code.
    pub fn ok<T: Serialize>(&self, body: &T) -> Result<(), Error> {
        self.respond(200, body)
    }

    /// Respond with a 404 status code.
    pub fn not_found<T: Serialize>(&self, body: &T) -> Result<(), Error> {
        self.respond(404, body)
    }

    /// Respond with a 401 status code.
    pub fn unauthorized<T: Serialize>(&self, body: &T) -> Result<(), Error> {
        self.respond(401, body)
    }

    /// Respond with a 403 status code.
    pub fn forbidden<T: Serialize>(&self, body: &T) -> Result<(), Error> {
        self.respond(403, body)
    }

    /// Respond with a 400 status code.
    pub fn bad_request<T: Serialize>(&self, body: &T) -> Result<(), Error> {
        self.respond(400, body)
    }

    /// Classify an error against the taxonomy and respond with the matching
    /// status and the canonical error body for the negotiated format.
    pub fn send_error(&self, err: &Error) {
        error!(request_id = %self.inner.id, error = %err, "Request failed");
        let status = err.status_code();
        match self.encode_error(err) {
            Ok(encoded) => self.store_response(status, encoded),
            Err(encode_err) => {
                // Encoding the error body itself failed; emit a bare 500.
                error!(request_id = %self.inner.id, error = %encode_err, "Failed to encode error body");
                self.store_response(500, Vec::new());
            }
        }
    }

    /// Extract the response written by the handler, or an empty 200 if the
    /// handler produced none. Every response carries the request-id and
    /// content-type headers.
    pub fn finish(&self) -> HttpResponse {
        self.inner
            .response
            .lock()
            .take()
            .unwrap_or_else(|| self.base_response(200))
    }

    fn store_response(&self, status: u16, body: Vec<u8>) {
        let response = self.base_response(status).with_body(body);
        *self.inner.response.lock() = Some(response);
    }

    fn base_response(&self, status: u16) -> HttpResponse {
        HttpResponse::new(status)
            .with_header(HEADER_REQUEST_ID, self.inner.id.clone())
            .with_header(HEADER_CONTENT_TYPE, self.inner.response_type.clone())
    }

    fn encode<T: Serialize>(&self, body: &T) -> Result<Vec<u8>, Error> {
        match self.inner.encoder {
            Format::Json => serde_json::to_vec(body).map_err(|e| Error::Encode(e.to_string())),
            Format::Xml => {
                let xml =
                    quick_xml::se::to_string(body).map_err(|e| Error::Encode(e.to_string()))?;
                Ok(format!("{XML_DECLARATION}{xml}").into_bytes())
            }
            Format::Soap => soap::encode(body),
        }
    }

    fn encode_error(&self, err: &Error) -> Result<Vec<u8>, Error> {
        let message = err.to_string();
        match self.inner.encoder {
            Format::Json => serde_json::to_vec(&serde_json::json!({ "error": message }))
                .map_err(|e| Error::Encode(e.to_string())),
            Format::Xml => {
                let xml = quick_xml::se::to_string(&XmlErrorBody { message: &message })
                    .map_err(|e| Error::Encode(e.to_string()))?;
                Ok(format!("{XML_DECLARATION}{xml}").into_bytes())
            }
            Format::Soap => soap::encode_fault(err),
        }
    }
}

/// Strip media type parameters: `application/json; charset=utf-8` →
/// `application/json`.
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}
