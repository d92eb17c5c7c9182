// SOAP 1.2 envelope codec
//
// Generic XML deserialization of the envelope captures the Body as raw
// inline bytes, which loses the namespace scope declared on the root
// element. The decoder therefore records the root's xmlns declarations and
// re-attaches them to the inner body's root tag before unmarshaling.

use crate::Error;
use quick_xml::Reader;
use quick_xml::events::Event;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// SOAP 1.2 envelope namespace.
pub const NS_SOAP_ENVELOPE: &str = "http://www.w3.org/2003/05/soap-envelope";

/// Fault code for client-side errors.
pub const FAULT_CODE_SENDER: &str = "SOAP-ENV:Sender";

/// Fault code for server-side errors.
pub const FAULT_CODE_RECEIVER: &str = "SOAP-ENV:Receiver";

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

/// A prefixed namespace declaration from the envelope root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    pub prefix: String,
    pub uri: String,
}

/// A parsed envelope: the raw Body content plus the namespaces declared on
/// the root element, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub namespaces: Vec<Namespace>,
    pub body: Vec<u8>,
}

/// Parse the outer envelope, capturing root namespace declarations and the
/// Body's inner XML verbatim. Anything that is not a well-formed envelope
/// with a Body is a decode error.
pub fn parse_envelope(input: &[u8]) -> Result<Envelope, Error> {
    let text = std::str::from_utf8(input).map_err(|e| Error::Decode(e.to_string()))?;
    let mut reader = Reader::from_str(text);

    let mut namespaces = None;
    loop {
        let event = reader
            .read_event()
            .map_err(|e| Error::Decode(format!("malformed SOAP envelope: {e}")))?;
        match event {
            Event::Start(root) if namespaces.is_none() => {
                if root.local_name().as_ref() != b"Envelope" {
                    return Err(Error::Decode(format!(
                        "expected SOAP Envelope, found {}",
                        String::from_utf8_lossy(root.name().as_ref())
                    )));
                }
                namespaces = Some(root_namespaces(&root)?);
            }
            Event::Start(elem) => {
                if elem.local_name().as_ref() == b"Body" {
                    let span = reader
                        .read_to_end(elem.name())
                        .map_err(|e| Error::Decode(format!("malformed SOAP Body: {e}")))?;
                    let body = text[span.start as usize..span.end as usize]
                        .as_bytes()
                        .to_vec();
                    return Ok(Envelope {
                        namespaces: namespaces.unwrap_or_default(),
                        body,
                    });
                }
                // Header and other envelope children are skipped whole.
                reader
                    .read_to_end(elem.name())
                    .map_err(|e| Error::Decode(format!("malformed SOAP envelope: {e}")))?;
            }
            Event::Empty(elem) if namespaces.is_some() && elem.local_name().as_ref() == b"Body" => {
                return Ok(Envelope {
                    namespaces: namespaces.unwrap_or_default(),
                    body: Vec::new(),
                });
            }
            Event::Eof => {
                return Err(Error::Decode(
                    "SOAP envelope has no Body element".to_string(),
                ));
            }
            _ => {}
        }
    }
}

fn root_namespaces(root: &quick_xml::events::BytesStart<'_>) -> Result<Vec<Namespace>, Error> {
    let mut namespaces = Vec::new();
    for attr in root.attributes() {
        let attr = attr.map_err(|e| Error::Decode(format!("malformed SOAP envelope: {e}")))?;
        let key = attr.key.as_ref();
        if let Some(prefix) = key.strip_prefix(b"xmlns:") {
            let value = attr
                .unescape_value()
                .map_err(|e| Error::Decode(e.to_string()))?;
            namespaces.push(Namespace {
                prefix: String::from_utf8_lossy(prefix).into_owned(),
                uri: value.into_owned(),
            });
        }
    }
    Ok(namespaces)
}

/// Re-attach namespace declarations to the body's root tag, inserting them
/// just before the tag closes and preserving declaration order.
pub fn inject_namespaces(body: &[u8], namespaces: &[Namespace]) -> Vec<u8> {
    if namespaces.is_empty() {
        return body.to_vec();
    }

    let insert_at = body
        .iter()
        .position(|&b| b == b'/' || b == b'>')
        .unwrap_or(body.len());

    let mut declarations = String::new();
    for ns in namespaces {
        declarations.push_str(&format!(r#" xmlns:{}="{}""#, ns.prefix, ns.uri));
    }

    let mut out = Vec::with_capacity(body.len() + declarations.len());
    out.extend_from_slice(&body[..insert_at]);
    out.extend_from_slice(declarations.as_bytes());
    out.extend_from_slice(&body[insert_at..]);
    out
}

/// Decode a SOAP request body into `T`.
pub fn decode<T: DeserializeOwned>(input: &[u8]) -> Result<T, Error> {
    let envelope = parse_envelope(input)?;
    let body = inject_namespaces(&envelope.body, &envelope.namespaces);
    let text = std::str::from_utf8(&body).map_err(|e| Error::Decode(e.to_string()))?;
    quick_xml::de::from_str(text).map_err(|e| Error::Decode(e.to_string()))
}

/// Encode `value` as a SOAP response: XML declaration plus an envelope
/// wrapping the marshaled body.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, Error> {
    let body = quick_xml::se::to_string(value).map_err(|e| Error::Encode(e.to_string()))?;
    Ok(wrap_body(&body))
}

/// Encode an error as a SOAP Fault response. Client-classified errors carry
/// the Sender code, everything else Receiver.
pub fn encode_fault(err: &Error) -> Result<Vec<u8>, Error> {
    let code = if err.is_client_error() {
        FAULT_CODE_SENDER
    } else {
        FAULT_CODE_RECEIVER
    };
    let fault = Fault {
        code: FaultCode {
            value: code.to_string(),
        },
        reason: FaultReason {
            text: ReasonText {
                lang: "en".to_string(),
                message: err.to_string(),
            },
        },
        detail: None,
    };
    let body = quick_xml::se::to_string(&fault).map_err(|e| Error::Encode(e.to_string()))?;
    Ok(wrap_body(&body))
}

fn wrap_body(body: &str) -> Vec<u8> {
    format!(
        "{XML_DECLARATION}<SOAP-ENV:Envelope xmlns:SOAP-ENV=\"{NS_SOAP_ENVELOPE}\">\
         <SOAP-ENV:Body>{body}</SOAP-ENV:Body></SOAP-ENV:Envelope>"
    )
    .into_bytes()
}

/// SOAP 1.2 Fault: structured error with a code, a human-readable reason,
/// and optional application-specific detail.
#[derive(Debug, Serialize)]
#[serde(rename = "SOAP-ENV:Fault")]
pub struct Fault {
    #[serde(rename = "SOAP-ENV:Code")]
    pub code: FaultCode,
    #[serde(rename = "SOAP-ENV:Reason")]
    pub reason: FaultReason,
    #[serde(rename = "SOAP-ENV:Detail", skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FaultCode {
    #[serde(rename = "SOAP-ENV:Value")]
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct FaultReason {
    #[serde(rename = "SOAP-ENV:Text")]
    pub text: ReasonText,
}

#[derive(Debug, Serialize)]
pub struct ReasonText {
    #[serde(rename = "@xml:lang")]
    pub lang: String,
    #[serde(rename = "$text")]
    pub message: String,
}
