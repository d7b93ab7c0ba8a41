//! SOAP envelope construction and typed parsing of `Get_Person_Photos`
//! responses.

use handlebars::Handlebars;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use serde::Serialize;

use crate::error::{Error, Result};

/// SOAP 1.1 envelope namespace.
pub const NS_ENVELOPE: &str = "http://schemas.xmlsoap.org/soap/envelope/";
/// WS-Security extension namespace (credentials in the header).
pub const NS_SECURITY: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
/// Workday business-services namespace.
pub const NS_WORKDAY: &str = "urn:com.workday/bsvc";

const ENVELOPE_TEMPLATE: &str = "get_person_photos";

/// A compiled `Get_Person_Photos` request template.
///
/// Recognised placeholders: `{{ username }}`, `{{ password }}`,
/// `{{ version }}`, `{{ employee_id }}`. Values are XML-escaped and any other
/// placeholder fails the render.
pub struct EnvelopeTemplate {
    registry: Handlebars<'static>,
}

/// Values embedded into one envelope.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EnvelopeFields<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub version: &'a str,
    pub employee_id: &'a str,
}

impl EnvelopeTemplate {
    pub fn new(text: &str) -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_escape_fn(|s| escape(s).into_owned());
        registry
            .register_template_string(ENVELOPE_TEMPLATE, text)
            .map_err(|e| Error::Template(format!("envelope template: {e}")))?;
        Ok(Self { registry })
    }

    pub fn render(&self, fields: &EnvelopeFields<'_>) -> Result<String> {
        self.registry
            .render(ENVELOPE_TEMPLATE, fields)
            .map_err(|e| Error::Template(format!("envelope template: {e}")))
    }
}

/// Outcome of a structurally valid `Get_Person_Photos` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoResponse {
    /// The backend answered with a SOAP fault.
    Fault(String),
    /// Base64 text of the `wd:File` element, trimmed.
    Photo(String),
    /// Valid response without a stored photo.
    NoPhoto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Envelope,
    Body,
    Fault,
    FaultString,
    File,
    Other,
}

fn classify(ns: &ResolveResult<'_>, local: &[u8]) -> Scope {
    let in_ns = |uri: &str| matches!(ns, ResolveResult::Bound(Namespace(n)) if *n == uri.as_bytes());
    match local {
        b"Envelope" if in_ns(NS_ENVELOPE) => Scope::Envelope,
        b"Body" if in_ns(NS_ENVELOPE) => Scope::Body,
        // Faults are accepted qualified or bare; some gateways strip the prefix.
        b"Fault" if in_ns(NS_ENVELOPE) || matches!(ns, ResolveResult::Unbound) => Scope::Fault,
        b"faultstring" => Scope::FaultString,
        b"File" if in_ns(NS_WORKDAY) => Scope::File,
        _ => Scope::Other,
    }
}

/// Parse a `Get_Person_Photos` response.
///
/// A fault anywhere in the document wins. Otherwise the document must be an
/// `env:Envelope` with an `env:Body`; anything else is
/// [`Error::MalformedResponse`].
pub fn parse_photo_response(xml: &str) -> Result<PhotoResponse> {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Scope> = Vec::new();
    let mut root: Option<Scope> = None;
    let mut saw_body = false;
    let mut fault: Option<String> = None;
    let mut file: Option<String> = None;
    let mut file_closed = false;

    loop {
        let (ns, event) = reader
            .read_resolved_event()
            .map_err(|e| Error::MalformedResponse(e.to_string()))?;
        match event {
            Event::Start(e) => {
                let scope = match classify(&ns, e.local_name().as_ref()) {
                    // Only the first wd:File carries the photo.
                    Scope::File if file_closed => Scope::Other,
                    scope => scope,
                };
                root.get_or_insert(scope);
                match scope {
                    Scope::Body => saw_body = true,
                    Scope::Fault => {
                        fault.get_or_insert_with(String::new);
                    }
                    Scope::File => {
                        file.get_or_insert_with(String::new);
                    }
                    _ => {}
                }
                stack.push(scope);
            }
            Event::Empty(e) => {
                let scope = classify(&ns, e.local_name().as_ref());
                root.get_or_insert(scope);
                match scope {
                    Scope::Body => saw_body = true,
                    Scope::Fault => {
                        fault.get_or_insert_with(String::new);
                    }
                    _ => {}
                }
            }
            Event::End(_) => match stack.pop() {
                Some(Scope::File) => file_closed = true,
                Some(_) => {}
                None => {
                    return Err(Error::MalformedResponse("unbalanced end tag".to_string()));
                }
            },
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| Error::MalformedResponse(e.to_string()))?;
                collect_text(&stack, &text, &mut fault, &mut file);
            }
            Event::CData(c) => {
                let text = String::from_utf8_lossy(&c).into_owned();
                collect_text(&stack, &text, &mut fault, &mut file);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(Error::MalformedResponse(
            "document ended inside an open element".to_string(),
        ));
    }

    if let Some(message) = fault {
        let message = message.trim();
        let message = if message.is_empty() {
            "Unknown SOAP fault".to_string()
        } else {
            message.to_string()
        };
        return Ok(PhotoResponse::Fault(message));
    }

    if root != Some(Scope::Envelope) {
        return Err(Error::MalformedResponse(
            "missing SOAP Envelope root element".to_string(),
        ));
    }
    if !saw_body {
        return Err(Error::MalformedResponse(
            "missing SOAP Body element".to_string(),
        ));
    }

    Ok(match file.map(|f| f.trim().to_string()) {
        Some(data) if !data.is_empty() => PhotoResponse::Photo(data),
        _ => PhotoResponse::NoPhoto,
    })
}

fn collect_text(
    stack: &[Scope],
    text: &str,
    fault: &mut Option<String>,
    file: &mut Option<String>,
) {
    match stack.last() {
        Some(Scope::FaultString) if stack.contains(&Scope::Fault) => {
            if let Some(f) = fault.as_mut() {
                f.push_str(text);
            }
        }
        Some(Scope::File) => {
            if let Some(f) = file.as_mut() {
                f.push_str(text);
            }
        }
        _ => {}
    }
}
