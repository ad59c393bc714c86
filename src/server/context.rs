//! Per-request response state and parameter maps.
//!
//! A [`RequestContext`] owns everything a template or worker can observe or
//! change about one response: status line, MIME type, charset, optional
//! content length, cookies, and the three parameter maps. The header block
//! is emitted exactly once, on the first write, after which every header
//! mutator fails with [`ContextError::HeadersAlreadySent`].

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use thiserror::Error;

use crate::server::dispatcher::{DispatchError, Dispatcher};

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("response headers have already been sent")]
    HeadersAlreadySent,
    #[error("header value {0:?} contains a line break")]
    InvalidHeaderValue(String),
    #[error("unsupported character encoding {0:?}")]
    UnsupportedCharset(String),
    #[error("no dispatcher is attached to this request")]
    NoDispatcher,
    #[error("failed to write response: {0}")]
    Io(#[from] io::Error),
    #[error("dispatch to {path} failed: {source}")]
    Dispatch {
        path: String,
        #[source]
        source: Box<DispatchError>,
    },
}

fn has_line_break(value: &str) -> bool {
    value.contains(['\r', '\n'])
}

/// Header fields are written verbatim, so a line break would start a new header.
fn header_value(value: String) -> Result<String, ContextError> {
    if has_line_break(&value) {
        Err(ContextError::InvalidHeaderValue(value))
    } else {
        Ok(value)
    }
}

/// Character encodings a response body can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    #[default]
    Utf8,
    Latin1,
}

impl Charset {
    /// Parse an encoding label such as `UTF-8` or `ISO-8859-1`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Some(Charset::Utf8),
            "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" => Some(Charset::Latin1),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Charset::Utf8 => "UTF-8",
            Charset::Latin1 => "ISO-8859-1",
        }
    }

    /// Encode text; characters outside Latin-1 become `?`.
    pub fn encode(self, text: &str) -> Cow<'_, [u8]> {
        match self {
            Charset::Utf8 => Cow::Borrowed(text.as_bytes()),
            Charset::Latin1 => Cow::Owned(
                text.chars()
                    .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                    .collect(),
            ),
        }
    }
}

/// An outgoing `Set-Cookie` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    name: String,
    value: String,
    domain: Option<String>,
    path: Option<String>,
    max_age: Option<u32>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            max_age: None,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_max_age(mut self, seconds: u32) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=\"{}\"", self.name, self.value)?;
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={domain}")?;
        }
        if let Some(path) = &self.path {
            write!(f, "; Path={path}")?;
        }
        if let Some(max_age) = self.max_age {
            write!(f, "; Max-Age={max_age}")?;
        }
        Ok(())
    }
}

pub struct RequestContext<'a> {
    output: &'a mut dyn Write,
    dispatcher: Option<Arc<Dispatcher>>,
    charset: Charset,
    status_code: u16,
    status_text: String,
    mime_type: String,
    content_length: Option<u64>,
    cookies: Vec<Cookie>,
    parameters: BTreeMap<String, String>,
    persistent_parameters: BTreeMap<String, String>,
    temporary_parameters: BTreeMap<String, String>,
    headers_sent: bool,
    pub(crate) dispatch_depth: usize,
}

impl<'a> RequestContext<'a> {
    /// A context with status `200 OK`, `text/html`, UTF-8 and empty maps.
    pub fn new(output: &'a mut dyn Write) -> Self {
        Self {
            output,
            dispatcher: None,
            charset: Charset::Utf8,
            status_code: 200,
            status_text: "OK".to_string(),
            mime_type: "text/html".to_string(),
            content_length: None,
            cookies: Vec::new(),
            parameters: BTreeMap::new(),
            persistent_parameters: BTreeMap::new(),
            temporary_parameters: BTreeMap::new(),
            headers_sent: false,
            dispatch_depth: 0,
        }
    }

    pub fn with_parameters(mut self, parameters: BTreeMap<String, String>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_persistent_parameters(mut self, parameters: BTreeMap<String, String>) -> Self {
        self.persistent_parameters = parameters;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn with_charset(mut self, charset: Charset) -> Self {
        self.charset = charset;
        self
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn encoding(&self) -> Charset {
        self.charset
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    pub fn headers_sent(&self) -> bool {
        self.headers_sent
    }

    fn ensure_headers_pending(&self) -> Result<(), ContextError> {
        if self.headers_sent {
            Err(ContextError::HeadersAlreadySent)
        } else {
            Ok(())
        }
    }

    pub fn set_status_code(&mut self, code: u16) -> Result<(), ContextError> {
        self.ensure_headers_pending()?;
        self.status_code = code;
        Ok(())
    }

    pub fn set_status_text(&mut self, text: impl Into<String>) -> Result<(), ContextError> {
        self.ensure_headers_pending()?;
        self.status_text = header_value(text.into())?;
        Ok(())
    }

    pub fn set_mime_type(&mut self, mime_type: impl Into<String>) -> Result<(), ContextError> {
        self.ensure_headers_pending()?;
        self.mime_type = header_value(mime_type.into())?;
        Ok(())
    }

    /// Switch the body encoding by label, e.g. `ISO-8859-1`.
    pub fn set_encoding(&mut self, label: &str) -> Result<(), ContextError> {
        self.ensure_headers_pending()?;
        self.charset = Charset::from_label(label)
            .ok_or_else(|| ContextError::UnsupportedCharset(label.to_string()))?;
        Ok(())
    }

    pub fn set_content_length(&mut self, length: Option<u64>) -> Result<(), ContextError> {
        self.ensure_headers_pending()?;
        self.content_length = length;
        Ok(())
    }

    pub fn add_cookie(&mut self, cookie: Cookie) -> Result<(), ContextError> {
        self.ensure_headers_pending()?;
        let fields = [&cookie.name, &cookie.value]
            .into_iter()
            .chain(cookie.domain.as_ref())
            .chain(cookie.path.as_ref());
        for field in fields {
            if has_line_break(field) {
                return Err(ContextError::InvalidHeaderValue(field.clone()));
            }
        }
        self.cookies.push(cookie);
        Ok(())
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.parameters.keys().map(String::as_str)
    }

    pub fn persistent_parameter(&self, name: &str) -> Option<&str> {
        self.persistent_parameters.get(name).map(String::as_str)
    }

    pub fn persistent_parameter_names(&self) -> impl Iterator<Item = &str> {
        self.persistent_parameters.keys().map(String::as_str)
    }

    pub fn set_persistent_parameter(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.persistent_parameters.insert(name.into(), value.into());
    }

    pub fn remove_persistent_parameter(&mut self, name: &str) -> Option<String> {
        self.persistent_parameters.remove(name)
    }

    pub fn persistent_parameters(&self) -> &BTreeMap<String, String> {
        &self.persistent_parameters
    }

    pub fn temporary_parameter(&self, name: &str) -> Option<&str> {
        self.temporary_parameters.get(name).map(String::as_str)
    }

    pub fn temporary_parameter_names(&self) -> impl Iterator<Item = &str> {
        self.temporary_parameters.keys().map(String::as_str)
    }

    pub fn set_temporary_parameter(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.temporary_parameters.insert(name.into(), value.into());
    }

    pub fn remove_temporary_parameter(&mut self, name: &str) -> Option<String> {
        self.temporary_parameters.remove(name)
    }

    /// Sessions are not tracked; there is never a session id.
    pub fn session_id(&self) -> Option<&str> {
        None
    }

    /// Write raw bytes, sending the header block first if needed.
    pub fn write(&mut self, data: &[u8]) -> Result<(), ContextError> {
        self.send_headers()?;
        self.output.write_all(data)?;
        self.output.flush()?;
        Ok(())
    }

    /// Write text encoded with the current charset.
    pub fn write_str(&mut self, text: &str) -> Result<(), ContextError> {
        let charset = self.charset;
        self.write(&charset.encode(text))
    }

    /// Internally dispatch `path` on this same context.
    ///
    /// Unlike a client request, this may reach resources under `/private/`.
    pub fn dispatch(&mut self, path: &str) -> Result<(), ContextError> {
        let dispatcher = self.dispatcher.clone().ok_or(ContextError::NoDispatcher)?;
        dispatcher
            .dispatch(path, self, false)
            .map_err(|source| ContextError::Dispatch {
                path: path.to_string(),
                source: Box::new(source),
            })
    }

    fn send_headers(&mut self) -> Result<(), ContextError> {
        if self.headers_sent {
            return Ok(());
        }
        let header = self.header_block();
        self.output.write_all(&Charset::Latin1.encode(&header))?;
        self.headers_sent = true;
        Ok(())
    }

    fn header_block(&self) -> String {
        let mut header = format!("HTTP/1.1 {} {}\r\n", self.status_code, self.status_text);
        header.push_str("Content-Type: ");
        header.push_str(&self.mime_type);
        if self.mime_type.starts_with("text/") {
            header.push_str("; charset=");
            header.push_str(self.charset.label());
        }
        header.push_str("\r\n");
        if let Some(length) = self.content_length {
            header.push_str(&format!("Content-Length: {length}\r\n"));
        }
        for cookie in &self.cookies {
            header.push_str(&format!("Set-Cookie: {cookie}\r\n"));
        }
        header.push_str("\r\n");
        header
    }
}
