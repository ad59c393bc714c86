use std::collections::BTreeMap;
use std::io::{self, Read};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// End of the request header block.
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

static REQUEST_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Z]+) (\S+) (HTTP/1\.[01])$").expect("request line regex should be valid")
});
static PORT_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":\d+$").expect("port suffix regex should be valid"));

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("connection closed before the request header was complete")]
    Incomplete,
    #[error("request header exceeds {limit} bytes")]
    HeaderTooLarge { limit: usize },
    #[error("malformed request line {0:?}")]
    MalformedRequestLine(String),
    #[error("method {0} is not supported")]
    UnsupportedMethod(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl RequestError {
    /// Whether a `400 Bad Request` should be sent back, as opposed to
    /// silently closing the connection.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RequestError::MalformedRequestLine(_)
                | RequestError::UnsupportedMethod(_)
                | RequestError::HeaderTooLarge { .. }
        )
    }
}

/// Request line and headers of one GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    pub method: String,
    /// Path without the query string, still percent-encoded.
    pub path: String,
    pub version: String,
    /// Host header with any port removed, or the configured domain.
    pub host: String,
    pub query_params: BTreeMap<String, String>,
}

/// Read from `reader` until the blank line ending the header block.
///
/// Bytes are decoded as Latin-1, so the result is always valid text.
pub fn read_header<R: Read>(reader: &mut R, limit: usize) -> Result<String, RequestError> {
    let mut buf: Vec<u8> = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            return Err(RequestError::Incomplete);
        }
        let search_from = buf.len().saturating_sub(HEADER_TERMINATOR.len() - 1);
        buf.extend_from_slice(&chunk[..n]);

        if let Some(pos) = find_subslice(&buf[search_from..], HEADER_TERMINATOR) {
            let end = search_from + pos;
            if end > limit {
                return Err(RequestError::HeaderTooLarge { limit });
            }
            return Ok(buf[..end].iter().map(|&b| char::from(b)).collect());
        }
        if buf.len() > limit {
            return Err(RequestError::HeaderTooLarge { limit });
        }
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Parse a header block produced by [`read_header`].
pub fn parse_request(header: &str, default_host: &str) -> Result<ParsedRequest, RequestError> {
    let mut lines = header.split("\r\n");
    let request_line = lines.next().unwrap_or("");

    let captures = REQUEST_LINE
        .captures(request_line)
        .ok_or_else(|| RequestError::MalformedRequestLine(request_line.to_string()))?;
    let method = captures[1].to_string();
    if method != "GET" {
        return Err(RequestError::UnsupportedMethod(method));
    }
    let target = &captures[2];
    let version = captures[3].to_string();

    let host = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("host"))
        .map(|(_, value)| strip_port(value.trim()))
        .filter(|host| !host.is_empty())
        .unwrap_or_else(|| default_host.to_string());

    let (path, query_params) = match target.split_once('?') {
        Some((path, query)) => (path.to_string(), parse_query_params(query)),
        None => (target.to_string(), BTreeMap::new()),
    };

    Ok(ParsedRequest {
        method,
        path,
        version,
        host,
        query_params,
    })
}

fn strip_port(host: &str) -> String {
    PORT_SUFFIX.replace(host, "").into_owned()
}

/// Decode `a=1&b=two` into a map. Later duplicates win.
pub fn parse_query_params(query: &str) -> BTreeMap<String, String> {
    url::form_urlencoded::parse(query.as_bytes())
        .filter(|(name, _)| !name.is_empty())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}
