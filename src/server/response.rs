use std::io::{self, Write};

use http::StatusCode;

use crate::server::context::{ContextError, RequestContext};

/// Canonical reason phrase for a status code.
pub fn status_reason(status: u16) -> &'static str {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("Unknown")
}

/// Write a complete response with the given status and an empty body.
pub fn write_empty_response(output: &mut dyn Write, status: u16) -> io::Result<()> {
    let mut context = RequestContext::new(output);
    fill_empty(&mut context, status).map_err(|err| match err {
        ContextError::Io(io) => io,
        other => io::Error::other(other.to_string()),
    })
}

fn fill_empty(context: &mut RequestContext<'_>, status: u16) -> Result<(), ContextError> {
    context.set_status_code(status)?;
    context.set_status_text(status_reason(status))?;
    context.set_content_length(Some(0))?;
    context.write(&[])
}
