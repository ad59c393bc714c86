//! Per-connection request handling.
//!
//! [`ConnectionService::serve`] runs one request from the first header byte
//! to the last body byte. It runs on a pool worker and owns the
//! [`RequestContext`] for the whole connection.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::ids::ConnectionId;
use crate::server::context::{Charset, RequestContext};
use crate::server::dispatcher::{DispatchError, Dispatcher};
use crate::server::request::{parse_request, read_header, ParsedRequest};
use crate::server::response::write_empty_response;

/// An accepted client connection waiting for a worker.
pub struct Connection {
    pub id: ConnectionId,
    pub stream: may::net::TcpStream,
    pub peer: Option<SocketAddr>,
}

impl Connection {
    pub fn new(stream: may::net::TcpStream, peer: Option<SocketAddr>) -> Self {
        Self {
            id: ConnectionId::new(),
            stream,
            peer,
        }
    }
}

/// Read-only state shared by all workers.
#[derive(Clone)]
pub struct ConnectionService {
    dispatcher: Arc<Dispatcher>,
    domain_name: String,
    max_header_bytes: usize,
    charset: Charset,
}

impl ConnectionService {
    pub fn new(config: &ServerConfig, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            domain_name: config.domain_name.clone(),
            max_header_bytes: config.max_header_bytes,
            charset: config.charset(),
        }
    }

    /// Handle an accepted TCP connection, then close it.
    pub fn handle(&self, mut connection: Connection) {
        debug!(
            connection_id = %connection.id,
            peer = ?connection.peer,
            "Handling connection"
        );
        self.serve(connection.id, &mut connection.stream);
        if let Err(e) = connection.stream.shutdown(std::net::Shutdown::Both) {
            debug!(connection_id = %connection.id, error = %e, "Shutdown after response failed");
        }
    }

    /// Serve a single request read from `stream`.
    ///
    /// Returns the status that was sent, or `None` when the connection was
    /// dropped without a response.
    pub fn serve<S: Read + Write>(&self, id: ConnectionId, stream: &mut S) -> Option<u16> {
        let header = match read_header(stream, self.max_header_bytes) {
            Ok(header) => header,
            Err(err) if err.is_client_error() => {
                warn!(connection_id = %id, error = %err, "Rejected request header");
                return self.respond_empty(id, stream, 400);
            }
            Err(err) => {
                debug!(connection_id = %id, error = %err, "Connection closed before request");
                return None;
            }
        };

        let request = match parse_request(&header, &self.domain_name) {
            Ok(request) => request,
            Err(err) => {
                warn!(connection_id = %id, error = %err, "Malformed request");
                return self.respond_empty(id, stream, 400);
            }
        };

        self.route(id, &request, stream)
    }

    fn route(&self, id: ConnectionId, request: &ParsedRequest, stream: &mut dyn Write) -> Option<u16> {
        let outcome = {
            let mut context = RequestContext::new(&mut *stream)
                .with_parameters(request.query_params.clone())
                .with_persistent_parameters(BTreeMap::new())
                .with_dispatcher(Arc::clone(&self.dispatcher))
                .with_charset(self.charset);

            let result = self
                .dispatcher
                .dispatch(&request.path, &mut context, true)
                .and_then(|()| {
                    // Nothing written yet: still send the header block.
                    if context.headers_sent() {
                        Ok(())
                    } else {
                        context.write(&[]).map_err(DispatchError::from)
                    }
                });
            (result, context.headers_sent(), context.status_code())
        };

        match outcome {
            (Ok(()), _, status) => {
                info!(
                    connection_id = %id,
                    host = %request.host,
                    path = %request.path,
                    status,
                    "Request served"
                );
                Some(status)
            }
            (Err(err), false, _) => {
                let status = err.status();
                log_failure(id, &request.path, status, &err);
                self.respond_empty(id, stream, status)
            }
            (Err(err), true, status) => {
                // Headers are out; all that is left is to close the connection.
                error!(
                    connection_id = %id,
                    path = %request.path,
                    status,
                    error = %err,
                    "Request failed after response headers were sent"
                );
                Some(status)
            }
        }
    }

    fn respond_empty(&self, id: ConnectionId, stream: &mut dyn Write, status: u16) -> Option<u16> {
        match write_empty_response(stream, status) {
            Ok(()) => Some(status),
            Err(e) => {
                debug!(connection_id = %id, status, error = %e, "Failed to write error response");
                None
            }
        }
    }
}

fn log_failure(id: ConnectionId, path: &str, status: u16, err: &DispatchError) {
    if status >= 500 {
        error!(connection_id = %id, path, status, error = %err, "Request failed");
    } else {
        warn!(connection_id = %id, path, status, error = %err, "Request rejected");
    }
}
