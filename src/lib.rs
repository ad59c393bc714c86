//! # smarthttp
//!
//! **smarthttp** is a small coroutine-powered HTTP server that serves static
//! files and renders SmartScript templates, a tag-based template language
//! with loops, stack-evaluated expressions and access to request state.
//!
//! ## Architecture
//!
//! - **[`script`]** - SmartScript lexer, parser, document tree and engine
//! - **[`server`]** - Acceptor, worker pool, request parsing, routing and
//!   the per-request [`RequestContext`]
//! - **[`workers`]** - Built-in request handlers written in Rust
//! - **[`config`]** - YAML configuration with environment overrides
//! - **[`logging`]** - `tracing` subscriber setup
//! - **[`cli`]** - The `smarthttp` binary
//!
//! ### Request Handling Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Client
//!     participant Acceptor as Acceptor<br/>(coroutine)
//!     participant Pool as WorkerPool
//!     participant Service as ConnectionService
//!     participant Dispatcher
//!     participant Worker as WebWorker
//!     participant Engine as SmartScriptEngine
//!
//!     Client->>Acceptor: TCP connect
//!     Acceptor->>Pool: dispatch(Connection)
//!     Pool->>Service: handle(Connection)
//!     Service->>Service: read header, parse request line
//!     Service->>Dispatcher: dispatch(path, context, direct)
//!     alt worker
//!         Dispatcher->>Worker: process_request(context)
//!         Worker->>Dispatcher: context.dispatch("/private/...")
//!         Dispatcher->>Engine: parse + execute
//!     else template
//!         Dispatcher->>Engine: parse + execute
//!     else static file
//!         Dispatcher->>Dispatcher: mime lookup, copy bytes
//!     end
//!     Service-->>Client: headers + body, close
//! ```
//!
//! ## Example
//!
//! ```
//! use smarthttp::script::{parse, SmartScriptEngine};
//! use smarthttp::RequestContext;
//!
//! let document = parse("{$= \"a\" \"b\" $}{$= 1 2 + $}").unwrap();
//! let mut out = Vec::new();
//! {
//!     let mut context = RequestContext::new(&mut out);
//!     SmartScriptEngine::new(&document, &mut context).execute().unwrap();
//! }
//! assert!(String::from_utf8(out).unwrap().ends_with("\r\n\r\nab3"));
//! ```

pub mod cli;
pub mod config;
pub mod ids;
pub mod logging;
pub mod script;
pub mod server;
pub mod workers;

pub use config::{MimeTypes, ServerConfig};
pub use server::context::{Charset, ContextError, Cookie, RequestContext};
pub use server::dispatcher::{DispatchError, Dispatcher};
pub use server::http_server::{ServerHandle, SmartHttpServer};
