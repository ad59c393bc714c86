//! HTTP plumbing: accepting connections, parsing requests, routing them,
//! and writing responses through a [`RequestContext`](context::RequestContext).

pub mod context;
pub mod dispatcher;
pub mod http_server;
pub mod request;
pub mod response;
pub mod service;
pub mod worker_pool;

pub use request::{parse_request, ParsedRequest};
pub use service::{Connection, ConnectionService};
pub use worker_pool::{WorkerPool, WorkerPoolConfig, WorkerPoolMetrics};
