//! Built-in web workers.
//!
//! A worker handles a request in code instead of from a file. Workers are
//! reachable at `/ext/<Name>` and at any path mapped to them in the
//! `workers` section of the server configuration.

use std::sync::Arc;

use thiserror::Error;

use crate::server::context::{ContextError, RequestContext};

mod bg_color;
mod echo_params;
mod home;
mod sum;

pub use bg_color::BgColorWorker;
pub use echo_params::EchoParams;
pub use home::Home;
pub use sum::SumWorker;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("{0}")]
    Failed(String),
}

/// Request handler implemented in Rust.
pub trait WebWorker: Send + Sync {
    fn process_request(&self, context: &mut RequestContext<'_>) -> Result<(), WorkerError>;
}

/// Names accepted by [`builtin`].
pub const BUILTIN_NAMES: &[&str] = &["EchoParams", "SumWorker", "BgColorWorker", "Home"];

/// Look up a built-in worker by its exact name.
pub fn builtin(name: &str) -> Option<Arc<dyn WebWorker>> {
    let worker: Arc<dyn WebWorker> = match name {
        "EchoParams" => Arc::new(EchoParams),
        "SumWorker" => Arc::new(SumWorker),
        "BgColorWorker" => Arc::new(BgColorWorker),
        "Home" => Arc::new(Home),
        _ => return None,
    };
    Some(worker)
}
