use crate::server::context::RequestContext;
use crate::workers::{WebWorker, WorkerError};

const PAGE: &str = "/private/pages/home.smscr";
const DEFAULT_BACKGROUND: &str = "7F7F7F";

/// Renders the home page with the stored background color.
#[derive(Debug, Default, Clone, Copy)]
pub struct Home;

impl WebWorker for Home {
    fn process_request(&self, context: &mut RequestContext<'_>) -> Result<(), WorkerError> {
        let background = context
            .persistent_parameter("bgcolor")
            .unwrap_or(DEFAULT_BACKGROUND)
            .to_string();
        context.set_temporary_parameter("background", background);
        context.dispatch(PAGE)?;
        Ok(())
    }
}
