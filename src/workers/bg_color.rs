use crate::server::context::RequestContext;
use crate::workers::{WebWorker, WorkerError};

const SET_PAGE: &str = "/private/pages/bgColorSet.smscr";
const NOT_SET_PAGE: &str = "/private/pages/bgColorNotSet.smscr";

/// Stores a six-digit hex `bgcolor` parameter as a persistent parameter.
#[derive(Debug, Default, Clone, Copy)]
pub struct BgColorWorker;

impl WebWorker for BgColorWorker {
    fn process_request(&self, context: &mut RequestContext<'_>) -> Result<(), WorkerError> {
        let color = context
            .parameter("bgcolor")
            .filter(|color| is_hex_color(color))
            .map(str::to_string);

        match color {
            Some(color) => {
                context.set_persistent_parameter("bgcolor", color);
                context.dispatch(SET_PAGE)?;
            }
            None => context.dispatch(NOT_SET_PAGE)?,
        }
        Ok(())
    }
}

fn is_hex_color(value: &str) -> bool {
    value.len() == 6 && value.bytes().all(|b| b.is_ascii_hexdigit())
}
