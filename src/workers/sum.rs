use crate::server::context::RequestContext;
use crate::workers::{WebWorker, WorkerError};

const PAGE: &str = "/private/pages/calc.smscr";

/// Adds parameters `a` and `b` (defaults 1 and 2) and renders the result
/// through the calculator page.
#[derive(Debug, Default, Clone, Copy)]
pub struct SumWorker;

impl WebWorker for SumWorker {
    fn process_request(&self, context: &mut RequestContext<'_>) -> Result<(), WorkerError> {
        let a = int_parameter(context, "a", 1);
        let b = int_parameter(context, "b", 2);
        let sum = a
            .checked_add(b)
            .ok_or_else(|| WorkerError::Failed(format!("{a} + {b} overflows")))?;

        context.set_temporary_parameter("varA", a.to_string());
        context.set_temporary_parameter("varB", b.to_string());
        context.set_temporary_parameter("zbroj", sum.to_string());
        let image = if sum % 2 == 0 { "2pac.gif" } else { "rave.gif" };
        context.set_temporary_parameter("imgName", image);

        context.dispatch(PAGE)?;
        Ok(())
    }
}

fn int_parameter(context: &RequestContext<'_>, name: &str, default: i32) -> i32 {
    context
        .parameter(name)
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
