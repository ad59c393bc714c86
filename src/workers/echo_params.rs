use crate::server::context::RequestContext;
use crate::workers::{WebWorker, WorkerError};

/// Renders the request parameters as an HTML table.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoParams;

impl WebWorker for EchoParams {
    fn process_request(&self, context: &mut RequestContext<'_>) -> Result<(), WorkerError> {
        context.set_mime_type("text/html")?;

        let mut body = String::from("<html>\n<body>\n<table>\n");
        for name in context.parameter_names() {
            let value = context.parameter(name).unwrap_or_default();
            body.push_str(&format!(
                "<tr><td>{}</td><td>{}</td></tr>\n",
                escape_html(name),
                escape_html(value)
            ));
        }
        body.push_str("</table>\n</body>\n</html>");

        context.write_str(&body)?;
        Ok(())
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}
