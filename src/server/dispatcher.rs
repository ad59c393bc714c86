//! Request routing.
//!
//! A URL path is resolved in this order:
//!
//! 1. `/private/...` on a client request is `404`; only redispatch can
//!    reach it.
//! 2. The decoded path is joined onto the document root and lexically
//!    normalized; anything that ends up outside the root is `403`.
//! 3. `/ext/<Name>` runs the built-in worker of that name.
//! 4. A path mapped in the `workers` configuration runs that worker.
//! 5. A file with the script extension is parsed and executed.
//! 6. Anything else is served as a static file.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{normalize, MimeTypes, ServerConfig};
use crate::script::{parse, ParseError, RuntimeError, SmartScriptEngine};
use crate::server::context::{ContextError, RequestContext};
use crate::workers::{self, WebWorker, WorkerError};

const PRIVATE_DIR: &str = "private";
const WORKER_PREFIX: &str = "/ext/";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("malformed request path {0:?}")]
    BadRequest(String),
    #[error("{0} resolves outside the document root")]
    Forbidden(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("failed to read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("template error: {0}")]
    Parse(#[from] ParseError),
    #[error("template execution failed: {0}")]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("worker {name} failed: {source}")]
    Worker {
        name: String,
        #[source]
        source: WorkerError,
    },
    #[error("redispatch nested deeper than {0} levels")]
    RedispatchDepth(usize),
}

impl DispatchError {
    /// HTTP status to answer with, looking through redispatch wrappers.
    pub fn status(&self) -> u16 {
        match self {
            DispatchError::BadRequest(_) => 400,
            DispatchError::Forbidden(_) => 403,
            DispatchError::NotFound(_) | DispatchError::Unreadable { .. } => 404,
            DispatchError::Context(ContextError::Dispatch { source, .. })
            | DispatchError::Worker {
                source: WorkerError::Context(ContextError::Dispatch { source, .. }),
                ..
            } => source.status(),
            _ => 500,
        }
    }
}

/// Routes paths to workers, templates, and files under one document root.
pub struct Dispatcher {
    document_root: PathBuf,
    script_extension: String,
    mime_types: MimeTypes,
    workers: HashMap<String, Arc<dyn WebWorker>>,
    max_depth: usize,
}

impl Dispatcher {
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let mut workers = HashMap::new();
        for (path, name) in &config.workers {
            let worker = workers::builtin(name)
                .with_context(|| format!("unknown worker {name:?} mapped at {path}"))?;
            workers.insert(path.clone(), worker);
        }
        Ok(Self {
            document_root: normalize(&config.document_root),
            script_extension: config.script_extension.clone(),
            mime_types: config.mime_types(),
            workers,
            max_depth: config.max_redispatch_depth,
        })
    }

    pub fn document_root(&self) -> &Path {
        &self.document_root
    }

    /// Route `url_path` on `context`.
    ///
    /// `direct` is true for client requests and false for redispatch.
    pub fn dispatch(
        &self,
        url_path: &str,
        context: &mut RequestContext<'_>,
        direct: bool,
    ) -> Result<(), DispatchError> {
        if context.dispatch_depth >= self.max_depth {
            return Err(DispatchError::RedispatchDepth(self.max_depth));
        }
        context.dispatch_depth += 1;
        let result = self.route(url_path, context, direct);
        context.dispatch_depth -= 1;
        result
    }

    fn route(
        &self,
        url_path: &str,
        context: &mut RequestContext<'_>,
        direct: bool,
    ) -> Result<(), DispatchError> {
        let path = self.resolve(url_path)?;
        if direct && self.is_private(&path) {
            return Err(DispatchError::NotFound(url_path.to_string()));
        }

        if let Some(name) = url_path.strip_prefix(WORKER_PREFIX) {
            let worker = workers::builtin(name)
                .ok_or_else(|| DispatchError::NotFound(url_path.to_string()))?;
            return run_worker(name, worker.as_ref(), context);
        }
        if let Some(worker) = self.workers.get(url_path) {
            return run_worker(url_path, worker.as_ref(), context);
        }

        let is_script = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == self.script_extension);
        if is_script {
            self.run_script(&path, context)
        } else {
            self.serve_file(&path, context)
        }
    }

    /// Map a URL path to a file path inside the document root.
    pub fn resolve(&self, url_path: &str) -> Result<PathBuf, DispatchError> {
        let decoded = urlencoding::decode(url_path)
            .map_err(|_| DispatchError::BadRequest(url_path.to_string()))?;
        if decoded.contains('\0') {
            return Err(DispatchError::BadRequest(url_path.to_string()));
        }

        let candidate = normalize(&self.document_root.join(decoded.trim_start_matches('/')));
        if !candidate.starts_with(&self.document_root) {
            warn!(path = %url_path, "path escapes document root");
            return Err(DispatchError::Forbidden(url_path.to_string()));
        }
        Ok(candidate)
    }

    /// Whether a resolved path lies under the private directory, either
    /// lexically or after following symlinks.
    fn is_private(&self, path: &Path) -> bool {
        let under_private = |path: &Path, root: &Path| {
            path.strip_prefix(root)
                .is_ok_and(|relative| relative.starts_with(PRIVATE_DIR))
        };
        if under_private(path, &self.document_root) {
            return true;
        }
        match (fs::canonicalize(path), fs::canonicalize(&self.document_root)) {
            (Ok(real), Ok(root)) => under_private(&real, &root),
            _ => false,
        }
    }

    /// Reject files whose real location, after following symlinks, is
    /// outside the real document root.
    fn check_real_path(&self, path: &Path) -> Result<(), DispatchError> {
        let (Ok(real), Ok(root)) = (fs::canonicalize(path), fs::canonicalize(&self.document_root))
        else {
            return Ok(());
        };
        if real.starts_with(root) {
            Ok(())
        } else {
            Err(DispatchError::Forbidden(path.display().to_string()))
        }
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, DispatchError> {
        if !path.is_file() {
            return Err(DispatchError::NotFound(path.display().to_string()));
        }
        self.check_real_path(path)?;
        fs::read(path).map_err(|source| DispatchError::Unreadable {
            path: path.to_path_buf(),
            source,
        })
    }

    fn run_script(&self, path: &Path, context: &mut RequestContext<'_>) -> Result<(), DispatchError> {
        let bytes = self.read(path)?;
        let source = String::from_utf8(bytes).map_err(|err| DispatchError::Unreadable {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidData, err),
        })?;
        let document = parse(&source)?;
        debug!(script = %path.display(), "executing script");
        SmartScriptEngine::new(&document, context).execute()?;
        Ok(())
    }

    fn serve_file(&self, path: &Path, context: &mut RequestContext<'_>) -> Result<(), DispatchError> {
        let bytes = self.read(path)?;
        context.set_mime_type(self.mime_types.lookup(path))?;
        context.set_content_length(Some(bytes.len() as u64))?;
        context.write(&bytes)?;
        Ok(())
    }
}

fn run_worker(
    name: &str,
    worker: &dyn WebWorker,
    context: &mut RequestContext<'_>,
) -> Result<(), DispatchError> {
    debug!(worker = name, "running worker");
    worker
        .process_request(context)
        .map_err(|source| DispatchError::Worker {
            name: name.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher(root: &Path) -> Dispatcher {
        Dispatcher::from_config(&ServerConfig::new(root)).unwrap()
    }

    #[test]
    fn resolve_stays_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(dir.path());
        assert_eq!(
            d.resolve("/a/./b/../c.html").unwrap(),
            d.document_root().join("a/c.html")
        );
        assert_eq!(d.resolve("/").unwrap(), d.document_root());
    }

    #[test]
    fn resolve_rejects_escapes() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(dir.path());
        assert!(matches!(
            d.resolve("/../secret"),
            Err(DispatchError::Forbidden(_))
        ));
        assert!(matches!(
            d.resolve("/a/%2e%2e/%2e%2e/secret"),
            Err(DispatchError::Forbidden(_))
        ));
    }

    #[test]
    fn sibling_with_common_prefix_is_forbidden() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("www");
        fs::create_dir(&root).unwrap();
        let d = dispatcher(&root);
        assert!(matches!(
            d.resolve("/../www2/file.txt"),
            Err(DispatchError::Forbidden(_))
        ));
    }

    #[test]
    fn status_mapping() {
        assert_eq!(DispatchError::BadRequest("x".into()).status(), 400);
        assert_eq!(DispatchError::Forbidden("x".into()).status(), 403);
        assert_eq!(DispatchError::NotFound("x".into()).status(), 404);
        assert_eq!(DispatchError::RedispatchDepth(8).status(), 500);
        assert_eq!(
            DispatchError::Runtime(RuntimeError::DivisionByZero).status(),
            500
        );
        let nested = DispatchError::Worker {
            name: "Home".into(),
            source: WorkerError::Context(ContextError::Dispatch {
                path: "/private/pages/home.smscr".into(),
                source: Box::new(DispatchError::NotFound("home".into())),
            }),
        };
        assert_eq!(nested.status(), 404);
    }

    #[test]
    fn serves_static_file_with_mime_and_length() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("note.TXT"), "hello").unwrap();
        let d = dispatcher(dir.path());
        let mut sink = Vec::new();
        {
            let mut ctx = RequestContext::new(&mut sink);
            d.dispatch("/note.TXT", &mut ctx, true).unwrap();
        }
        let out = String::from_utf8(sink).unwrap();
        assert!(out.contains("Content-Type: text/plain; charset=UTF-8\r\n"));
        assert!(out.contains("Content-Length: 5\r\n"));
        assert!(out.ends_with("\r\n\r\nhello"));
    }

    #[test]
    fn unknown_extension_is_octet_stream() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("blob.bin"), [0u8, 1, 2]).unwrap();
        let d = dispatcher(dir.path());
        let mut sink = Vec::new();
        {
            let mut ctx = RequestContext::new(&mut sink);
            d.dispatch("/blob.bin", &mut ctx, true).unwrap();
        }
        assert!(String::from_utf8_lossy(&sink).contains("Content-Type: application/octet-stream\r\n"));
    }

    #[test]
    fn missing_file_and_directory_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(dir.path());
        let mut sink = Vec::new();
        let mut ctx = RequestContext::new(&mut sink);
        assert!(matches!(
            d.dispatch("/nope.html", &mut ctx, true),
            Err(DispatchError::NotFound(_))
        ));
        assert!(matches!(
            d.dispatch("/", &mut ctx, true),
            Err(DispatchError::NotFound(_))
        ));
    }

    #[test]
    fn private_paths_need_redispatch() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("private")).unwrap();
        fs::write(dir.path().join("private/p.txt"), "secret").unwrap();
        let d = dispatcher(dir.path());

        let mut sink = Vec::new();
        let mut ctx = RequestContext::new(&mut sink);
        assert!(matches!(
            d.dispatch("/private/p.txt", &mut ctx, true),
            Err(DispatchError::NotFound(_))
        ));
        d.dispatch("/private/p.txt", &mut ctx, false).unwrap();
        assert!(ctx.headers_sent());
    }

    #[test]
    fn private_paths_stay_hidden_in_any_spelling() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("private")).unwrap();
        fs::write(dir.path().join("private/p.txt"), "secret").unwrap();
        let d = dispatcher(dir.path());

        for url in [
            "/%70rivate/p.txt",
            "/./private/p.txt",
            "//private/p.txt",
            "/x/../private/p.txt",
            "/private",
        ] {
            let mut sink = Vec::new();
            let mut ctx = RequestContext::new(&mut sink);
            assert!(
                matches!(d.dispatch(url, &mut ctx, true), Err(DispatchError::NotFound(_))),
                "{url} was served"
            );
            assert!(!ctx.headers_sent());
        }

        let mut sink = Vec::new();
        let mut ctx = RequestContext::new(&mut sink);
        d.dispatch("/privateer.txt", &mut ctx, true).unwrap_err();
        assert!(!d.is_private(&d.resolve("/privateer.txt").unwrap()));
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_into_private_are_hidden() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("private")).unwrap();
        fs::write(dir.path().join("private/p.txt"), "secret").unwrap();
        std::os::unix::fs::symlink(dir.path().join("private"), dir.path().join("open")).unwrap();
        let d = dispatcher(dir.path());

        let mut sink = Vec::new();
        let mut ctx = RequestContext::new(&mut sink);
        assert!(matches!(
            d.dispatch("/open/p.txt", &mut ctx, true),
            Err(DispatchError::NotFound(_))
        ));
    }

    #[test]
    fn scripts_are_executed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("t.smscr"), "{$ FOR i 1 3 $}{$= i $}{$END$}").unwrap();
        let d = dispatcher(dir.path());
        let mut sink = Vec::new();
        {
            let mut ctx = RequestContext::new(&mut sink);
            d.dispatch("/t.smscr", &mut ctx, true).unwrap();
        }
        assert!(String::from_utf8(sink).unwrap().ends_with("\r\n\r\n123"));
    }

    #[test]
    fn broken_script_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.smscr"), "{$ FOR i 1 $}").unwrap();
        let d = dispatcher(dir.path());
        let mut sink = Vec::new();
        let mut ctx = RequestContext::new(&mut sink);
        let err = d.dispatch("/bad.smscr", &mut ctx, true).unwrap_err();
        assert!(matches!(err, DispatchError::Parse(_)));
        assert_eq!(err.status(), 500);
        assert!(!ctx.headers_sent());
    }

    #[test]
    fn unknown_ext_worker_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(dir.path());
        let mut sink = Vec::new();
        let mut ctx = RequestContext::new(&mut sink);
        assert!(matches!(
            d.dispatch("/ext/Nope", &mut ctx, true),
            Err(DispatchError::NotFound(_))
        ));
    }

    #[test]
    fn runaway_redispatch_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServerConfig::new(dir.path());
        config.max_redispatch_depth = 3;
        let d = Dispatcher::from_config(&config).unwrap();
        let mut sink = Vec::new();
        let mut ctx = RequestContext::new(&mut sink);
        ctx.dispatch_depth = 3;
        assert!(matches!(
            d.dispatch("/x", &mut ctx, false),
            Err(DispatchError::RedispatchDepth(3))
        ));
    }
}
