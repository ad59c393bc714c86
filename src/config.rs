//! # Server Configuration
//!
//! Configuration is read from a YAML file and then overridden by
//! environment variables and finally by command-line flags.
//!
//! ## YAML
//!
//! ```yaml
//! address: 127.0.0.1
//! port: 5721
//! domain_name: localhost
//! worker_threads: 4
//! document_root: ./webroot
//! script_extension: smscr
//! mime_types:
//!   html: text/html
//!   png: image/png
//! workers:
//!   /calc: SumWorker
//!   /index2.html: Home
//! ```
//!
//! Only `document_root` is required. A relative document root is resolved
//! against the directory holding the configuration file.
//!
//! ## Environment Variables
//!
//! | Variable                 | Overrides        |
//! |--------------------------|------------------|
//! | `SMARTHTTP_PORT`         | `port`           |
//! | `SMARTHTTP_WORKERS`      | `worker_threads` |
//! | `SMARTHTTP_DOCUMENT_ROOT`| `document_root`  |
//! | `SMARTHTTP_STACK_SIZE`   | `stack_size`, decimal or `0x` hex |

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::server::context::Charset;
use crate::workers;

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5721
}

fn default_domain_name() -> String {
    "localhost".to_string()
}

fn default_worker_threads() -> usize {
    4
}

fn default_script_extension() -> String {
    "smscr".to_string()
}

fn default_mime_type() -> String {
    "application/octet-stream".to_string()
}

fn default_max_header_bytes() -> usize {
    8192
}

fn default_max_redispatch_depth() -> usize {
    8
}

fn default_stack_size() -> usize {
    0x10000
}

fn default_charset() -> String {
    "UTF-8".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Host name used when a request carries no `Host` header.
    #[serde(default = "default_domain_name")]
    pub domain_name: String,
    /// Number of connection-handling coroutines.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    pub document_root: PathBuf,
    /// Files with this extension are executed as templates.
    #[serde(default = "default_script_extension")]
    pub script_extension: String,
    /// Extension to MIME type, on top of the built-in table.
    #[serde(default)]
    pub mime_types: BTreeMap<String, String>,
    #[serde(default = "default_mime_type")]
    pub default_mime_type: String,
    /// URL path to built-in worker name.
    #[serde(default)]
    pub workers: BTreeMap<String, String>,
    #[serde(default = "default_max_header_bytes")]
    pub max_header_bytes: usize,
    #[serde(default = "default_max_redispatch_depth")]
    pub max_redispatch_depth: usize,
    /// Coroutine stack size in bytes.
    #[serde(default = "default_stack_size")]
    pub stack_size: usize,
    /// Default response body encoding.
    #[serde(default = "default_charset")]
    pub charset: String,
}

impl ServerConfig {
    /// Configuration with every default and the given document root.
    pub fn new(document_root: impl Into<PathBuf>) -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            domain_name: default_domain_name(),
            worker_threads: default_worker_threads(),
            document_root: document_root.into(),
            script_extension: default_script_extension(),
            mime_types: BTreeMap::new(),
            default_mime_type: default_mime_type(),
            workers: BTreeMap::new(),
            max_header_bytes: default_max_header_bytes(),
            max_redispatch_depth: default_max_redispatch_depth(),
            stack_size: default_stack_size(),
            charset: default_charset(),
        }
    }

    /// Read a YAML configuration file. Call [`validate`](Self::validate) before use.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let mut config = Self::from_yaml(&text)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        if config.document_root.is_relative() {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            config.document_root = base.join(&config.document_root);
        }
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: ServerConfig = serde_yaml::from_str(text)?;
        Ok(config)
    }

    /// Apply `SMARTHTTP_*` environment overrides.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(port) = lookup("SMARTHTTP_PORT") {
            self.port = port
                .parse()
                .with_context(|| format!("SMARTHTTP_PORT={port} is not a port number"))?;
        }
        if let Some(workers) = lookup("SMARTHTTP_WORKERS") {
            self.worker_threads = workers
                .parse()
                .with_context(|| format!("SMARTHTTP_WORKERS={workers} is not a number"))?;
        }
        if let Some(root) = lookup("SMARTHTTP_DOCUMENT_ROOT") {
            self.document_root = PathBuf::from(root);
        }
        if let Some(size) = lookup("SMARTHTTP_STACK_SIZE") {
            self.stack_size = parse_size(&size)
                .with_context(|| format!("SMARTHTTP_STACK_SIZE={size} is not a size"))?;
        }
        Ok(())
    }

    /// Check invariants and make the document root absolute.
    pub fn validate(&mut self) -> Result<()> {
        if self.worker_threads == 0 {
            bail!("worker_threads must be at least 1");
        }
        if self.max_redispatch_depth == 0 {
            bail!("max_redispatch_depth must be at least 1");
        }
        if self.script_extension.is_empty() {
            bail!("script_extension must not be empty");
        }
        if Charset::from_label(&self.charset).is_none() {
            bail!("unsupported charset {:?}", self.charset);
        }
        for (path, name) in &self.workers {
            if !path.starts_with('/') {
                bail!("worker path {path:?} must start with '/'");
            }
            if workers::builtin(name).is_none() {
                bail!("unknown worker {name:?} mapped at {path}");
            }
        }

        let root = if self.document_root.is_absolute() {
            self.document_root.clone()
        } else {
            env::current_dir()
                .context("failed to resolve current directory")?
                .join(&self.document_root)
        };
        self.document_root = normalize(&root);
        if !self.document_root.is_dir() {
            bail!(
                "document root {} is not a directory",
                self.document_root.display()
            );
        }
        Ok(())
    }

    pub fn charset(&self) -> Charset {
        Charset::from_label(&self.charset).unwrap_or_default()
    }

    pub fn mime_types(&self) -> MimeTypes {
        let mut mime = MimeTypes::with_defaults(&self.default_mime_type);
        for (extension, mime_type) in &self.mime_types {
            mime.insert(extension, mime_type);
        }
        mime
    }
}

/// Parse a byte size given in decimal or `0x` hexadecimal.
pub fn parse_size(value: &str) -> Option<usize> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

/// Lexically resolve `.` and `..` without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Extension to MIME type lookup. Extensions are matched case-insensitively.
#[derive(Debug, Clone)]
pub struct MimeTypes {
    by_extension: HashMap<String, String>,
    fallback: String,
}

const BUILTIN_MIME_TYPES: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("htm", "text/html"),
    ("txt", "text/plain"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("json", "application/json"),
    ("xml", "application/xml"),
    ("gif", "image/gif"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("svg", "image/svg+xml"),
    ("ico", "image/x-icon"),
    ("pdf", "application/pdf"),
];

impl MimeTypes {
    pub fn with_defaults(fallback: &str) -> Self {
        let mut mime = Self {
            by_extension: HashMap::new(),
            fallback: fallback.to_string(),
        };
        for (extension, mime_type) in BUILTIN_MIME_TYPES {
            mime.insert(extension, mime_type);
        }
        mime
    }

    pub fn insert(&mut self, extension: &str, mime_type: &str) {
        self.by_extension.insert(
            extension.trim_start_matches('.').to_ascii_lowercase(),
            mime_type.to_string(),
        );
    }

    pub fn lookup(&self, path: &Path) -> &str {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.by_extension.get(&ext.to_ascii_lowercase()))
            .map(String::as_str)
            .unwrap_or(&self.fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_yaml_takes_defaults() {
        let config = ServerConfig::from_yaml("document_root: /srv/www\n").unwrap();
        assert_eq!(config.address, "127.0.0.1");
        assert_eq!(config.port, 5721);
        assert_eq!(config.worker_threads, 4);
        assert_eq!(config.script_extension, "smscr");
        assert_eq!(config.max_redispatch_depth, 8);
        assert_eq!(config.stack_size, 0x10000);
        assert_eq!(config.charset(), Charset::Utf8);
    }

    #[test]
    fn full_yaml() {
        let yaml = r#"
address: 0.0.0.0
port: 8080
domain_name: www.example.com
worker_threads: 2
document_root: /srv/www
mime_types:
  WEBP: image/webp
workers:
  /calc: SumWorker
charset: ISO-8859-1
"#;
        let config = ServerConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.workers.get("/calc").map(String::as_str), Some("SumWorker"));
        assert_eq!(config.charset(), Charset::Latin1);
        let mime = config.mime_types();
        assert_eq!(mime.lookup(Path::new("a.webp")), "image/webp");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(ServerConfig::from_yaml("document_root: /x\nbogus: 1\n").is_err());
    }

    #[test]
    fn missing_document_root_is_rejected() {
        assert!(ServerConfig::from_yaml("port: 80\n").is_err());
    }

    #[test]
    fn env_overrides() {
        let mut config = ServerConfig::new("/srv/www");
        let vars = HashMap::from([
            ("SMARTHTTP_PORT", "9000"),
            ("SMARTHTTP_WORKERS", "8"),
            ("SMARTHTTP_STACK_SIZE", "0x8000"),
        ]);
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.worker_threads, 8);
        assert_eq!(config.stack_size, 0x8000);
    }

    #[test]
    fn bad_env_override_is_an_error() {
        let mut config = ServerConfig::new("/srv/www");
        let result = config.apply_overrides(|key| {
            (key == "SMARTHTTP_PORT").then(|| "not-a-port".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn validate_checks_workers_and_root() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServerConfig::new(dir.path());
        config.workers.insert("/calc".into(), "SumWorker".into());
        config.validate().unwrap();

        config.workers.insert("/x".into(), "NoSuchWorker".into());
        assert!(config.validate().is_err());

        let mut missing = ServerConfig::new(dir.path().join("missing"));
        assert!(missing.validate().is_err());

        let mut zero = ServerConfig::new(dir.path());
        zero.worker_threads = 0;
        assert!(zero.validate().is_err());
    }

    #[test]
    fn load_resolves_relative_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("web")).unwrap();
        let file = dir.path().join("server.yaml");
        fs::write(&file, "document_root: web\n").unwrap();
        let config = ServerConfig::load(&file).unwrap();
        assert_eq!(config.document_root, dir.path().join("web"));
    }

    #[test]
    fn sizes_parse_in_hex_and_decimal() {
        assert_eq!(parse_size("0x4000"), Some(0x4000));
        assert_eq!(parse_size("16384"), Some(16384));
        assert_eq!(parse_size("lots"), None);
    }

    #[test]
    fn normalize_pops_parent_components() {
        assert_eq!(
            normalize(Path::new("/srv/www/./a/../b")),
            PathBuf::from("/srv/www/b")
        );
        assert_eq!(normalize(Path::new("/srv/../../etc")), PathBuf::from("/etc"));
    }

    #[test]
    fn mime_lookup_is_case_insensitive() {
        let mime = MimeTypes::with_defaults("application/octet-stream");
        assert_eq!(mime.lookup(Path::new("/a/B.HTML")), "text/html");
        assert_eq!(mime.lookup(Path::new("/a/file")), "application/octet-stream");
        assert_eq!(mime.lookup(Path::new("/a/file.zzz")), "application/octet-stream");
    }
}
