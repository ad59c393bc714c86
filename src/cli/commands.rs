use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use crate::config::ServerConfig;
use crate::logging::{init_logging_with_config, LogConfig, LogFormat};
use crate::script::{parse, SmartScriptEngine};
use crate::server::context::RequestContext;
use crate::server::http_server::SmartHttpServer;

/// Command-line interface for smarthttp
#[derive(Parser, Debug)]
#[command(name = "smarthttp", version)]
#[command(about = "HTTP server for static files and SmartScript templates", long_about = None)]
pub struct Cli {
    /// YAML server configuration
    #[arg(short, long, env = "SMARTHTTP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port to listen on, overriding the configuration
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Number of worker coroutines, overriding the configuration
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Document root, overriding the configuration
    #[arg(short, long)]
    pub document_root: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormatArg>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render a template to stdout without starting a server
    Render {
        /// Template file
        template: PathBuf,

        /// Request parameters as key=value
        #[arg(value_parser = parse_key_value)]
        params: Vec<(String, String)>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Json,
    Pretty,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Json => LogFormat::Json,
            LogFormatArg::Pretty => LogFormat::Pretty,
        }
    }
}

fn parse_key_value(arg: &str) -> Result<(String, String), String> {
    arg.split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected key=value, got {arg:?}"))
}

pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    match &cli.command {
        Some(Commands::Render { template, params }) => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            render(template, params.iter().cloned().collect(), &mut out)
        }
        None => serve(&cli),
    }
}

fn serve(cli: &Cli) -> Result<()> {
    let mut log_config = LogConfig::from_env();
    if let Some(format) = cli.log_format {
        log_config.format = format.into();
    }
    init_logging_with_config(&log_config)?;

    let config = build_config(cli)?;
    may::config()
        .set_workers(config.worker_threads)
        .set_stack_size(config.stack_size);

    let server = SmartHttpServer::new(config)?;
    let addr = server.start().context("failed to start server")?;
    info!(%addr, "Listening");

    wait_for_shutdown(&server)?;
    server.stop();
    Ok(())
}

/// Merge the configuration file, environment and flags, then validate.
pub fn build_config(cli: &Cli) -> Result<ServerConfig> {
    let mut config = match (&cli.config, &cli.document_root) {
        (Some(path), _) => ServerConfig::load(path)?,
        (None, Some(root)) => ServerConfig::new(root),
        (None, None) => bail!("either --config or --document-root is required"),
    };
    config.apply_env_overrides()?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(workers) = cli.workers {
        config.worker_threads = workers;
    }
    if let Some(root) = &cli.document_root {
        config.document_root = root.clone();
    }
    config.validate()?;
    Ok(config)
}

#[cfg(unix)]
fn wait_for_shutdown(_server: &SmartHttpServer) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("failed to install signal handlers")?;
    if let Some(signal) = signals.forever().next() {
        info!(signal, "Shutdown signal received");
    }
    Ok(())
}

#[cfg(not(unix))]
fn wait_for_shutdown(server: &SmartHttpServer) -> Result<()> {
    server.join();
    Ok(())
}

/// Parse and execute `template`, writing only the body to `out`.
pub fn render(
    template: &Path,
    params: BTreeMap<String, String>,
    out: &mut dyn Write,
) -> Result<()> {
    let source = fs::read_to_string(template)
        .with_context(|| format!("failed to read template {}", template.display()))?;
    let document =
        parse(&source).with_context(|| format!("failed to parse {}", template.display()))?;

    let mut response = Vec::new();
    {
        let mut context = RequestContext::new(&mut response).with_parameters(params);
        SmartScriptEngine::new(&document, &mut context)
            .execute()
            .with_context(|| format!("failed to execute {}", template.display()))?;
    }

    let body_start = response
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|at| at + 4);
    match body_start {
        Some(start) => out.write_all(&response[start..])?,
        // Nothing was written, so no header block either.
        None if response.is_empty() => {}
        None => return Err(anyhow!("rendered output has no header terminator")),
    }
    out.flush()?;
    Ok(())
}
