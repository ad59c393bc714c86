//! # CLI Module
//!
//! The `smarthttp` binary either runs the server or renders one template.
//!
//! ## Serving
//!
//! ```bash
//! smarthttp --config config/server.yaml
//! smarthttp --document-root webroot --port 8080 --log-format pretty
//! ```
//!
//! Flags override the configuration file, which is itself overridden by
//! `SMARTHTTP_*` environment variables. The server runs until SIGINT or
//! SIGTERM.
//!
//! ## Rendering
//!
//! ```bash
//! smarthttp render webroot/scripts/osnovni.smscr name=World
//! ```
//!
//! Prints the rendered body without response headers.

mod commands;


pub use commands::{build_config, render, run_cli, Cli, Commands, LogFormatArg};
