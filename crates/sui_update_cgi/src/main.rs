//! SUI Update - CGI entry point
//!
//! Invoked by the router's web server with the request body on stdin. The
//! response goes to stdout, logs to stderr.

mod cgi;
mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use std::io::{self, Write};
use std::process::ExitCode;
use sui_update::version::{BUILD_DATE, FIRMWARE_VERSION};
use sui_update::UpdateConfig;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

/// Log filter variable, e.g. `SUI_UPDATE_LOG=sui_update=debug`
const LOG_ENV: &str = "SUI_UPDATE_LOG";

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();

    debug!(
        firmware = FIRMWARE_VERSION,
        built = BUILD_DATE,
        command = ?cli.command,
        "sui-update starting"
    );

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match run(&cli, &mut out) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run<W: Write>(cli: &Cli, out: &mut W) -> Result<()> {
    let config = match UpdateConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Unable to load configuration: {:#}", e);
            cgi::write_error(out, 500, &cli.xsrf, cgi::CONFIG_ERROR)
                .context("Failed to write response")?;
            return Ok(());
        }
    };

    match cli.command {
        Command::Update => cgi::handle_update(&config, &cli.xsrf, io::stdin().lock(), out),
        Command::UpdateLog => cgi::handle_update_log(&config, &cli.xsrf, out),
    }
    .context("Failed to write response")
}
