//! Dirbind - LDAP credential check
//!
//! Runs one authentication attempt against the configured directory and
//! prints the outcome as JSON.

use std::io::BufRead;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dirbind_auth::{authenticate_once, AuthResult, DirectoryConfig, LdapConnector};
use dirbind_core::config::{DirbindConfig, LoggingConfig};
use serde_json::json;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "dirbind")]
#[command(author = "Dirbind Team")]
#[command(version = dirbind_core::VERSION)]
#[command(about = "Authenticate users against an LDAP directory", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, global = true, env = "DIRBIND_CONFIG")]
    config: Option<String>,

    /// LDAP host or URL
    #[arg(long, global = true)]
    host: Option<String>,

    /// LDAP port
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate a user and print the outcome
    Authenticate {
        /// Login name
        #[arg(short, long)]
        username: String,

        /// Read the password from the first line of stdin (takes precedence)
        #[arg(long)]
        password_stdin: bool,

        /// Password (prefer --password-stdin)
        #[arg(long, env = "DIRBIND_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Validate the configuration
    CheckConfig,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            let mut config = DirbindConfig::from_file(path)?;
            config.apply_env();
            config
        }
        None => DirbindConfig::from_env(),
    };

    // Override with CLI args
    if let Some(host) = cli.host {
        config.ldap.host = host;
    }
    if let Some(port) = cli.port {
        config.ldap.port = Some(port);
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    init_tracing(&config.logging);

    match cli.command.unwrap_or(Commands::Version) {
        Commands::Version => {
            println!("dirbind {}", dirbind_core::VERSION);
            Ok(ExitCode::SUCCESS)
        }
        Commands::CheckConfig => {
            config.validate()?;
            info!(
                "Configuration valid: {} diagnostic rule(s)",
                DirectoryConfig::from_config(&config).diagnostics.len()
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::Authenticate {
            username,
            password_stdin,
            password,
        } => {
            let password = if password_stdin {
                Some(read_password_line()?)
            } else {
                password
            };

            run_authenticate(&config, &username, password.as_deref()).await
        }
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    // stdout carries the JSON result, logs go to stderr
    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

fn read_password_line() -> anyhow::Result<String> {
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;

    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

async fn run_authenticate(
    config: &DirbindConfig,
    username: &str,
    password: Option<&str>,
) -> anyhow::Result<ExitCode> {
    config.validate()?;

    let directory = Arc::new(DirectoryConfig::from_config(config));
    debug!("Authenticating against {}", config.ldap.host);

    let result = authenticate_once(&LdapConnector, directory, Some(username), password).await?;

    println!("{}", serde_json::to_string_pretty(&render_result(&result))?);

    Ok(if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// JSON view of an outcome; raw diagnostics are never included
fn render_result(result: &AuthResult) -> serde_json::Value {
    match result {
        AuthResult::NotAttempted => json!({ "outcome": result.outcome() }),
        AuthResult::Success(attributes) => json!({
            "outcome": result.outcome(),
            "attributes": attributes,
        }),
        AuthResult::Failure(failure) => json!({
            "outcome": result.outcome(),
            "notices": failure.notices().collect::<Vec<_>>(),
        }),
    }
}
