//! # Blade Main Entry Point
//!
//! File: cli/src/main.rs
//!
//! ## Overview
//!
//! Entry point of the `blade` CLI, a deploy tool for Liferay projects. It:
//! - parses the command line with Clap,
//! - sets up logging from the `-v` count (or `RUST_LOG`),
//! - runs the chosen command handler,
//! - prints any error with the command name as prefix and exits non-zero.
//!
//! ## Architecture
//!
//! Each top-level command is a variant of `Commands` holding that command's
//! argument struct; the match in `main` is the command registry. Handlers
//! live in `commands::` and share the building blocks in `common::` and
//! `core::`.
//!
//! ## Examples
//!
//! ```bash
//! # Build and deploy the project in the current directory
//! blade deploy
//!
//! # Keep redeploying as sources change, with debug logging
//! blade -vv deploy --watch
//!
//! # Ask the running framework for its bundles
//! blade sh lb -s
//! ```
//!
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

mod commands; // Command handlers (deploy, sh)
mod common; // Shared utilities (gogo, bundle, build, watch, ...)
mod core; // Errors, configuration, invocation context

#[derive(Parser, Debug)]
#[command(
    name = "blade",
    about = "Build and deploy Liferay modules to a running instance",
    long_about = "Builds Gradle or Maven Liferay projects and deploys the resulting bundles\n\
                  to a running Liferay instance through its gogo shell.",
    propagate_version = true,
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Parser, Debug)]
enum Commands {
    #[command(alias = "d")]
    Deploy(commands::deploy::DeployArgs),
    Sh(commands::sh::ShArgs),
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Deploy(_) => commands::deploy::COMMAND_NAME,
            Commands::Sh(_) => "sh",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    tracing::debug!("Parsed CLI arguments: {:?}", cli);

    let command_name = cli.command.name();
    let command_result = match cli.command {
        Commands::Deploy(args) => commands::deploy::handle_deploy(args).await,
        Commands::Sh(args) => commands::sh::handle_sh(args).await,
    };

    if let Err(e) = command_result {
        tracing::error!("Command execution failed: {:?}", e);
        eprintln!("{}: {:#}", command_name, e);
        std::process::exit(1);
    }

    Ok(())
}
