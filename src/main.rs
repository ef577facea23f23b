//! Gridstack operator tool
//!
//! Validates stack configurations and issues or checks access tokens
//! when debugging storage backends.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gridstack::{
    generate_token, validate_token, Credentials, PluginManager, SecurityContext, StackInstance,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Gridstack - pluggable storage virtualization stack
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a configuration and build a stack from it
    Check {
        /// Configuration file (.yaml/.yml or line format)
        #[arg(long, env = "GRIDSTACK_CONFIG")]
        config: PathBuf,

        /// Resolve this user through the configured user/group db
        #[arg(long)]
        user: Option<String>,
    },

    /// Access token tools
    #[command(subcommand)]
    Token(TokenCommand),
}

#[derive(Subcommand, Debug)]
enum TokenCommand {
    /// Print a token for a physical file name
    Generate {
        #[command(flatten)]
        target: TokenTarget,

        /// Lifetime in seconds
        #[arg(long, default_value = "600")]
        lifetime: u64,
    },

    /// Check a token and print its status
    Validate {
        #[command(flatten)]
        target: TokenTarget,

        #[arg(long)]
        token: String,
    },
}

#[derive(Args, Debug)]
struct TokenTarget {
    /// Shared secret of the backend
    #[arg(long, env = "GRIDSTACK_TOKEN_SECRET", hide_env_values = true)]
    secret: String,

    /// User name or client address the token is bound to
    #[arg(long)]
    id: String,

    /// Physical file name
    #[arg(long)]
    path: String,

    /// Token grants write access
    #[arg(long)]
    write: bool,
}

// =============================================================================
// Main
// =============================================================================

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    if let Err(e) = run(cli.command) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Check { config, user } => check(&config, user.as_deref()),
        Command::Token(TokenCommand::Generate { target, lifetime }) => {
            let token = generate_token(
                &target.id,
                &target.path,
                &target.secret,
                lifetime,
                target.write,
            )?;
            println!("{}", token);
            Ok(())
        }
        Command::Token(TokenCommand::Validate { target, token }) => {
            let status = validate_token(&token, &target.id, &target.path, &target.secret, target.write);
            println!("{}", status);
            if !status.is_valid() {
                bail!("token is {}", status);
            }
            Ok(())
        }
    }
}

fn check(config: &Path, user: Option<&str>) -> Result<()> {
    info!("Gridstack {} checking {}", gridstack::VERSION, config.display());

    let mut manager = PluginManager::new();
    manager
        .load_configuration(config)
        .with_context(|| format!("loading {}", config.display()))?;
    info!(plugins = ?manager.loaded_plugins(), "configuration loaded");

    let mut stack = StackInstance::new(Arc::new(manager)).context("building stack instance")?;
    match user {
        Some(name) => stack
            .set_security_credentials(&Credentials::new("local", name))
            .with_context(|| format!("resolving user {}", name))?,
        None => stack.set_security_context(SecurityContext::root())?,
    }

    for (contract, chain) in stack.chains() {
        info!(%contract, outermost = %chain[0], chain = ?chain, "stack");
    }

    let cwd = stack.catalog()?.working_dir()?;
    info!(user = %stack.security_context()?.user.name, cwd = %cwd, "stack ready");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(cli: &Cli) {
    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    if cli.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
