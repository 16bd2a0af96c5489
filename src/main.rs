//! Entry point: loads configuration, wires up logging, and dispatches to the
//! `clap` subcommand surface (falling back to the interactive menu when no
//! subcommand is given, matching the teacher's original default).

mod adapters;
mod aqi;
mod cli;
mod collector;
mod config;
mod db;
mod epa;
mod error;
mod fusion;
mod history;
mod models;
mod priority;
mod retry;
mod scheduler;

use clap::Parser;
use cli::{run_command, App, Cli, Command};
use colored::Colorize;
use config::Config;
use error::Result;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[tokio::main]
async fn main() -> Result<()> {
    let file_appender = tracing_appender::rolling::daily("logs", "skyfuse.log");
    let (non_blocking_appender, _guard) = tracing_appender::non_blocking(file_appender);

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));

    let file_layer = fmt::layer().with_writer(non_blocking_appender).with_ansi(false);
    let console_layer = fmt::layer().with_writer(std::io::stderr).with_ansi(true).with_filter(EnvFilter::new("off"));

    tracing_subscriber::registry().with(env_filter).with(file_layer).with(console_layer).init();

    info!("Starting skyfuse...");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {:?}", e);
            println!("{}", format!("Configuration error: {e}").red());
            return Err(e);
        },
    };

    let app = match App::new(config).await {
        Ok(app) => {
            info!("Application initialized successfully.");
            app
        },
        Err(e) => {
            error!("Failed to initialize application: {:?}", e);
            println!("{}", "Error: Failed to initialize application. Check logs/skyfuse.log for details.".red());
            return Err(e);
        },
    };

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Interactive);

    if let Err(e) = run_command(&app, command).await {
        error!("Command execution failed: {:?}", e);
        println!("{} {}", "Error executing command:".red(), e.to_string().red());
        return Err(e);
    }

    Ok(())
}
