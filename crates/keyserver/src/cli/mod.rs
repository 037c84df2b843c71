//! cli subcommands for the keyserver.
//!
//! - `keyserver serve` - load the configuration and serve the api
//! - `keyserver check` - load and compile the configuration, then exit

mod check;
mod config;
mod serve;

pub use check::CheckCommand;
pub use config::ConfigArgs;
pub use serve::ServeCommand;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// keyserver - cluster certificate authority and authorization service
#[derive(Parser, Debug)]
#[command(name = "keyserver")]
#[command(about = "Cluster certificate authority and authorization service", long_about = None)]
#[command(version)]
pub struct Cli {
    /// the subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// top-level commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// run the keyserver
    Serve(ServeCommand),

    /// validate a configuration without serving it
    Check(CheckCommand),
}

/// install the global fmt subscriber at `level` (default info).
fn init_logging(level: Option<&str>) -> Result<()> {
    let log_level = match level.unwrap_or("info").to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
