//! keyserver - cluster certificate authority and authorization service

use clap::Parser;
use color_eyre::eyre::Result;
use keyserver::cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    match cli.command {
        Command::Serve(cmd) => cmd.run().await,
        Command::Check(cmd) => cmd.run().await,
    }
}
