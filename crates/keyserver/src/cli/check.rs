//! the `check` subcommand - validates a configuration.

use clap::Args;
use color_eyre::eyre::{Context, Result};

use super::{ConfigArgs, init_logging};
use crate::{listener, world};

/// load every authority and compile every grant, then exit
#[derive(Args, Debug)]
pub struct CheckCommand {
    #[command(flatten)]
    args: ConfigArgs,
}

impl CheckCommand {
    /// run the check command
    pub async fn run(self) -> Result<()> {
        init_logging(self.args.log_level.as_deref())?;

        let config = self.args.into_config()?;
        let state = world::load(&config).wrap_err("configuration is invalid")?;
        if let Some(server) = &config.server_tls {
            listener::server_tls_config(&state.authorities, &config.authentication_authority, server)
                .wrap_err("server tls configuration is invalid")?;
        }

        println!(
            "configuration ok: {} accounts, {} authorities, {} apis, {} static files",
            state.directory.account_count(),
            state.authorities.len(),
            state.engine.len(),
            state.static_files.len()
        );
        Ok(())
    }
}
