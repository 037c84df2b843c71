//! the `serve` subcommand - runs the keyserver.

use std::net::SocketAddr;

use clap::Args;
use color_eyre::eyre::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::{ConfigArgs, init_logging};
use crate::{create_app, listener, world};

/// run the keyserver
#[derive(Args, Debug)]
pub struct ServeCommand {
    #[command(flatten)]
    args: ConfigArgs,
}

impl ServeCommand {
    /// run the serve command
    pub async fn run(self) -> Result<()> {
        init_logging(self.args.log_level.as_deref())?;
        info!("Starting keyserver...");

        let config = self.args.into_config()?;
        let state = world::load(&config).wrap_err("failed to load configuration")?;
        info!(
            authentication = %config.authentication_authority,
            "Configuration loaded"
        );

        let addr: SocketAddr = config
            .listen_addr
            .parse()
            .context("invalid listen address")?;
        let tls = config
            .server_tls
            .as_ref()
            .map(|server| {
                listener::server_tls_config(
                    &state.authorities,
                    &config.authentication_authority,
                    server,
                )
            })
            .transpose()
            .wrap_err("failed to set up server tls")?;

        let app = create_app(state);
        let tcp = TcpListener::bind(addr).await?;
        match tls {
            Some(tls) => {
                info!("Starting HTTPS server on {}", addr);
                listener::serve_tls(tcp, tls, app).await;
            }
            None => {
                warn!("server_tls is not configured, serving plain http without client certificates");
                info!("Starting HTTP server on {}", addr);
                axum::serve(tcp, app.into_make_service_with_connect_info::<SocketAddr>())
                    .await
                    .context("server error")?;
            }
        }

        Ok(())
    }
}
