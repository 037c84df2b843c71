//! configuration arguments shared by the subcommands.

use std::path::{Path, PathBuf};

use clap::Args;
use color_eyre::eyre::{Context, Result};
use keyserver_types::Config;
use tracing::{debug, info};

/// default config file search paths (in order of priority).
const CONFIG_SEARCH_PATHS: &[&str] = &["/etc/keyserver/config.toml", "./keyserver.toml"];

/// where to find the configuration, and what to override in it
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// path to config file (toml format)
    #[arg(short, long, env = "KEYSERVER_CONFIG")]
    pub config: Option<PathBuf>,

    /// address to listen on
    #[arg(long, env = "KEYSERVER_LISTEN_ADDR")]
    pub listen_addr: Option<String>,

    /// directory holding authority keys and certificates
    #[arg(long, env = "KEYSERVER_AUTHORITY_DIR")]
    pub authority_dir: Option<PathBuf>,

    /// directory holding static files
    #[arg(long, env = "KEYSERVER_STATIC_DIR")]
    pub static_dir: Option<PathBuf>,

    /// log level
    #[arg(long, env = "KEYSERVER_LOG_LEVEL")]
    pub log_level: Option<String>,
}

impl ConfigArgs {
    /// find and load config file, returning none if no config file is found.
    fn load_config_file(config_path: Option<&PathBuf>) -> Result<Option<Config>> {
        // an explicit path must exist
        if let Some(path) = config_path {
            return read_config(path).map(Some);
        }

        for path_str in CONFIG_SEARCH_PATHS {
            let path = PathBuf::from(path_str);
            if path.exists() {
                debug!("Found config file at {:?}", path);
                return read_config(&path).map(Some);
            }
        }

        Ok(None)
    }

    /// the configuration these arguments select.
    ///
    /// priority order: defaults -> config file -> cli flags
    pub fn into_config(self) -> Result<Config> {
        let mut config = match Self::load_config_file(self.config.as_ref())? {
            Some(file_config) => {
                info!("Loaded configuration from file");
                file_config
            }
            None => {
                debug!("No config file found, using defaults");
                Config::default()
            }
        };

        if let Some(listen_addr) = self.listen_addr {
            config.listen_addr = listen_addr;
        }
        if let Some(authority_dir) = self.authority_dir {
            config.authority_dir = authority_dir;
        }
        if let Some(static_dir) = self.static_dir {
            config.static_dir = static_dir;
        }

        Ok(config)
    }
}

fn read_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {:?}", path))?;
    toml::from_str(&content).with_context(|| format!("failed to parse config file: {:?}", path))
}
