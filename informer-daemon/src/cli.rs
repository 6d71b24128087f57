//! Command-line interface and logging setup

use crate::config::Config;
use anyhow::{Context, Result};
use clap::Parser;
use informer_protocol::parse_port;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

/// Informer daemon command-line interface
#[derive(Parser, Debug)]
#[command(name = "informer-daemon")]
#[command(about = "Mirror phone SMS conversations on the desktop", long_about = None)]
#[command(version)]
pub struct Cli {
    /// TCP port the phone connects to (overrides the config file)
    #[arg(short, long, value_name = "PORT", value_parser = port_arg)]
    pub port: Option<u16>,

    /// Path to the configuration file
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(short, long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Enable JSON structured logging
    #[arg(long)]
    pub json_logs: bool,
}

fn port_arg(value: &str) -> std::result::Result<u16, String> {
    parse_port(value).map_err(|e| e.to_string())
}

impl Cli {
    /// Load the configuration file this invocation points at
    pub fn load_config(&self) -> Result<Config> {
        let config = match &self.config {
            Some(path) => Config::load_from(path),
            None => Config::load(),
        }
        .context("Failed to load configuration")?;

        let config = self.apply(config);
        config.validate()?;
        Ok(config)
    }

    /// Command-line values win over the file
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(port) = self.port {
            config.network.port = port;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.json_logs {
            config.logging.json = true;
        }
        config
    }
}

/// Initialize the tracing subscriber
///
/// `RUST_LOG` wins over the configured level.
pub fn init_logging(config: &Config) -> Result<()> {
    let level = config.logging.level.parse::<Level>().with_context(|| {
        format!(
            "Invalid log level '{}'. Valid levels: error, warn, info, debug, trace",
            config.logging.level
        )
    })?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.as_str()))
        .context("Failed to create log filter")?;

    let subscriber = fmt().with_env_filter(filter).with_target(true);

    if config.logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(
        "Logging initialized: level={}, json={}",
        level, config.logging.json
    );
    Ok(())
}
