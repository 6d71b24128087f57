mod cli;
mod config;
mod console;
mod observer;

use anyhow::{Context, Result};
use clap::Parser;
use informer_protocol::{ListenerConfig, SyncEngine};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use cli::Cli;
use config::Config;
use console::Flow;
use observer::LogObserver;

/// Main daemon state
struct Daemon {
    /// Configuration
    config: Config,

    /// Sync engine
    engine: SyncEngine,
}

impl Daemon {
    /// Create a new daemon
    fn new(config: Config) -> Self {
        let engine = SyncEngine::new(ListenerConfig {
            bind_addr: config.network.bind_address,
        });
        Self { config, engine }
    }

    /// Run the daemon until Ctrl+C or `/quit`
    async fn run(&self) -> Result<()> {
        self.engine
            .coordinator()
            .attach_observer(Arc::new(LogObserver))
            .await;

        let port = self
            .engine
            .start(self.config.network.port)
            .await
            .with_context(|| {
                format!(
                    "Failed to listen on {}:{}",
                    self.config.network.bind_address, self.config.network.port
                )
            })?;

        info!("Informer daemon listening on port {}", port);
        info!("Type /help for commands, press Ctrl+C to stop");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;

        loop {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    signal.context("Failed to listen for shutdown signal")?;
                    info!("Received shutdown signal");
                    break;
                }
                line = lines.next_line(), if stdin_open => match line {
                    Ok(Some(line)) => {
                        if console::handle_line(&self.engine, &line).await == Flow::Quit {
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("Console closed, running until Ctrl+C");
                        stdin_open = false;
                    }
                    Err(e) => {
                        error!("Failed to read console input: {}", e);
                        stdin_open = false;
                    }
                },
            }
        }

        Ok(())
    }

    /// Shutdown the daemon
    async fn shutdown(&self) -> Result<()> {
        info!("Shutting down daemon...");

        if let Err(e) = self.engine.stop_all_work(false).await {
            error!("Error stopping engine: {}", e);
        }

        info!("Daemon shutdown complete");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = cli.load_config()?;
    cli::init_logging(&config)?;

    info!("Starting Informer daemon...");
    info!("Bind address: {}", config.network.bind_address);
    info!("Port: {}", config.network.port);

    let daemon = Daemon::new(config);

    // Run daemon
    let result = daemon.run().await;

    // Shutdown
    daemon.shutdown().await?;

    result
}
