//! Sync Engine
//!
//! The engine context built once at process start. It owns the shared
//! [`Coordinator`] and the [`ConnectionListener`] and exposes the service
//! lifecycle used by the UI: start listening, stop services, stop all work.

use crate::connection::{ConnectionListener, ListenerConfig, ListenerState};
use crate::{Coordinator, ProtocolError, Result};
use std::sync::Arc;
use tracing::info;

/// Port used when none is configured
pub const DEFAULT_PORT: u16 = 8888;

/// Parse a user-supplied port number
///
/// # Examples
///
/// ```rust
/// use informer_protocol::parse_port;
///
/// assert_eq!(parse_port(" 8888 ").unwrap(), 8888);
/// assert!(parse_port("0").is_err());
/// assert!(parse_port("http").is_err());
/// ```
pub fn parse_port(input: &str) -> Result<u16> {
    let input = input.trim();
    let port: u16 = input.parse().map_err(|_| {
        ProtocolError::Configuration(format!("'{}' is not a valid port number", input))
    })?;
    if port == 0 {
        return Err(ProtocolError::Configuration(
            "port must be a positive integer".to_string(),
        ));
    }
    Ok(port)
}

/// Owner of the coordinator and the connection listener
pub struct SyncEngine {
    coordinator: Arc<Coordinator>,
    listener: ConnectionListener,
}

impl SyncEngine {
    pub fn new(config: ListenerConfig) -> Self {
        let coordinator = Arc::new(Coordinator::new());
        let listener = ConnectionListener::new(coordinator.clone(), config);
        Self {
            coordinator,
            listener,
        }
    }

    pub fn coordinator(&self) -> Arc<Coordinator> {
        self.coordinator.clone()
    }

    pub fn listener(&self) -> &ConnectionListener {
        &self.listener
    }

    /// Stop whatever runs and listen on `port`
    ///
    /// A listener that never ran goes straight from idle to listening.
    pub async fn start(&self, port: u16) -> Result<u16> {
        if self.listener.state() != ListenerState::Idle {
            self.stop_services().await?;
        }
        self.coordinator.set_shutting_down(false);
        self.listener.start(port).await
    }

    /// Stop listening and drop the phone connection without restarting
    pub async fn stop_services(&self) -> Result<()> {
        self.listener.stop(false).await?;
        self.coordinator.clear_session().await;
        Ok(())
    }

    /// Stop everything; with `is_restart` listen again on the last port
    ///
    /// Without a restart the engine enters its terminal shutdown state and
    /// connection changes are no longer reported to the UI.
    pub async fn stop_all_work(&self, is_restart: bool) -> Result<()> {
        info!("Stopping all work (restart: {})", is_restart);
        if !is_restart {
            self.coordinator.set_shutting_down(true);
        }
        self.coordinator.clear_session().await;
        self.listener.stop(is_restart).await
    }
}

impl Default for SyncEngine {
    fn default() -> Self {
        Self::new(ListenerConfig::default())
    }
}
