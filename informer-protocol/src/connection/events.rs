//! Connection Events
//!
//! Lifecycle state and events published by the connection listener.

use std::fmt;
use std::net::SocketAddr;

/// Listener lifecycle
///
/// `Idle → Listening → Connected → (Closing | Restarting) → Listening | Terminated`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Never started
    Idle,
    /// Bound and waiting for the phone
    Listening,
    /// Phone attached, channels running
    Connected,
    /// Stop requested, tearing down
    Closing,
    /// Connection lost, about to listen again
    Restarting,
    /// Stopped for good (or failed to listen again)
    Terminated,
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ListenerState::Idle => "idle",
            ListenerState::Listening => "listening",
            ListenerState::Connected => "connected",
            ListenerState::Closing => "closing",
            ListenerState::Restarting => "restarting",
            ListenerState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Connection event types
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Listening socket bound
    Listening {
        /// Local port listening on
        port: u16,
    },

    /// The phone connected
    Connected {
        /// Remote address
        remote_addr: SocketAddr,
    },

    /// The phone connection was lost
    Disconnected {
        /// Reason for disconnection
        reason: String,
    },

    /// The listener could not keep going
    ConnectionError {
        /// Error message
        message: String,
    },

    /// Listener stopped without restart
    ListenerStopped,
}
