//! Error handling for the Informer sync protocol
//!
//! This module provides a single error type for every engine operation.
//! Errors are automatically converted from underlying library errors using `thiserror`.
//!
//! ## Error Handling Patterns
//!
//! ### Basic Usage
//!
//! ```rust,no_run
//! use informer_protocol::{Frame, Result};
//!
//! fn decode(data: &[u8]) -> Result<Frame> {
//!     // Errors are automatically converted using From trait
//!     let frame = Frame::from_bytes(data)?;
//!     Ok(frame)
//! }
//! ```
//!
//! ### Error Matching
//!
//! Precondition failures are returned as values; the caller decides what to do:
//!
//! ```rust,no_run
//! use informer_protocol::{Coordinator, ProtocolError, Result};
//!
//! # async fn example(coordinator: &Coordinator) -> Result<()> {
//! match coordinator.send_message("hi").await {
//!     Ok(()) => {}
//!     Err(ProtocolError::NoActiveConversation) => {
//!         eprintln!("Pick a conversation first");
//!     }
//!     Err(e) => return Err(e),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Categories
//!
//! ### Transport Errors
//! Connection reset, read/write failure, oversized frames. The listener recovers
//! from these by tearing the connection down and listening again.
//!
//! ### Decode Errors
//! Unknown frame kinds and malformed bodies. The inbound channel skips the frame.
//!
//! ### Precondition Errors
//! - `ObserverNotAttached`: no UI collaborator registered yet
//! - `NoActiveConversation`: nothing selected to send to
//! - `NoActiveConnection`: no phone attached
//!
//! ### Configuration Errors
//! Invalid port numbers, reported synchronously to whoever asked to listen.

use thiserror::Error;

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors that can occur during sync engine operations
///
/// # Examples
///
/// ```rust
/// use informer_protocol::ProtocolError;
///
/// let error = ProtocolError::UnknownFrameKind("informer.battery".to_string());
/// assert_eq!(error.to_string(), "Unknown frame kind: informer.battery");
///
/// let error = ProtocolError::NoActiveConversation;
/// assert_eq!(error.to_string(), "No conversation selected");
/// ```
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// I/O error on the connection or listening socket
    ///
    /// Automatically converted from `std::io::Error`.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    ///
    /// Automatically converted from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame envelope or body did not match the expected layout
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Frame envelope carried a kind this side does not understand
    #[error("Unknown frame kind: {0}")]
    UnknownFrameKind(String),

    /// Announced frame length exceeds the allowed maximum
    ///
    /// Fields: (actual_size, max_size)
    #[error("Frame size {0} exceeds maximum {1}")]
    FrameSizeExceeded(usize, usize),

    /// The peer closed the connection
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// No UI collaborator has been attached to the coordinator
    #[error("Observer not attached")]
    ObserverNotAttached,

    /// No conversation is currently selected
    #[error("No conversation selected")]
    NoActiveConversation,

    /// No phone connection with a live outbound channel
    #[error("No active connection")]
    NoActiveConnection,

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ProtocolError {
    /// Whether this error means the connection itself is unusable
    ///
    /// Oversized frames count as transport failures because the stream
    /// cannot be resynchronized after skipping an unread body.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ProtocolError::Io(_)
                | ProtocolError::FrameSizeExceeded(_, _)
                | ProtocolError::ConnectionClosed
        )
    }

    /// Whether this error only affects a single frame
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            ProtocolError::Json(_)
                | ProtocolError::InvalidFrame(_)
                | ProtocolError::UnknownFrameKind(_)
        )
    }

    /// Whether the engine recovers from this error on its own
    ///
    /// Transport errors trigger the restart policy, decode errors skip the frame.
    /// Precondition and configuration errors need the caller.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use informer_protocol::ProtocolError;
    ///
    /// assert!(ProtocolError::ConnectionClosed.is_recoverable());
    /// assert!(!ProtocolError::ObserverNotAttached.is_recoverable());
    /// ```
    pub fn is_recoverable(&self) -> bool {
        self.is_transport() || self.is_decode()
    }

    /// Get a user-friendly error message suitable for display in UI
    pub fn user_message(&self) -> String {
        match self {
            ProtocolError::ObserverNotAttached => {
                "The window is not ready yet. Try again in a moment.".to_string()
            }
            ProtocolError::NoActiveConversation => {
                "Select a conversation before sending a message.".to_string()
            }
            ProtocolError::NoActiveConnection => {
                "No phone connected. Waiting for the phone to connect.".to_string()
            }
            ProtocolError::Configuration(msg) => {
                format!("Configuration error: {}. Check your settings.", msg)
            }
            ProtocolError::FrameSizeExceeded(size, max) => {
                format!(
                    "Phone sent too much data at once ({} bytes, max {} bytes).",
                    size, max
                )
            }
            ProtocolError::ConnectionClosed => "The phone disconnected.".to_string(),
            ProtocolError::Io(e) => format!("Connection error: {}.", e),
            ProtocolError::Json(_)
            | ProtocolError::InvalidFrame(_)
            | ProtocolError::UnknownFrameKind(_) => {
                "Received data the desktop could not understand.".to_string()
            }
        }
    }
}
