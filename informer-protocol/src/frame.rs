//! Informer Wire Frames
//!
//! Every unit exchanged with the phone is a JSON envelope:
//!
//! - `id`: UNIX epoch timestamp in milliseconds
//! - `type`: frame kind, `informer.<kind>`
//! - `body`: kind-specific JSON object
//!
//! ## Frame Kinds
//!
//! **Snapshot** (`informer.snapshot`, phone → desktop): the complete history,
//! sent once per connection right after connecting.
//!
//! ```json
//! {
//!     "id": 1640000000000,
//!     "type": "informer.snapshot",
//!     "body": {
//!         "conversations": [
//!             { "person": { "number": "+48111", "nickname": "Alice" }, "messages": [] }
//!         ]
//!     }
//! }
//! ```
//!
//! **Conversation** (`informer.conversation`, phone → desktop): new messages
//! for one contact.
//!
//! ```json
//! {
//!     "id": 1640000000000,
//!     "type": "informer.conversation",
//!     "body": {
//!         "person": { "number": "+48111", "nickname": "Alice" },
//!         "messages": [ { "text": "Hi", "timestamp": 1640000000000, "fromMe": false } ]
//!     }
//! }
//! ```
//!
//! **Outbound message** (`informer.message`, desktop → phone): text the
//! desktop owner wants the phone to send.
//!
//! ```json
//! {
//!     "id": 1640000000000,
//!     "type": "informer.message",
//!     "body": {
//!         "recipient": "+48111",
//!         "message": { "text": "Hello", "timestamp": 1640000000000, "fromMe": true }
//!     }
//! }
//! ```

use crate::{Conversation, Message, ProtocolError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Frame kind of a full history snapshot
pub const SNAPSHOT_FRAME: &str = "informer.snapshot";

/// Frame kind of an incremental conversation batch
pub const CONVERSATION_FRAME: &str = "informer.conversation";

/// Frame kind of a desktop-composed message
pub const MESSAGE_FRAME: &str = "informer.message";

/// Untyped frame envelope as it travels on the wire
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Packet {
    /// UNIX timestamp in milliseconds
    #[serde(default)]
    pub id: i64,

    /// Frame kind
    #[serde(rename = "type")]
    pub packet_type: String,

    /// Kind-specific parameters
    #[serde(default)]
    pub body: Value,
}

impl Packet {
    /// Creates a new packet stamped with the current time
    pub fn new(packet_type: impl Into<String>, body: Value) -> Self {
        Self {
            id: current_timestamp(),
            packet_type: packet_type.into(),
            body,
        }
    }

    /// Serialize packet to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize a packet from JSON bytes
    ///
    /// Trailing `\n` or `\r\n` is tolerated.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let trimmed = data
            .strip_suffix(b"\r\n")
            .or_else(|| data.strip_suffix(b"\n"))
            .unwrap_or(data);

        serde_json::from_slice(trimmed).map_err(|e| {
            ProtocolError::InvalidFrame(format!("Failed to deserialize envelope: {}", e))
        })
    }

    /// Check if packet is of a specific kind
    pub fn is_type(&self, packet_type: &str) -> bool {
        self.packet_type == packet_type
    }
}

/// Body of a snapshot frame
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotBody {
    conversations: Vec<Conversation>,
}

/// Message the desktop asks the phone to deliver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Phone number of the contact
    pub recipient: String,

    /// The message itself, flagged as sent by the owner
    pub message: Message,
}

impl OutboundMessage {
    pub fn new(recipient: impl Into<String>, message: Message) -> Self {
        Self {
            recipient: recipient.into(),
            message,
        }
    }
}

/// A decoded frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Full baseline: replaces everything the desktop knows
    Snapshot(Vec<Conversation>),

    /// New messages for one contact
    Conversation(Conversation),

    /// Desktop-composed message for the phone to relay
    OutboundMessage(OutboundMessage),
}

impl Frame {
    /// Wire kind of this frame
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Snapshot(_) => SNAPSHOT_FRAME,
            Frame::Conversation(_) => CONVERSATION_FRAME,
            Frame::OutboundMessage(_) => MESSAGE_FRAME,
        }
    }

    /// Wrap this frame into its envelope
    pub fn to_packet(&self) -> Result<Packet> {
        let body = match self {
            Frame::Snapshot(conversations) => json!({ "conversations": conversations }),
            Frame::Conversation(conversation) => serde_json::to_value(conversation)?,
            Frame::OutboundMessage(outbound) => serde_json::to_value(outbound)?,
        };
        Ok(Packet::new(self.kind(), body))
    }

    /// Interpret an envelope
    ///
    /// # Errors
    ///
    /// `UnknownFrameKind` for kinds this side does not know, `InvalidFrame`
    /// when the body does not match the kind's layout.
    pub fn from_packet(packet: Packet) -> Result<Self> {
        let kind = packet.packet_type;
        let invalid =
            |e: serde_json::Error| ProtocolError::InvalidFrame(format!("{} body: {}", kind, e));

        match kind.as_str() {
            SNAPSHOT_FRAME => {
                let body: SnapshotBody = serde_json::from_value(packet.body).map_err(invalid)?;
                Ok(Frame::Snapshot(body.conversations))
            }
            CONVERSATION_FRAME => Ok(Frame::Conversation(
                serde_json::from_value(packet.body).map_err(invalid)?,
            )),
            MESSAGE_FRAME => Ok(Frame::OutboundMessage(
                serde_json::from_value(packet.body).map_err(invalid)?,
            )),
            _ => Err(ProtocolError::UnknownFrameKind(kind.clone())),
        }
    }

    /// Serialize to envelope bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.to_packet()?.to_bytes()
    }

    /// Decode from envelope bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::from_packet(Packet::from_bytes(data)?)
    }
}

/// Generate current UNIX timestamp in milliseconds
pub fn current_timestamp() -> i64 {
    Utc::now().timestamp_millis()
}
