//! Informer Sync Engine
//!
//! Desktop side of the Informer phone companion. A single phone connects over
//! TCP, sends a snapshot of its SMS conversations and then streams new
//! messages; the desktop answers with messages composed by the user.
//!
//! ## Layout
//!
//! - [`conversation`]: contacts, messages and conversations
//! - [`frame`]: JSON frames exchanged with the phone
//! - [`transport`]: length-prefixed framing over a byte stream
//! - [`store`]: in-memory conversation store
//! - [`connection`]: listener and the inbound/outbound channels
//! - [`coordinator`]: applies frames to the store and notifies the UI
//! - [`engine`]: the context owning all of the above

pub mod connection;
pub mod conversation;
pub mod coordinator;
pub mod engine;
pub mod frame;
pub mod observer;
pub mod store;
pub mod transport;

mod error;

pub use connection::{
    ConnectionEvent, ConnectionListener, FrameHandler, InboundChannel, InboundExit,
    ListenerConfig, ListenerState, OutboundChannel,
};
pub use conversation::{Conversation, Message, PersonId};
pub use coordinator::Coordinator;
pub use engine::{parse_port, SyncEngine, DEFAULT_PORT};
pub use error::{ProtocolError, Result};
pub use frame::{current_timestamp, Frame, OutboundMessage, Packet};
pub use observer::ConversationObserver;
pub use store::{ConversationStore, MergeOutcome};
