//! Phone Connection Handling
//!
//! The listener accepts a single phone connection and splits it into two
//! channels, each driven by its own task:
//!
//! - [`OutboundChannel`] writes desktop-composed messages in enqueue order
//! - [`InboundChannel`] decodes frames and hands them to a [`FrameHandler`]
//!
//! When the inbound side loses the transport, the listener tears both channels
//! down and listens again on the same port.

pub mod events;
pub mod inbound;
pub mod listener;
pub mod outbound;

pub use events::{ConnectionEvent, ListenerState};
pub use inbound::{FrameHandler, InboundChannel, InboundExit};
pub use listener::{ConnectionListener, ListenerConfig};
pub use outbound::OutboundChannel;
