//! Informer Transport Layer
//!
//! Plain TCP with length-prefixed JSON frames. The connection is split into a
//! reading and a writing side so the inbound and outbound channels can own
//! one each.

pub mod tcp;

pub use tcp::{FrameReader, FrameWriter, TcpConnection, MAX_FRAME_SIZE};
