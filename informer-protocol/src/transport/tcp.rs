//! Length-prefixed TCP framing
//!
//! Each frame is a 4-byte big-endian length followed by the JSON envelope.
//! The length prefix lets the reader skip frames it cannot interpret without
//! losing its place in the stream.

use crate::{Frame, OutboundMessage, Packet, ProtocolError, Result};
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, error};

/// Maximum frame size (16MB); snapshots carry whole histories and avatars
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Reading side of a connection
pub struct FrameReader<R> {
    reader: R,
    remote_addr: Option<SocketAddr>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            remote_addr: None,
        }
    }

    /// Read one raw envelope
    ///
    /// Returns `ConnectionClosed` on a clean end of stream before a frame starts.
    pub async fn read_packet(&mut self) -> Result<Packet> {
        let mut len_bytes = [0u8; 4];
        if let Err(e) = self.reader.read_exact(&mut len_bytes).await {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                return Err(ProtocolError::ConnectionClosed);
            }
            return Err(e.into());
        }

        let len = u32::from_be_bytes(len_bytes) as usize;
        if len > MAX_FRAME_SIZE {
            error!("Frame too large: {} bytes", len);
            return Err(ProtocolError::FrameSizeExceeded(len, MAX_FRAME_SIZE));
        }

        let mut data = vec![0u8; len];
        self.reader.read_exact(&mut data).await?;

        debug!("Received frame ({} bytes) from {:?}", len, self.remote_addr);
        Packet::from_bytes(&data)
    }

    /// Read and decode one frame
    ///
    /// Decode errors leave the stream positioned at the next frame, so the
    /// caller may keep reading after them.
    pub async fn read_frame(&mut self) -> Result<Frame> {
        let packet = self.read_packet().await?;
        Frame::from_packet(packet)
    }
}

/// Writing side of a connection
pub struct FrameWriter<W> {
    writer: W,
    remote_addr: Option<SocketAddr>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            remote_addr: None,
        }
    }

    /// Write one frame without flushing
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.write_packet(&frame.to_packet()?).await
    }

    /// Write one raw envelope without flushing
    pub async fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        let bytes = packet.to_bytes()?;
        if bytes.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameSizeExceeded(bytes.len(), MAX_FRAME_SIZE));
        }

        debug!(
            "Sending {} frame ({} bytes) to {:?}",
            packet.packet_type,
            bytes.len(),
            self.remote_addr
        );

        let len = bytes.len() as u32;
        self.writer.write_all(&len.to_be_bytes()).await?;
        self.writer.write_all(&bytes).await?;
        Ok(())
    }

    /// Write a desktop-composed message
    pub async fn write_message(&mut self, message: OutboundMessage) -> Result<()> {
        self.write_frame(&Frame::OutboundMessage(message)).await
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.writer.flush().await?;
        Ok(())
    }

    /// Close the write side
    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// Accepted connection to the phone
pub struct TcpConnection {
    stream: TcpStream,
    remote_addr: SocketAddr,
}

impl TcpConnection {
    /// Create from an accepted TcpStream
    pub fn from_stream(stream: TcpStream, remote_addr: SocketAddr) -> Self {
        Self {
            stream,
            remote_addr,
        }
    }

    /// Get remote address
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Split into independently owned reading and writing sides
    pub fn into_split(self) -> (FrameReader<OwnedReadHalf>, FrameWriter<OwnedWriteHalf>) {
        if let Err(e) = self.stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY for {}: {}", self.remote_addr, e);
        }
        let (read_half, write_half) = self.stream.into_split();

        let mut reader = FrameReader::new(read_half);
        reader.remote_addr = Some(self.remote_addr);
        let mut writer = FrameWriter::new(write_half);
        writer.remote_addr = Some(self.remote_addr);

        (reader, writer)
    }
}
