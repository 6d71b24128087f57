//! Inbound Channel
//!
//! One reading task bound to the read side of the live connection. Frames are
//! handed to the [`FrameHandler`] one at a time, in the order they arrived.
//!
//! - Undecodable frames (unknown kind, malformed body) are logged and skipped
//! - Handler failures are logged; the loop keeps reading
//! - A transport failure ends the loop with [`InboundExit::TransportFailed`],
//!   which the listener answers by listening again
//! - Cancellation ends the loop with [`InboundExit::Cancelled`] and no restart

use crate::transport::FrameReader;
use crate::{Frame, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Receives decoded frames from the inbound channel
#[async_trait]
pub trait FrameHandler: Send + Sync {
    /// Apply one frame
    async fn handle_frame(&self, frame: Frame) -> Result<()>;
}

/// Why the reading loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundExit {
    /// The loop was never started
    NotStarted,
    /// Stopped on request
    Cancelled,
    /// The connection broke
    TransportFailed(String),
}

/// Reading task for frames coming from the phone
pub struct InboundChannel {
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<InboundExit>>>,
}

impl InboundChannel {
    pub fn new() -> Self {
        Self::with_cancellation(CancellationToken::new())
    }

    /// Reading task that also stops when `cancel` fires
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            task: Mutex::new(None),
        }
    }

    /// Spawn the reading task
    pub async fn start<R>(&self, reader: FrameReader<R>, handler: Arc<dyn FrameHandler>)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let mut task = self.task.lock().await;
        if task.is_some() {
            warn!("Inbound channel already started");
            return;
        }

        let cancel = self.cancel.clone();
        *task = Some(tokio::spawn(run_receiver(reader, handler, cancel)));
    }

    /// Stop reading; the pending read is abandoned and the read side dropped
    ///
    /// Safe to call repeatedly and before `start`.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            debug!("Cancelling inbound channel");
        }
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for the reading loop to end
    ///
    /// The exit reason is reported once; later calls see `NotStarted`.
    pub async fn join(&self) -> InboundExit {
        let task = self.task.lock().await.take();
        match task {
            Some(task) => match task.await {
                Ok(exit) => exit,
                Err(e) => InboundExit::TransportFailed(format!("reader task failed: {}", e)),
            },
            None => InboundExit::NotStarted,
        }
    }
}

impl Default for InboundChannel {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_receiver<R>(
    mut reader: FrameReader<R>,
    handler: Arc<dyn FrameHandler>,
    cancel: CancellationToken,
) -> InboundExit
where
    R: AsyncRead + Unpin + Send,
{
    let exit = loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break InboundExit::Cancelled,
            result = reader.read_frame() => result,
        };

        match result {
            Ok(frame) => {
                let kind = frame.kind();
                debug!("Dispatching {} frame", kind);
                if let Err(e) = handler.handle_frame(frame).await {
                    warn!("Could not apply {} frame: {}", kind, e);
                }
            }
            Err(e) if e.is_decode() => {
                warn!("Skipping undecodable frame: {}", e);
            }
            Err(e) => {
                if cancel.is_cancelled() {
                    break InboundExit::Cancelled;
                }
                warn!("Connection to phone lost: {}", e);
                break InboundExit::TransportFailed(e.to_string());
            }
        }
    };

    info!("Inbound channel stopped ({:?})", exit);
    exit
}
