//! Outbound Channel
//!
//! Unbounded queue of desktop-composed messages plus one sending task bound to
//! the write side of the live connection.
//!
//! The sending task waits for the queue to become non-empty, drains everything
//! queued at that moment, writes each message as its own frame in enqueue
//! order and flushes once per drain. A failed write ends the task; there is no
//! retry because reconnecting belongs to the listener.

use crate::transport::FrameWriter;
use crate::{OutboundMessage, Result};
use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Queue and sending task for messages going to the phone
pub struct OutboundChannel {
    /// Producer side, shared by every `enqueue` caller
    queue_tx: mpsc::UnboundedSender<OutboundMessage>,

    /// Consumer side until the sending task takes it
    queue_rx: Mutex<Option<mpsc::UnboundedReceiver<OutboundMessage>>>,

    /// Shutdown signal for the sending task
    cancel: CancellationToken,

    /// Sending task, once started
    task: Mutex<Option<JoinHandle<()>>>,
}

impl OutboundChannel {
    /// Create the queue; nothing is sent until [`start`](Self::start)
    pub fn new() -> Self {
        Self::with_cancellation(CancellationToken::new())
    }

    /// Create the queue, stopping when `cancel` fires
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            cancel,
            task: Mutex::new(None),
        }
    }

    /// Spawn the sending task on the connection's write side
    ///
    /// Messages enqueued before this call are sent first.
    pub async fn start<W>(&self, writer: FrameWriter<W>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let Some(queue_rx) = self.queue_rx.lock().await.take() else {
            warn!("Outbound channel already started");
            return;
        };

        let cancel = self.cancel.clone();
        let task = tokio::spawn(run_sender(writer, queue_rx, cancel));
        *self.task.lock().await = Some(task);
    }

    /// Append a message to the queue
    ///
    /// Never blocks. Once the sending task has stopped the message is dropped.
    pub fn enqueue(&self, message: OutboundMessage) {
        if self.cancel.is_cancelled() {
            debug!("Outbound channel cancelled, dropping message to {}", message.recipient);
            return;
        }
        if let Err(e) = self.queue_tx.send(message) {
            debug!(
                "Outbound sender gone, dropping message to {}",
                e.0.recipient
            );
        }
    }

    /// Stop the sending task and close the write side
    ///
    /// Safe to call repeatedly and before `start`.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            debug!("Cancelling outbound channel");
        }
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for the sending task to finish
    ///
    /// Returns immediately when the task was never started.
    pub async fn join(&self) {
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Outbound task ended abnormally: {}", e);
            }
        }
    }
}

impl Default for OutboundChannel {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_sender<W>(
    mut writer: FrameWriter<W>,
    mut queue: mpsc::UnboundedReceiver<OutboundMessage>,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin + Send,
{
    loop {
        let first = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = queue.recv() => match next {
                Some(message) => message,
                None => break,
            },
        };

        let mut batch = vec![first];
        while let Ok(message) = queue.try_recv() {
            batch.push(message);
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = send_batch(&mut writer, batch) => result,
        };

        if let Err(e) = result {
            warn!("Failed to send messages to phone: {}", e);
            break;
        }
    }

    // Dropping the receiver makes later enqueues no-ops
    queue.close();

    if let Err(e) = writer.shutdown().await {
        debug!("Error closing write side: {}", e);
    }
    info!("Outbound channel stopped");
}

async fn send_batch<W>(writer: &mut FrameWriter<W>, batch: Vec<OutboundMessage>) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let count = batch.len();
    for message in batch {
        writer.write_message(message).await?;
    }
    writer.flush().await?;
    debug!("Sent {} queued messages", count);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::FrameReader;
    use crate::{Frame, Message};
    use std::time::Duration;
    use tokio::time::timeout;

    fn message(text: &str) -> OutboundMessage {
        OutboundMessage::new("+48111", Message::sent(text))
    }

    async fn next_text<R: tokio::io::AsyncRead + Unpin>(reader: &mut FrameReader<R>) -> String {
        match reader.read_frame().await.unwrap() {
            Frame::OutboundMessage(outbound) => outbound.message.text().to_string(),
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_drain_preserves_enqueue_order() {
        let (local, remote) = tokio::io::duplex(64 * 1024);
        let channel = OutboundChannel::new();

        channel.enqueue(message("m1"));
        channel.enqueue(message("m2"));
        channel.enqueue(message("m3"));
        channel.start(FrameWriter::new(local)).await;

        let mut reader = FrameReader::new(remote);
        assert_eq!(next_text(&mut reader).await, "m1");
        assert_eq!(next_text(&mut reader).await, "m2");
        assert_eq!(next_text(&mut reader).await, "m3");

        channel.cancel();
        channel.join().await;
    }

    #[tokio::test]
    async fn test_enqueue_after_start_wakes_sender() {
        let (local, remote) = tokio::io::duplex(64 * 1024);
        let channel = OutboundChannel::new();
        channel.start(FrameWriter::new(local)).await;

        let mut reader = FrameReader::new(remote);
        channel.enqueue(message("first"));
        assert_eq!(next_text(&mut reader).await, "first");
        channel.enqueue(message("second"));
        assert_eq!(next_text(&mut reader).await, "second");

        channel.cancel();
        channel.join().await;
    }

    #[tokio::test]
    async fn test_cancel_unblocks_idle_sender() {
        let (local, remote) = tokio::io::duplex(1024);
        let channel = OutboundChannel::new();
        channel.start(FrameWriter::new(local)).await;

        channel.cancel();
        timeout(Duration::from_secs(1), channel.join())
            .await
            .expect("sender should stop promptly");

        // Write side closed, nothing was transmitted
        let mut reader = FrameReader::new(remote);
        assert!(reader.read_frame().await.unwrap_err().is_transport());
    }

    #[tokio::test]
    async fn test_cancel_unblocks_stalled_write() {
        // Tiny buffer and nobody reading: the write blocks
        let (local, _remote) = tokio::io::duplex(8);
        let channel = OutboundChannel::new();
        channel.start(FrameWriter::new(local)).await;
        channel.enqueue(message("this will not fit"));
        tokio::task::yield_now().await;

        channel.cancel();
        timeout(Duration::from_secs(1), channel.join())
            .await
            .expect("sender should stop promptly");
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent_and_safe_before_start() {
        let channel = OutboundChannel::new();
        channel.cancel();
        channel.cancel();
        assert!(channel.is_cancelled());
        channel.join().await;

        // Accepted, never transmitted
        channel.enqueue(message("late"));
    }

    #[tokio::test]
    async fn test_parent_token_cancels_sender() {
        let (local, _remote) = tokio::io::duplex(1024);
        let parent = CancellationToken::new();
        let channel = OutboundChannel::with_cancellation(parent.child_token());
        channel.start(FrameWriter::new(local)).await;

        parent.cancel();
        assert!(channel.is_cancelled());
        timeout(Duration::from_secs(1), channel.join())
            .await
            .expect("sender should stop promptly");
    }

    #[tokio::test]
    async fn test_write_failure_stops_sender() {
        let (local, remote) = tokio::io::duplex(1024);
        drop(remote);

        let channel = OutboundChannel::new();
        channel.start(FrameWriter::new(local)).await;
        channel.enqueue(message("lost"));

        timeout(Duration::from_secs(1), channel.join())
            .await
            .expect("sender should stop after a failed write");

        // Still accepted afterwards
        channel.enqueue(message("also lost"));
    }
}
