//! Connection Listener
//!
//! Owns the listening socket and the single phone connection.
//!
//! ## Lifecycle
//!
//! 1. [`ConnectionListener::start`] binds the port and spawns a supervisor task
//! 2. The supervisor accepts one connection, closes the listening socket and
//!    starts an [`OutboundChannel`] and an [`InboundChannel`] on it
//! 3. When the inbound side loses the transport the supervisor tears both
//!    channels down and listens again on the same port
//! 4. [`ConnectionListener::stop`] cancels everything; with `is_restart` the
//!    port is bound again right away
//!
//! State changes are published through a `watch` channel and lifecycle events
//! through a `broadcast` channel.

use super::events::{ConnectionEvent, ListenerState};
use super::inbound::{FrameHandler, InboundChannel, InboundExit};
use super::outbound::OutboundChannel;
use crate::transport::TcpConnection;
use crate::{Coordinator, ProtocolError, Result};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Capacity of the lifecycle event channel
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Pause after a failed accept (e.g. out of file descriptors)
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Listener configuration
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Local address to bind to
    pub bind_addr: IpAddr,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }
}

/// State shared between the listener handle and its supervisor task
struct Shared {
    coordinator: Arc<Coordinator>,
    state_tx: watch::Sender<ListenerState>,
    event_tx: broadcast::Sender<ConnectionEvent>,
}

impl Shared {
    fn set_state(&self, state: ListenerState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!("Listener state: {} -> {}", previous, state);
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}

/// Running supervisor task
struct Supervisor {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Single-connection TCP listener with restart on failure
pub struct ConnectionListener {
    shared: Arc<Shared>,
    config: ListenerConfig,

    /// Last port successfully bound, 0 before the first start
    port: AtomicU16,

    supervisor: Mutex<Option<Supervisor>>,
}

impl ConnectionListener {
    pub fn new(coordinator: Arc<Coordinator>, config: ListenerConfig) -> Self {
        let (state_tx, _) = watch::channel(ListenerState::Idle);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            shared: Arc::new(Shared {
                coordinator,
                state_tx,
                event_tx,
            }),
            config,
            port: AtomicU16::new(0),
            supervisor: Mutex::new(None),
        }
    }

    /// Bind `port` and start waiting for the phone
    ///
    /// A listener that is already running is stopped first. Bind errors are
    /// returned and leave the listener stopped.
    pub async fn start(&self, port: u16) -> Result<u16> {
        if port == 0 {
            return Err(ProtocolError::Configuration(
                "port must be a positive integer".to_string(),
            ));
        }

        let mut supervisor = self.supervisor.lock().await;
        if let Some(running) = supervisor.take() {
            debug!("Listener already running, stopping it first");
            self.shutdown(running).await;
        }

        *supervisor = Some(self.listen(port).await?);
        Ok(port)
    }

    /// Stop listening and drop the connection
    ///
    /// With `is_restart` the last port is bound again; otherwise the listener
    /// ends in [`ListenerState::Terminated`].
    pub async fn stop(&self, is_restart: bool) -> Result<()> {
        let mut supervisor = self.supervisor.lock().await;
        if let Some(running) = supervisor.take() {
            info!("Stopping connection listener (restart: {})", is_restart);
            self.shared.set_state(ListenerState::Closing);
            self.shutdown(running).await;
        }

        if is_restart {
            if let Some(port) = self.port() {
                *supervisor = Some(self.listen(port).await?);
                return Ok(());
            }
            debug!("Listener never bound, nothing to restart");
        }

        self.shared.set_state(ListenerState::Terminated);
        self.shared.emit(ConnectionEvent::ListenerStopped);
        Ok(())
    }

    async fn listen(&self, port: u16) -> Result<Supervisor> {
        let addr = SocketAddr::new(self.config.bind_addr, port);
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            error!("Failed to listen on {}: {}", addr, e);
            ProtocolError::Io(e)
        })?;

        self.port.store(port, Ordering::SeqCst);
        info!("Waiting for phone on {}", addr);
        self.shared.set_state(ListenerState::Listening);
        self.shared.emit(ConnectionEvent::Listening { port });

        let cancel = CancellationToken::new();
        let task = tokio::spawn(supervise(
            self.shared.clone(),
            listener,
            addr,
            cancel.clone(),
        ));
        Ok(Supervisor { cancel, task })
    }

    async fn shutdown(&self, supervisor: Supervisor) {
        supervisor.cancel.cancel();
        if let Err(e) = supervisor.task.await {
            warn!("Listener task ended abnormally: {}", e);
        }
        self.shared.coordinator.detach_outbound().await;
    }

    /// Last port bound
    pub fn port(&self) -> Option<u16> {
        match self.port.load(Ordering::SeqCst) {
            0 => None,
            port => Some(port),
        }
    }

    pub fn state(&self) -> ListenerState {
        *self.shared.state_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ListenerState::Connected
    }

    /// Watch lifecycle state transitions
    pub fn state_changes(&self) -> watch::Receiver<ListenerState> {
        self.shared.state_tx.subscribe()
    }

    /// Receive lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.event_tx.subscribe()
    }
}

async fn supervise(
    shared: Arc<Shared>,
    listener: TcpListener,
    addr: SocketAddr,
    cancel: CancellationToken,
) {
    let mut listener = Some(listener);

    while let Some(socket) = listener.take() {
        let accepted = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            accepted = socket.accept() => accepted,
        };

        let (stream, remote_addr) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Failed to accept connection: {}", e);
                if !accept_backoff(&cancel).await {
                    break;
                }
                listener = Some(socket);
                continue;
            }
        };

        // One phone at a time: stop listening while connected
        drop(socket);

        let reason = match serve(&shared, stream, remote_addr, &cancel).await {
            InboundExit::TransportFailed(reason) => reason,
            InboundExit::Cancelled | InboundExit::NotStarted => break,
        };

        info!("Phone at {} disconnected: {}", remote_addr, reason);
        shared.emit(ConnectionEvent::Disconnected { reason });
        if let Err(e) = shared.coordinator.connection_state_changed(false).await {
            debug!("Disconnect not shown: {}", e);
        }
        shared.coordinator.clear_session().await;
        shared.set_state(ListenerState::Restarting);

        match TcpListener::bind(addr).await {
            Ok(socket) => {
                info!("Waiting for phone on {}", addr);
                shared.set_state(ListenerState::Listening);
                shared.emit(ConnectionEvent::Listening { port: addr.port() });
                listener = Some(socket);
            }
            Err(e) => {
                error!("Failed to listen again on {}: {}", addr, e);
                shared.emit(ConnectionEvent::ConnectionError {
                    message: e.to_string(),
                });
                shared.set_state(ListenerState::Terminated);
            }
        }
    }

    debug!("Listener supervisor exiting");
}

/// Wait before the next accept; `false` when cancelled meanwhile
async fn accept_backoff(cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(ACCEPT_RETRY_DELAY) => true,
    }
}

/// Run both channels on one connection until the inbound side ends
async fn serve(
    shared: &Shared,
    stream: TcpStream,
    remote_addr: SocketAddr,
    cancel: &CancellationToken,
) -> InboundExit {
    info!("Phone connected from {}", remote_addr);
    let (reader, writer) = TcpConnection::from_stream(stream, remote_addr).into_split();

    let outbound = Arc::new(OutboundChannel::with_cancellation(cancel.child_token()));
    outbound.start(writer).await;
    shared.coordinator.attach_outbound(outbound.clone()).await;

    let inbound = InboundChannel::with_cancellation(cancel.child_token());
    let handler: Arc<dyn FrameHandler> = shared.coordinator.clone();
    inbound.start(reader, handler).await;

    shared.set_state(ListenerState::Connected);
    shared.emit(ConnectionEvent::Connected { remote_addr });
    if let Err(e) = shared.coordinator.connection_state_changed(true).await {
        debug!("Connection not shown: {}", e);
    }

    let exit = inbound.join().await;

    outbound.cancel();
    outbound.join().await;
    shared.coordinator.detach_outbound().await;
    exit
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::time::timeout;

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn loopback_listener() -> ConnectionListener {
        ConnectionListener::new(
            Arc::new(Coordinator::new()),
            ListenerConfig {
                bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            },
        )
    }

    async fn wait_for(rx: &mut watch::Receiver<ListenerState>, state: ListenerState) {
        timeout(Duration::from_secs(5), rx.wait_for(|s| *s == state))
            .await
            .expect("state not reached in time")
            .expect("listener dropped");
    }

    #[tokio::test]
    async fn test_port_zero_rejected() {
        let listener = loopback_listener();
        let result = listener.start(0).await;
        assert!(matches!(result, Err(ProtocolError::Configuration(_))));
        assert_eq!(listener.state(), ListenerState::Idle);
    }

    #[tokio::test]
    async fn test_bind_failure_returned() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let listener = loopback_listener();
        let result = listener.start(port).await;
        assert!(matches!(result, Err(ProtocolError::Io(_))));
        assert_eq!(listener.state(), ListenerState::Idle);
        assert_eq!(listener.port(), None);
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let port = free_port();
        let listener = loopback_listener();
        let mut events = listener.subscribe();

        assert_eq!(listener.start(port).await.unwrap(), port);
        assert_eq!(listener.state(), ListenerState::Listening);
        assert_eq!(listener.port(), Some(port));
        assert!(matches!(
            events.recv().await.unwrap(),
            ConnectionEvent::Listening { port: p } if p == port
        ));

        listener.stop(false).await.unwrap();
        assert_eq!(listener.state(), ListenerState::Terminated);
        assert!(matches!(
            events.recv().await.unwrap(),
            ConnectionEvent::ListenerStopped
        ));

        // Socket released
        assert!(TcpStream::connect(("127.0.0.1", port)).await.is_err());
    }

    #[tokio::test]
    async fn test_accept_then_restart_after_disconnect() {
        let port = free_port();
        let listener = loopback_listener();
        let mut states = listener.state_changes();
        listener.start(port).await.unwrap();

        let phone = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        wait_for(&mut states, ListenerState::Connected).await;
        assert!(listener.is_connected());

        drop(phone);
        wait_for(&mut states, ListenerState::Listening).await;
        assert_eq!(listener.port(), Some(port));

        // A new phone can attach on the same port
        let _phone = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        wait_for(&mut states, ListenerState::Connected).await;

        listener.stop(false).await.unwrap();
        assert_eq!(listener.state(), ListenerState::Terminated);
    }

    #[tokio::test]
    async fn test_stop_with_restart_listens_again() {
        let port = free_port();
        let listener = loopback_listener();
        let mut states = listener.state_changes();
        listener.start(port).await.unwrap();

        let _phone = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        wait_for(&mut states, ListenerState::Connected).await;

        listener.stop(true).await.unwrap();
        assert_eq!(listener.state(), ListenerState::Listening);

        let _phone = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        wait_for(&mut states, ListenerState::Connected).await;
        listener.stop(false).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let listener = loopback_listener();
        listener.stop(true).await.unwrap();
        assert_eq!(listener.state(), ListenerState::Terminated);
    }

    #[tokio::test]
    async fn test_rebind_failure_terminates() {
        let port = free_port();
        let listener = loopback_listener();
        let mut states = listener.state_changes();
        let mut events = listener.subscribe();
        listener.start(port).await.unwrap();

        let phone = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        wait_for(&mut states, ListenerState::Connected).await;

        // Someone else takes the port while the phone is attached
        let _squatter = std::net::TcpListener::bind(("127.0.0.1", port)).unwrap();
        drop(phone);

        wait_for(&mut states, ListenerState::Terminated).await;
        let error = timeout(Duration::from_secs(5), async {
            loop {
                if let ConnectionEvent::ConnectionError { message } = events.recv().await.unwrap() {
                    return message;
                }
            }
        })
        .await
        .expect("no connection error reported");
        assert!(!error.is_empty());

        // Stopping afterwards is still clean
        listener.stop(false).await.unwrap();
        assert_eq!(listener.state(), ListenerState::Terminated);
    }

    #[tokio::test]
    async fn test_accept_backoff_waits_and_honours_cancel() {
        let cancel = CancellationToken::new();
        let started = Instant::now();
        assert!(accept_backoff(&cancel).await);
        assert!(started.elapsed() >= ACCEPT_RETRY_DELAY);

        cancel.cancel();
        let started = Instant::now();
        assert!(!accept_backoff(&cancel).await);
        assert!(started.elapsed() < ACCEPT_RETRY_DELAY);
    }
}
