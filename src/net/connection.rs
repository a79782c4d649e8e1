use bytes::Bytes;
use parking_lot::Mutex;
use std::{
    fmt,
    net::SocketAddr,
    sync::{
        Arc, OnceLock,
        atomic::{AtomicU8, Ordering},
    },
};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, trace, warn};

use super::{
    NetworkHandler, framing,
    receive::{Source, spawn_receive_loop},
    writer::{Outbound, Sink, spawn_writer_task},
};
use crate::{
    buffer::{BufferPool, MessageBuffer},
    config::{Framing, TransportKind},
    errors::{NetError, Result},
};

// -----------------------------------------------------------------------------
// ----- ConnectionId ----------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    /// Id carried by client-side connections, which live outside any registry.
    pub const CLIENT: ConnectionId = ConnectionId(0);
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// -----------------------------------------------------------------------------
// ----- ConnectionState -------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected, // terminal
}

const CONNECTING: u8 = 0;
const CONNECTED: u8 = 1;
const DISCONNECTED: u8 = 2;

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            CONNECTING => ConnectionState::Connecting,
            CONNECTED => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- DisconnectReason ------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `close()` was called locally.
    Closed,
    /// Zero-length read (stream) or zero-length datagram.
    PeerClosed,
    ReadFailed,
    WriteFailed,
    /// Framing violation, e.g. a declared length above the limit.
    ProtocolViolation,
    /// The owning listener went away.
    Shutdown,
}

// -----------------------------------------------------------------------------
// ----- Connection ------------------------------------------------------------

pub struct Connection {
    id: ConnectionId,
    remote_addr: SocketAddr,
    transport: TransportKind,
    framing: Framing,
    max_message_size: usize,

    state: AtomicU8,
    reason: OnceLock<DisconnectReason>,
    // stops the receive loop
    closed: watch::Sender<bool>,
    // set once `on_disconnected` has returned (or was skipped)
    finished: watch::Sender<bool>,

    outbound: Mutex<Option<mpsc::UnboundedSender<Outbound>>>,
    // datagram server peers: fed by the listener's demultiplexer
    inbox: Mutex<Option<mpsc::Sender<Bytes>>>,

    pool: Arc<BufferPool>,
    handler: Arc<dyn NetworkHandler>,
}

/// Everything a listener or client knows about a peer before its
/// `Connection` exists.
pub(crate) struct Endpoint {
    pub(crate) id: ConnectionId,
    pub(crate) remote_addr: SocketAddr,
    pub(crate) transport: TransportKind,
    pub(crate) framing: Framing,
    pub(crate) max_message_size: usize,
    pub(crate) pool: Arc<BufferPool>,
    pub(crate) handler: Arc<dyn NetworkHandler>,
}

// -----------------------------------------------------------------------------
// ----- Connection: Static ----------------------------------------------------

impl Connection {
    /// Build the connection and its writer task. The connection stays in
    /// `Connecting` until `start`.
    pub(crate) fn open(
        endpoint: Endpoint,
        sink: Sink,
        inbox: Option<mpsc::Sender<Bytes>>,
    ) -> Arc<Self> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(false);
        let (finished, _) = watch::channel(false);

        // length prefixes only make sense on a byte stream
        let framing = match endpoint.transport {
            TransportKind::Stream => endpoint.framing,
            TransportKind::Datagram => Framing::Raw,
        };

        Arc::new_cyclic(|weak| {
            spawn_writer_task(sink, outbound_rx, weak.clone());

            Self {
                id: endpoint.id,
                remote_addr: endpoint.remote_addr,
                transport: endpoint.transport,
                framing,
                max_message_size: endpoint.max_message_size,
                state: AtomicU8::new(CONNECTING),
                reason: OnceLock::new(),
                closed,
                finished,
                outbound: Mutex::new(Some(outbound_tx)),
                inbox: Mutex::new(inbox),
                pool: endpoint.pool,
                handler: endpoint.handler,
            }
        })
    }
}

// -----------------------------------------------------------------------------
// ----- Connection: Public ----------------------------------------------------

impl Connection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_connected(&self) -> bool {
        self.state.load(Ordering::Acquire) == CONNECTED
    }

    /// Why the connection ended; `None` while it is still open.
    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        self.reason.get().copied()
    }

    /// Queue the buffer's written bytes for the writer task. Returns once
    /// queued; use `send_and_wait` to observe the transport write itself.
    pub fn send(&self, buffer: &MessageBuffer) -> Result<()> {
        self.enqueue(buffer.as_slice(), None)
    }

    /// Queue the buffer and wait until the transport accepted it.
    pub async fn send_and_wait(&self, buffer: &MessageBuffer) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.enqueue(buffer.as_slice(), Some(ack_tx))?;

        match ack_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(NetError::TransportWrite(e)),
            // writer stopped before reaching this message
            Err(_) => Err(NetError::Disconnected),
        }
    }

    /// Close the connection from this side. Already-queued sends are still
    /// flushed. Datagram peers get a zero-length datagram as a close signal.
    pub fn close(self: &Arc<Self>) {
        self.close_with(DisconnectReason::Closed);
    }

    /// Resolves once the connection is disconnected and `on_disconnected`
    /// has returned.
    pub async fn disconnected(&self) {
        let mut finished = self.finished.subscribe();
        let _ = finished.wait_for(|done| *done).await;
    }
}

// -----------------------------------------------------------------------------
// ----- Connection: Crate -----------------------------------------------------

impl Connection {
    pub(crate) fn close_with(self: &Arc<Self>, reason: DisconnectReason) {
        if self.transport == TransportKind::Datagram && self.is_connected() {
            if let Some(tx) = self.outbound.lock().as_ref() {
                let _ = tx.send(Outbound {
                    payload: Bytes::new(),
                    ack: None,
                });
            }
        }

        self.disconnect(reason);
    }

    /// Move to `Connected`, notify the handler, then arm the receive loop.
    pub(crate) fn start(self: &Arc<Self>, source: Source) {
        if self
            .state
            .compare_exchange(CONNECTING, CONNECTED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        debug!(
            "{} connection {} from {} established",
            self.transport.as_str(),
            self.id,
            self.remote_addr
        );

        self.handler.on_connected(self);
        spawn_receive_loop(self.clone(), source, self.closed.subscribe());
    }

    /// Transition to `Disconnected`. Only the first call has any effect;
    /// returns whether this call was it. The handler hears about it from
    /// the receive task, after its last `on_message`.
    pub(crate) fn disconnect(&self, reason: DisconnectReason) -> bool {
        let previous = self.state.swap(DISCONNECTED, Ordering::AcqRel);
        if previous == DISCONNECTED {
            return false;
        }

        let _ = self.reason.set(reason);

        // stop the receive loop, then let the writer drain and close
        self.closed.send_replace(true);
        self.outbound.lock().take();
        self.inbox.lock().take();

        debug!(
            "{} connection {} from {} closed: {:?}",
            self.transport.as_str(),
            self.id,
            self.remote_addr,
            reason
        );

        // never started: no receive task, and no `on_connected` to pair with
        if previous == CONNECTING {
            self.finished.send_replace(true);
        }

        true
    }

    /// Run `on_disconnected`. Called once, by the receive task as it exits.
    pub(crate) fn finish(self: &Arc<Self>) {
        self.handler.on_disconnected(self);
        self.finished.send_replace(true);
    }

    /// Copy received bytes into a pooled buffer and hand it to the handler.
    /// The scratch area is free for the next read once this returns.
    pub(crate) fn deliver(self: &Arc<Self>, bytes: &[u8]) {
        if !self.is_connected() {
            return;
        }

        let mut buffer = self.pool.acquire();
        if let Err(e) = buffer.load(bytes) {
            warn!("connection {} dropped inbound message: {e}", self.id);
            return;
        }

        trace!("connection {} received {} bytes", self.id, bytes.len());
        self.handler.on_message(self, buffer);
    }

    /// Route one datagram from the shared server socket to this peer.
    /// Close signals never come through here.
    pub(crate) fn push_datagram(&self, payload: Bytes) {
        let inbox = self.inbox.lock();
        let Some(inbox) = inbox.as_ref() else {
            return;
        };

        if let Err(mpsc::error::TrySendError::Full(_)) = inbox.try_send(payload) {
            warn!("connection {} inbound queue full; dropping datagram", self.id);
        }
    }

    pub(crate) fn max_message_size(&self) -> usize {
        self.max_message_size
    }
}

// -----------------------------------------------------------------------------
// ----- Connection: Private ---------------------------------------------------

impl Connection {
    fn enqueue(
        &self,
        payload: &[u8],
        ack: Option<oneshot::Sender<std::io::Result<()>>>,
    ) -> Result<()> {
        if !self.is_connected() {
            return Err(NetError::Disconnected);
        }

        let payload = self.frame(payload)?;

        let guard = self.outbound.lock();
        let Some(tx) = guard.as_ref() else {
            return Err(NetError::Disconnected);
        };

        tx.send(Outbound { payload, ack })
            .map_err(|_| NetError::Disconnected)
    }

    fn frame(&self, payload: &[u8]) -> Result<Bytes> {
        let limit = self.max_message_size;

        match (self.transport, self.framing) {
            (TransportKind::Datagram, _) => {
                if payload.is_empty() {
                    return Err(NetError::EmptyDatagram);
                }
                if payload.len() > limit {
                    return Err(NetError::MessageTooLarge {
                        len: payload.len(),
                        limit,
                    });
                }
                Ok(Bytes::copy_from_slice(payload))
            }

            (TransportKind::Stream, Framing::LengthPrefixed) => {
                if payload.len() > limit {
                    return Err(NetError::MessageTooLarge {
                        len: payload.len(),
                        limit,
                    });
                }
                Ok(framing::encode_frame(payload))
            }

            (TransportKind::Stream, Framing::Raw) => Ok(Bytes::copy_from_slice(payload)),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("transport", &self.transport)
            .field("state", &self.state())
            .finish()
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
