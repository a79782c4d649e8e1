use bytes::Bytes;
use std::{
    io,
    net::SocketAddr,
    sync::{Arc, Weak},
};
use tokio::{
    io::AsyncWriteExt,
    net::{UdpSocket, tcp::OwnedWriteHalf},
    sync::{mpsc, oneshot},
};
use tracing::{trace, warn};

use super::{Connection, DisconnectReason};
use crate::errors::is_closed_kind;

// -----------------------------------------------------------------------------
// ----- Outbound --------------------------------------------------------------

/// One queued write. `ack` is set by `send_and_wait`.
#[derive(Debug)]
pub(crate) struct Outbound {
    pub(crate) payload: Bytes,
    pub(crate) ack: Option<oneshot::Sender<io::Result<()>>>,
}

// -----------------------------------------------------------------------------
// ----- DatagramLink ----------------------------------------------------------

/// Route from a datagram socket to one peer. A client socket is
/// `connect`ed to the server; a server socket is shared by every peer and
/// needs an explicit destination per send.
#[derive(Clone, Debug)]
pub(crate) struct DatagramLink {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    connected: bool,
}

impl DatagramLink {
    pub(crate) fn connected(socket: Arc<UdpSocket>, peer: SocketAddr) -> Self {
        Self {
            socket,
            peer,
            connected: true,
        }
    }

    pub(crate) fn shared(socket: Arc<UdpSocket>, peer: SocketAddr) -> Self {
        Self {
            socket,
            peer,
            connected: false,
        }
    }

    async fn send(&self, payload: &[u8]) -> io::Result<()> {
        let sent = if self.connected {
            self.socket.send(payload).await?
        } else {
            self.socket.send_to(payload, self.peer).await?
        };

        if sent != payload.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("datagram truncated: sent {sent} of {} bytes", payload.len()),
            ));
        }

        Ok(())
    }
}

// -----------------------------------------------------------------------------
// ----- Sink ------------------------------------------------------------------

#[derive(Debug)]
pub(crate) enum Sink {
    Stream(OwnedWriteHalf),
    Datagram(DatagramLink),
}

impl Sink {
    async fn write(&mut self, payload: &[u8]) -> io::Result<()> {
        match self {
            Sink::Stream(writer) => writer.write_all(payload).await,
            Sink::Datagram(link) => link.send(payload).await,
        }
    }

    async fn close(self) {
        match self {
            Sink::Stream(mut writer) => {
                let _ = writer.shutdown().await;
            }
            Sink::Datagram(_) => {}
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Writer Task -----------------------------------------------------------

/// Drain the outbound queue in order until every sender is gone, then close
/// the write side. A write failure that means the peer is gone disconnects
/// the owning connection.
pub(crate) fn spawn_writer_task(
    mut sink: Sink,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    owner: Weak<Connection>,
) {
    tokio::spawn(async move {
        while let Some(Outbound { payload, ack }) = rx.recv().await {
            let result = sink.write(&payload).await;
            let failed_kind = result.as_ref().err().map(|e| e.kind());

            match (ack, result) {
                (Some(ack), result) => {
                    let _ = ack.send(result);
                }
                (None, Err(e)) => warn!("write of {} bytes failed: {e}", payload.len()),
                (None, Ok(())) => trace!("wrote {} bytes", payload.len()),
            }

            if failed_kind.is_some_and(is_closed_kind) {
                if let Some(conn) = owner.upgrade() {
                    conn.disconnect(DisconnectReason::WriteFailed);
                }
                break;
            }
        }

        sink.close().await;
    });
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
