use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use tokio::{
    io::AsyncReadExt,
    net::{UdpSocket, tcp::OwnedReadHalf},
    select,
    sync::{mpsc, watch},
};
use tracing::{debug, warn};

use super::{Connection, DisconnectReason, framing};
use crate::config::Framing;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const SCRATCH_CAPACITY_HINT: usize = 4096;

// -----------------------------------------------------------------------------
// ----- Source ----------------------------------------------------------------

/// Where a connection's inbound bytes come from.
#[derive(Debug)]
pub(crate) enum Source {
    Stream(OwnedReadHalf),
    /// Client datagram socket, `connect`ed to the server.
    Datagram(Arc<UdpSocket>),
    /// Server-side datagram peer, fed by the listener's demultiplexer.
    Demuxed(mpsc::Receiver<Bytes>),
}

// -----------------------------------------------------------------------------
// ----- Receive Loop ----------------------------------------------------------

/// One loop per connection: exactly one read in flight, each completion is
/// delivered before the next read is issued. Whichever way it stops, the
/// loop then fires `on_disconnected`, so that callback always comes after
/// the last `on_message`.
pub(crate) fn spawn_receive_loop(
    conn: Arc<Connection>,
    source: Source,
    closed: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        let reason = match source {
            Source::Stream(reader) => match conn.framing() {
                Framing::Raw => receive_stream_raw(&conn, reader, closed).await,
                Framing::LengthPrefixed => receive_stream_framed(&conn, reader, closed).await,
            },
            Source::Datagram(socket) => receive_datagram(&conn, &socket, closed).await,
            Source::Demuxed(inbox) => receive_demuxed(&conn, inbox, closed).await,
        };

        conn.disconnect(reason);
        conn.finish();
    });
}

// -----------------------------------------------------------------------------
// ----- Internal: Stream ------------------------------------------------------

async fn receive_stream_raw(
    conn: &Arc<Connection>,
    mut reader: OwnedReadHalf,
    mut closed: watch::Receiver<bool>,
) -> DisconnectReason {
    let mut scratch = vec![0u8; conn.max_message_size()];

    loop {
        select! {
            _ = closed.wait_for(|c| *c) => return DisconnectReason::Closed,

            read_res = reader.read(&mut scratch) => match read_res {
                Ok(0) => return DisconnectReason::PeerClosed,
                Ok(n) => conn.deliver(&scratch[..n]),
                Err(e) => {
                    debug!("connection {} read failed: {e}", conn.id());
                    return DisconnectReason::ReadFailed;
                }
            },
        }
    }
}

async fn receive_stream_framed(
    conn: &Arc<Connection>,
    mut reader: OwnedReadHalf,
    mut closed: watch::Receiver<bool>,
) -> DisconnectReason {
    let limit = conn.max_message_size();
    let mut inbox = BytesMut::with_capacity(SCRATCH_CAPACITY_HINT);

    loop {
        select! {
            _ = closed.wait_for(|c| *c) => return DisconnectReason::Closed,

            read_res = async {
                inbox.reserve(SCRATCH_CAPACITY_HINT);
                reader.read_buf(&mut inbox).await
            } => {
                match read_res {
                    Ok(0) => return DisconnectReason::PeerClosed,
                    Ok(_) => {}
                    Err(e) => {
                        debug!("connection {} read failed: {e}", conn.id());
                        return DisconnectReason::ReadFailed;
                    }
                }

                // drain every complete frame in the inbox
                loop {
                    match framing::split_frame(&mut inbox, limit) {
                        Ok(Some(frame)) => conn.deliver(&frame),
                        Ok(None) => break,
                        Err(e) => {
                            warn!("connection {} sent a bad frame: {e}", conn.id());
                            return DisconnectReason::ProtocolViolation;
                        }
                    }
                }
            }
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Datagram ----------------------------------------------------

async fn receive_datagram(
    conn: &Arc<Connection>,
    socket: &UdpSocket,
    mut closed: watch::Receiver<bool>,
) -> DisconnectReason {
    let limit = conn.max_message_size();
    // one spare byte tells an oversized datagram apart from a full one
    let mut scratch = vec![0u8; limit + 1];

    loop {
        select! {
            _ = closed.wait_for(|c| *c) => return DisconnectReason::Closed,

            recv_res = socket.recv(&mut scratch) => match recv_res {
                Ok(0) => return DisconnectReason::PeerClosed,
                Ok(n) if n > limit => {
                    warn!("connection {} dropped datagram above {limit} bytes", conn.id());
                }
                Ok(n) => conn.deliver(&scratch[..n]),
                Err(e) => {
                    debug!("connection {} receive failed: {e}", conn.id());
                    return DisconnectReason::ReadFailed;
                }
            },
        }
    }
}

async fn receive_demuxed(
    conn: &Arc<Connection>,
    mut inbox: mpsc::Receiver<Bytes>,
    mut closed: watch::Receiver<bool>,
) -> DisconnectReason {
    loop {
        select! {
            _ = closed.wait_for(|c| *c) => return DisconnectReason::Closed,

            next = inbox.recv() => match next {
                Some(datagram) => conn.deliver(&datagram),
                // sender dropped by `disconnect`, which already set the reason
                None => return DisconnectReason::Closed,
            },
        }
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
