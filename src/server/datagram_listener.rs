use bytes::Bytes;
use std::{net::SocketAddr, sync::Arc};
use tokio::{
    net::UdpSocket,
    select,
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{trace, warn};

use super::server::ListenerContext;
use crate::{
    errors::{NetError, Result},
    net::{
        Connection, DisconnectReason,
        receive::Source,
        writer::{DatagramLink, Sink},
    },
};

// -----------------------------------------------------------------------------
// ----- Bind ------------------------------------------------------------------

pub(super) async fn bind(addr: SocketAddr) -> Result<UdpSocket> {
    UdpSocket::bind(addr)
        .await
        .map_err(|e| NetError::setup(addr, e))
}

// -----------------------------------------------------------------------------
// ----- Demux Loop ------------------------------------------------------------

/// Read every datagram off the shared socket and route it by source address.
/// A new address gets its own `Connection` on first sight.
pub(super) fn spawn_demux_loop(
    socket: UdpSocket,
    ctx: Arc<ListenerContext>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let socket = Arc::new(socket);

    tokio::spawn(async move {
        let limit = ctx.config.max_message_size;
        // one spare byte tells an oversized datagram apart from a full one
        let mut scratch = vec![0u8; limit + 1];

        loop {
            select! {
                _ = shutdown.wait_for(|stop| *stop) => break,

                recv_res = socket.recv_from(&mut scratch) => {
                    let (n, peer) = match recv_res {
                        Ok(v) => v,
                        // e.g. ICMP port-unreachable from an earlier send; the socket is still fine
                        Err(e) => { warn!("datagram receive error: {e}"); continue; }
                    };

                    if n > limit {
                        warn!("dropping datagram from {peer}: above {limit} bytes");
                        continue;
                    }

                    route(&ctx, &socket, peer, &scratch[..n]);
                }
            }
        }
    })
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

fn route(ctx: &ListenerContext, socket: &Arc<UdpSocket>, peer: SocketAddr, datagram: &[u8]) {
    if let Some(conn) = ctx.registry.find_by_addr(peer) {
        // close signals skip the bounded inbox so a busy peer cannot lose them
        if datagram.is_empty() {
            conn.disconnect(DisconnectReason::PeerClosed);
        } else {
            conn.push_datagram(Bytes::copy_from_slice(datagram));
        }
        return;
    }

    // close signal from a peer we no longer track
    if datagram.is_empty() {
        trace!("ignoring close signal from unknown peer {peer}");
        return;
    }

    let (inbox_tx, inbox_rx) = mpsc::channel(ctx.config.datagram_queue_depth);
    let link = DatagramLink::shared(socket.clone(), peer);

    let added = ctx.registry.add(|id| {
        Connection::open(ctx.endpoint(id, peer), Sink::Datagram(link), Some(inbox_tx))
    });

    match added {
        Ok(conn) => {
            conn.start(Source::Demuxed(inbox_rx));
            conn.push_datagram(Bytes::copy_from_slice(datagram));
        }
        Err(e) => warn!("refusing datagram peer {peer}: {e}"),
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
