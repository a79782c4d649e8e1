use std::{net::SocketAddr, sync::Arc};
use tokio::{
    net::{TcpListener, TcpSocket, TcpStream},
    select,
    sync::watch,
    task::JoinHandle,
};
use tracing::{error, warn};

use super::server::ListenerContext;
use crate::{
    errors::{NetError, Result},
    net::{Connection, receive::Source, writer::Sink},
};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const LISTEN_BACKLOG: u32 = 1024;

// -----------------------------------------------------------------------------
// ----- Bind ------------------------------------------------------------------

pub(super) fn bind(addr: SocketAddr) -> Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(|e| NetError::setup(addr, e))?;

    socket
        .set_reuseaddr(true)
        .map_err(|e| NetError::setup(addr, e))?;
    socket.bind(addr).map_err(|e| NetError::setup(addr, e))?;

    socket
        .listen(LISTEN_BACKLOG)
        .map_err(|e| NetError::setup(addr, e))
}

// -----------------------------------------------------------------------------
// ----- Accept Loop -----------------------------------------------------------

/// Accept until shutdown; each accepted socket becomes a registered
/// `Connection` and the next accept is armed right away.
pub(super) fn spawn_accept_loop(
    listener: TcpListener,
    ctx: Arc<ListenerContext>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            select! {
                _ = shutdown.wait_for(|stop| *stop) => break,

                accept_res = listener.accept() => {
                    let (stream, peer) = match accept_res {
                        Ok(v) => v,
                        Err(e) => { error!("accept error: {e}"); continue; }
                    };

                    admit(&ctx, stream, peer);
                }
            }
        }

        // listener dropped here: the port stops accepting before peers close
    })
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

fn admit(ctx: &ListenerContext, stream: TcpStream, peer: SocketAddr) {
    let _ = stream.set_nodelay(true);
    let (reader, writer) = stream.into_split();

    let added = ctx.registry.add(|id| {
        Connection::open(ctx.endpoint(id, peer), Sink::Stream(writer), None)
    });

    match added {
        Ok(conn) => conn.start(Source::Stream(reader)),
        Err(e) => warn!("refusing stream connection from {peer}: {e}"),
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
