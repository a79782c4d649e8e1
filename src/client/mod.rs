//! Client side: one outbound `Connection` to a listening server, over either
//! transport. Client connections live outside any registry and carry
//! `ConnectionId::CLIENT`.

use std::{
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
    sync::Arc,
};
use tokio::net::{TcpStream, UdpSocket};

use crate::{
    buffer::BufferPool,
    config::{NetConfig, TransportKind},
    errors::{NetError, Result},
    net::{
        Connection, ConnectionId, NetworkHandler,
        connection::Endpoint,
        receive::Source,
        writer::{DatagramLink, Sink},
    },
};

// -----------------------------------------------------------------------------
// ----- Connect ---------------------------------------------------------------

/// Connect to `config.socket_addr()`. On success the connection is already
/// `Connected` and `on_connected` has run.
pub async fn connect(
    config: NetConfig,
    handler: Arc<dyn NetworkHandler>,
) -> Result<Arc<Connection>> {
    config.validate()?;

    let remote = config.socket_addr();
    let endpoint = Endpoint {
        id: ConnectionId::CLIENT,
        remote_addr: remote,
        transport: config.transport,
        framing: config.framing,
        max_message_size: config.max_message_size,
        pool: Arc::new(BufferPool::new(config.pool_capacity, config.max_message_size)),
        handler,
    };

    let (sink, source) = match config.transport {
        TransportKind::Stream => open_stream(remote).await?,
        TransportKind::Datagram => open_datagram(remote).await?,
    };

    let conn = Connection::open(endpoint, sink, None);
    conn.start(source);

    Ok(conn)
}

// -----------------------------------------------------------------------------
// ----- Internal: Transports --------------------------------------------------

async fn open_stream(remote: SocketAddr) -> Result<(Sink, Source)> {
    let stream = TcpStream::connect(remote)
        .await
        .map_err(|e| NetError::setup(remote, e))?;

    let _ = stream.set_nodelay(true);
    let (reader, writer) = stream.into_split();

    Ok((Sink::Stream(writer), Source::Stream(reader)))
}

async fn open_datagram(remote: SocketAddr) -> Result<(Sink, Source)> {
    // ephemeral local port, same family as the server
    let local: SocketAddr = if remote.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };

    let socket = UdpSocket::bind(local)
        .await
        .map_err(|e| NetError::setup(local, e))?;
    socket
        .connect(remote)
        .await
        .map_err(|e| NetError::setup(remote, e))?;

    let socket = Arc::new(socket);

    Ok((
        Sink::Datagram(DatagramLink::connected(socket.clone(), remote)),
        Source::Datagram(socket),
    ))
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
