use parking_lot::Mutex;
use smallvec::SmallVec;
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use tracing::trace;

use crate::{
    buffer::MessageBuffer,
    errors::{NetError, Result},
    net::{Connection, ConnectionId, DisconnectReason},
};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const SMALLVEC_SIZE: usize = 16;

type Snapshot = SmallVec<[Arc<Connection>; SMALLVEC_SIZE]>;

// -----------------------------------------------------------------------------
// ----- SessionRegistry -------------------------------------------------------

/// Live connections of one server, keyed by id and by remote address.
/// Every operation takes the same lock, so a broadcast never reaches a
/// connection that is halfway through removal.
#[derive(Debug)]
pub struct SessionRegistry {
    inner: Mutex<RegistryInner>,
    limit: Option<usize>,
}

#[derive(Debug)]
struct RegistryInner {
    next_id: u64,
    by_id: HashMap<ConnectionId, Arc<Connection>>,
    by_addr: HashMap<SocketAddr, ConnectionId>,
}

// -----------------------------------------------------------------------------
// ----- SessionRegistry: Static -----------------------------------------------

impl SessionRegistry {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                // 0 is reserved for client-side connections
                next_id: 1,
                by_id: HashMap::new(),
                by_addr: HashMap::new(),
            }),
            limit,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- SessionRegistry: Public -----------------------------------------------

impl SessionRegistry {
    /// Issue the next id, build the connection with it and insert it.
    /// Ids are monotonic and never reused.
    pub(crate) fn add<F>(&self, build: F) -> Result<Arc<Connection>>
    where
        F: FnOnce(ConnectionId) -> Arc<Connection>,
    {
        let mut inner = self.inner.lock();

        if let Some(limit) = self.limit {
            if inner.by_id.len() >= limit {
                return Err(NetError::RegistryFull { limit });
            }
        }

        let id = ConnectionId(inner.next_id);
        inner.next_id += 1;

        let conn = build(id);
        inner.by_addr.insert(conn.remote_addr(), id);
        inner.by_id.insert(id, conn.clone());

        trace!("registry added {} ({} live)", id, inner.by_id.len());
        Ok(conn)
    }

    pub fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let mut inner = self.inner.lock();

        let conn = inner.by_id.remove(&id)?;
        if inner.by_addr.get(&conn.remote_addr()) == Some(&id) {
            inner.by_addr.remove(&conn.remote_addr());
        }

        trace!("registry removed {} ({} live)", id, inner.by_id.len());
        Some(conn)
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.inner.lock().by_id.get(&id).cloned()
    }

    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<Arc<Connection>> {
        let inner = self.inner.lock();
        let id = inner.by_addr.get(&addr)?;
        inner.by_id.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().by_id.is_empty()
    }

    pub fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.inner.lock().by_id.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Queue `buffer` on every live connection; returns how many accepted it.
    pub fn broadcast(&self, buffer: &MessageBuffer) -> usize {
        let inner = self.inner.lock();

        inner
            .by_id
            .values()
            .filter(|conn| conn.send(buffer).is_ok())
            .count()
    }
}

// -----------------------------------------------------------------------------
// ----- SessionRegistry: Crate ------------------------------------------------

impl SessionRegistry {
    /// Disconnect everything and wait for each `on_disconnected` to return.
    /// The lock is not held meanwhile; callbacks may remove entries too.
    pub(crate) async fn close_all(&self, reason: DisconnectReason) {
        let live: Snapshot = self.inner.lock().by_id.values().cloned().collect();

        for conn in &live {
            conn.close_with(reason);
        }

        for conn in live {
            conn.disconnected().await;
            self.remove(conn.id());
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        buffer::{BufferPool, PooledBuffer},
        config::{Framing, TransportKind},
        net::{
            NetworkHandler,
            connection::Endpoint,
            receive::Source,
            writer::{DatagramLink, Sink},
        },
    };
    use bytes::Bytes;
    use tokio::{net::UdpSocket, sync::mpsc};

    struct Quiet;

    impl NetworkHandler for Quiet {
        fn on_message(&self, _connection: &Arc<Connection>, _buffer: PooledBuffer) {}
    }

    async fn add_peer(
        registry: &SessionRegistry,
        port: u16,
    ) -> Result<(Arc<Connection>, mpsc::Receiver<Bytes>)> {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let peer: SocketAddr = ([127, 0, 0, 1], port).into();
        let (tx, rx) = mpsc::channel(4);

        let conn = registry.add(|id| {
            Connection::open(
                Endpoint {
                    id,
                    remote_addr: peer,
                    transport: TransportKind::Datagram,
                    framing: Framing::Raw,
                    max_message_size: 64,
                    pool: Arc::new(BufferPool::new(1, 64)),
                    handler: Arc::new(Quiet),
                },
                Sink::Datagram(DatagramLink::shared(socket, peer)),
                Some(tx),
            )
        })?;

        Ok((conn, rx))
    }

    #[tokio::test]
    async fn ids_are_monotonic_and_lookups_work() {
        let registry = SessionRegistry::new(None);
        let (a, _ra) = add_peer(&registry, 40001).await.unwrap();
        let (b, _rb) = add_peer(&registry, 40002).await.unwrap();

        assert_eq!(a.id(), ConnectionId(1));
        assert_eq!(b.id(), ConnectionId(2));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.ids(), vec![ConnectionId(1), ConnectionId(2)]);

        let found = registry
            .find_by_addr(([127, 0, 0, 1], 40002).into())
            .unwrap();
        assert_eq!(found.id(), b.id());

        registry.remove(a.id()).unwrap();
        assert!(registry.get(a.id()).is_none());
        assert!(registry.find_by_addr(a.remote_addr()).is_none());

        // removed ids are not handed out again
        let (c, _rc) = add_peer(&registry, 40001).await.unwrap();
        assert_eq!(c.id(), ConnectionId(3));
    }

    #[tokio::test]
    async fn limit_refuses_extra_connections() {
        let registry = SessionRegistry::new(Some(1));
        let (_a, _ra) = add_peer(&registry, 40011).await.unwrap();

        let err = add_peer(&registry, 40012).await.unwrap_err();
        assert!(matches!(err, NetError::RegistryFull { limit: 1 }));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn broadcast_counts_live_connections() {
        let registry = SessionRegistry::new(None);
        let (a, ra) = add_peer(&registry, 40021).await.unwrap();
        let (b, rb) = add_peer(&registry, 40022).await.unwrap();
        a.start(Source::Demuxed(ra));
        b.start(Source::Demuxed(rb));

        let mut msg = MessageBuffer::new(8);
        msg.write(&5u8).unwrap();
        assert_eq!(registry.broadcast(&msg), 2);

        registry.close_all(DisconnectReason::Shutdown).await;
        assert!(registry.is_empty());
        assert_eq!(a.disconnect_reason(), Some(DisconnectReason::Shutdown));
        assert_eq!(registry.broadcast(&msg), 0);
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
