use std::{
    net::SocketAddr,
    sync::{Arc, Weak},
};
use tokio::{sync::watch, task::JoinHandle};
use tracing::info;

use super::{datagram_listener, registry::SessionRegistry, stream_listener};
use crate::{
    buffer::{BufferPool, MessageBuffer, PooledBuffer},
    config::{NetConfig, TransportKind},
    errors::{NetError, Result},
    net::{Connection, ConnectionId, DisconnectReason, NetworkHandler, connection::Endpoint},
};

// -----------------------------------------------------------------------------
// ----- Server ----------------------------------------------------------------

/// A running listener. Dropping the handle without `shutdown` leaves the
/// accept loop running for the life of the runtime.
#[derive(Debug)]
pub struct Server {
    local_addr: SocketAddr,
    transport: TransportKind,
    registry: Arc<SessionRegistry>,
    pool: Arc<BufferPool>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

// -----------------------------------------------------------------------------
// ----- Server: Static --------------------------------------------------------

impl Server {
    /// Bind and start accepting. Setup failures are returned once and
    /// nothing is retried.
    pub async fn start(config: NetConfig, handler: Arc<dyn NetworkHandler>) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(SessionRegistry::new(config.max_connections));
        let pool = Arc::new(BufferPool::new(config.pool_capacity, config.max_message_size));
        let (shutdown, shutdown_rx) = watch::channel(false);

        let ctx = Arc::new(ListenerContext {
            handler: Arc::new(RegistryHandler {
                inner: handler,
                registry: Arc::downgrade(&registry),
            }),
            registry: registry.clone(),
            pool: pool.clone(),
            config,
        });

        let (local_addr, task) = match ctx.config.transport {
            TransportKind::Stream => {
                let listener = stream_listener::bind(ctx.config.socket_addr())?;
                let local_addr = listener
                    .local_addr()
                    .map_err(|e| NetError::setup(ctx.config.socket_addr(), e))?;
                let task = stream_listener::spawn_accept_loop(listener, ctx.clone(), shutdown_rx);
                (local_addr, task)
            }
            TransportKind::Datagram => {
                let socket = datagram_listener::bind(ctx.config.socket_addr()).await?;
                let local_addr = socket
                    .local_addr()
                    .map_err(|e| NetError::setup(ctx.config.socket_addr(), e))?;
                let task = datagram_listener::spawn_demux_loop(socket, ctx.clone(), shutdown_rx);
                (local_addr, task)
            }
        };

        info!(
            "{} listener bound on {}",
            ctx.config.transport.as_str(),
            local_addr
        );

        Ok(Self {
            local_addr,
            transport: ctx.config.transport,
            registry,
            pool,
            shutdown,
            task,
        })
    }
}

// -----------------------------------------------------------------------------
// ----- Server: Public --------------------------------------------------------

impl Server {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.registry.get(id)
    }

    pub fn broadcast(&self, buffer: &MessageBuffer) -> usize {
        self.registry.broadcast(buffer)
    }

    /// Stop accepting (the listening socket is closed first), then close
    /// every live connection and wait for its disconnect callback.
    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);
        let _ = self.task.await;

        self.registry.close_all(DisconnectReason::Shutdown).await;

        info!(
            "{} listener on {} stopped",
            self.transport.as_str(),
            self.local_addr
        );
    }
}

// -----------------------------------------------------------------------------
// ----- ListenerContext -------------------------------------------------------

/// Shared by the accept / demux loop of one server.
pub(super) struct ListenerContext {
    pub(super) config: NetConfig,
    pub(super) registry: Arc<SessionRegistry>,
    pub(super) pool: Arc<BufferPool>,
    pub(super) handler: Arc<dyn NetworkHandler>,
}

impl ListenerContext {
    pub(super) fn endpoint(&self, id: ConnectionId, remote_addr: SocketAddr) -> Endpoint {
        Endpoint {
            id,
            remote_addr,
            transport: self.config.transport,
            framing: self.config.framing,
            max_message_size: self.config.max_message_size,
            pool: self.pool.clone(),
            handler: self.handler.clone(),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: RegistryHandler ---------------------------------------------

/// Wraps the application handler so the registry entry is gone before the
/// application hears about a disconnect.
struct RegistryHandler {
    inner: Arc<dyn NetworkHandler>,
    registry: Weak<SessionRegistry>,
}

impl NetworkHandler for RegistryHandler {
    fn on_connected(&self, connection: &Arc<Connection>) {
        self.inner.on_connected(connection);
    }

    fn on_message(&self, connection: &Arc<Connection>, buffer: PooledBuffer) {
        self.inner.on_message(connection, buffer);
    }

    fn on_disconnected(&self, connection: &Arc<Connection>) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(connection.id());
        }

        self.inner.on_disconnected(connection);
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
