use parking_lot::Mutex;
use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::time::{sleep, timeout};

use tidewire::{
    Connection, ConnectionId, Framing, NetConfig, NetworkHandler, PooledBuffer, Server,
    TransportKind,
};

const WAIT_STEP: Duration = Duration::from_millis(10);
const WAIT_LIMIT: Duration = Duration::from_secs(5);

// -----------------------------------------------------------------------------
// ----- Recorder --------------------------------------------------------------

#[allow(dead_code)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Connected(ConnectionId),
    Message(ConnectionId, Vec<u8>),
    Disconnected(ConnectionId),
}

/// Handler that remembers every callback and optionally echoes messages.
#[derive(Default)]
pub struct Recorder {
    echo: bool,
    events: Mutex<Vec<Event>>,
    connects: AtomicUsize,
    messages: AtomicUsize,
    disconnects: AtomicUsize,
}

#[allow(dead_code)]
impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn echoing() -> Arc<Self> {
        Arc::new(Self {
            echo: true,
            ..Self::default()
        })
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn messages(&self) -> Vec<Vec<u8>> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::Message(_, bytes) => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn message_count(&self) -> usize {
        self.messages.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

impl NetworkHandler for Recorder {
    fn on_connected(&self, connection: &Arc<Connection>) {
        self.events.lock().push(Event::Connected(connection.id()));
        self.connects.fetch_add(1, Ordering::SeqCst);
    }

    fn on_message(&self, connection: &Arc<Connection>, buffer: PooledBuffer) {
        self.events
            .lock()
            .push(Event::Message(connection.id(), buffer.as_slice().to_vec()));
        self.messages.fetch_add(1, Ordering::SeqCst);

        if self.echo {
            let _ = connection.send(&buffer);
        }
    }

    fn on_disconnected(&self, connection: &Arc<Connection>) {
        self.events.lock().push(Event::Disconnected(connection.id()));
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

// -----------------------------------------------------------------------------
// ----- Helpers ---------------------------------------------------------------

#[allow(dead_code)]
pub fn loopback(transport: TransportKind) -> NetConfig {
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    NetConfig::new(transport, addr)
}

#[allow(dead_code)]
pub fn framed_loopback() -> NetConfig {
    loopback(TransportKind::Stream).with_framing(Framing::LengthPrefixed)
}

/// Client config pointing at a running server, same transport and framing.
#[allow(dead_code)]
pub fn client_config(server: &Server, server_config: &NetConfig) -> NetConfig {
    let mut config = server_config.clone();
    config.address = server.local_addr().ip();
    config.port = server.local_addr().port();
    config
}

/// Poll until `cond` holds, panicking after a few seconds.
#[allow(dead_code)]
pub async fn wait_until<F>(what: &str, mut cond: F)
where
    F: FnMut() -> bool,
{
    let polled = timeout(WAIT_LIMIT, async {
        while !cond() {
            sleep(WAIT_STEP).await;
        }
    })
    .await;

    if polled.is_err() {
        panic!("timed out waiting for {what}");
    }
}

/// Give in-flight callbacks a chance to run when asserting something
/// did NOT happen.
#[allow(dead_code)]
pub async fn settle() {
    sleep(Duration::from_millis(100)).await;
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
