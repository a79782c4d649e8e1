mod support;

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use support::{Event, Recorder, client_config, loopback, settle, wait_until};
use tidewire::{
    Connection, MessageBuffer, NetError, NetworkHandler, PooledBuffer, Server, TransportKind,
    client,
};
use tokio::net::UdpSocket;

/// Takes its time over every message.
#[derive(Default)]
struct Sluggish {
    messages: AtomicUsize,
    disconnects: AtomicUsize,
}

impl NetworkHandler for Sluggish {
    fn on_message(&self, _connection: &Arc<Connection>, _buffer: PooledBuffer) {
        std::thread::sleep(Duration::from_millis(300));
        self.messages.fetch_add(1, Ordering::SeqCst);
    }

    fn on_disconnected(&self, _connection: &Arc<Connection>) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn each_source_address_gets_its_own_connection() {
    let server_config = loopback(TransportKind::Datagram);
    let server_handler = Recorder::echoing();
    let server = Server::start(server_config.clone(), server_handler.clone())
        .await
        .expect("start server");

    let handler_a = Recorder::new();
    let handler_b = Recorder::new();
    let a = client::connect(client_config(&server, &server_config), handler_a.clone())
        .await
        .unwrap();
    let b = client::connect(client_config(&server, &server_config), handler_b.clone())
        .await
        .unwrap();

    // nothing exists server-side until the first datagram arrives
    assert_eq!(server.connection_count(), 0);

    let mut msg = MessageBuffer::new(8);
    msg.write(&1u32).unwrap();
    a.send(&msg).unwrap();

    let mut msg = MessageBuffer::new(8);
    msg.write(&2u32).unwrap();
    b.send(&msg).unwrap();

    wait_until("two peers", || server.connection_count() == 2).await;
    wait_until("echo to a", || handler_a.message_count() == 1).await;
    wait_until("echo to b", || handler_b.message_count() == 1).await;

    assert_eq!(handler_a.messages(), vec![1u32.to_le_bytes().to_vec()]);
    assert_eq!(handler_b.messages(), vec![2u32.to_le_bytes().to_vec()]);

    let ids = server.registry().ids();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);

    // a second datagram from a known address reuses its connection
    a.send(&msg).unwrap();
    wait_until("second echo", || handler_a.message_count() == 2).await;
    assert_eq!(server.connection_count(), 2);
    assert_eq!(server_handler.connect_count(), 2);

    a.close();
    b.close();
    server.shutdown().await;
}

#[tokio::test]
async fn empty_datagram_closes_the_server_side_peer() {
    let server_config = loopback(TransportKind::Datagram);
    let server_handler = Recorder::new();
    let server = Server::start(server_config.clone(), server_handler.clone())
        .await
        .unwrap();

    let conn = client::connect(client_config(&server, &server_config), Recorder::new())
        .await
        .unwrap();

    let mut msg = MessageBuffer::new(8);
    msg.write(&9u16).unwrap();
    conn.send_and_wait(&msg).await.unwrap();
    wait_until("peer registered", || server.connection_count() == 1).await;

    let peer_id = server.registry().ids()[0];
    conn.close();

    wait_until("peer disconnect", || server_handler.disconnect_count() == 1).await;
    assert_eq!(server.connection_count(), 0);
    assert_eq!(
        server_handler.events().last(),
        Some(&Event::Disconnected(peer_id))
    );
}

#[tokio::test]
async fn oversized_and_empty_datagrams_are_rejected_locally() {
    let server_config = loopback(TransportKind::Datagram).with_max_message_size(32);
    let server = Server::start(server_config.clone(), Recorder::new())
        .await
        .unwrap();

    let conn = client::connect(client_config(&server, &server_config), Recorder::new())
        .await
        .unwrap();

    let empty = MessageBuffer::new(8);
    assert!(matches!(conn.send(&empty), Err(NetError::EmptyDatagram)));

    let big = MessageBuffer::from_bytes(&[1u8; 33]);
    assert!(matches!(
        conn.send(&big),
        Err(NetError::MessageTooLarge { len: 33, limit: 32 })
    ));

    // neither reached the server
    settle().await;
    assert_eq!(server.connection_count(), 0);

    conn.close();
    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn close_signal_survives_a_full_inbox() {
    let server_config = loopback(TransportKind::Datagram).with_datagram_queue_depth(1);
    let handler = Arc::new(Sluggish::default());
    let server = Server::start(server_config, handler.clone()).await.unwrap();

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    for payload in [&b"a"[..], &b"b"[..], &b"c"[..], &b""[..]] {
        socket.send_to(payload, server.local_addr()).await.unwrap();
    }

    wait_until("peer disconnect", || handler.disconnects.load(Ordering::SeqCst) == 1).await;
    assert_eq!(server.connection_count(), 0);
    assert!(handler.messages.load(Ordering::SeqCst) <= 3);

    server.shutdown().await;
}

#[tokio::test]
async fn oversized_datagram_is_dropped_not_truncated() {
    let server_config = loopback(TransportKind::Datagram).with_max_message_size(16);
    let server_handler = Recorder::new();
    let server = Server::start(server_config, server_handler.clone())
        .await
        .unwrap();

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(&[7u8; 40], server.local_addr()).await.unwrap();
    socket.send_to(&[1, 2, 3, 4], server.local_addr()).await.unwrap();

    wait_until("small datagram", || server_handler.message_count() == 1).await;
    settle().await;
    assert_eq!(server_handler.messages(), vec![vec![1, 2, 3, 4]]);
    assert_eq!(server.connection_count(), 1);

    server.shutdown().await;
}

#[tokio::test]
async fn client_drops_datagrams_above_its_limit() {
    let server_config = loopback(TransportKind::Datagram).with_max_message_size(64);
    let server = Server::start(server_config.clone(), Recorder::new())
        .await
        .unwrap();

    let client_handler = Recorder::new();
    let conn = client::connect(
        client_config(&server, &server_config).with_max_message_size(16),
        client_handler.clone(),
    )
    .await
    .unwrap();

    let mut hello = MessageBuffer::new(4);
    hello.write(&1u32).unwrap();
    conn.send(&hello).unwrap();
    wait_until("peer registered", || server.connection_count() == 1).await;

    server.broadcast(&MessageBuffer::from_bytes(&[9u8; 40]));
    server.broadcast(&MessageBuffer::from_bytes(&[5, 6]));

    wait_until("small datagram", || client_handler.message_count() == 1).await;
    settle().await;
    assert_eq!(client_handler.messages(), vec![vec![5, 6]]);

    conn.close();
    server.shutdown().await;
}

#[tokio::test]
async fn datagrams_from_one_peer_arrive_in_order() {
    let server_config = loopback(TransportKind::Datagram);
    let server_handler = Recorder::new();
    let server = Server::start(server_config.clone(), server_handler.clone())
        .await
        .unwrap();

    let conn = client::connect(client_config(&server, &server_config), Recorder::new())
        .await
        .unwrap();

    for text in ["m1", "m2", "m3"] {
        let mut msg = MessageBuffer::new(16);
        msg.write(text).unwrap();
        conn.send(&msg).unwrap();
    }

    wait_until("three messages", || server_handler.message_count() == 3).await;

    let decoded: Vec<String> = server_handler
        .messages()
        .iter()
        .map(|bytes| MessageBuffer::from_bytes(bytes).read::<String>().unwrap())
        .collect();
    assert_eq!(decoded, vec!["m1", "m2", "m3"]);

    conn.close();
    server.shutdown().await;
}
