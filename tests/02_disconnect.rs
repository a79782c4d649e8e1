mod support;

use std::time::Duration;
use support::{Event, Recorder, client_config, loopback, settle, wait_until};
use tidewire::{
    ConnectionState, DisconnectReason, MessageBuffer, NetError, Server, TransportKind, client,
};
use tokio::{net::TcpSocket, time::timeout};

#[tokio::test]
async fn client_close_fires_one_disconnect_on_the_server() {
    let server_config = loopback(TransportKind::Stream);
    let server_handler = Recorder::new();
    let server = Server::start(server_config.clone(), server_handler.clone())
        .await
        .unwrap();

    let client_handler = Recorder::new();
    let conn = client::connect(client_config(&server, &server_config), client_handler.clone())
        .await
        .unwrap();

    let mut msg = MessageBuffer::new(4);
    msg.write(&5u32).unwrap();
    conn.send_and_wait(&msg).await.unwrap();
    wait_until("server message", || server_handler.message_count() == 1).await;

    let peer_id = server.registry().ids()[0];
    conn.close();

    wait_until("server disconnect", || server_handler.disconnect_count() == 1).await;
    assert_eq!(server.connection_count(), 0);
    assert!(server.get(peer_id).is_none());

    settle().await;
    let events = server_handler.events();
    assert_eq!(server_handler.disconnect_count(), 1);
    assert_eq!(events.last(), Some(&Event::Disconnected(peer_id)));
    assert_eq!(server_handler.message_count(), 1);

    // local side: one disconnect, reason recorded, sends refused
    conn.disconnected().await;
    assert_eq!(client_handler.disconnect_count(), 1);
    assert_eq!(conn.state(), ConnectionState::Disconnected);
    assert_eq!(conn.disconnect_reason(), Some(DisconnectReason::Closed));
    assert!(matches!(conn.send(&msg), Err(NetError::Disconnected)));

    conn.close();
    settle().await;
    assert_eq!(client_handler.disconnect_count(), 1);

    server.shutdown().await;
}

#[tokio::test]
async fn server_close_is_seen_as_peer_closed() {
    let server_config = loopback(TransportKind::Stream);
    let server = Server::start(server_config.clone(), Recorder::new())
        .await
        .unwrap();

    let client_handler = Recorder::new();
    let conn = client::connect(client_config(&server, &server_config), client_handler.clone())
        .await
        .unwrap();

    wait_until("registered", || server.connection_count() == 1).await;
    let peer = server.get(server.registry().ids()[0]).unwrap();
    peer.close();

    conn.disconnected().await;
    assert_eq!(conn.disconnect_reason(), Some(DisconnectReason::PeerClosed));
    assert_eq!(client_handler.disconnect_count(), 1);

    let mut msg = MessageBuffer::new(4);
    msg.write(&1u8).unwrap();
    assert!(matches!(
        conn.send_and_wait(&msg).await,
        Err(NetError::Disconnected)
    ));

    server.shutdown().await;
}

#[tokio::test]
async fn shutdown_disconnects_every_peer() {
    let server_config = loopback(TransportKind::Stream);
    let server_handler = Recorder::new();
    let server = Server::start(server_config.clone(), server_handler.clone())
        .await
        .unwrap();

    let a_handler = Recorder::new();
    let b_handler = Recorder::new();
    let a = client::connect(client_config(&server, &server_config), a_handler.clone())
        .await
        .unwrap();
    let b = client::connect(client_config(&server, &server_config), b_handler.clone())
        .await
        .unwrap();

    wait_until("both registered", || server.connection_count() == 2).await;

    let registry = server.registry().clone();
    server.shutdown().await;

    assert!(registry.is_empty());
    assert_eq!(server_handler.disconnect_count(), 2);

    timeout(Duration::from_secs(5), async {
        a.disconnected().await;
        b.disconnected().await;
    })
    .await
    .expect("clients saw the shutdown");
    assert_eq!(a_handler.disconnect_count(), 1);
    assert_eq!(b_handler.disconnect_count(), 1);
}

#[tokio::test]
async fn reset_peer_fails_reads_and_writes_but_disconnects_once() {
    let server_config = loopback(TransportKind::Stream);
    let server_handler = Recorder::new();
    let server = Server::start(server_config, server_handler.clone())
        .await
        .unwrap();

    let socket = TcpSocket::new_v4().unwrap();
    socket.set_linger(Some(Duration::ZERO)).unwrap();
    let stream = socket.connect(server.local_addr()).await.unwrap();

    wait_until("registered", || server.connection_count() == 1).await;
    let peer = server.get(server.registry().ids()[0]).unwrap();

    // zero linger: dropping sends a reset instead of a clean close
    drop(stream);

    let mut chunk = MessageBuffer::new(1024);
    chunk.write_raw(&[0xAA; 1024]).unwrap();

    let write_error = timeout(Duration::from_secs(5), async {
        loop {
            if let Err(e) = peer.send_and_wait(&chunk).await {
                return e;
            }
        }
    })
    .await
    .expect("writes to a reset peer start failing");
    assert!(write_error.is_connection_closed());

    peer.disconnected().await;
    settle().await;

    assert_eq!(server_handler.disconnect_count(), 1);
    assert_eq!(server.connection_count(), 0);
    assert!(matches!(
        peer.disconnect_reason(),
        Some(DisconnectReason::ReadFailed | DisconnectReason::WriteFailed | DisconnectReason::PeerClosed)
    ));

    server.shutdown().await;
}
