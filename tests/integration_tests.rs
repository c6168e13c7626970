//! Integration tests for the arena host
//!
//! These tests run a real server on an ephemeral port and talk to it over
//! WebSockets, the same way a game client would.

use futures_util::{SinkExt, StreamExt};
use server::config::{ConnectionLimit, RunMode, ServerConfig};
use server::network::{Server, ServerHandle};
use shared::{ClientBound, Reader, ServerBound};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const READ_TIMEOUT: Duration = Duration::from_secs(2);

struct TestServer {
    addr: SocketAddr,
    handle: ServerHandle,
    task: JoinHandle<()>,
}

impl TestServer {
    async fn start(config: ServerConfig) -> Self {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..config
        };
        let mut server = Server::new(config).await.expect("server should start");
        let addr = server.local_addr();
        let handle = server.handle();
        let task = tokio::spawn(async move {
            server.run().await.expect("server loop failed");
        });
        TestServer { addr, handle, task }
    }

    async fn unlimited() -> Self {
        Self::start(ServerConfig {
            connections_per_ip: ConnectionLimit::Unlimited,
            mspt: 10,
            ..Default::default()
        })
        .await
    }

    async fn connect(&self) -> Socket {
        let (socket, _) = connect_async(format!("ws://{}", self.addr))
            .await
            .expect("handshake should succeed");
        socket
    }

    async fn connect_forwarded(&self, forwarded_for: &'static str) -> Socket {
        let mut request = format!("ws://{}", self.addr).into_client_request().unwrap();
        request
            .headers_mut()
            .insert("X-Forwarded-For", HeaderValue::from_static(forwarded_for));
        let (socket, _) = connect_async(request)
            .await
            .expect("handshake should succeed");
        socket
    }

    async fn stop(self) {
        self.handle.shutdown();
        let _ = tokio::time::timeout(READ_TIMEOUT, self.task).await;
    }
}

/// Next binary frame, or `None` if the connection ended or went quiet
async fn next_binary(socket: &mut Socket) -> Option<Vec<u8>> {
    loop {
        let message = tokio::time::timeout(READ_TIMEOUT, socket.next()).await.ok()??;
        match message {
            Ok(Message::Binary(data)) => return Some(data.to_vec()),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            _ => return None,
        }
    }
}

/// Reads frames until a player count arrives and returns it
async fn next_player_count(socket: &mut Socket) -> Option<u64> {
    loop {
        let packet = next_binary(socket).await?;
        let mut reader = Reader::new(&packet);
        if reader.u8().ok()? == ClientBound::PlayerCount as u8 {
            return reader.vu().ok();
        }
    }
}

/// Whether the server ended the connection without sending more data
async fn connection_ended(socket: &mut Socket) -> bool {
    match tokio::time::timeout(READ_TIMEOUT, socket.next()).await {
        Ok(None) | Ok(Some(Err(_))) | Ok(Some(Ok(Message::Close(_)))) => true,
        _ => false,
    }
}

/// ADMISSION TESTS
mod admission_tests {
    use super::*;

    /// Tests that the first admitted client hears a player count of one
    #[tokio::test]
    async fn first_client_receives_player_count() {
        let server = TestServer::unlimited().await;
        let mut socket = server.connect().await;

        let packet = next_binary(&mut socket).await.expect("player count");
        assert_eq!(packet, vec![ClientBound::PlayerCount as u8, 1]);

        server.stop().await;
    }

    /// Tests that the connection limit drops the extra connection from one IP
    #[tokio::test]
    async fn connection_limit_terminates_extra_connection() {
        let server = TestServer::start(ServerConfig {
            connections_per_ip: ConnectionLimit::PerIp(1),
            ..Default::default()
        })
        .await;

        let mut first = server.connect().await;
        assert_eq!(next_player_count(&mut first).await, Some(1));

        let mut second = server.connect().await;
        assert!(connection_ended(&mut second).await);

        // The first client never heard about a second player
        let quiet = tokio::time::timeout(Duration::from_millis(200), first.next()).await;
        assert!(quiet.is_err());

        server.stop().await;
    }

    /// Tests that a freed slot can be taken by a new connection
    #[tokio::test]
    async fn slot_reused_after_disconnect() {
        let server = TestServer::start(ServerConfig {
            connections_per_ip: ConnectionLimit::PerIp(1),
            ..Default::default()
        })
        .await;

        let mut first = server.connect().await;
        assert_eq!(next_player_count(&mut first).await, Some(1));
        first.close(None).await.unwrap();
        drop(first);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut second = server.connect().await;
        assert_eq!(next_player_count(&mut second).await, Some(1));

        server.stop().await;
    }

    /// Tests that an inconsistent forwarded chain is refused with a close frame
    #[tokio::test]
    async fn forwarded_mismatch_gets_policy_close() {
        let server = TestServer::unlimited().await;
        let mut socket = server.connect_forwarded("9.9.9.9, 127.0.0.1").await;

        let message = tokio::time::timeout(READ_TIMEOUT, socket.next())
            .await
            .expect("server should answer")
            .expect("stream should yield a frame")
            .expect("frame should be valid");
        match message {
            Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Policy),
            other => panic!("Expected close frame, got {:?}", other),
        }

        server.stop().await;
    }

    /// Tests that development mode accepts the same chain
    #[tokio::test]
    async fn forwarded_chain_trusted_in_development() {
        let server = TestServer::start(ServerConfig {
            connections_per_ip: ConnectionLimit::Unlimited,
            mode: RunMode::Development,
            ..Default::default()
        })
        .await;
        let mut socket = server.connect_forwarded("9.9.9.9, 8.8.8.8").await;

        assert_eq!(next_player_count(&mut socket).await, Some(1));

        server.stop().await;
    }

    /// Tests that a banned IP loses its sessions and cannot reconnect
    #[tokio::test]
    async fn banned_ip_is_dropped_and_refused() {
        let server = TestServer::unlimited().await;
        let mut socket = server.connect().await;
        assert_eq!(next_player_count(&mut socket).await, Some(1));

        server.handle.ban_ip("127.0.0.1");
        assert!(connection_ended(&mut socket).await);

        let mut retry = server.connect().await;
        assert!(connection_ended(&mut retry).await);

        server.stop().await;
    }
}

/// REGISTRY BROADCAST TESTS
mod broadcast_tests {
    use super::*;

    /// Tests that every join and leave is announced to everyone connected
    #[tokio::test]
    async fn player_count_follows_joins_and_leaves() {
        let server = TestServer::unlimited().await;

        let mut first = server.connect().await;
        assert_eq!(next_player_count(&mut first).await, Some(1));

        let mut second = server.connect().await;
        assert_eq!(next_player_count(&mut second).await, Some(2));
        assert_eq!(next_player_count(&mut first).await, Some(2));

        second.close(None).await.unwrap();
        assert_eq!(next_player_count(&mut first).await, Some(1));

        server.stop().await;
    }
}

/// TICK AND LIFECYCLE TESTS
mod lifecycle_tests {
    use super::*;

    /// Tests that a ping is answered on the next tick
    #[tokio::test]
    async fn ping_is_answered() {
        let server = TestServer::unlimited().await;
        let mut socket = server.connect().await;
        assert_eq!(next_player_count(&mut socket).await, Some(1));

        socket
            .send(Message::Binary(vec![ServerBound::Ping as u8].into()))
            .await
            .unwrap();

        let packet = next_binary(&mut socket).await.expect("pong");
        assert_eq!(packet, vec![ClientBound::Ping as u8]);

        server.stop().await;
    }

    /// Tests that a restart drops every session and admits new ones
    #[tokio::test]
    async fn restart_drops_sessions() {
        let server = TestServer::unlimited().await;
        let mut socket = server.connect().await;
        assert_eq!(next_player_count(&mut socket).await, Some(1));

        server.handle.restart();
        assert!(connection_ended(&mut socket).await);

        let mut fresh = server.connect().await;
        assert_eq!(next_player_count(&mut fresh).await, Some(1));

        server.stop().await;
    }

    /// Tests that a finished round notifies players and restarts the instance
    #[tokio::test]
    async fn closed_round_restarts_instance() {
        let server = TestServer::start(ServerConfig {
            connections_per_ip: ConnectionLimit::Unlimited,
            mspt: 2,
            round_ticks: Some(5),
            ..Default::default()
        })
        .await;
        let mut socket = server.connect().await;
        assert_eq!(next_player_count(&mut socket).await, Some(1));

        let packet = next_binary(&mut socket).await.expect("notification");
        let mut reader = Reader::new(&packet);
        assert_eq!(reader.u8().unwrap(), ClientBound::Notification as u8);
        assert_eq!(
            reader.string_nt().unwrap(),
            "Arena closed: No players can join"
        );

        // The grace period runs out and the instance restarts
        let ended = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match socket.next().await {
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => continue,
                }
            }
        })
        .await;
        assert!(ended.is_ok());

        let mut fresh = server.connect().await;
        assert_eq!(next_player_count(&mut fresh).await, Some(1));

        server.stop().await;
    }

    /// Tests that shutdown closes every connection and stops the loop
    #[tokio::test]
    async fn shutdown_closes_connections() {
        let server = TestServer::unlimited().await;
        let mut socket = server.connect().await;
        assert_eq!(next_player_count(&mut socket).await, Some(1));

        server.handle.shutdown();
        assert!(connection_ended(&mut socket).await);
        let result = tokio::time::timeout(READ_TIMEOUT, server.task).await;
        assert!(result.is_ok());
    }
}
