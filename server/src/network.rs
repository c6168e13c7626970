//! Server network layer handling WebSocket connections and game loop coordination

use crate::admission::ConnectionRequest;
use crate::client::{Client, OUTBOUND_QUEUE_SIZE};
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::instance::{GameInstance, TickOutcome};
use crate::registry::PlayerCounter;
use crate::session::{ClientId, Outbound, Session};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, trace};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_hdr_async_with_config;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::Message;

/// A peer that takes longer than this to accept one frame is dropped
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// A connection that finished its WebSocket handshake and waits for admission
#[derive(Debug)]
pub struct PendingConnection {
    pub id: ClientId,
    pub peer_addr: SocketAddr,
    pub forwarded_for: Option<String>,
    pub outbound: mpsc::Sender<Outbound>,
}

/// Messages sent from network tasks and handles to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    Connected { connection: PendingConnection },
    PacketReceived { client_id: ClientId, data: Bytes },
    Disconnected { client_id: ClientId },
    Ban { ip: String },
    Restart,
    Shutdown,
}

/// Cloneable control handle for a running [`Server`]
#[derive(Debug, Clone)]
pub struct ServerHandle {
    server_tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ServerHandle {
    /// Ends the current game instance and boots a fresh one.
    pub fn restart(&self) -> bool {
        self.server_tx.send(ServerMessage::Restart).is_ok()
    }

    /// Ends the game instance and stops the server loop.
    pub fn shutdown(&self) -> bool {
        self.server_tx.send(ServerMessage::Shutdown).is_ok()
    }

    pub fn ban_ip(&self, ip: impl Into<String>) -> bool {
        self.server_tx
            .send(ServerMessage::Ban { ip: ip.into() })
            .is_ok()
    }
}

/// Main server coordinating connections and the game instance
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    instance: GameInstance,
    counter: PlayerCounter,
    max_payload_size: usize,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    /// Validates the configuration, binds the listener and starts the first
    /// game instance.
    pub async fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let gamemode = config.validate()?;
        let arena_factory = gamemode.arena_factory(config.round_ticks)?;

        let listener = TcpListener::bind(config.bind_address()).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let counter = PlayerCounter::new();
        let mut instance =
            GameInstance::new(config.instance_config(), counter.clone(), arena_factory);
        instance.start();

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener: Some(listener),
            local_addr,
            instance,
            counter,
            max_payload_size: config.max_payload_size,
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            server_tx: self.server_tx.clone(),
        }
    }

    /// Players connected across every instance this server hosted.
    pub fn player_count(&self) -> usize {
        self.counter.get()
    }

    pub fn instance(&self) -> &GameInstance {
        &self.instance
    }

    /// Spawns task that accepts TCP connections and hands each to its own task
    fn spawn_listener(&mut self) -> Result<JoinHandle<()>, ServerError> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| ServerError::Network("listener already running".to_string()))?;
        let server_tx = self.server_tx.clone();
        let max_payload_size = self.max_payload_size;

        Ok(tokio::spawn(async move {
            let mut next_id: u32 = 0;

            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        if server_tx.is_closed() {
                            break;
                        }
                        next_id = next_id.wrapping_add(1);
                        let id = ClientId(next_id);
                        let server_tx = server_tx.clone();

                        tokio::spawn(async move {
                            if let Err(e) =
                                handle_connection(stream, addr, id, server_tx, max_payload_size)
                                    .await
                            {
                                debug!("Connection from {} ended: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        }))
    }

    /// Runs admission for a freshly handshaken connection
    fn handle_connected(&mut self, connection: PendingConnection) {
        let PendingConnection {
            id,
            peer_addr,
            forwarded_for,
            outbound,
        } = connection;

        let request = ConnectionRequest {
            forwarded_for,
            peer_addr: Some(peer_addr.ip().to_string()),
        };
        let session_outbound = outbound.clone();

        let result = self.instance.admit(&request, move |ip| -> Box<dyn Session> {
            Box::new(Client::new(id, ip, peer_addr, session_outbound))
        });

        if let Err(e) = result {
            let command = if e.is_protocol_error() {
                Outbound::Close(e.to_string())
            } else {
                Outbound::Terminate
            };
            // The queue is still empty here; the socket task may already be gone
            let _ = outbound.try_send(command);
        }
    }

    fn handle_message(&mut self, message: ServerMessage) -> bool {
        match message {
            ServerMessage::Connected { connection } => self.handle_connected(connection),
            ServerMessage::PacketReceived { client_id, data } => {
                self.instance.receive(client_id, data)
            }
            ServerMessage::Disconnected { client_id } => {
                self.instance.disconnect(client_id);
            }
            ServerMessage::Ban { ip } => {
                self.instance.ban_ip(&ip);
            }
            ServerMessage::Restart => self.instance.end(true),
            ServerMessage::Shutdown => {
                info!("Server shutting down");
                self.instance.end(false);
                return false;
            }
        }
        true
    }

    /// Main server loop: connection events and ticks, one at a time
    pub async fn run(&mut self) -> Result<(), ServerError> {
        let listener = self.spawn_listener()?;

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network and control events
                message = self.server_rx.recv() => {
                    let Some(message) = message else { break };
                    if !self.handle_message(message) {
                        break;
                    }
                },

                // Handle server tick events
                _ = self.instance.wait_for_tick() => {
                    match self.instance.on_timer() {
                        TickOutcome::Advanced(tick) if tick % 250 == 0 => {
                            debug!("Tick {}: {} clients", tick, self.instance.clients().len());
                        }
                        TickOutcome::Restarted => {
                            info!("Arena closed, instance restarted");
                        }
                        _ => trace!("Tick {}", self.instance.tick()),
                    }
                },
            }
        }

        listener.abort();
        Ok(())
    }
}

/// Joins every `X-Forwarded-For` header value with commas.
fn forwarded_for(request: &Request) -> Option<String> {
    let values: Vec<&str> = request
        .headers()
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();

    if values.is_empty() {
        None
    } else {
        Some(values.join(","))
    }
}

/// Handles one WebSocket connection from handshake to socket close
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    id: ClientId,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    max_payload_size: usize,
) -> Result<(), ServerError> {
    let mut forwarded = None;
    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        forwarded = forwarded_for(request);
        Ok(response)
    };

    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(max_payload_size);
    config.max_frame_size = Some(max_payload_size);

    let ws_stream = accept_hdr_async_with_config(stream, callback, Some(config))
        .await
        .map_err(|e| ServerError::Network(format!("WebSocket handshake failed: {e}")))?;

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_SIZE);

    server_tx
        .send(ServerMessage::Connected {
            connection: PendingConnection {
                id,
                peer_addr: addr,
                forwarded_for: forwarded,
                outbound: outbound_tx,
            },
        })
        .map_err(|_| ServerError::Network("server loop is not running".to_string()))?;

    loop {
        tokio::select! {
            message = ws_receiver.next() => match message {
                Some(Ok(Message::Binary(data))) => {
                    if server_tx.send(ServerMessage::PacketReceived { client_id: id, data }).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("WebSocket error for client {}: {}", id, e);
                    break;
                }
            },

            command = outbound_rx.recv() => match command {
                Some(Outbound::Frame(data)) => {
                    match tokio::time::timeout(WRITE_TIMEOUT, ws_sender.send(Message::Binary(data))).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            debug!("Failed to send to client {}: {}", id, e);
                            break;
                        }
                        Err(_) => {
                            debug!("Client {} stopped reading, dropping connection", id);
                            break;
                        }
                    }
                }
                Some(Outbound::Close(reason)) => {
                    let frame = CloseFrame {
                        code: CloseCode::Policy,
                        reason: reason.into(),
                    };
                    let _ = ws_sender.send(Message::Close(Some(frame))).await;
                    break;
                }
                Some(Outbound::Terminate) | None => break,
            },
        }
    }

    let _ = server_tx.send(ServerMessage::Disconnected { client_id: id });
    Ok(())
}
