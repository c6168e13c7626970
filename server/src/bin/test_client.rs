use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use shared::{ClientBound, Reader, ServerBound, Writer};
use std::time::{Duration, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser, Debug)]
#[command(author, version, about = "Connects to an arena host and reports what it hears")]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Seconds to stay connected, 0 to run until the server closes
    #[arg(short = 'd', long, default_value = "0")]
    duration: u64,
}

fn describe(packet: &[u8]) -> String {
    let mut reader = Reader::new(packet);
    let opcode = match reader.u8() {
        Ok(opcode) => opcode,
        Err(_) => return "empty packet".to_string(),
    };

    match ClientBound::from_u8(opcode) {
        Some(ClientBound::PlayerCount) => match reader.vu() {
            Ok(count) => format!("player count: {}", count),
            Err(e) => format!("malformed player count: {}", e),
        },
        Some(ClientBound::Notification) => match reader.string_nt() {
            Ok(text) => format!("notification: {}", text),
            Err(e) => format!("malformed notification: {}", e),
        },
        Some(ClientBound::Ping) => "pong".to_string(),
        Some(ClientBound::Update) => format!("update ({} bytes)", packet.len()),
        None => format!("unknown opcode {:#04x}", opcode),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let url = format!("ws://{}", args.server);

    info!("Connecting to {}", url);
    let (ws_stream, _) = connect_async(url.as_str()).await?;
    info!("Connected");

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let mut ping_interval = tokio::time::interval(Duration::from_secs(1));
    let mut ping_sent: Option<Instant> = None;

    let deadline = (args.duration > 0).then(|| Instant::now() + Duration::from_secs(args.duration));

    loop {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            info!("Time is up, closing");
            ws_sender.send(Message::Close(None)).await?;
            break;
        }

        tokio::select! {
            message = ws_receiver.next() => match message {
                Some(Ok(Message::Binary(data))) => {
                    if data.first() == Some(&(ClientBound::Ping as u8)) {
                        if let Some(sent) = ping_sent.take() {
                            info!("pong after {:.1}ms", sent.elapsed().as_secs_f64() * 1000.0);
                            continue;
                        }
                    }
                    info!("{}", describe(&data));
                }
                Some(Ok(Message::Close(frame))) => {
                    match frame {
                        Some(frame) => warn!("Server closed connection: {} {}", frame.code, frame.reason),
                        None => warn!("Server closed connection"),
                    }
                    break;
                }
                Some(Ok(other)) => debug!("Ignoring {:?}", other),
                Some(Err(e)) => {
                    warn!("Connection error: {}", e);
                    break;
                }
                None => {
                    warn!("Connection dropped");
                    break;
                }
            },

            _ = ping_interval.tick() => {
                let mut writer = Writer::new();
                writer.u8(ServerBound::Ping as u8);
                ws_sender.send(Message::Binary(writer.finish())).await?;
                ping_sent = Some(Instant::now());
            },
        }
    }

    Ok(())
}
