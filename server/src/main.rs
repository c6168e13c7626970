use clap::Parser;
use log::{error, info};
use server::config::{ConnectionLimit, RunMode, ServerConfig};
use server::network::Server;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server IP address to bind to
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Server port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Gamemode to host (ffa, teams, 4teams, sandbox, dom, mot, maze)
    #[arg(short, long)]
    gamemode: Option<String>,

    /// Milliseconds per tick
    #[arg(long)]
    mspt: Option<u64>,

    /// Concurrent connections per IP, -1 for unlimited
    #[arg(long, allow_hyphen_values = true)]
    connections_per_ip: Option<i64>,

    /// Largest accepted WebSocket message in bytes
    #[arg(long)]
    max_payload_size: Option<usize>,

    #[arg(short, long, value_enum)]
    mode: Option<RunMode>,

    /// Round length in ticks before the arena closes and restarts
    #[arg(long)]
    round_ticks: Option<u64>,
}

impl Args {
    fn into_config(self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };

        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(gamemode) = self.gamemode {
            config.gamemode = gamemode;
        }
        if let Some(mspt) = self.mspt {
            config.mspt = mspt;
        }
        if let Some(limit) = self.connections_per_ip {
            config.connections_per_ip = ConnectionLimit::from(limit);
        }
        if let Some(size) = self.max_payload_size {
            config.max_payload_size = size;
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if self.round_ticks.is_some() {
            config.round_ticks = self.round_ticks;
        }
        Ok(config)
    }
}

/// Any panic on the game loop leaves the instance in an unknown state, so the
/// process goes down with it.
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_string());
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());

        error!("Fatal fault at {}: {}", location, payload);
        default_hook(info);
        std::process::exit(1);
    }));
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    install_panic_hook();

    let config = Args::parse().into_config()?;

    let mut server = Server::new(config.clone()).await?;
    info!("Server up");
    info!(
        "Publishing gamemode {} on port {}",
        config.gamemode,
        server.local_addr().port()
    );

    let handle = server.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
            handle.shutdown();
        }
    });

    server.run().await?;

    Ok(())
}
