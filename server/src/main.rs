use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::network::Server;
use std::time::Duration;

/// Live classroom polling server
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Housekeeping ticks per second
    #[clap(short, long, default_value = "10")]
    tick_rate: u32,
    /// Maximum number of concurrent connections
    #[clap(short, long, default_value = "256")]
    max_clients: usize,
    /// Seconds of silence before a connection is dropped
    #[clap(long, default_value = "5")]
    client_timeout: u64,
    /// End polls automatically when their countdown runs out
    #[clap(long)]
    auto_end: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let config = ServerConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        max_clients: args.max_clients,
        client_timeout: Duration::from_secs(args.client_timeout),
        auto_end_expired_polls: args.auto_end,
        ..ServerConfig::default()
    }
    .with_tick_rate(args.tick_rate);

    let mut server = Server::new(config).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped with error: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
