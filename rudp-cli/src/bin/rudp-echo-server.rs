//! RUDP Echo Server
//!
//! Sends every payload it receives back to its sender as a reliable packet.

use anyhow::Context;
use clap::Parser;
use rudp::RudpError;
use rudp_cli::{display_peer_stats, init_logging, Config, ServerConfig};
use rudp_io::Timer;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "rudp-echo-server")]
#[command(about = "RUDP echo server", long_about = None)]
struct Args {
    /// TOML configuration file with a [server] section
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address family (udp, udp4, udp6)
    #[arg(short, long)]
    network: Option<String>,

    /// Bind address
    #[arg(short, long)]
    bind: Option<String>,

    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Drop peers silent for this many seconds (0 disables)
    #[arg(long)]
    idle_timeout: Option<u64>,

    /// Statistics interval in seconds (0 disables)
    #[arg(long)]
    stats: Option<u64>,

    /// Print an example configuration file and exit
    #[arg(long)]
    example_config: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(args: &Args) -> anyhow::Result<ServerConfig> {
    let config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        None => Config::example_server(),
    };
    let mut server = config
        .server
        .context("Configuration has no [server] section")?;

    if let Some(network) = &args.network {
        server.network = network.clone();
    }
    if let Some(bind) = &args.bind {
        server.bind = bind.clone();
    }
    if let Some(port) = args.port {
        server.port = port;
    }
    if let Some(secs) = args.idle_timeout {
        server.idle_timeout_secs = secs;
    }
    if let Some(secs) = args.stats {
        server.stats_interval_secs = secs;
    }
    Ok(server)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if args.example_config {
        print!("{}", toml::to_string_pretty(&Config::example_server())?);
        return Ok(());
    }

    let config = load_config(&args)?;
    let network = config.network()?;
    let server = rudp::listen_with_config(
        network,
        &config.bind,
        config.port,
        config.endpoint_config(),
    )
    .with_context(|| format!("Failed to listen on {}:{}", config.bind, config.port))?;

    tracing::info!("RUDP echo server listening on {}", server.local_addr()?);

    let mut buffer = vec![0u8; config.buffer_size];
    let mut tick_timer = Timer::new(config.tick_interval());
    let mut stats_timer = Timer::new(config.stats_interval());
    let mut evict_timer = config.idle_timeout().map(Timer::new);
    let start_time = Instant::now();

    loop {
        match server.receive(&mut buffer) {
            Ok(received) => {
                for seq in &received.confirmed {
                    tracing::debug!(peer = %received.peer, %seq, "echo confirmed");
                }
                let payload = &buffer[..received.len];
                match server.send_to(payload, received.peer, true) {
                    Ok(sent) => tracing::debug!(
                        peer = %received.peer,
                        len = sent.len,
                        seq = ?sent.seq,
                        "echoed"
                    ),
                    Err(e) => tracing::warn!(peer = %received.peer, error = %e, "echo failed"),
                }
            }
            Err(e) if e.is_timeout() => {}
            Err(RudpError::Capacity { needed, .. }) => {
                tracing::info!(needed, "growing receive buffer");
                buffer.resize(needed, 0);
            }
            Err(e) if e.is_recoverable() => tracing::warn!(error = %e, "receive failed"),
            Err(e) => return Err(e).context("Receive failed"),
        }

        if tick_timer.try_fire() {
            let resent = server.tick()?;
            if resent > 0 {
                tracing::debug!(resent, "retransmitted stale packets");
            }
        }

        if let (Some(max_idle), Some(timer)) = (config.idle_timeout(), evict_timer.as_mut()) {
            if timer.try_fire() {
                for peer in server.evict_idle(max_idle) {
                    tracing::info!(%peer, "dropped idle peer");
                }
            }
        }

        if config.stats_interval_secs > 0 && stats_timer.try_fire() {
            let peers: Vec<_> = server
                .peers()
                .into_iter()
                .filter_map(|peer| server.connection_stats(peer).map(|stats| (peer, stats)))
                .collect();
            display_peer_stats(&peers, start_time.elapsed());
        }
    }
}
