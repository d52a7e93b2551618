//! RUDP Echo Client
//!
//! Sends a batch of reliable payloads to an echo server and waits until the
//! server has confirmed every one of them.

use anyhow::Context;
use clap::Parser;
use crossbeam::channel::{self, RecvTimeoutError, Sender};
use rudp::{Client, RudpError, SeqNumber};
use rudp_cli::{display_compact_stats, init_logging, ClientConfig, Config};
use rudp_io::Timer;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "rudp-echo-client")]
#[command(about = "RUDP echo client", long_about = None)]
struct Args {
    /// TOML configuration file with a [client] section
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address family (udp, udp4, udp6)
    #[arg(short, long)]
    network: Option<String>,

    /// Server host
    #[arg(long)]
    host: Option<String>,

    /// Server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Number of reliable payloads to send
    #[arg(short = 'n', long)]
    count: Option<u32>,

    /// Seconds to wait for confirmations
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Print an example configuration file and exit
    #[arg(long)]
    example_config: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// What the receive thread reports
enum Event {
    Echo {
        payload: Vec<u8>,
        confirmed: Vec<SeqNumber>,
    },
    Failed(RudpError),
}

fn load_config(args: &Args) -> anyhow::Result<ClientConfig> {
    let config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        None => Config::example_client(),
    };
    let mut client = config
        .client
        .context("Configuration has no [client] section")?;

    if let Some(network) = &args.network {
        client.network = network.clone();
    }
    if let Some(host) = &args.host {
        client.host = host.clone();
    }
    if let Some(port) = args.port {
        client.port = port;
    }
    if let Some(count) = args.count {
        client.count = count;
    }
    if let Some(secs) = args.timeout {
        client.timeout_secs = secs;
    }
    if client.count == 0 {
        anyhow::bail!("Payload count must be positive");
    }
    Ok(client)
}

fn receive_loop(client: Arc<Client>, buffer_size: usize, events: Sender<Event>) {
    let mut buffer = vec![0u8; buffer_size];
    loop {
        match client.receive(&mut buffer) {
            Ok(received) => {
                let event = Event::Echo {
                    payload: buffer[..received.len].to_vec(),
                    confirmed: received.confirmed,
                };
                if events.send(event).is_err() {
                    break;
                }
            }
            Err(e) if e.is_timeout() => {}
            Err(RudpError::Closed) => break,
            Err(RudpError::Capacity { needed, .. }) => buffer.resize(needed, 0),
            Err(e) if e.is_recoverable() => tracing::warn!(error = %e, "receive failed"),
            Err(e) => {
                let _ = events.send(Event::Failed(e));
                break;
            }
        }
    }
    tracing::debug!("receive thread exiting");
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if args.example_config {
        print!("{}", toml::to_string_pretty(&Config::example_client())?);
        return Ok(());
    }

    let config = load_config(&args)?;
    let network = config.network()?;
    let client = Arc::new(
        rudp::dial_with_config(network, &config.host, config.port, config.endpoint_config())
            .with_context(|| format!("Failed to dial {}:{}", config.host, config.port))?,
    );
    tracing::info!(
        "RUDP echo client {} -> {}",
        client.local_addr()?,
        client.peer_addr()
    );

    let (tx, rx) = channel::unbounded();
    let receiver = {
        let client = Arc::clone(&client);
        let buffer_size = config.buffer_size;
        thread::spawn(move || receive_loop(client, buffer_size, tx))
    };

    let start_time = Instant::now();
    let mut unconfirmed = HashSet::new();
    for i in (1..=config.count).rev() {
        let payload = i.to_be_bytes();
        let sent = client.send(&payload, true)?;
        if let Some(seq) = sent.seq {
            unconfirmed.insert(seq);
        }
        tracing::debug!(seq = ?sent.seq, len = sent.len, "sent");
        if !config.send_interval().is_zero() {
            thread::sleep(config.send_interval());
        }
    }

    let mut echoes = 0u32;
    let mut tick_timer = Timer::new(config.tick_interval());
    let deadline = start_time + config.timeout();

    while !unconfirmed.is_empty() && Instant::now() < deadline {
        match rx.recv_timeout(tick_timer.time_until_expiration()) {
            Ok(Event::Echo { payload, confirmed }) => {
                echoes += 1;
                tracing::debug!(?payload, "echo received");
                for seq in confirmed {
                    if unconfirmed.remove(&seq) {
                        tracing::info!(%seq, "confirmed");
                    }
                }
            }
            Ok(Event::Failed(e)) => {
                client.close()?;
                return Err(e).context("Receive failed");
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if tick_timer.try_fire() {
            client.tick()?;
        }
    }

    display_compact_stats(&client.stats(), client.in_flight(), start_time.elapsed());
    println!();

    client.close()?;
    if receiver.join().is_err() {
        tracing::warn!("receive thread panicked");
    }

    if !unconfirmed.is_empty() {
        anyhow::bail!(
            "{} of {} payloads unconfirmed after {:?} ({} echoes received)",
            unconfirmed.len(),
            config.count,
            config.timeout(),
            echoes
        );
    }

    tracing::info!("All {} payloads confirmed, {} echoes received", config.count, echoes);
    Ok(())
}
