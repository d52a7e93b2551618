//! Statistics display and formatting

use rudp::ConnectionStats;
use std::io::Write;
use std::net::SocketAddr;
use std::time::Duration;

/// Format bytes in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format duration in human-readable form
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Share of reliable sends the peer has confirmed, as a percentage
pub fn confirmation_rate(stats: &ConnectionStats) -> f64 {
    if stats.reliable_sent == 0 {
        return 100.0;
    }
    stats.packets_confirmed as f64 * 100.0 / stats.reliable_sent as f64
}

/// One table row per peer
pub fn format_stats_row(peer: SocketAddr, stats: &ConnectionStats) -> String {
    format!(
        "│ {:21} │ {:>7} │ {:>7} │ {:>9} │ {:>6.1}% │ {:>6} │",
        peer.to_string(),
        stats.packets_sent,
        stats.packets_received,
        stats.packets_retransmitted,
        confirmation_rate(stats),
        stats.protocol_errors,
    )
}

/// Display per-peer statistics as a table
pub fn display_peer_stats(peers: &[(SocketAddr, ConnectionStats)], uptime: Duration) {
    println!("\n┌───────────────────────────────────────────────────────────────────────────┐");
    println!(
        "│ PEERS: {:<4} UPTIME: {:<51}│",
        peers.len(),
        format_duration(uptime)
    );
    println!("├───────────────────────┬─────────┬─────────┬───────────┬─────────┬────────┤");
    println!("│ Peer                  │ Sent    │ Recv    │ Resent    │ Acked   │ Errors │");
    println!("├───────────────────────┼─────────┼─────────┼───────────┼─────────┼────────┤");
    for (peer, stats) in peers {
        println!("{}", format_stats_row(*peer, stats));
    }
    println!("└───────────────────────┴─────────┴─────────┴───────────┴─────────┴────────┘");
}

/// Display compact stats on one line (for continuous updates)
pub fn display_compact_stats(stats: &ConnectionStats, in_flight: usize, elapsed: Duration) {
    print!(
        "\r[{:8}] Sent: {} ({}) | Recv: {} | Resent: {} | Confirmed: {:.1}% | In flight: {}   ",
        format_duration(elapsed),
        stats.packets_sent,
        format_bytes(stats.bytes_sent),
        stats.packets_received,
        stats.packets_retransmitted,
        confirmation_rate(stats),
        in_flight,
    );

    let _ = std::io::stdout().flush();
}
