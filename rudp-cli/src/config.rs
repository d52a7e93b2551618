//! Configuration file support for the RUDP echo tools

use rudp::{EndpointConfig, Network};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

fn default_network() -> String {
    "udp4".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_buffer_size() -> usize {
    1500
}

fn default_retransmit_ms() -> u64 {
    200
}

fn default_tick_ms() -> u64 {
    50
}

fn default_stats_interval() -> u64 {
    5
}

/// Echo server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address family: udp, udp4 or udp6
    #[serde(default = "default_network")]
    pub network: String,
    /// Host or address to bind
    pub bind: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Receive buffer size
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Retransmission timeout in milliseconds
    #[serde(default = "default_retransmit_ms")]
    pub retransmit_timeout_ms: u64,
    /// How often stale packets are resent when no traffic arrives
    #[serde(default = "default_tick_ms")]
    pub tick_interval_ms: u64,
    /// Peers silent for this long are dropped; 0 keeps them forever
    #[serde(default)]
    pub idle_timeout_secs: u64,
    /// Statistics interval in seconds; 0 disables
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
}

/// Echo client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Address family: udp, udp4 or udp6
    #[serde(default = "default_network")]
    pub network: String,
    /// Server host
    pub host: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Number of reliable payloads to send
    pub count: u32,
    /// Pause between sends in milliseconds
    #[serde(default)]
    pub send_interval_ms: u64,
    /// Receive buffer size
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Retransmission timeout in milliseconds
    #[serde(default = "default_retransmit_ms")]
    pub retransmit_timeout_ms: u64,
    /// How often stale packets are resent when no traffic arrives
    #[serde(default = "default_tick_ms")]
    pub tick_interval_ms: u64,
    /// Give up waiting for confirmations after this many seconds
    pub timeout_secs: u64,
}

/// Combined configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: Option<ServerConfig>,
    /// Client configuration
    pub client: Option<ClientConfig>,
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Check every present section
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(server) = &self.server {
            parse_network(&server.network)?;
            check_buffer(server.buffer_size)?;
        }
        if let Some(client) = &self.client {
            parse_network(&client.network)?;
            check_buffer(client.buffer_size)?;
            if client.count == 0 {
                return Err(ConfigError::Invalid("client.count must be positive".into()));
            }
        }
        Ok(())
    }

    /// Create example server configuration
    pub fn example_server() -> Self {
        Config {
            server: Some(ServerConfig {
                network: default_network(),
                bind: "127.0.0.1".to_string(),
                port: default_port(),
                buffer_size: default_buffer_size(),
                retransmit_timeout_ms: default_retransmit_ms(),
                tick_interval_ms: default_tick_ms(),
                idle_timeout_secs: 60,
                stats_interval_secs: default_stats_interval(),
            }),
            client: None,
        }
    }

    /// Create example client configuration
    pub fn example_client() -> Self {
        Config {
            server: None,
            client: Some(ClientConfig {
                network: default_network(),
                host: "127.0.0.1".to_string(),
                port: default_port(),
                count: 10,
                send_interval_ms: 0,
                buffer_size: default_buffer_size(),
                retransmit_timeout_ms: default_retransmit_ms(),
                tick_interval_ms: default_tick_ms(),
                timeout_secs: 5,
            }),
        }
    }
}

fn parse_network(network: &str) -> Result<Network, ConfigError> {
    network
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("unknown network {network:?}")))
}

fn check_buffer(size: usize) -> Result<(), ConfigError> {
    if size == 0 {
        return Err(ConfigError::Invalid("buffer_size must be positive".into()));
    }
    Ok(())
}

fn endpoint_config(retransmit_ms: u64, buffer_size: usize, tick_ms: u64) -> EndpointConfig {
    EndpointConfig {
        retransmit_timeout: Duration::from_millis(retransmit_ms),
        // header plus a payload as large as the receive buffer
        max_datagram_size: buffer_size + rudp::protocol::packet::RELIABLE_HEADER_SIZE,
        // wake up at tick pace so stale packets are resent while idle
        read_timeout: Some(Duration::from_millis(tick_ms.max(1))),
        ..EndpointConfig::default()
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ServerConfig {
    pub fn network(&self) -> Result<Network, ConfigError> {
        parse_network(&self.network)
    }

    pub fn endpoint_config(&self) -> EndpointConfig {
        endpoint_config(self.retransmit_timeout_ms, self.buffer_size, self.tick_interval_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Idle eviction threshold, `None` when disabled
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    /// Get statistics interval as Duration
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }
}

impl ClientConfig {
    pub fn network(&self) -> Result<Network, ConfigError> {
        parse_network(&self.network)
    }

    pub fn endpoint_config(&self) -> EndpointConfig {
        endpoint_config(self.retransmit_timeout_ms, self.buffer_size, self.tick_interval_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
