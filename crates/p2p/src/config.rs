use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Network magic word for Bitcoin mainnet.
pub const MAINNET_MAGIC: u32 = 0xd9b4_bef9;

/// Subnet in CIDR form, used by the inbound blacklist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Subnet {
    pub address: IpAddr,
    pub prefix: u8,
}

impl Subnet {
    pub fn new(address: IpAddr, prefix: u8) -> Self {
        Self { address, prefix }
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (self.address, ip) {
            (IpAddr::V4(net), IpAddr::V4(host)) => {
                let bits = u32::from(self.prefix).min(32);
                if bits == 0 {
                    return true;
                }
                let mask = u32::MAX << (32 - bits);
                (u32::from(net) & mask) == (u32::from(*host) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(host)) => {
                let bits = u32::from(self.prefix).min(128);
                if bits == 0 {
                    return true;
                }
                let mask = u128::MAX << (128 - bits);
                (u128::from(net) & mask) == (u128::from(*host) & mask)
            }
            _ => false,
        }
    }
}

/// Runtime configuration for the session layer.
///
/// `threads` is advisory: the worker pool is the embedding tokio
/// runtime, sized by whoever builds it.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Network magic discriminating protocols on the wire.
    pub identifier: u32,
    /// Suggested worker thread count for the embedding runtime.
    pub threads: usize,
    /// Port for accepting inbound peers; zero disables the listener.
    pub inbound_port: u16,
    /// Number of outbound connections to maintain.
    pub outbound_connections: usize,
    pub manual_retry_seconds: u64,
    pub connect_timeout_seconds: u64,
    pub channel_handshake_seconds: u64,
    pub channel_revival_minutes: u64,
    pub channel_heartbeat_minutes: u64,
    pub channel_expiration_minutes: u64,
    /// Maximum number of addresses retained by the host store.
    pub host_pool_capacity: usize,
    /// Backing file for the host store.
    pub hosts_file: PathBuf,
    /// Seed endpoints (`hostname:port`) contacted during start.
    pub seeds: Vec<String>,
    /// Advertised local endpoint, when known.
    pub self_address: Option<SocketAddr>,
    /// Subnets refused by the inbound session.
    pub blacklist: Vec<Subnet>,
    pub user_agent: String,
    pub protocol_version: u32,
    /// Advertised service bitmask.
    pub services: u64,
    /// Payload size guard for DoS protection.
    pub max_payload_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            identifier: MAINNET_MAGIC,
            threads: 4,
            inbound_port: 8333,
            outbound_connections: 8,
            manual_retry_seconds: 10,
            connect_timeout_seconds: 5,
            channel_handshake_seconds: 30,
            channel_revival_minutes: 30,
            channel_heartbeat_minutes: 5,
            channel_expiration_minutes: 90,
            host_pool_capacity: 1000,
            hosts_file: PathBuf::from("hosts.cache"),
            seeds: vec![
                "seed.bitcoin.sipa.be:8333".to_string(),
                "dnsseed.bluematt.me:8333".to_string(),
                "seed.bitcoin.jonasschnelli.ch:8333".to_string(),
            ],
            self_address: None,
            blacklist: Vec::new(),
            user_agent: concat!("/p2p:", env!("CARGO_PKG_VERSION"), "/").to_string(),
            protocol_version: 70016,
            services: crate::message::NODE_NETWORK,
            max_payload_size: 10 * 1024 * 1024,
        }
    }
}

impl Settings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.channel_handshake_seconds)
    }

    pub fn manual_retry(&self) -> Duration {
        Duration::from_secs(self.manual_retry_seconds)
    }

    pub fn channel_revival(&self) -> Duration {
        Duration::from_secs(self.channel_revival_minutes * 60)
    }

    pub fn channel_heartbeat(&self) -> Duration {
        Duration::from_secs(self.channel_heartbeat_minutes * 60)
    }

    pub fn channel_expiration(&self) -> Duration {
        Duration::from_secs(self.channel_expiration_minutes * 60)
    }

    pub fn blacklisted(&self, ip: &IpAddr) -> bool {
        self.blacklist.iter().any(|subnet| subnet.contains(ip))
    }
}
