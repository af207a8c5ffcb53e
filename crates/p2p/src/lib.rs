//! Peer-to-peer session layer for the Bitcoin wire protocol.
//!
//! A [`Channel`] frames and validates one TCP connection and fans typed
//! messages out to subscribers.  The [`P2p`] manager composes four
//! sessions over a pool of channels — manual, seed, inbound and
//! outbound — together with a persistent host store and the live
//! connection set.  Every public operation that performs I/O is async;
//! stop paths are idempotent and cascade from the manager down to each
//! channel.

mod channel;
mod config;
mod connections;
mod error;
mod handshake;
mod heading;
mod hosts;
mod message;
mod p2p;
mod sessions;

pub use channel::Channel;
pub use config::{Settings, Subnet};
pub use connections::Connections;
pub use error::NetworkError;
pub use heading::{Heading, HEADING_SIZE};
pub use hosts::Hosts;
pub use message::{Message, Version, NODE_NETWORK};
pub use p2p::P2p;
