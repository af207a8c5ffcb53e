use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::channel::Channel;
use crate::error::NetworkError;

/// Live channel set, at most one per remote endpoint.
#[derive(Default)]
pub struct Connections {
    channels: RwLock<HashMap<SocketAddr, Arc<Channel>>>,
}

impl Connections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exists(&self, authority: &SocketAddr) -> bool {
        self.channels.read().contains_key(authority)
    }

    pub fn count(&self) -> usize {
        self.channels.read().len()
    }

    /// Admit a channel, refusing a second connection to the same
    /// endpoint.
    pub fn store(&self, channel: Arc<Channel>) -> Result<(), NetworkError> {
        let mut channels = self.channels.write();
        match channels.entry(channel.authority()) {
            std::collections::hash_map::Entry::Occupied(_) => Err(NetworkError::AddressInUse),
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(channel);
                Ok(())
            }
        }
    }

    /// Drop a channel from the set.  Only the channel actually stored
    /// under the endpoint is removed; a stale handle is reported as
    /// `NotFound`.
    pub fn remove(&self, channel: &Arc<Channel>) -> Result<(), NetworkError> {
        let mut channels = self.channels.write();
        match channels.get(&channel.authority()) {
            Some(stored) if Arc::ptr_eq(stored, channel) => {
                channels.remove(&channel.authority());
                Ok(())
            }
            _ => Err(NetworkError::NotFound),
        }
    }

    /// Stop every live channel with the given code and clear the set.
    pub fn stop(&self, reason: NetworkError) {
        let drained: Vec<Arc<Channel>> = self.channels.write().drain().map(|(_, c)| c).collect();
        for channel in drained {
            channel.stop(reason.clone());
        }
    }
}
