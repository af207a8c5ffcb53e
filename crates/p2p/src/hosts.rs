use std::collections::HashSet;
use std::fs;
use std::io::{Cursor, Write};
use std::path::PathBuf;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chain::NetworkAddress;
use parking_lot::Mutex;
use rand::Rng;
use tracing::debug;

use crate::config::Settings;
use crate::error::NetworkError;

/// Persistent, capacity-bounded set of known peer addresses.
///
/// On disk the store is a little-endian count followed by canonical
/// timestamped `net_addr` records.  Saves go through a temporary file
/// and a rename so a crash never leaves a torn file behind.
pub struct Hosts {
    buffer: Mutex<HashSet<NetworkAddress>>,
    capacity: usize,
    file_path: PathBuf,
}

impl Hosts {
    pub fn new(settings: &Settings) -> Self {
        Self {
            buffer: Mutex::new(HashSet::new()),
            capacity: settings.host_pool_capacity,
            file_path: settings.hosts_file.clone(),
        }
    }

    pub fn count(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Fetch one address at random.
    pub fn fetch(&self) -> Result<NetworkAddress, NetworkError> {
        let buffer = self.buffer.lock();
        if buffer.is_empty() {
            return Err(NetworkError::NotFound);
        }
        let index = rand::thread_rng().gen_range(0..buffer.len());
        buffer
            .iter()
            .nth(index)
            .copied()
            .ok_or(NetworkError::NotFound)
    }

    pub fn store(&self, address: NetworkAddress) {
        if self.capacity == 0 || address.port == 0 {
            return;
        }
        let mut buffer = self.buffer.lock();
        // Replace rather than duplicate: identity is the endpoint, so a
        // refreshed timestamp displaces the stale record.
        buffer.remove(&address);
        if buffer.len() >= self.capacity {
            if let Some(evicted) = buffer.iter().next().copied() {
                buffer.remove(&evicted);
            }
        }
        buffer.insert(address);
    }

    /// Up to `limit` addresses for answering `getaddr`.
    pub fn snapshot(&self, limit: usize) -> Vec<NetworkAddress> {
        self.buffer.lock().iter().take(limit).copied().collect()
    }

    pub fn store_many(&self, addresses: &[NetworkAddress]) {
        for address in addresses {
            self.store(*address);
        }
    }

    pub fn remove(&self, address: &NetworkAddress) -> Result<(), NetworkError> {
        if self.buffer.lock().remove(address) {
            Ok(())
        } else {
            Err(NetworkError::NotFound)
        }
    }

    /// Load the set from disk.  A missing file is an empty store, not
    /// an error.
    pub fn load(&self) -> Result<(), NetworkError> {
        let bytes = match fs::read(&self.file_path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(NetworkError::file_system(err)),
        };
        let mut cursor = Cursor::new(bytes.as_slice());
        let count = cursor
            .read_u32::<LittleEndian>()
            .map_err(NetworkError::file_system)?;
        let mut buffer = self.buffer.lock();
        for _ in 0..count {
            let address =
                NetworkAddress::read(&mut cursor, true).map_err(NetworkError::file_system)?;
            if buffer.len() >= self.capacity {
                break;
            }
            buffer.insert(address);
        }
        debug!(count = buffer.len(), path = %self.file_path.display(), "hosts loaded");
        Ok(())
    }

    /// Save the set to disk atomically.
    pub fn save(&self) -> Result<(), NetworkError> {
        let snapshot: Vec<NetworkAddress> = self.buffer.lock().iter().copied().collect();
        let mut bytes = Vec::with_capacity(4 + snapshot.len() * 30);
        bytes
            .write_u32::<LittleEndian>(snapshot.len() as u32)
            .map_err(NetworkError::file_system)?;
        for address in &snapshot {
            address
                .write(&mut bytes, true)
                .map_err(NetworkError::file_system)?;
        }

        let temp_path = self.file_path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).map_err(NetworkError::file_system)?;
        file.write_all(&bytes).map_err(NetworkError::file_system)?;
        file.sync_all().map_err(NetworkError::file_system)?;
        drop(file);
        fs::rename(&temp_path, &self.file_path).map_err(NetworkError::file_system)?;
        debug!(count = snapshot.len(), path = %self.file_path.display(), "hosts saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(last_octet: u8, port: u16) -> NetworkAddress {
        NetworkAddress::from_socket_addr(
            format!("10.0.0.{last_octet}:{port}").parse().expect("addr"),
            1,
        )
    }

    fn settings_with(path: PathBuf, capacity: usize) -> Settings {
        Settings {
            hosts_file: path,
            host_pool_capacity: capacity,
            ..Settings::default()
        }
    }

    #[test]
    fn fetch_from_empty_store_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let hosts = Hosts::new(&settings_with(dir.path().join("hosts.cache"), 10));
        assert!(matches!(hosts.fetch(), Err(NetworkError::NotFound)));
    }

    #[test]
    fn store_deduplicates_and_honors_capacity() {
        let dir = tempfile::tempdir().expect("tempdir");
        let hosts = Hosts::new(&settings_with(dir.path().join("hosts.cache"), 3));
        hosts.store(address(1, 8333));
        hosts.store(address(1, 8333));
        assert_eq!(hosts.count(), 1);

        hosts.store_many(&[address(2, 8333), address(3, 8333), address(4, 8333)]);
        assert_eq!(hosts.count(), 3);

        // Zero ports never enter the pool.
        hosts.store(address(9, 0));
        assert_eq!(hosts.count(), 3);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("hosts.cache");
        let hosts = Hosts::new(&settings_with(path.clone(), 10));
        hosts.store_many(&[address(1, 8333), address(2, 18333)]);
        hosts.save().expect("save");

        let restored = Hosts::new(&settings_with(path, 10));
        restored.load().expect("load");
        assert_eq!(restored.count(), 2);
        let fetched = restored.fetch().expect("fetch");
        assert!([address(1, 8333), address(2, 18333)].contains(&fetched));
    }

    #[test]
    fn load_of_missing_file_is_empty_success() {
        let dir = tempfile::tempdir().expect("tempdir");
        let hosts = Hosts::new(&settings_with(dir.path().join("absent.cache"), 10));
        hosts.load().expect("load");
        assert_eq!(hosts.count(), 0);
    }

    #[test]
    fn corrupt_file_reports_file_system_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("hosts.cache");
        fs::write(&path, [9u8, 0, 0, 0, 1, 2]).expect("write");
        let hosts = Hosts::new(&settings_with(path, 10));
        assert!(matches!(
            hosts.load(),
            Err(NetworkError::FileSystem(_))
        ));
    }

    #[test]
    fn remove_reports_not_found_for_strangers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let hosts = Hosts::new(&settings_with(dir.path().join("hosts.cache"), 10));
        hosts.store(address(1, 8333));
        assert!(hosts.remove(&address(1, 8333)).is_ok());
        assert!(matches!(
            hosts.remove(&address(1, 8333)),
            Err(NetworkError::NotFound)
        ));
    }
}
