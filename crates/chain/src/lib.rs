//! Transaction data structures and the network address record shared by
//! the wire protocol and the host store.

mod address;
mod transaction;

use std::fmt;

pub use address::NetworkAddress;
pub use transaction::{OutPoint, Transaction, TxInput, TxOutput};

/// 32 byte transaction identifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TxHash(pub [u8; 32]);

impl TxHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Displayed in the conventional reversed order.
        for byte in self.0.iter().rev() {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
