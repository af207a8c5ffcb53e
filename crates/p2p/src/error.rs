use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Error codes surfaced by the session layer.
///
/// Stop codes are relayed to every subscriber of a stopping channel or
/// manager, so the type is cheaply cloneable; transport errors are
/// shared behind an `Arc`.
#[derive(Clone, Debug, Error)]
pub enum NetworkError {
    #[error("operation violates current state")]
    OperationFailed,
    #[error("service stopped")]
    ServiceStopped,
    #[error("channel stopped")]
    ChannelStopped,
    #[error("invalid stream")]
    BadStream,
    #[error("address already in use")]
    AddressInUse,
    #[error("address not found")]
    NotFound,
    #[error("operation timed out")]
    Timeout,
    #[error("file system error: {0}")]
    FileSystem(Arc<io::Error>),
    #[error("transport error: {0}")]
    Io(Arc<io::Error>),
}

impl From<io::Error> for NetworkError {
    fn from(err: io::Error) -> Self {
        NetworkError::Io(Arc::new(err))
    }
}

impl NetworkError {
    pub(crate) fn file_system(err: io::Error) -> Self {
        NetworkError::FileSystem(Arc::new(err))
    }
}
