use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chain::NetworkAddress;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::debug;

use crate::channel::Channel;
use crate::config::Settings;
use crate::error::NetworkError;
use crate::message::{Message, Version};

/// Which side of the connection we are on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionRole {
    Inbound,
    Outbound,
}

/// Run the version/verack exchange over an already started channel.
///
/// The caller subscribes before starting the channel so no handshake
/// message can be missed; the receiver is handed in here.  The whole
/// exchange runs under the configured handshake timeout.
pub async fn perform_handshake(
    channel: &Arc<Channel>,
    messages: &mut broadcast::Receiver<Message>,
    role: SessionRole,
    settings: &Settings,
    start_height: u32,
) -> Result<Version, NetworkError> {
    let local = local_version(channel, settings, start_height);
    channel.set_nonce(local.nonce);

    let exchange = async {
        match role {
            SessionRole::Outbound => {
                channel.send(&Message::Version(local.clone())).await?;
                let remote = expect_version(channel, messages).await?;
                channel.send(&Message::Verack).await?;
                expect_verack(messages).await?;
                Ok(remote)
            }
            SessionRole::Inbound => {
                let remote = expect_version(channel, messages).await?;
                channel.send(&Message::Version(local.clone())).await?;
                channel.send(&Message::Verack).await?;
                expect_verack(messages).await?;
                Ok(remote)
            }
        }
    };

    match timeout(settings.handshake_timeout(), exchange).await {
        Ok(result) => result,
        Err(_) => {
            debug!(peer = %channel.authority(), "handshake timed out");
            Err(NetworkError::Timeout)
        }
    }
}

fn local_version(channel: &Arc<Channel>, settings: &Settings, start_height: u32) -> Version {
    let address_sender = match settings.self_address {
        Some(address) => NetworkAddress::from_socket_addr(address, settings.services),
        None => NetworkAddress::unspecified(),
    };
    Version {
        protocol: settings.protocol_version,
        services: settings.services,
        timestamp: unix_time(),
        address_receiver: NetworkAddress::from_socket_addr(channel.authority(), 0),
        address_sender,
        nonce: rand::random(),
        user_agent: settings.user_agent.clone(),
        start_height,
    }
}

async fn expect_version(
    channel: &Arc<Channel>,
    messages: &mut broadcast::Receiver<Message>,
) -> Result<Version, NetworkError> {
    match next_message(messages).await? {
        Message::Version(remote) => {
            if remote.protocol == 0 || remote.nonce == channel.nonce() {
                // A zero protocol or an echoed nonce means a broken
                // peer or a connection back to ourselves.
                return Err(NetworkError::BadStream);
            }
            Ok(remote)
        }
        _ => Err(NetworkError::BadStream),
    }
}

async fn expect_verack(
    messages: &mut broadcast::Receiver<Message>,
) -> Result<(), NetworkError> {
    match next_message(messages).await? {
        Message::Verack => Ok(()),
        _ => Err(NetworkError::BadStream),
    }
}

async fn next_message(
    messages: &mut broadcast::Receiver<Message>,
) -> Result<Message, NetworkError> {
    messages
        .recv()
        .await
        .map_err(|_| NetworkError::ChannelStopped)
}

fn unix_time() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or_default()
}
