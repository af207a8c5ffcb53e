//! Session strategies supervising classes of channels.
//!
//! Each session drives channels through the same admission path: dial
//! or accept, handshake under timeout, store into the connection set,
//! then notify subscribers and watch liveness.  Sessions hold the
//! manager context; channels never hold references back.

mod inbound;
mod manual;
mod outbound;
mod seed;

pub(crate) use inbound::InboundSession;
pub(crate) use manual::ManualSession;
pub(crate) use outbound::OutboundSession;
pub(crate) use seed::SeedSession;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use tokio::net::TcpStream;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::timeout;
use tracing::debug;

use crate::channel::Channel;
use crate::config::Settings;
use crate::error::NetworkError;
use crate::handshake::{perform_handshake, SessionRole};
use crate::message::Message;
use crate::p2p::Context;

/// Dial a target under the configured connect timeout.
pub(crate) async fn dial<A>(settings: &Settings, target: A) -> Result<TcpStream, NetworkError>
where
    A: tokio::net::ToSocketAddrs,
{
    match timeout(settings.connect_timeout(), TcpStream::connect(target)).await {
        Ok(connected) => connected.map_err(Into::into),
        Err(_) => Err(NetworkError::Timeout),
    }
}

/// Wrap a fresh stream in a channel, start it and run the handshake.
/// The channel is stopped on any handshake fault.
pub(crate) async fn open_channel(
    context: &Arc<Context>,
    stream: TcpStream,
    role: SessionRole,
) -> Result<Arc<Channel>, NetworkError> {
    let channel = Channel::new(
        stream,
        context.settings.identifier,
        context.settings.max_payload_size,
    );
    // Subscribe before the first read so the peer's version message
    // cannot be missed.
    let mut messages = channel.subscribe()?;
    channel.start()?;
    let height = context.height.load(Ordering::Relaxed);
    match perform_handshake(&channel, &mut messages, role, &context.settings, height).await {
        Ok(version) => {
            debug!(
                peer = %channel.authority(),
                agent = %version.user_agent,
                height = version.start_height,
                "handshake complete"
            );
            Ok(channel)
        }
        Err(err) => {
            channel.stop(err.clone());
            Err(err)
        }
    }
}

/// Admit a handshaken channel: store it, announce it, and attach the
/// protocol responder, cleanup and liveness watchers.
pub(crate) fn register_channel(
    context: &Arc<Context>,
    channel: &Arc<Channel>,
) -> Result<(), NetworkError> {
    context.connections.store(Arc::clone(channel))?;
    context.notify(channel);
    spawn_responder(context, channel);
    spawn_cleanup(context, channel);
    spawn_liveness(context, channel);
    Ok(())
}

/// Answer pings and harvest address gossip for the host store.
fn spawn_responder(context: &Arc<Context>, channel: &Arc<Channel>) {
    let Ok(mut messages) = channel.subscribe() else {
        return;
    };
    let task_context = Arc::clone(context);
    let channel = Arc::clone(channel);
    let task = tokio::spawn(async move {
        loop {
            match messages.recv().await {
                Ok(Message::Ping(nonce)) => {
                    if channel.send(&Message::Pong(nonce)).await.is_err() {
                        break;
                    }
                }
                Ok(Message::GetAddr) => {
                    let addresses = task_context.hosts.snapshot(1000);
                    if channel.send(&Message::Addr(addresses)).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Addr(addresses)) => task_context.hosts.store_many(&addresses),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    debug!(peer = %channel.authority(), skipped, "responder lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
    context.track(task);
}

/// Drop the channel from the connection set once it stops.
fn spawn_cleanup(context: &Arc<Context>, channel: &Arc<Channel>) {
    let Ok(mut stops) = channel.subscribe_stop() else {
        let _ = context.connections.remove(channel);
        return;
    };
    let task_context = Arc::clone(context);
    let channel = Arc::clone(channel);
    let task = tokio::spawn(async move {
        let _ = stops.recv().await;
        let _ = task_context.connections.remove(&channel);
    });
    context.track(task);
}

/// Heartbeat pings plus revival and expiration deadlines.
fn spawn_liveness(context: &Arc<Context>, channel: &Arc<Channel>) {
    let heartbeat = context.settings.channel_heartbeat();
    let revival = context.settings.channel_revival();
    let expiration = context.settings.channel_expiration();
    let channel = Arc::clone(channel);
    let task = tokio::spawn(async move {
        let opened = Instant::now();
        let mut ticker = tokio::time::interval(heartbeat);
        ticker.tick().await; // the first tick completes immediately
        loop {
            ticker.tick().await;
            if channel.stopped() {
                break;
            }
            if opened.elapsed() >= expiration || channel.idle_for() >= revival {
                channel.stop(NetworkError::Timeout);
                break;
            }
            if channel.send(&Message::Ping(rand::random())).await.is_err() {
                break;
            }
        }
    });
    context.track(task);
}
