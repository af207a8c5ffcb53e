use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::NetworkError;
use crate::heading::{Heading, HEADING_SIZE};
use crate::message::Message;

const MESSAGE_SUBSCRIBER_CAPACITY: usize = 256;
const STOP_SUBSCRIBER_CAPACITY: usize = 4;

/// One live peer connection.
///
/// The channel owns the socket, frames the byte stream into typed
/// messages and fans them out to subscribers.  It is either running or
/// stopped; the stop transition is one-way and idempotent, after which
/// sends fail with `ChannelStopped` and no further delivery occurs.
pub struct Channel {
    // Read completions need to retain the channel, like the socket
    // retains its owner in any proactor design.
    weak_self: Weak<Channel>,
    magic: u32,
    max_payload: usize,
    authority: SocketAddr,
    nonce: AtomicU64,
    started: AtomicBool,
    stopped: AtomicBool,
    messages: Mutex<Option<broadcast::Sender<Message>>>,
    stops: Mutex<Option<broadcast::Sender<NetworkError>>>,
    reader: Mutex<Option<OwnedReadHalf>>,
    writer: Arc<tokio::sync::Mutex<Option<OwnedWriteHalf>>>,
    read_task: Mutex<Option<JoinHandle<()>>>,
    last_activity: Mutex<Instant>,
}

impl Channel {
    pub fn new(stream: TcpStream, magic: u32, max_payload: usize) -> Arc<Self> {
        // Cache the authority for logging after stop.
        let authority = stream.peer_addr().unwrap_or_else(|_| {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)
        });
        let (read_half, write_half) = stream.into_split();
        let (messages, _) = broadcast::channel(MESSAGE_SUBSCRIBER_CAPACITY);
        let (stops, _) = broadcast::channel(STOP_SUBSCRIBER_CAPACITY);
        Arc::new_cyclic(|weak_self| Self {
            weak_self: weak_self.clone(),
            magic,
            max_payload,
            authority,
            nonce: AtomicU64::new(0),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            messages: Mutex::new(Some(messages)),
            stops: Mutex::new(Some(stops)),
            reader: Mutex::new(Some(read_half)),
            writer: Arc::new(tokio::sync::Mutex::new(Some(write_half))),
            read_task: Mutex::new(None),
            last_activity: Mutex::new(Instant::now()),
        })
    }

    /// Remote endpoint, cached at construction.
    pub fn authority(&self) -> SocketAddr {
        self.authority
    }

    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Nonce advertised in our version message, used to detect
    /// accidental self-connection.
    pub fn nonce(&self) -> u64 {
        self.nonce.load(Ordering::Relaxed)
    }

    pub fn set_nonce(&self, nonce: u64) {
        self.nonce.store(nonce, Ordering::Relaxed);
    }

    /// Time since the last fully validated message arrived.
    pub fn idle_for(&self) -> std::time::Duration {
        self.last_activity.lock().elapsed()
    }

    /// Subscribe to decoded messages.  Closure of the stream is the
    /// stopped signal: `recv` yields `Closed` once the channel stops.
    /// Registration is refused after stop.
    pub fn subscribe(&self) -> Result<broadcast::Receiver<Message>, NetworkError> {
        self.messages
            .lock()
            .as_ref()
            .map(|sender| sender.subscribe())
            .ok_or(NetworkError::ChannelStopped)
    }

    /// Subscribe to the channel's final stop code, delivered exactly
    /// once.  Registration is refused after stop.
    pub fn subscribe_stop(&self) -> Result<broadcast::Receiver<NetworkError>, NetworkError> {
        self.stops
            .lock()
            .as_ref()
            .map(|sender| sender.subscribe())
            .ok_or(NetworkError::ChannelStopped)
    }

    /// Begin the read cycle.  Subscriptions registered before this call
    /// are guaranteed to observe every message.
    pub fn start(&self) -> Result<(), NetworkError> {
        if self.stopped() || self.started.swap(true, Ordering::AcqRel) {
            return Err(NetworkError::OperationFailed);
        }
        let reader = self
            .reader
            .lock()
            .take()
            .ok_or(NetworkError::OperationFailed)?;
        let channel = self
            .weak_self
            .upgrade()
            .ok_or(NetworkError::OperationFailed)?;
        let handle = tokio::spawn(async move { channel.read_cycle(reader).await });
        *self.read_task.lock() = Some(handle);
        Ok(())
    }

    /// Frame and write one message.  Writes are serialized by the
    /// socket mutex, so concurrent sends drain FIFO.
    pub async fn send(&self, message: &Message) -> Result<(), NetworkError> {
        if self.stopped() {
            return Err(NetworkError::ChannelStopped);
        }
        let payload = message.encode_payload();
        let heading = Heading::for_payload(self.magic, message.command(), &payload);
        let mut frame = Vec::with_capacity(HEADING_SIZE + payload.len());
        frame.extend_from_slice(&heading.encode());
        frame.extend_from_slice(&payload);

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(NetworkError::ChannelStopped)?;
        debug!(
            peer = %self.authority,
            command = message.command(),
            bytes = frame.len(),
            "sending message"
        );
        if let Err(err) = writer.write_all(&frame).await {
            debug!(peer = %self.authority, error = %err, "send failed");
            return Err(err.into());
        }
        Ok(())
    }

    /// Stop the channel with the given reason.  Idempotent; the first
    /// call relays the reason to stop subscribers, closes the message
    /// stream and tears the socket down.
    pub fn stop(&self, reason: NetworkError) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(peer = %self.authority, %reason, "channel stopping");

        // Dropping the senders closes every subscription stream; new
        // registrations are refused from here on.
        self.messages.lock().take();
        if let Some(stops) = self.stops.lock().take() {
            let _ = stops.send(reason);
        }

        if let Some(task) = self.read_task.lock().take() {
            task.abort();
        }

        // The socket is guarded against concurrent use; shutdown waits
        // its turn behind any in-flight send.  Without a runtime the
        // halves close when the channel drops.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let writer = Arc::clone(&self.writer);
            handle.spawn(async move {
                if let Some(mut half) = writer.lock().await.take() {
                    let _ = half.shutdown().await;
                }
            });
        }
    }

    fn record_activity(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    fn publish(&self, message: Message) {
        if let Some(sender) = self.messages.lock().as_ref() {
            let _ = sender.send(message);
        }
    }

    async fn read_cycle(self: Arc<Self>, mut reader: OwnedReadHalf) {
        let mut heading_buffer = [0u8; HEADING_SIZE];
        loop {
            if self.stopped() {
                return;
            }
            if let Err(err) = reader.read_exact(&mut heading_buffer).await {
                if !self.stopped() {
                    debug!(peer = %self.authority, error = %err, "heading read failed");
                    self.stop(err.into());
                }
                return;
            }

            let heading = match Heading::decode(&heading_buffer) {
                Ok(heading) if heading.magic == self.magic => heading,
                _ => {
                    warn!(peer = %self.authority, "invalid heading");
                    self.stop(NetworkError::BadStream);
                    return;
                }
            };
            if heading.payload_size as usize > self.max_payload {
                warn!(
                    peer = %self.authority,
                    command = %heading.command,
                    bytes = heading.payload_size,
                    "oversized payload indicated"
                );
                self.stop(NetworkError::BadStream);
                return;
            }

            let mut payload = vec![0u8; heading.payload_size as usize];
            if let Err(err) = reader.read_exact(&mut payload).await {
                if !self.stopped() {
                    debug!(peer = %self.authority, error = %err, "payload read failed");
                    self.stop(err.into());
                }
                return;
            }
            if self.stopped() {
                return;
            }

            if codec::checksum(&payload) != heading.checksum {
                warn!(
                    peer = %self.authority,
                    command = %heading.command,
                    "invalid payload checksum"
                );
                self.stop(NetworkError::BadStream);
                return;
            }

            match Message::decode(&heading.command, &payload) {
                Ok(Some((message, unconsumed))) => {
                    if unconsumed > 0 {
                        warn!(
                            peer = %self.authority,
                            command = %heading.command,
                            unconsumed,
                            "valid payload with unused bytes"
                        );
                    }
                    self.publish(message);
                }
                Ok(None) => {
                    debug!(
                        peer = %self.authority,
                        command = %heading.command,
                        "skipping unknown command"
                    );
                }
                Err(err) => {
                    warn!(
                        peer = %self.authority,
                        command = %heading.command,
                        error = %err,
                        "invalid payload stream"
                    );
                    self.stop(NetworkError::BadStream);
                    return;
                }
            }

            self.record_activity();
        }
    }
}
