use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use chain::NetworkAddress;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::channel::Channel;
use crate::config::Settings;
use crate::connections::Connections;
use crate::error::NetworkError;
use crate::hosts::Hosts;
use crate::sessions::{InboundSession, ManualSession, OutboundSession, SeedSession};

const CONNECTION_SUBSCRIBER_CAPACITY: usize = 64;

/// State shared between the manager and its sessions.  Sessions hold an
/// `Arc<Context>`; channels hold nothing back, so teardown is acyclic.
pub(crate) struct Context {
    pub settings: Settings,
    pub hosts: Hosts,
    pub connections: Connections,
    pub subscriber: Mutex<Option<broadcast::Sender<Arc<Channel>>>>,
    pub stopped: AtomicBool,
    pub height: AtomicU32,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Context {
    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Publish a freshly admitted channel to connection subscribers.
    pub fn notify(&self, channel: &Arc<Channel>) {
        if let Some(sender) = self.subscriber.lock().as_ref() {
            let _ = sender.send(Arc::clone(channel));
        }
    }

    /// Keep a session task for teardown on stop.
    pub fn track(&self, task: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
    }

    fn teardown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

/// The peer session manager.
///
/// Lifecycle is three-phase: `start` seeds the node, `run` begins
/// accepting and dialing, `stop` tears everything down.  `stop` is
/// idempotent and its synchronous half also runs on drop, so a manager
/// can always be discarded safely and a fresh instance started in its
/// place.
pub struct P2p {
    context: Arc<Context>,
    manual: Mutex<Option<Arc<ManualSession>>>,
}

impl P2p {
    pub fn new(settings: Settings) -> Self {
        let hosts = Hosts::new(&settings);
        Self {
            context: Arc::new(Context {
                settings,
                hosts,
                connections: Connections::new(),
                subscriber: Mutex::new(None),
                stopped: AtomicBool::new(true),
                height: AtomicU32::new(0),
                tasks: Mutex::new(Vec::new()),
            }),
            manual: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.context.settings
    }

    pub fn stopped(&self) -> bool {
        self.context.stopped()
    }

    /// Blockchain height advertised during handshakes.
    pub fn height(&self) -> u32 {
        self.context.height.load(Ordering::Relaxed)
    }

    pub fn set_height(&self, height: u32) {
        self.context.height.store(height, Ordering::Relaxed);
    }

    /// Seed the node: attach the manual session, load the host store,
    /// then contact the seed peers.  The node is not yet accepting or
    /// dialing when this returns.
    pub async fn start(&self) -> Result<(), NetworkError> {
        if !self.context.stopped.swap(false, Ordering::AcqRel) {
            return Err(NetworkError::OperationFailed);
        }
        let (sender, _) = broadcast::channel(CONNECTION_SUBSCRIBER_CAPACITY);
        *self.context.subscriber.lock() = Some(sender);

        let manual = Arc::new(ManualSession::new(Arc::clone(&self.context)));
        manual.start().await?;
        *self.manual.lock() = Some(manual);
        if self.context.stopped() {
            return Err(NetworkError::ServiceStopped);
        }

        if let Err(err) = self.context.hosts.load() {
            error!(error = %err, "loading host addresses failed");
            return Err(err);
        }
        if self.context.stopped() {
            return Err(NetworkError::ServiceStopped);
        }

        SeedSession::new(Arc::clone(&self.context)).start().await?;
        if self.context.stopped() {
            return Err(NetworkError::ServiceStopped);
        }
        Ok(())
    }

    /// Begin accepting inbound peers and maintaining outbound ones.
    pub async fn run(&self) -> Result<(), NetworkError> {
        if self.context.stopped() {
            return Err(NetworkError::ServiceStopped);
        }
        InboundSession::new(Arc::clone(&self.context))
            .start()
            .await?;
        if self.context.stopped() {
            return Err(NetworkError::ServiceStopped);
        }
        OutboundSession::new(Arc::clone(&self.context))
            .start()
            .await?;
        Ok(())
    }

    /// Subscribe to channels completing their handshake.  Stream
    /// closure signals manager stop.  Refused once stopped.
    pub fn subscribe_connections(
        &self,
    ) -> Result<broadcast::Receiver<Arc<Channel>>, NetworkError> {
        self.context
            .subscriber
            .lock()
            .as_ref()
            .map(|sender| sender.subscribe())
            .ok_or(NetworkError::ServiceStopped)
    }

    /// Hand a target to the manual session.  No-op when stopped.
    pub fn connect(&self, hostname: &str, port: u16) {
        if self.stopped() {
            return;
        }
        if let Some(manual) = self.manual.lock().as_ref() {
            manual.connect(hostname, port);
        }
    }

    /// Stop the manager: close subscriptions, stop every channel, drop
    /// the manual session, save hosts.  Idempotent; only the first stop
    /// saves, later calls report success immediately.
    pub async fn stop(&self) -> Result<(), NetworkError> {
        // Subscriber stop precedes connection stop, matching the
        // observed shutdown ordering of the protocol stack.
        self.context.subscriber.lock().take();
        self.context.connections.stop(NetworkError::ServiceStopped);
        self.manual.lock().take();

        let was_stopped = self.context.stopped.swap(true, Ordering::AcqRel);
        let result = if was_stopped {
            Ok(())
        } else {
            self.context.hosts.save()
        };
        self.context.teardown();

        if let Err(err) = &result {
            error!(error = %err, "saving host addresses failed");
        } else {
            debug!("p2p stopped");
        }
        result
    }

    // Connections collection.

    pub fn connected(&self, authority: &SocketAddr) -> bool {
        self.context.connections.exists(authority)
    }

    /// Admit an externally created channel and notify subscribers.
    pub fn store_channel(&self, channel: &Arc<Channel>) -> Result<(), NetworkError> {
        crate::sessions::register_channel(&self.context, channel)
    }

    pub fn remove_channel(&self, channel: &Arc<Channel>) -> Result<(), NetworkError> {
        self.context.connections.remove(channel)
    }

    pub fn connected_count(&self) -> usize {
        self.context.connections.count()
    }

    // Hosts collection.

    pub fn fetch_address(&self) -> Result<NetworkAddress, NetworkError> {
        self.context.hosts.fetch()
    }

    pub fn store_address(&self, address: NetworkAddress) {
        self.context.hosts.store(address);
    }

    pub fn store_addresses(&self, addresses: &[NetworkAddress]) {
        self.context.hosts.store_many(addresses);
    }

    pub fn remove_address(&self, address: &NetworkAddress) -> Result<(), NetworkError> {
        self.context.hosts.remove(address)
    }

    pub fn address_count(&self) -> usize {
        self.context.hosts.count()
    }
}

impl Drop for P2p {
    fn drop(&mut self) {
        // Mirror the synchronous parts of stop so dropping without an
        // explicit stop still severs every subscription and channel.
        self.context.subscriber.lock().take();
        self.context.connections.stop(NetworkError::ServiceStopped);
        self.context.stopped.store(true, Ordering::Release);
        self.context.teardown();
    }
}
