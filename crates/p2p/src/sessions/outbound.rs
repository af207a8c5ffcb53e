use std::sync::Arc;
use std::time::Duration;

use chain::NetworkAddress;
use tracing::debug;

use crate::error::NetworkError;
use crate::handshake::SessionRole;
use crate::p2p::Context;
use crate::sessions::{dial, open_channel, register_channel};

const CONNECT_PACING: Duration = Duration::from_secs(5);

/// Keeps the configured number of outbound connections alive, drawing
/// candidates at random from the host store.
pub(crate) struct OutboundSession {
    context: Arc<Context>,
}

impl OutboundSession {
    pub fn new(context: Arc<Context>) -> Self {
        Self { context }
    }

    pub async fn start(&self) -> Result<(), NetworkError> {
        let target = self.context.settings.outbound_connections;
        if target == 0 {
            debug!("outbound connections disabled");
            return Ok(());
        }

        let context = Arc::clone(&self.context);
        let task = tokio::spawn(async move {
            loop {
                if context.stopped() {
                    break;
                }
                if context.connections.count() < target {
                    match context.hosts.fetch() {
                        Ok(address) => {
                            if !context.connections.exists(&address.to_socket_addr()) {
                                let context = Arc::clone(&context);
                                tokio::spawn(async move {
                                    if let Err(err) = dial_one(&context, address).await {
                                        debug!(
                                            peer = %address.to_socket_addr(),
                                            error = %err,
                                            "outbound attempt failed"
                                        );
                                        // A dead address has no place in
                                        // the pool.
                                        let _ = context.hosts.remove(&address);
                                    }
                                });
                            }
                        }
                        Err(_) => debug!("no addresses available for outbound"),
                    }
                }
                tokio::time::sleep(CONNECT_PACING).await;
            }
        });
        self.context.track(task);
        Ok(())
    }
}

async fn dial_one(context: &Arc<Context>, address: NetworkAddress) -> Result<(), NetworkError> {
    let authority = address.to_socket_addr();
    let stream = dial(&context.settings, authority).await?;
    let channel = open_channel(context, stream, SessionRole::Outbound).await?;
    match register_channel(context, &channel) {
        Ok(()) => {
            debug!(peer = %authority, "outbound connection established");
            Ok(())
        }
        Err(err) => {
            channel.stop(err.clone());
            Err(err)
        }
    }
}
