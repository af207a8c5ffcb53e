use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::error::NetworkError;
use crate::handshake::SessionRole;
use crate::p2p::Context;
use crate::sessions::{open_channel, register_channel};

/// Accepts peers on the configured listen port and admits each one
/// after a completed handshake.
pub(crate) struct InboundSession {
    context: Arc<Context>,
}

impl InboundSession {
    pub fn new(context: Arc<Context>) -> Self {
        Self { context }
    }

    pub async fn start(&self) -> Result<(), NetworkError> {
        let port = self.context.settings.inbound_port;
        if port == 0 {
            debug!("inbound connections disabled");
            return Ok(());
        }
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        info!(port, "accepting inbound connections");

        let context = Arc::clone(&self.context);
        let task = tokio::spawn(async move {
            loop {
                if context.stopped() {
                    break;
                }
                match listener.accept().await {
                    Ok((stream, address)) => {
                        if context.settings.blacklisted(&address.ip()) {
                            debug!(peer = %address, "dropping blacklisted peer");
                            continue;
                        }
                        let context = Arc::clone(&context);
                        tokio::spawn(async move {
                            match open_channel(&context, stream, SessionRole::Inbound).await {
                                Ok(channel) => {
                                    if let Err(err) = register_channel(&context, &channel) {
                                        debug!(
                                            peer = %channel.authority(),
                                            error = %err,
                                            "inbound channel rejected"
                                        );
                                        channel.stop(err);
                                    }
                                }
                                Err(err) => {
                                    debug!(peer = %address, error = %err, "inbound handshake failed");
                                }
                            }
                        });
                    }
                    Err(err) => {
                        warn!(error = %err, "listener accept failed");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });
        self.context.track(task);
        Ok(())
    }
}
