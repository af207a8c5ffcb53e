use std::sync::Arc;

use tracing::{debug, info};

use crate::error::NetworkError;
use crate::handshake::SessionRole;
use crate::p2p::Context;
use crate::sessions::{dial, open_channel, register_channel};

/// Maintains operator-requested connections, redialing with a retry
/// delay for as long as the manager runs.
pub(crate) struct ManualSession {
    context: Arc<Context>,
}

impl ManualSession {
    pub fn new(context: Arc<Context>) -> Self {
        Self { context }
    }

    pub async fn start(&self) -> Result<(), NetworkError> {
        debug!("manual session started");
        Ok(())
    }

    /// Begin a persistent dial towards `hostname:port`.
    pub fn connect(&self, hostname: &str, port: u16) {
        let context = Arc::clone(&self.context);
        let target = format!("{hostname}:{port}");
        let task = tokio::spawn(async move {
            let retry = context.settings.manual_retry();
            loop {
                if context.stopped() {
                    break;
                }
                match connect_once(&context, &target).await {
                    Ok(()) => {
                        if context.stopped() {
                            break;
                        }
                        debug!(target = %target, "manual connection dropped");
                    }
                    Err(err) => debug!(target = %target, error = %err, "manual attempt failed"),
                }
                tokio::time::sleep(retry).await;
            }
        });
        self.context.track(task);
    }
}

/// One dial attempt; on success, holds until the channel stops.
async fn connect_once(context: &Arc<Context>, target: &str) -> Result<(), NetworkError> {
    let stream = dial(&context.settings, target).await?;
    let channel = open_channel(context, stream, SessionRole::Outbound).await?;
    if let Err(err) = register_channel(context, &channel) {
        channel.stop(err.clone());
        return Err(err);
    }
    info!(target = %target, peer = %channel.authority(), "manual connection established");
    if let Ok(mut stops) = channel.subscribe_stop() {
        let _ = stops.recv().await;
    }
    Ok(())
}
