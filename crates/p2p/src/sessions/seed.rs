use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::NetworkError;
use crate::handshake::SessionRole;
use crate::message::Message;
use crate::p2p::Context;
use crate::sessions::{dial, open_channel};

/// Contacts the configured seed endpoints once, harvests their address
/// gossip into the host store, then terminates.  Seed channels never
/// enter the live connection set.
pub(crate) struct SeedSession {
    context: Arc<Context>,
}

impl SeedSession {
    pub fn new(context: Arc<Context>) -> Self {
        Self { context }
    }

    pub async fn start(&self) -> Result<(), NetworkError> {
        let seeds = self.context.settings.seeds.clone();
        if seeds.is_empty() {
            debug!("no seeds configured");
            return Ok(());
        }
        if self.context.hosts.count() > 0 {
            debug!(
                hosts = self.context.hosts.count(),
                "host pool already populated; skipping seeding"
            );
            return Ok(());
        }

        let mut rounds = Vec::new();
        for seed in seeds {
            let context = Arc::clone(&self.context);
            rounds.push(tokio::spawn(async move {
                match seed_one(&context, &seed).await {
                    Ok(()) => debug!(seed = %seed, "seed harvested"),
                    Err(err) => warn!(seed = %seed, error = %err, "seeding failed"),
                }
            }));
        }
        for round in rounds {
            let _ = round.await;
        }
        info!(hosts = self.context.hosts.count(), "seeding complete");
        Ok(())
    }
}

async fn seed_one(context: &Arc<Context>, seed: &str) -> Result<(), NetworkError> {
    let stream = dial(&context.settings, seed).await?;
    let channel = open_channel(context, stream, SessionRole::Outbound).await?;
    let mut messages = channel.subscribe()?;
    channel.send(&Message::GetAddr).await?;

    let harvest = async {
        loop {
            match messages.recv().await {
                Ok(Message::Addr(addresses)) => {
                    context.hosts.store_many(&addresses);
                    return Ok(());
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return Err(NetworkError::ChannelStopped),
            }
        }
    };
    let outcome = timeout(context.settings.handshake_timeout(), harvest)
        .await
        .unwrap_or(Err(NetworkError::Timeout));
    channel.stop(NetworkError::ServiceStopped);
    outcome
}
