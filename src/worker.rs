use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::bus::TRANSACTIONS_CREATED;
use crate::database::{Database, SpendApplication};
use crate::errors::{LedgerError, Result};
use crate::metrics;
use crate::models::SpendEvent;

/// Queue group shared by all workers; each event is delivered to exactly one
/// member, so horizontally scaled instances do not double-process.
pub const WORKER_GROUP: &str = "worker_group";

/// Consumes spend events from `transactions.created` and folds them into
/// Postgres under an idempotent transaction.
pub struct TransactionWorker {
    client: async_nats::Client,
    db: Arc<Database>,
}

impl TransactionWorker {
    pub fn new(client: async_nats::Client, db: Arc<Database>) -> Self {
        TransactionWorker { client, db }
    }

    /// Blocks until the shutdown signal fires, then unsubscribes and drains
    /// messages the server already delivered before returning.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut subscription = self
            .client
            .queue_subscribe(TRANSACTIONS_CREATED.to_string(), WORKER_GROUP.to_string())
            .await
            .map_err(|e| LedgerError::Bus(e.to_string()))?;

        info!(
            topic = TRANSACTIONS_CREATED,
            group = WORKER_GROUP,
            "transaction worker subscribed"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("transaction worker shutting down, draining subscription");
                    subscription
                        .unsubscribe()
                        .await
                        .map_err(|e| LedgerError::Bus(e.to_string()))?;
                    while let Some(message) = subscription.next().await {
                        self.process(&message.payload).await;
                    }
                    return Ok(());
                }
                message = subscription.next() => {
                    match message {
                        Some(message) => self.process(&message.payload).await,
                        None => {
                            warn!("transaction subscription closed");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    async fn process(&self, payload: &[u8]) {
        let event: SpendEvent = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(e) => {
                error!(error = %e, "failed to decode spend event, skipping");
                metrics::EVENTS_APPLIED_TOTAL.with_label_values(&["decode_error"]).inc();
                return;
            }
        };

        match self.db.apply_spend_event(&event).await {
            Ok(SpendApplication::Applied) => {
                info!(
                    account_id = %event.account_id,
                    idempotency_key = %event.idempotency_key,
                    amount = event.amount,
                    "spend event applied"
                );
                metrics::EVENTS_APPLIED_TOTAL.with_label_values(&["applied"]).inc();
            }
            Ok(SpendApplication::Duplicate) => {
                info!(
                    idempotency_key = %event.idempotency_key,
                    "spend event already recorded, skipping"
                );
                metrics::EVENTS_APPLIED_TOTAL.with_label_values(&["duplicate"]).inc();
            }
            Err(e) => {
                // Left unacknowledged; the broker redelivers and operators
                // must intervene if the condition persists.
                error!(
                    account_id = %event.account_id,
                    idempotency_key = %event.idempotency_key,
                    error = %e,
                    "failed to apply spend event"
                );
                metrics::EVENTS_APPLIED_TOTAL.with_label_values(&["error"]).inc();
            }
        }
    }
}
