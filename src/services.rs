use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{error, info, warn};
use validator::Validate;

use crate::bus::{EventBus, TRANSACTIONS_CREATED};
use crate::cache::{BalanceCache, SpendOutcome};
use crate::database::Database;
use crate::errors::{LedgerError, Result};
use crate::metrics;
use crate::models::{CreateAccountRequest, RechargeRequest, SpendEvent, SpendRequest, SpendResult};

/// The ledger core. Coordinates the Redis-authoritative hot path, the
/// Postgres durable record, and the event fan-out to the sync worker.
///
/// Holds no mutable state of its own; serialization of concurrent spends is
/// delegated entirely to the atomic spend script.
pub struct LedgerService {
    cache: BalanceCache,
    db: Arc<Database>,
    bus: Arc<dyn EventBus>,
    op_timeout: Duration,
}

impl LedgerService {
    pub fn new(
        cache: BalanceCache,
        db: Arc<Database>,
        bus: Arc<dyn EventBus>,
        op_timeout: Duration,
    ) -> Self {
        LedgerService {
            cache,
            db,
            bus,
            op_timeout,
        }
    }

    /// Ceiling on every public operation. Expiry aborts the current network
    /// call; Redis mutations that already committed (including the
    /// idempotency marker) stay in place, so a cancelled-after-success spend
    /// remains debited and the client can retry with the same key to learn
    /// the outcome.
    async fn with_deadline<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::Canceled),
        }
    }

    pub async fn create_account(&self, req: CreateAccountRequest) -> Result<()> {
        req.validate()
            .map_err(|e| LedgerError::Validation(e.to_string()))?;
        self.with_deadline(self.create_account_inner(req)).await
    }

    async fn create_account_inner(&self, req: CreateAccountRequest) -> Result<()> {
        let created = self
            .db
            .insert_balance_if_absent(&req.account_id, &req.resource_type, req.initial_amount)
            .await?;

        if !created {
            return Err(LedgerError::AlreadyExists(req.account_id, req.resource_type));
        }

        // The row is the source of truth; a failed seed just means the first
        // spend warms up from the database.
        if let Err(e) = self
            .cache
            .populate(&req.account_id, &req.resource_type, req.initial_amount)
            .await
        {
            warn!(
                account_id = %req.account_id,
                resource_type = %req.resource_type,
                error = %e,
                "balance cache seed failed, next spend will warm up"
            );
        }

        info!(
            account_id = %req.account_id,
            resource_type = %req.resource_type,
            initial_amount = req.initial_amount,
            "account created"
        );
        Ok(())
    }

    pub async fn delete_account(&self, account_id: &str, resource_type: &str) -> Result<()> {
        self.with_deadline(self.delete_account_inner(account_id, resource_type))
            .await
    }

    async fn delete_account_inner(&self, account_id: &str, resource_type: &str) -> Result<()> {
        let deleted = self.db.soft_delete_balance(account_id, resource_type).await?;
        if !deleted {
            return Err(LedgerError::NotFound);
        }

        // Must not be swallowed: a stale balance entry would keep admitting
        // spends against the deleted account.
        self.cache.tombstone(account_id, resource_type).await?;

        info!(account_id, resource_type, "account deleted");
        Ok(())
    }

    /// Credit a live account.
    ///
    /// The cache entry is invalidated, not overwritten: an in-flight spend
    /// script may be racing, and a plain set could be clobbered by a
    /// decrement of the stale pre-recharge value. The next spend warms up
    /// from Postgres, which may not yet include spends still queued on the
    /// bus; the views reconverge once the worker drains.
    pub async fn recharge(&self, req: RechargeRequest) -> Result<()> {
        req.validate()
            .map_err(|e| LedgerError::Validation(e.to_string()))?;
        self.with_deadline(self.recharge_inner(req)).await
    }

    async fn recharge_inner(&self, req: RechargeRequest) -> Result<()> {
        let updated = self
            .db
            .increment_balance(&req.account_id, &req.resource_type, req.amount)
            .await?;

        if !updated {
            return Err(LedgerError::NotFound);
        }

        self.cache.invalidate(&req.account_id, &req.resource_type).await?;

        info!(
            account_id = %req.account_id,
            resource_type = %req.resource_type,
            amount = req.amount,
            "account recharged"
        );
        Ok(())
    }

    /// Best-effort read of the live counter; it may lead or lag Postgres by
    /// the in-flight event queue.
    pub async fn get_balance(&self, account_id: &str, resource_type: &str) -> Result<i64> {
        self.with_deadline(self.get_balance_inner(account_id, resource_type))
            .await
    }

    async fn get_balance_inner(&self, account_id: &str, resource_type: &str) -> Result<i64> {
        if let Some(balance) = self.cache.get_balance(account_id, resource_type).await? {
            return Ok(balance);
        }

        let row = self
            .db
            .select_balance(account_id, resource_type)
            .await?
            .ok_or(LedgerError::NotFound)?;

        // A tombstoned account is observationally absent.
        if row.deleted_at.is_some() {
            return Err(LedgerError::NotFound);
        }

        self.cache
            .set_balance(account_id, resource_type, row.amount)
            .await?;
        Ok(row.amount)
    }

    /// Debit an account, at most once per idempotency key.
    pub async fn spend(&self, req: SpendRequest) -> Result<SpendResult> {
        req.validate()
            .map_err(|e| LedgerError::Validation(e.to_string()))?;

        let start = Instant::now();
        let result = self.with_deadline(self.spend_inner(req)).await;
        metrics::SPEND_DURATION.observe(start.elapsed().as_secs_f64());

        let outcome = match &result {
            Ok(_) => "success",
            Err(LedgerError::Insufficient) => "insufficient",
            Err(LedgerError::AlreadyProcessed) => "already_processed",
            Err(LedgerError::NotFound) | Err(LedgerError::Deleted) => "not_found",
            Err(_) => "error",
        };
        metrics::SPEND_TOTAL.with_label_values(&[outcome]).inc();

        result
    }

    async fn spend_inner(&self, req: SpendRequest) -> Result<SpendResult> {
        let outcome = self
            .cache
            .execute_spend(&req.account_id, &req.resource_type, &req.idempotency_key, req.amount)
            .await?;

        let outcome = match outcome {
            SpendOutcome::NotFound => {
                info!(
                    account_id = %req.account_id,
                    resource_type = %req.resource_type,
                    "balance not cached, warming up from the database"
                );
                self.warm_up(&req.account_id, &req.resource_type).await?;

                // Retried exactly once; losing the race against a concurrent
                // delete means the key is simply gone.
                self.cache
                    .execute_spend(&req.account_id, &req.resource_type, &req.idempotency_key, req.amount)
                    .await?
            }
            other => other,
        };

        match outcome {
            SpendOutcome::Success { new_balance } => self.finish_spend(&req, new_balance).await,
            SpendOutcome::AlreadyProcessed => Err(LedgerError::AlreadyProcessed),
            SpendOutcome::Insufficient => Err(LedgerError::Insufficient),
            SpendOutcome::NotFound => Err(LedgerError::NotFound),
        }
    }

    /// Copy the durable balance into the cache. The tombstone sentinel is
    /// checked first to spare Postgres during the window after a delete.
    async fn warm_up(&self, account_id: &str, resource_type: &str) -> Result<()> {
        if self.cache.is_tombstoned(account_id, resource_type).await? {
            return Err(LedgerError::Deleted);
        }

        let row = self
            .db
            .select_balance(account_id, resource_type)
            .await?
            .ok_or(LedgerError::NotFound)?;

        if row.deleted_at.is_some() {
            return Err(LedgerError::Deleted);
        }

        self.cache
            .set_balance(account_id, resource_type, row.amount)
            .await?;
        metrics::CACHE_WARMUPS_TOTAL.inc();
        Ok(())
    }

    /// The debit is already committed in Redis; publication failures are
    /// logged, never returned. The worker falls behind and catches up once
    /// the bus recovers.
    async fn finish_spend(&self, req: &SpendRequest, new_balance: i64) -> Result<SpendResult> {
        let event = SpendEvent {
            account_id: req.account_id.clone(),
            resource_type: req.resource_type.clone(),
            amount: req.amount,
            idempotency_key: req.idempotency_key.clone(),
            created_at: Utc::now(),
        };

        match serde_json::to_vec(&event) {
            Ok(payload) => {
                if let Err(e) = self.bus.publish(TRANSACTIONS_CREATED, payload).await {
                    error!(
                        idempotency_key = %req.idempotency_key,
                        error = %e,
                        "failed to publish spend event"
                    );
                    metrics::EVENTS_PUBLISHED_TOTAL.with_label_values(&["error"]).inc();
                } else {
                    metrics::EVENTS_PUBLISHED_TOTAL.with_label_values(&["success"]).inc();
                }
            }
            Err(e) => {
                error!(
                    idempotency_key = %req.idempotency_key,
                    error = %e,
                    "failed to encode spend event"
                );
                metrics::EVENTS_PUBLISHED_TOTAL.with_label_values(&["error"]).inc();
            }
        }

        Ok(SpendResult {
            new_balance,
            status: "SUCCESS".to_string(),
        })
    }
}
