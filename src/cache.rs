use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

use crate::errors::Result;

/// Cache key prefixes
pub mod keys {
    pub const BALANCE: &str = "balance";
    pub const IDEMPOTENCY: &str = "idem";
    pub const TOMBSTONE: &str = "deleted";
}

/// Cache TTL constants (in seconds)
pub mod ttl {
    /// Idempotency markers must outlive any reasonable client retry horizon.
    pub const IDEMPOTENCY: u64 = 24 * 60 * 60;
    /// Tombstones only cover the window where a delete races warm-ups.
    pub const TOMBSTONE: u64 = 30;
}

/// Atomic spend script. The idempotency TTL baked into the script must match
/// [`ttl::IDEMPOTENCY`].
const SPEND_SCRIPT: &str = include_str!("spend.lua");

/// Decoded reply of the atomic spend script. The raw numeric status never
/// leaves this module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpendOutcome {
    Success { new_balance: i64 },
    AlreadyProcessed,
    NotFound,
    Insufficient,
}

impl SpendOutcome {
    fn from_reply(status: i64, value: i64) -> Option<Self> {
        match status {
            1 => Some(SpendOutcome::Success { new_balance: value }),
            0 => Some(SpendOutcome::AlreadyProcessed),
            -1 => Some(SpendOutcome::NotFound),
            -2 => Some(SpendOutcome::Insufficient),
            _ => None,
        }
    }
}

/// Fast-store adapter over Redis. Holds the authoritative live balances,
/// short-lived idempotency markers, and deletion tombstones.
#[derive(Clone)]
pub struct BalanceCache {
    redis: ConnectionManager,
    spend_script: Script,
}

impl BalanceCache {
    pub fn new(redis: ConnectionManager) -> Self {
        BalanceCache {
            redis,
            spend_script: Script::new(SPEND_SCRIPT),
        }
    }

    fn balance_key(account_id: &str, resource_type: &str) -> String {
        format!("{}:{}:{}", keys::BALANCE, account_id, resource_type)
    }

    fn idempotency_key(key: &str) -> String {
        format!("{}:{}", keys::IDEMPOTENCY, key)
    }

    fn tombstone_key(account_id: &str, resource_type: &str) -> String {
        format!("{}:{}:{}", keys::TOMBSTONE, account_id, resource_type)
    }

    /// Run the atomic spend script over the balance and idempotency keys.
    /// Both keys are touched inside one server-side execution, so concurrent
    /// spends against the same account serialize on the Redis shard.
    pub async fn execute_spend(
        &self,
        account_id: &str,
        resource_type: &str,
        idempotency_key: &str,
        amount: i64,
    ) -> Result<SpendOutcome> {
        let (status, value): (i64, i64) = self
            .spend_script
            .key(Self::balance_key(account_id, resource_type))
            .key(Self::idempotency_key(idempotency_key))
            .arg(amount)
            .invoke_async(&mut self.redis.clone())
            .await?;

        SpendOutcome::from_reply(status, value).ok_or_else(|| {
            redis::RedisError::from((
                redis::ErrorKind::TypeError,
                "Unexpected spend script status",
                status.to_string(),
            ))
            .into()
        })
    }

    pub async fn get_balance(
        &self,
        account_id: &str,
        resource_type: &str,
    ) -> Result<Option<i64>> {
        let value: Option<i64> = self
            .redis
            .clone()
            .get(Self::balance_key(account_id, resource_type))
            .await?;
        Ok(value)
    }

    /// Write a balance with no expiry; this is the primary store on the hot
    /// path, not a cache entry that may lapse.
    pub async fn set_balance(
        &self,
        account_id: &str,
        resource_type: &str,
        amount: i64,
    ) -> Result<()> {
        let _: () = self
            .redis
            .clone()
            .set(Self::balance_key(account_id, resource_type), amount)
            .await?;
        Ok(())
    }

    /// Seed a freshly created account: drop any lingering tombstone and set
    /// the balance in one pipeline.
    pub async fn populate(
        &self,
        account_id: &str,
        resource_type: &str,
        amount: i64,
    ) -> Result<()> {
        let _: () = redis::pipe()
            .del(Self::tombstone_key(account_id, resource_type))
            .ignore()
            .set(Self::balance_key(account_id, resource_type), amount)
            .ignore()
            .query_async(&mut self.redis.clone())
            .await?;
        Ok(())
    }

    /// Drop the balance entry, forcing the next spend to warm up from the
    /// database.
    pub async fn invalidate(&self, account_id: &str, resource_type: &str) -> Result<()> {
        let _: () = self
            .redis
            .clone()
            .del(Self::balance_key(account_id, resource_type))
            .await?;
        Ok(())
    }

    /// Remove the balance entry and leave a short-lived tombstone that
    /// suppresses racing warm-ups of a just-deleted account.
    pub async fn tombstone(&self, account_id: &str, resource_type: &str) -> Result<()> {
        let _: () = redis::pipe()
            .del(Self::balance_key(account_id, resource_type))
            .ignore()
            .set_ex(Self::tombstone_key(account_id, resource_type), 1, ttl::TOMBSTONE)
            .ignore()
            .query_async(&mut self.redis.clone())
            .await?;
        Ok(())
    }

    pub async fn is_tombstoned(&self, account_id: &str, resource_type: &str) -> Result<bool> {
        let exists: bool = self
            .redis
            .clone()
            .exists(Self::tombstone_key(account_id, resource_type))
            .await?;
        Ok(exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_formatting() {
        assert_eq!(BalanceCache::balance_key("u1", "credits"), "balance:u1:credits");
        assert_eq!(BalanceCache::idempotency_key("k1"), "idem:k1");
        assert_eq!(BalanceCache::tombstone_key("u1", "credits"), "deleted:u1:credits");
    }

    #[test]
    fn test_spend_outcome_decoding() {
        assert_eq!(
            SpendOutcome::from_reply(1, 70),
            Some(SpendOutcome::Success { new_balance: 70 })
        );
        assert_eq!(SpendOutcome::from_reply(0, 0), Some(SpendOutcome::AlreadyProcessed));
        assert_eq!(SpendOutcome::from_reply(-1, 0), Some(SpendOutcome::NotFound));
        assert_eq!(SpendOutcome::from_reply(-2, 3), Some(SpendOutcome::Insufficient));
        assert_eq!(SpendOutcome::from_reply(42, 0), None);
    }

    #[test]
    fn test_script_marker_ttl_matches_constant() {
        // The script sets the idempotency marker with a hardcoded EX.
        assert!(SPEND_SCRIPT.contains(&format!("'EX', {}", ttl::IDEMPOTENCY)));
    }
}
