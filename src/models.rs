use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Account creation request
#[derive(Debug, Deserialize, Serialize, validator::Validate)]
pub struct CreateAccountRequest {
    #[validate(length(min = 1, max = 255))]
    pub account_id: String,
    #[validate(length(min = 1, max = 50))]
    pub resource_type: String,
    #[validate(range(min = 0))]
    pub initial_amount: i64,
}

/// Spend request
#[derive(Debug, Clone, Deserialize, Serialize, validator::Validate)]
pub struct SpendRequest {
    #[validate(length(min = 1, max = 255))]
    pub account_id: String,
    #[validate(length(min = 1, max = 50))]
    pub resource_type: String,
    #[validate(range(min = 1))]
    pub amount: i64,
    #[validate(length(min = 1, max = 255))]
    pub idempotency_key: String,
}

/// Recharge request
#[derive(Debug, Deserialize, Serialize, validator::Validate)]
pub struct RechargeRequest {
    #[validate(length(min = 1, max = 255))]
    pub account_id: String,
    #[validate(length(min = 1, max = 50))]
    pub resource_type: String,
    #[validate(range(min = 1))]
    pub amount: i64,
}

/// Query parameters identifying one (account, resource) pair
#[derive(Debug, Deserialize)]
pub struct AccountQuery {
    pub account_id: String,
    pub resource_type: String,
}

/// Spend result returned to the caller
#[derive(Debug, Serialize, Deserialize)]
pub struct SpendResult {
    pub new_balance: i64,
    pub status: String,
}

/// Spend event published on `transactions.created` and folded into Postgres
/// by the sync worker. `amount` is the positive magnitude debited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpendEvent {
    pub account_id: String,
    pub resource_type: String,
    pub amount: i64,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

/// Balance row. `deleted_at` present means the account is tombstoned and
/// observationally absent; rows are never hard-deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Balance {
    pub account_id: String,
    pub resource_type: String,
    pub amount: i64,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Append-only transaction row, unique by idempotency key
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub account_id: String,
    pub resource_type: String,
    pub amount: i64,
    pub idempotency_key: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn test_spend_request_validation() {
        let valid = SpendRequest {
            account_id: "u1".into(),
            resource_type: "credits".into(),
            amount: 30,
            idempotency_key: "k1".into(),
        };
        assert!(valid.validate().is_ok());

        let zero_amount = SpendRequest { amount: 0, ..valid.clone() };
        assert!(zero_amount.validate().is_err());

        let negative_amount = SpendRequest { amount: -5, ..valid.clone() };
        assert!(negative_amount.validate().is_err());

        let empty_key = SpendRequest {
            idempotency_key: String::new(),
            ..valid
        };
        assert!(empty_key.validate().is_err());
    }

    #[test]
    fn test_create_account_allows_zero_initial_amount() {
        let req = CreateAccountRequest {
            account_id: "u1".into(),
            resource_type: "credits".into(),
            initial_amount: 0,
        };
        assert!(req.validate().is_ok());

        let negative = CreateAccountRequest {
            initial_amount: -1,
            ..req
        };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_spend_event_wire_format() {
        let event = SpendEvent {
            account_id: "u1".into(),
            resource_type: "credits".into(),
            amount: 30,
            idempotency_key: "k1".into(),
            created_at: Utc::now(),
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["account_id"], "u1");
        assert_eq!(value["resource_type"], "credits");
        assert_eq!(value["amount"], 30);
        assert_eq!(value["idempotency_key"], "k1");
        // RFC3339 timestamp
        assert!(value["created_at"].as_str().unwrap().contains('T'));

        let decoded: SpendEvent = serde_json::from_value(value).unwrap();
        assert_eq!(decoded.idempotency_key, event.idempotency_key);
        assert_eq!(decoded.amount, event.amount);
    }
}
