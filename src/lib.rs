//! Resource-metering ledger engine.
//!
//! Decrements per-account balances under heavy concurrency while
//! guaranteeing no negative balances, exactly-once application of client
//! idempotency keys, and a durable audit trail of every successful spend.
//!
//! # Architecture
//!
//! - **Hot path**: an atomic Redis script serializes concurrent spends per
//!   (account, resource) key and deduplicates retries
//! - **Durable record**: Postgres holds balances and the append-only
//!   transactions table, fed asynchronously by the sync worker
//! - **Fan-out**: successful spends are published on `transactions.created`
//!   over NATS, or over a point-to-point gRPC bus

pub mod bus;
pub mod cache;
pub mod config;
pub mod database;
pub mod errors;
pub mod grpc;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod services;
pub mod worker;

pub use config::Config;
pub use errors::{LedgerError, Result};
pub use services::LedgerService;
