//! Event bus back-ends behind one publish contract.
//!
//! The broker back-end (NATS) gives at-least-once delivery to competing
//! consumer groups. The rpc back-end forwards to a single remote receiver
//! through a bounded in-memory buffer and is best-effort by construction:
//! a full buffer or a failed RPC drops the event with a warning.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tonic::transport::Channel;
use tracing::{error, info, warn};

use crate::errors::{LedgerError, Result};
use crate::grpc::proto::event_service_client::EventServiceClient;
use crate::grpc::proto::EventRequest;
use crate::metrics;

/// Topic carrying successful spends from the hot path to the sync worker.
pub const TRANSACTIONS_CREATED: &str = "transactions.created";

/// Publish contract shared by both back-ends. Publication must not block on
/// consumer handling.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;
}

/// Broker-backed bus over a NATS connection.
pub struct NatsBus {
    client: async_nats::Client,
}

impl NatsBus {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| LedgerError::Bus(e.to_string()))?;

        info!("Connected to NATS at {}", url);
        Ok(NatsBus { client })
    }

    /// Underlying connection, shared with the subscribing worker.
    pub fn client(&self) -> async_nats::Client {
        self.client.clone()
    }
}

#[async_trait]
impl EventBus for NatsBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.client
            .publish(topic.to_string(), payload.into())
            .await
            .map_err(|e| LedgerError::Bus(e.to_string()))
    }
}

/// Point-to-point bus: a bounded buffer drained by one background dispatcher
/// that forwards each event to a remote `EventService` over gRPC.
pub struct GrpcBus {
    tx: mpsc::Sender<EventRequest>,
}

impl GrpcBus {
    pub async fn connect(addr: &str, buffer_size: usize) -> Result<Self> {
        let client = EventServiceClient::connect(addr.to_string())
            .await
            .map_err(|e| LedgerError::Bus(e.to_string()))?;

        info!("Connected to event receiver at {}", addr);

        let (tx, rx) = mpsc::channel(buffer_size);
        tokio::spawn(Self::dispatch(client, rx));

        Ok(GrpcBus { tx })
    }

    async fn dispatch(
        mut client: EventServiceClient<Channel>,
        mut rx: mpsc::Receiver<EventRequest>,
    ) {
        while let Some(request) = rx.recv().await {
            let topic = request.topic.clone();
            match client.publish(request).await {
                Ok(response) => {
                    let response = response.into_inner();
                    if !response.success {
                        error!(
                            topic = %topic,
                            error = %response.error_message,
                            "event receiver rejected publish"
                        );
                    }
                }
                Err(e) => {
                    // Not retried; the event is lost on this back-end.
                    error!(topic = %topic, error = %e, "async publish failed, dropping event");
                }
            }
        }
    }
}

#[async_trait]
impl EventBus for GrpcBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        let request = EventRequest {
            topic: topic.to_string(),
            payload,
        };

        match self.tx.try_send(request) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(topic, "event buffer full, dropping event");
                metrics::EVENTS_DROPPED_TOTAL.inc();
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(LedgerError::Bus("event dispatcher stopped".to_string()))
            }
        }
    }
}
