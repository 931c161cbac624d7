use std::net::SocketAddr;
use std::sync::Arc;

use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{error, info, warn};

use crate::bus::TRANSACTIONS_CREATED;
use crate::database::Database;
use crate::grpc::proto::event_service_server::{EventService, EventServiceServer};
use crate::grpc::proto::ledger_service_server::{LedgerService as LedgerServiceRpc, LedgerServiceServer};
use crate::grpc::proto::{
    EventRequest, EventResponse, RechargeRequest, RechargeResponse, SpendRequest, SpendResponse,
};
use crate::models;
use crate::models::SpendEvent;
use crate::services::LedgerService;

/// gRPC front for the ledger core. Errors are carried in-band
/// (`success = false` + message) rather than as transport status codes.
pub struct LedgerGrpcServer {
    service: Arc<LedgerService>,
}

impl LedgerGrpcServer {
    pub fn new(service: Arc<LedgerService>) -> Self {
        LedgerGrpcServer { service }
    }
}

#[tonic::async_trait]
impl LedgerServiceRpc for LedgerGrpcServer {
    async fn spend(
        &self,
        request: Request<SpendRequest>,
    ) -> Result<Response<SpendResponse>, Status> {
        let req = request.into_inner();

        let result = self
            .service
            .spend(models::SpendRequest {
                account_id: req.account_id,
                resource_type: req.resource_type,
                amount: req.amount,
                idempotency_key: req.idempotency_key,
            })
            .await;

        let response = match result {
            Ok(res) => SpendResponse {
                success: true,
                new_balance: res.new_balance,
                status: res.status,
                error_message: String::new(),
            },
            Err(e) => SpendResponse {
                success: false,
                new_balance: 0,
                status: String::new(),
                error_message: e.to_string(),
            },
        };

        Ok(Response::new(response))
    }

    async fn recharge(
        &self,
        request: Request<RechargeRequest>,
    ) -> Result<Response<RechargeResponse>, Status> {
        let req = request.into_inner();

        let result = self
            .service
            .recharge(models::RechargeRequest {
                account_id: req.account_id,
                resource_type: req.resource_type,
                amount: req.amount,
            })
            .await;

        let response = match result {
            Ok(()) => RechargeResponse {
                success: true,
                status: "SUCCESS".to_string(),
                error_message: String::new(),
            },
            Err(e) => RechargeResponse {
                success: false,
                status: String::new(),
                error_message: e.to_string(),
            },
        };

        Ok(Response::new(response))
    }
}

/// Receiver side of the rpc bus back-end: plays the sync worker role by
/// applying published spend events straight to the durable store.
pub struct EventGrpcServer {
    db: Arc<Database>,
}

impl EventGrpcServer {
    pub fn new(db: Arc<Database>) -> Self {
        EventGrpcServer { db }
    }
}

#[tonic::async_trait]
impl EventService for EventGrpcServer {
    async fn publish(
        &self,
        request: Request<EventRequest>,
    ) -> Result<Response<EventResponse>, Status> {
        let req = request.into_inner();

        if req.topic != TRANSACTIONS_CREATED {
            warn!(topic = %req.topic, "publish for unknown topic, ignoring");
            return Ok(Response::new(EventResponse {
                success: false,
                error_message: format!("unknown topic: {}", req.topic),
            }));
        }

        let event: SpendEvent = match serde_json::from_slice(&req.payload) {
            Ok(event) => event,
            Err(e) => {
                error!(error = %e, "failed to decode published spend event");
                return Ok(Response::new(EventResponse {
                    success: false,
                    error_message: format!("invalid payload: {}", e),
                }));
            }
        };

        match self.db.apply_spend_event(&event).await {
            Ok(_) => Ok(Response::new(EventResponse {
                success: true,
                error_message: String::new(),
            })),
            Err(e) => {
                error!(
                    idempotency_key = %event.idempotency_key,
                    error = %e,
                    "failed to apply published spend event"
                );
                Ok(Response::new(EventResponse {
                    success: false,
                    error_message: e.to_string(),
                }))
            }
        }
    }
}

/// Serve both gRPC services until the process exits.
pub async fn serve(
    addr: SocketAddr,
    service: Arc<LedgerService>,
    db: Arc<Database>,
) -> Result<(), tonic::transport::Error> {
    info!("gRPC server listening on {}", addr);

    Server::builder()
        .add_service(LedgerServiceServer::new(LedgerGrpcServer::new(service)))
        .add_service(EventServiceServer::new(EventGrpcServer::new(db)))
        .serve(addr)
        .await
}
