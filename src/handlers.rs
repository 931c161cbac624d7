use crate::errors::LedgerError;
use crate::metrics;
use crate::models::{AccountQuery, CreateAccountRequest, RechargeRequest, SpendRequest};
use crate::services::LedgerService;
use actix_web::{web, HttpResponse};
use serde_json::json;
use std::sync::Arc;

/// Health check endpoint
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

/// Create a (account, resource) balance
pub async fn create_account(
    service: web::Data<Arc<LedgerService>>,
    request: web::Json<CreateAccountRequest>,
) -> Result<HttpResponse, LedgerError> {
    service.create_account(request.into_inner()).await?;
    Ok(HttpResponse::Created().json(json!({"status": "created"})))
}

/// Soft-delete a balance
pub async fn delete_account(
    service: web::Data<Arc<LedgerService>>,
    query: web::Query<AccountQuery>,
) -> Result<HttpResponse, LedgerError> {
    service
        .delete_account(&query.account_id, &query.resource_type)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Read the live balance
pub async fn get_balance(
    service: web::Data<Arc<LedgerService>>,
    query: web::Query<AccountQuery>,
) -> Result<HttpResponse, LedgerError> {
    let balance = service
        .get_balance(&query.account_id, &query.resource_type)
        .await?;
    Ok(HttpResponse::Ok().json(json!({"balance": balance})))
}

/// Credit an account
pub async fn recharge(
    service: web::Data<Arc<LedgerService>>,
    request: web::Json<RechargeRequest>,
) -> Result<HttpResponse, LedgerError> {
    service.recharge(request.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({"status": "success"})))
}

/// Debit an account
pub async fn spend(
    service: web::Data<Arc<LedgerService>>,
    request: web::Json<SpendRequest>,
) -> Result<HttpResponse, LedgerError> {
    let result = service.spend(request.into_inner()).await?;
    Ok(HttpResponse::Ok().json(result))
}

/// Prometheus metrics endpoint
pub async fn metrics_endpoint() -> HttpResponse {
    match metrics::metrics_handler() {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(body),
        Err(e) => HttpResponse::InternalServerError().json(json!({
            "error": "Failed to gather metrics",
            "details": e.to_string()
        })),
    }
}

/// Configure routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/accounts", web::post().to(create_account))
        .route("/accounts", web::delete().to(delete_account))
        .route("/balance", web::get().to(get_balance))
        .route("/recharge", web::post().to(recharge))
        .route("/spend", web::post().to(spend))
        .route("/metrics", web::get().to(metrics_endpoint));
}
