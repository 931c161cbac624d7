use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use dotenv::dotenv;
use metering_engine::{
    bus::{EventBus, GrpcBus, NatsBus},
    cache::BalanceCache,
    config::Config,
    database::Database,
    grpc, handlers,
    services::LedgerService,
    worker::TransactionWorker,
};
use redis::aio::ConnectionManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let config = Config::from_env().expect("Failed to load configuration");
    config.validate().expect("Invalid configuration");

    info!("Starting metering engine");

    let db = Arc::new(
        Database::new(&config.database.url, config.database.max_connections)
            .await
            .expect("Failed to connect to database"),
    );
    db.run_migrations()
        .await
        .expect("Failed to run database migrations");

    let redis_client =
        redis::Client::open(config.redis.url.clone()).expect("Failed to create Redis client");
    let redis_conn = ConnectionManager::new(redis_client)
        .await
        .expect("Failed to connect to Redis");
    let cache = BalanceCache::new(redis_conn);

    // Bus wiring is resolved first so the handle can be injected into the
    // ledger core; the NATS connection is shared with the worker.
    let (bus, nats_client): (Arc<dyn EventBus>, Option<async_nats::Client>) =
        match config.bus.provider.as_str() {
            "rpc" => {
                let bus = GrpcBus::connect(&config.bus.rpc_addr, config.bus.buffer_size)
                    .await
                    .expect("Failed to connect to event receiver");
                (Arc::new(bus), None)
            }
            _ => {
                let bus = NatsBus::connect(&config.nats.url)
                    .await
                    .expect("Failed to connect to NATS");
                let client = bus.client();
                (Arc::new(bus), Some(client))
            }
        };

    let service = Arc::new(LedgerService::new(
        cache,
        db.clone(),
        bus,
        Duration::from_millis(config.request.timeout_ms),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // With the rpc provider the gRPC EventService receiver plays the worker
    // role, so no subscription loop is needed.
    if config.bus.worker_provider() == "broker" {
        let client = match &nats_client {
            Some(client) => client.clone(),
            None => NatsBus::connect(&config.nats.url)
                .await
                .expect("Failed to connect to NATS for the worker")
                .client(),
        };
        let worker = TransactionWorker::new(client, db.clone());
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = worker.run(shutdown).await {
                error!("Transaction worker error: {}", e);
            }
        });
    }

    let grpc_addr = format!("{}:{}", config.server.host, config.server.grpc_port)
        .parse()
        .expect("Invalid gRPC address");
    {
        let service = service.clone();
        let db = db.clone();
        tokio::spawn(async move {
            if let Err(e) = grpc::server::serve(grpc_addr, service, db).await {
                error!("gRPC server error: {}", e);
            }
        });
    }

    if config.server.api_enabled {
        info!(
            "HTTP API listening on {}:{}",
            config.server.host, config.server.port
        );

        HttpServer::new(move || {
            App::new()
                .wrap(Cors::permissive())
                .wrap(middleware::Logger::default())
                .wrap(middleware::NormalizePath::trim())
                .app_data(web::Data::new(service.clone()))
                .configure(handlers::configure_routes)
        })
        .bind((config.server.host.as_str(), config.server.port))?
        .run()
        .await?;
    } else {
        info!("HTTP API disabled");
        tokio::signal::ctrl_c().await?;
    }

    info!("Shutting down");
    let _ = shutdown_tx.send(true);

    Ok(())
}
