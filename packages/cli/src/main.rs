// ABOUTME: Sammati server entry point
// ABOUTME: Wires storage, engine, outbound worker, scheduler and the HTTP API

use axum::http::Method;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

mod config;

use config::Config;
use sammati_api::{create_router, AppState};
use sammati_consents::ConsentEngine;
use sammati_fiduciaries::FiduciaryStorage;
use sammati_notify::{HttpNotifier, OutboundQueue, WebhookLogStorage};
use sammati_scheduler::{Scheduler, SchedulerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sammati=info,sammatid=info".into()),
        )
        .init();

    let config = Config::from_env()?;

    info!("Starting sammatid on port {}", config.port);

    let pool = sammati_storage::connect(&config.database_path).await?;

    // Dispatcher side: webhook notifier behind the outbound queue. The
    // engine only ever talks to the queue.
    let notifier = Arc::new(HttpNotifier::new(
        FiduciaryStorage::new(pool.clone()),
        WebhookLogStorage::new(pool.clone()),
    ));
    let (queue, worker) = OutboundQueue::new(notifier);
    worker.spawn();

    let engine = Arc::new(ConsentEngine::new(
        pool.clone(),
        queue,
        config.notice_base_url.clone(),
    ));

    let scheduler = Arc::new(Scheduler::new(
        engine.clone(),
        SchedulerConfig {
            reminder_interval_secs: config.reminder_interval_secs,
            expiry_interval_secs: config.expiry_interval_secs,
            reminder_window_days: config.reminder_window_days,
        },
    ));
    scheduler.start().await;

    let cors = CorsLayer::new()
        .allow_origin(config.cors_origin.parse::<axum::http::HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    let app = create_router(AppState::new(pool, engine, scheduler)).layer(cors);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
