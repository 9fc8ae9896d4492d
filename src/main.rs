// Giftledger server
// Balance and transfer ledger for the gift-wallet platform

mod auth;
mod database;
mod error;
mod events;
mod handlers;
mod ledger;
mod models;
mod notify;
mod sales;
mod wallet;
mod withdrawals;

use anyhow::Result;
use axum::{
    routing::{delete, get, post},
    Router,
};
use database::DbPool;
use notify::Notifier;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Application state shared across handlers
pub struct AppState {
    pub db: DbPool,
    pub notifier: Notifier,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("giftledger=info".parse().unwrap())
                .add_directive("sqlx=warn".parse().unwrap()),
        )
        .init();

    info!("Starting giftledger server");

    // Load configuration
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let push_url = std::env::var("PUSH_ENDPOINT_URL").ok();
    let server_port = std::env::var("PORT")
        .unwrap_or_else(|_| "4000".to_string())
        .parse::<u16>()?;

    info!("Configuration:");
    info!(
        "  Push endpoint: {}",
        push_url.as_deref().unwrap_or("(disabled)")
    );
    info!("  Server Port: {}", server_port);

    // Initialize database
    let db = database::Database::init(&database_url).await?;

    // Create app state
    let notifier = Notifier::new(db.clone(), push_url);
    let state = Arc::new(AppState { db, notifier });

    // Setup CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    let app = Router::new()
        .route("/health", get(handlers::health_check))
        // Identity
        .route("/users", post(handlers::create_user))
        .route("/admin/users/:id/role", post(handlers::set_role))
        // Wallet
        .route("/wallet", get(handlers::get_wallet))
        .route("/wallet/top_up", post(handlers::top_up))
        .route("/wallet/history", get(handlers::transfer_history))
        // Transfers
        .route("/transfers", post(handlers::create_transfer))
        // Events
        .route("/events", post(handlers::create_event))
        .route("/events/:id/balance", get(handlers::event_balance))
        .route("/events/:id/done", post(handlers::mark_event_done))
        .route("/events/:id", delete(handlers::delete_event))
        // Withdrawals
        .route("/withdrawals", post(handlers::request_withdrawal))
        .route("/withdrawals/:id/process", post(handlers::process_withdrawal))
        .route("/withdrawals/:id/fail", post(handlers::fail_withdrawal))
        // Gateways and vendor sales
        .route("/gateways", post(handlers::create_gateway))
        .route("/gateways/scan", post(handlers::scan_gateway))
        .route("/sales/:id/confirm", post(handlers::confirm_sale))
        .route("/sales/:id/issue_notes", post(handlers::issue_notes))
        // Notifications
        .route("/notifications", get(handlers::list_notifications))
        .route("/notifications/:id/read", post(handlers::read_notification))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr = format!("0.0.0.0:{}", server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("giftledger listening on {}", listener.local_addr()?);

    axum::serve(listener, app.into_make_service())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))
}
