use std::sync::Arc;

use axum::Router;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use huddle_server::config::Config;
use huddle_server::routes::create_routes;
use huddle_server::services::{LogNotifier, NotificationDispatcher, Notifier, WebhookNotifier};
use huddle_server::state::AppState;
use huddle_server::store::{MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("huddle_server=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env().expect("Invalid configuration");

    let store: Arc<dyn Store> = match &config.database_url {
        Some(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(config.acquire_timeout)
                .connect(database_url)
                .await
                .expect("Failed to connect to database");

            tracing::info!("Successfully connected to database");

            sqlx::migrate!()
                .run(&pool)
                .await
                .expect("Failed to run migrations");

            tracing::info!("Migrations run successfully");
            Arc::new(PgStore::new(pool, config.lock_timeout))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-process store (data is not persisted)");
            Arc::new(MemoryStore::new(config.lock_timeout))
        }
    };

    let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
        Some(url) => {
            tracing::info!("Confirmations will be posted to {}", url);
            Arc::new(
                WebhookNotifier::new(url.as_str(), config.notify_timeout)
                    .expect("Failed to build notification client"),
            )
        }
        None => Arc::new(LogNotifier),
    };
    let notifications = NotificationDispatcher::spawn(
        notifier,
        config.notify_queue_depth,
        config.notify_max_in_flight,
    );

    let app: Router = create_routes(
        AppState::new(store, notifications),
        &config.cors_allowed_origins,
    );

    tracing::info!("🚀 Server running at http://{}", config.bind_addr);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app).await.expect("Server failed");
}
