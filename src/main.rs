use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::{Any, CorsLayer}, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod db;
mod error;
mod memory;
mod models;
mod pathgen;
mod routes;
mod seed;
mod store;

use config::{Config, StoreKind};
use store::SharedStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "learnpath_server=info,tower_http=info".into())
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let store: SharedStore = match config.store {
        StoreKind::Postgres => {
            let url = config.database_url.as_deref().context("DATABASE_URL not set")?;
            let pool = db::connect(url).await?;
            // crate-relative path for sqlx migrations
            sqlx::migrate!("./migrations").run(&pool).await?;
            Arc::new(db::PgStore::new(pool))
        }
        StoreKind::Memory => {
            tracing::warn!("using in-memory store; data is lost on exit");
            Arc::new(memory::MemoryStore::new())
        }
    };

    if config.seed_catalog || config.store == StoreKind::Memory {
        seed::seed_if_empty(store.as_ref()).await?;
    }

    let state = routes::AppState::new(store, &config.default_user);
    let app = routes::router(state, config.static_dir.clone())
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(default_user=%config.default_user, "listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
