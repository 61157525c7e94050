//! Serve the resources under `CONFIG_PATH`.
//!
//! Run from repo root: `cargo run --example server`
//! Uses PostgreSQL when `DATABASE_URL` is set, the in-memory repository otherwise.

use resource_kit::{
    build_app_from_settings, load_from_path, resolve_all, resource_routers, AppState, InMemoryRepository,
    PgRepository, Repository, Settings,
};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("resource_kit=info")),
        )
        .init();

    let settings = Settings::from_env()?;
    let configs = load_from_path(&settings.config_path).await?;
    let descriptors = resolve_all(&configs, &settings.page)?;

    let routers = match &settings.database_url {
        Some(url) => {
            let pool = PgRepository::connect(url, 5).await?;
            resource_routers(descriptors, |d| Arc::new(PgRepository::new(pool.clone(), d)) as Arc<dyn Repository>)?
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory storage");
            resource_routers(descriptors, |d| Arc::new(InMemoryRepository::new(d)) as Arc<dyn Repository>)?
        }
    };
    for r in &routers {
        tracing::info!(resource = %r.descriptor().name, path = %r.descriptor().path_segment, "mounted");
    }

    let app = build_app_from_settings(AppState::new(routers), &settings);
    let listener = TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
