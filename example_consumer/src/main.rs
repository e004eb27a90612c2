//! Example consumer: serves the APIs described by a JSON document over PostgreSQL.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Environment: `DATABASE_URL`, `CONFIG_PATH` (default `apis.json`), `BIND_ADDR`.

use restless_sdk::{load_from_path, HostApp, Manager, PgSession, Processors};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("restless_sdk=info")),
        )
        .init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/restless".into());
    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "apis.json".into());
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".into());

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    let host = HostApp::new();
    let manager = Manager::with_app(&host, Arc::new(PgSession::new(pool)), Processors::new())?;
    for (model, config) in load_from_path(&config_path).await?.resolve()? {
        let name = model.name.clone();
        let group = manager.create_api(model, config)?;
        tracing::info!(model = %name, collection = %group.collection_name(), "api created");
    }

    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("Example consumer listening on http://{}", listener.local_addr()?);
    axum::serve(listener, host.router()).await?;
    Ok(())
}
