use anyhow::Result;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;

use linkstat::app::{self, Services};
use linkstat::config::Config;
use linkstat::storage;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_env()?;
    info!("Loaded configuration");

    info!(
        "Using {:?} storage: {}",
        config.database.backend, config.database.url
    );
    let backend = storage::connect(&config.database).await?;
    info!("Database initialized successfully");

    let services = Services::new(&config, backend);
    let api_router = app::api_router(&config, &services);
    let redirect_router = app::redirect_router(&config, &services);

    info!(
        "Stats exports are written to {}",
        config.analytics.export_dir.display()
    );

    let api_addr = config.api_server.addr();
    let api_listener = tokio::net::TcpListener::bind(&api_addr).await?;
    info!("API server listening on http://{}", api_addr);

    let redirect_addr = config.redirect_server.addr();
    let redirect_listener = tokio::net::TcpListener::bind(&redirect_addr).await?;
    info!("Redirect server listening on http://{}", redirect_addr);

    // the redirect server needs the peer address for click attribution
    tokio::try_join!(
        axum::serve(api_listener, api_router),
        axum::serve(
            redirect_listener,
            redirect_router.into_make_service_with_connect_info::<SocketAddr>(),
        ),
    )?;

    Ok(())
}
