use std::net::SocketAddr;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod state;
mod db;
mod routes;
mod session_store;
mod views;

mod crypto {
    pub mod signing;
}

mod models {
    pub mod user;
    pub mod session;
}

mod repositories {
    pub mod user;
    pub mod logout;
    #[cfg(test)]
    pub mod memory;
}

mod services {
    pub mod auth;
}

mod handlers {
    pub mod auth;
}

mod validation {
    pub mod auth;
}

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!("✅ Configuration loaded successfully");

    let state = match AppState::new(&config).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("❌ Failed to connect to database: {}", e);
            return Err(e.into());
        }
    };
    tracing::info!("✅ AppState initialized");

    let app = routes::build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.bind_addr, config.port)
        .parse()
        .context("BIND_ADDR and PORT must form a socket address")?;
    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("👋 Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("❌ Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
