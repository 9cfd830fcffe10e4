use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use crate::config::DatabaseConfig;
use crate::error::{AppError, Result};
use std::time::Duration;

/// Creates a new database connection pool.
///
/// No connection is opened here; the first borrow connects.
pub fn create_pool(database: &DatabaseConfig) -> Result<Pool> {
    let mut cfg = Config::new();
    cfg.host = Some(database.host.clone());
    cfg.port = Some(database.port);
    cfg.user = Some(database.user.clone());
    cfg.password = Some(database.password.clone());
    cfg.dbname = Some(database.name.clone());
    cfg.ssl_mode = Some(database.ssl_mode.clone());

    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });

    cfg.pool = Some(PoolConfig {
        max_size: database.pool_size,
        timeouts: deadpool_postgres::Timeouts {
            wait: Some(Duration::from_secs(5)),
            create: Some(Duration::from_secs(2)),
            recycle: Some(Duration::from_secs(1)),
        },
        ..Default::default()
    });

    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(AppError::from)
}

/// Borrows one connection and runs a trivial query against it.
pub async fn verify_connection(pool: &Pool) -> Result<()> {
    let client = pool.get().await?;
    client.simple_query("SELECT 1").await?;
    tracing::info!("✅ Connected to database successfully");
    Ok(())
}
