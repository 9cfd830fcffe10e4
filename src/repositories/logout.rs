use async_trait::async_trait;
use deadpool_postgres::Pool;

use crate::error::Result;

const CREATE_LOGOUT_HISTORY_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS logout_history (
        id SERIAL PRIMARY KEY,
        user_id INT NOT NULL,
        logout_time TIMESTAMP NOT NULL
    )
"#;

const INSERT_LOGOUT: &str = r#"
    INSERT INTO logout_history (user_id, logout_time)
    VALUES ($1, NOW())
"#;

/// Append-only record of logouts.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Creates the `logout_history` table if it does not exist yet.
    async fn ensure_table(&self) -> Result<()>;

    /// Records a logout for `user_id`, timestamped by the database clock.
    async fn insert_logout(&self, user_id: i32) -> Result<()>;
}

/// `AuditStore` backed by PostgreSQL.
#[derive(Clone)]
pub struct PgAuditStore {
    pool: Pool,
}

impl PgAuditStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn ensure_table(&self) -> Result<()> {
        let client = self.pool.get().await?;
        client.batch_execute(CREATE_LOGOUT_HISTORY_TABLE).await?;
        Ok(())
    }

    async fn insert_logout(&self, user_id: i32) -> Result<()> {
        let client = self.pool.get().await?;
        let statement = client.prepare_cached(INSERT_LOGOUT).await?;
        client.execute(&statement, &[&user_id]).await?;
        Ok(())
    }
}
