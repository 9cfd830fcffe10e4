use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::Row;

use crate::{
    error::{AppError, Result},
    models::user::{NewUser, StoredCredentials, User},
};

const CREATE_USERS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS users (
        id SERIAL PRIMARY KEY,
        username VARCHAR(50) NOT NULL,
        first_name VARCHAR(200) NOT NULL,
        last_name VARCHAR(200) NOT NULL,
        password VARCHAR(120) NOT NULL
    )
"#;

const INSERT_USER: &str = r#"
    INSERT INTO users (username, first_name, last_name, password)
    VALUES ($1, $2, $3, $4)
"#;

const SELECT_BY_CREDENTIALS: &str = r#"
    SELECT id, username, first_name, last_name
    FROM users
    WHERE username = $1 AND password = $2
    LIMIT 1
"#;

const SELECT_BY_USERNAME: &str = r#"
    SELECT id, username, first_name, last_name, password
    FROM users
    WHERE username = $1
    ORDER BY id
"#;

/// Persistence for registered users.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Creates the `users` table if it does not exist yet.
    async fn ensure_table(&self) -> Result<()>;

    /// Inserts one row. No uniqueness is enforced.
    async fn insert_user(&self, user: &NewUser) -> Result<()>;

    /// Finds a user whose username and password both equal the given values.
    ///
    /// `Ok(None)` means no row matched; errors are store failures only.
    async fn find_by_credentials(&self, username: &str, password: &str) -> Result<Option<User>>;

    /// Every row registered under `username`, with the stored password.
    async fn find_by_username(&self, username: &str) -> Result<Vec<StoredCredentials>>;
}

/// A helper function to map a `tokio_postgres::Row` to a `User`.
fn row_to_user(row: &Row) -> Result<User> {
    Ok(User {
        id: row.try_get("id").map_err(|_| AppError::MissingData("id".to_string()))?,
        username: row.try_get("username").map_err(|_| AppError::MissingData("username".to_string()))?,
        first_name: row.try_get("first_name").map_err(|_| AppError::MissingData("first_name".to_string()))?,
        last_name: row.try_get("last_name").map_err(|_| AppError::MissingData("last_name".to_string()))?,
    })
}

fn row_to_credentials(row: &Row) -> Result<StoredCredentials> {
    Ok(StoredCredentials {
        user: row_to_user(row)?,
        password: row.try_get("password").map_err(|_| AppError::MissingData("password".to_string()))?,
    })
}

/// `CredentialStore` backed by PostgreSQL.
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: Pool,
}

impl PgCredentialStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn ensure_table(&self) -> Result<()> {
        let client = self.pool.get().await?;
        client.batch_execute(CREATE_USERS_TABLE).await?;
        Ok(())
    }

    async fn insert_user(&self, user: &NewUser) -> Result<()> {
        let client = self.pool.get().await?;
        let statement = client.prepare_cached(INSERT_USER).await?;
        client
            .execute(
                &statement,
                &[&user.username, &user.first_name, &user.last_name, &user.password],
            )
            .await?;
        tracing::debug!("User row inserted for username: {}", user.username);
        Ok(())
    }

    async fn find_by_credentials(&self, username: &str, password: &str) -> Result<Option<User>> {
        let client = self.pool.get().await?;
        let statement = client.prepare_cached(SELECT_BY_CREDENTIALS).await?;
        let row = client.query_opt(&statement, &[&username, &password]).await?;
        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn find_by_username(&self, username: &str) -> Result<Vec<StoredCredentials>> {
        let client = self.pool.get().await?;
        let statement = client.prepare_cached(SELECT_BY_USERNAME).await?;
        let rows = client.query(&statement, &[&username]).await?;
        rows.iter().map(row_to_credentials).collect()
    }
}
