//! In-memory stand-ins for the PostgreSQL stores, used by tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    error::{AppError, Result},
    models::user::{NewUser, StoredCredentials, User},
    repositories::{logout::AuditStore, user::CredentialStore},
};

struct Row {
    user: User,
    password: String,
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    rows: Mutex<Vec<Row>>,
    fail: AtomicBool,
}

impl MemoryCredentialStore {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn stored_password(&self, username: &str) -> Option<String> {
        self.rows
            .lock()
            .await
            .iter()
            .find(|row| row.user.username == username)
            .map(|row| row.password.clone())
    }

    fn check(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Internal("credential store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn ensure_table(&self) -> Result<()> {
        self.check()
    }

    async fn insert_user(&self, user: &NewUser) -> Result<()> {
        self.check()?;
        let mut rows = self.rows.lock().await;
        let id = rows.len() as i32 + 1;
        rows.push(Row {
            user: User {
                id,
                username: user.username.clone(),
                first_name: user.first_name.clone(),
                last_name: user.last_name.clone(),
            },
            password: user.password.clone(),
        });
        Ok(())
    }

    async fn find_by_credentials(&self, username: &str, password: &str) -> Result<Option<User>> {
        self.check()?;
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .find(|row| row.user.username == username && row.password == password)
            .map(|row| row.user.clone()))
    }

    async fn find_by_username(&self, username: &str) -> Result<Vec<StoredCredentials>> {
        self.check()?;
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .filter(|row| row.user.username == username)
            .map(|row| StoredCredentials {
                user: row.user.clone(),
                password: row.password.clone(),
            })
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryAuditStore {
    events: Mutex<Vec<i32>>,
    attempts: AtomicUsize,
    fail: AtomicBool,
}

impl MemoryAuditStore {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Number of `ensure_table` + `insert_logout` calls, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub async fn events(&self) -> Vec<i32> {
        self.events.lock().await.clone()
    }

    fn check(&self) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Internal("audit store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn ensure_table(&self) -> Result<()> {
        self.check()
    }

    async fn insert_logout(&self, user_id: i32) -> Result<()> {
        self.check()?;
        self.events.lock().await.push(user_id);
        Ok(())
    }
}
