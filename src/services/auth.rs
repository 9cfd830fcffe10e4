use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, ParamsBuilder,
};
use rand::{rngs::OsRng, RngCore};
use std::sync::OnceLock;
use zeroize::Zeroize;

use crate::error::{AppError, Result};
use crate::models::user::{NewUser, User};
use crate::repositories::user::CredentialStore;
use crate::validation::auth::{validate_name, validate_password, validate_username};

/// The memory cost for Argon2 in MB.
const ARGON2_MEMORY_MB: u32 = 19;
/// The number of iterations for Argon2.
const ARGON2_ITERATIONS: u32 = 3;
/// The parallelism factor for Argon2.
const ARGON2_PARALLELISM: u32 = 6;

/// Sent for every rejected login, whether or not the username exists.
pub const LOGIN_FAILED: &str = "Login failed. Try again.";

/// Password behind `DUMMY_HASH`. Never stored for any user.
const DUMMY_PASSWORD: &str = "unused-login-placeholder";

/// Checked when a username has no stored rows, so an unknown username costs
/// the same Argon2 work as a wrong password.
static DUMMY_HASH: OnceLock<Option<String>> = OnceLock::new();

#[cfg(test)]
static DUMMY_VERIFICATIONS: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

/// How credentials are checked and stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialPolicy {
    /// Accepts any input, stores passwords as given and matches them with
    /// plain string equality in the store.
    Plaintext,
    /// Validates input, rejects taken usernames and stores Argon2id hashes.
    Hardened,
}

impl CredentialPolicy {
    pub fn from_flag(hardening: bool) -> Self {
        if hardening {
            CredentialPolicy::Hardened
        } else {
            CredentialPolicy::Plaintext
        }
    }
}

/// The registration form fields, as submitted.
#[derive(Default)]
pub struct Registration {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.password.zeroize();
    }
}

/// Hashes a password using Argon2id.
fn hash_password(password: &str) -> Result<String> {
    let mut password_bytes = password.as_bytes().to_vec();

    let mut salt_bytes = [0u8; 16];
    OsRng.fill_bytes(&mut salt_bytes);

    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AppError::Internal(format!("Salt encoding error: {}", e)))?;

    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        ParamsBuilder::new()
            .m_cost(ARGON2_MEMORY_MB * 1024)
            .t_cost(ARGON2_ITERATIONS)
            .p_cost(ARGON2_PARALLELISM)
            .build()
            .map_err(|e| AppError::Internal(format!("Argon2 params: {}", e)))?,
    );

    let password_hash = argon2
        .hash_password(&password_bytes, &salt)
        .map_err(|e| AppError::Internal(format!("Argon2 hash error: {}", e)))?
        .to_string();

    password_bytes.zeroize();
    tracing::debug!("Password hashed successfully with Argon2");
    Ok(password_hash)
}

/// Verifies a password against a stored hash.
///
/// A stored value that is not a PHC hash string never matches.
fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(hash) else {
        tracing::debug!("Stored password is not a PHC hash, treating as mismatch");
        return false;
    };

    let mut password_bytes = password.as_bytes().to_vec();
    let result = Argon2::default()
        .verify_password(&password_bytes, &parsed_hash)
        .is_ok();
    password_bytes.zeroize();
    result
}

/// Returns the placeholder hash, computing it on first use.
pub fn dummy_hash() -> Option<&'static str> {
    DUMMY_HASH
        .get_or_init(|| match hash_password(DUMMY_PASSWORD) {
            Ok(hash) => Some(hash),
            Err(e) => {
                tracing::error!("❌ Failed to prepare placeholder password hash: {}", e);
                None
            }
        })
        .as_deref()
}

fn verify_against_dummy(password: &str) {
    #[cfg(test)]
    DUMMY_VERIFICATIONS.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

    if let Some(hash) = dummy_hash() {
        let _ = verify_password(password, hash);
    }
}

/// Stores a new user.
///
/// Under `Plaintext` nothing is checked: empty or duplicate values are
/// inserted as submitted.
pub async fn register_user(
    store: &dyn CredentialStore,
    policy: CredentialPolicy,
    registration: &Registration,
) -> Result<()> {
    tracing::debug!("📝 Registering user: {}", registration.username);

    store.ensure_table().await?;

    let password = match policy {
        CredentialPolicy::Plaintext => registration.password.clone(),
        CredentialPolicy::Hardened => {
            validate_username(&registration.username)?;
            validate_name("First name", &registration.first_name)?;
            validate_name("Last name", &registration.last_name)?;
            validate_password(&registration.password)?;

            if !store.find_by_username(&registration.username).await?.is_empty() {
                return Err(AppError::Conflict("Username is already taken".to_string()));
            }

            hash_password(&registration.password)?
        }
    };

    let new_user = NewUser {
        username: registration.username.clone(),
        first_name: registration.first_name.clone(),
        last_name: registration.last_name.clone(),
        password,
    };
    store.insert_user(&new_user).await?;

    tracing::info!("✅ User registered: {}", registration.username);
    Ok(())
}

/// Checks a username/password pair.
///
/// A mismatch and an unknown username both produce
/// `AppError::Authentication(LOGIN_FAILED)`.
pub async fn authenticate_user(
    store: &dyn CredentialStore,
    policy: CredentialPolicy,
    username: &str,
    password: &str,
) -> Result<User> {
    tracing::debug!("🔐 Authenticating user: {}", username);

    let user = match policy {
        CredentialPolicy::Plaintext => store.find_by_credentials(username, password).await?,
        CredentialPolicy::Hardened => {
            let candidates = store.find_by_username(username).await?;
            if candidates.is_empty() {
                verify_against_dummy(password);
                None
            } else {
                candidates
                    .iter()
                    .find(|candidate| verify_password(password, &candidate.password))
                    .map(|candidate| candidate.user.clone())
            }
        }
    };

    let user = user.ok_or_else(|| AppError::Authentication(LOGIN_FAILED.to_string()))?;

    tracing::info!("✅ User authenticated: {}", user.id);
    Ok(user)
}
