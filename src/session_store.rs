use base64::{Engine as _, engine::general_purpose};
use tower_cookies::cookie::time::{Duration, OffsetDateTime};
use tower_cookies::cookie::SameSite;
use tower_cookies::{Cookie, Cookies, Key};

use crate::{
    config::Config,
    crypto::signing::derive_cookie_key,
    error::{AppError, Result},
    models::session::{Session, SessionContext, SessionData},
};

/// Reads and writes sessions as signed cookies.
///
/// All state lives in the browser; nothing is kept server-side.
#[derive(Clone)]
pub struct SessionStore {
    key: Key,
    max_age_days: i64,
    secure: bool,
}

impl SessionStore {
    pub fn new(config: &Config) -> Self {
        Self {
            key: derive_cookie_key(&config.session_secret),
            max_age_days: config.session_duration_days,
            secure: config.secure_cookies,
        }
    }

    /// Loads the session for `context`.
    ///
    /// A missing, tampered or undecodable cookie yields an empty session.
    pub fn get(&self, cookies: &Cookies, context: SessionContext) -> Session {
        let data = cookies
            .signed(&self.key)
            .get(context.cookie_name())
            .and_then(|cookie| {
                let decoded = decode(cookie.value());
                if decoded.is_none() {
                    tracing::debug!("Discarding undecodable {} cookie", context.cookie_name());
                }
                decoded
            })
            .unwrap_or_default();

        Session::new(context, data)
    }

    /// Signs the session and queues it on the response.
    ///
    /// An invalidated session is written with an expiry in the past, which
    /// makes the browser drop it.
    pub fn save(&self, cookies: &Cookies, session: &Session) -> Result<()> {
        let name = session.context().cookie_name();

        let cookie = if session.is_invalidated() {
            let mut cookie = self.base_cookie(name, String::new());
            cookie.set_max_age(Duration::ZERO);
            cookie.set_expires(OffsetDateTime::now_utc() - Duration::days(365));
            cookie
        } else {
            let mut cookie = self.base_cookie(name, encode(session.data())?);
            cookie.set_max_age(Duration::days(self.max_age_days));
            cookie
        };

        cookies.signed(&self.key).add(cookie);
        tracing::debug!(
            "Session cookie {} queued (invalidated: {})",
            name,
            session.is_invalidated()
        );
        Ok(())
    }

    fn base_cookie(&self, name: &'static str, value: String) -> Cookie<'static> {
        let mut cookie = Cookie::new(name, value);
        cookie.set_http_only(true);
        cookie.set_same_site(SameSite::Lax);
        cookie.set_path("/");
        if self.secure {
            cookie.set_secure(true);
        }
        cookie
    }
}

fn encode(data: &SessionData) -> Result<String> {
    let json = sonic_rs::to_string(data)
        .map_err(|e| AppError::Session(format!("Session serialization failed: {}", e)))?;
    Ok(general_purpose::URL_SAFE_NO_PAD.encode(json))
}

fn decode(value: &str) -> Option<SessionData> {
    let bytes = general_purpose::URL_SAFE_NO_PAD.decode(value).ok()?;
    sonic_rs::from_slice(&bytes).ok()
}
