use axum::{routing::get, Router};
use tower_cookies::CookieManagerLayer;
use tower_http::{
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{handlers, state::AppState};

/// Builds the application router.
pub fn build_router(state: AppState) -> Router {
    let static_dir = state.config.static_dir.clone();

    Router::new()
        .route("/", get(handlers::auth::home).post(handlers::auth::home_post))
        .route(
            "/register",
            get(handlers::auth::register_page).post(handlers::auth::register),
        )
        .route(
            "/login",
            get(handlers::auth::login_page).post(handlers::auth::login),
        )
        .route(
            "/logout",
            get(handlers::auth::logout_page).post(handlers::auth::logout),
        )
        .nest_service("/styles", ServeDir::new(static_dir.join("styles")))
        .route_service("/script.js", ServeFile::new(static_dir.join("script.js")))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default())
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(CookieManagerLayer::new())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::handlers::auth::{LOGIN_SUCCESS, REGISTER_SUCCESS};
    use crate::repositories::memory::{MemoryAuditStore, MemoryCredentialStore};
    use crate::services::auth::LOGIN_FAILED;

    /// A router plus a cookie jar that behaves like a browser.
    struct Browser {
        router: Router,
        credentials: Arc<MemoryCredentialStore>,
        audit: Arc<MemoryAuditStore>,
        jar: BTreeMap<String, String>,
    }

    struct Reply {
        status: StatusCode,
        location: Option<String>,
        set_cookies: Vec<String>,
        body: String,
    }

    impl Reply {
        fn sets_cookie(&self, name: &str) -> bool {
            self.set_cookies
                .iter()
                .any(|c| c.starts_with(&format!("{}=", name)))
        }

        fn expires_cookie(&self, name: &str) -> bool {
            self.set_cookies
                .iter()
                .any(|c| c.starts_with(&format!("{}=", name)) && c.contains("Max-Age=0"))
        }
    }

    impl Browser {
        fn new() -> Self {
            Self::with_config(Config::for_tests())
        }

        fn with_config(config: Config) -> Self {
            let credentials = Arc::new(MemoryCredentialStore::default());
            let audit = Arc::new(MemoryAuditStore::default());
            let state = AppState::with_stores(&config, credentials.clone(), audit.clone()).unwrap();
            Self {
                router: build_router(state),
                credentials,
                audit,
                jar: BTreeMap::new(),
            }
        }

        async fn send(&mut self, request: Request<Body>) -> Reply {
            let response: Response = self.router.clone().oneshot(request).await.unwrap();

            let status = response.status();
            let location = response
                .headers()
                .get(header::LOCATION)
                .map(|v| v.to_str().unwrap().to_string());
            let set_cookies: Vec<String> = response
                .headers()
                .get_all(header::SET_COOKIE)
                .iter()
                .map(|v| v.to_str().unwrap().to_string())
                .collect();

            for cookie in &set_cookies {
                let pair = cookie.split(';').next().unwrap();
                let (name, value) = pair.split_once('=').unwrap();
                if cookie.contains("Max-Age=0") {
                    self.jar.remove(name);
                } else {
                    self.jar.insert(name.to_string(), value.to_string());
                }
            }

            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            Reply {
                status,
                location,
                set_cookies,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            }
        }

        fn cookie_header(&self) -> String {
            self.jar
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; ")
        }

        async fn get(&mut self, path: &str) -> Reply {
            let request = Request::builder()
                .method("GET")
                .uri(path)
                .header(header::COOKIE, self.cookie_header())
                .body(Body::empty())
                .unwrap();
            self.send(request).await
        }

        async fn post(&mut self, path: &str, form: &str) -> Reply {
            let request = Request::builder()
                .method("POST")
                .uri(path)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .header(header::COOKIE, self.cookie_header())
                .body(Body::from(form.to_string()))
                .unwrap();
            self.send(request).await
        }

        async fn register(&mut self, username: &str, first: &str, last: &str, password: &str) -> Reply {
            let form = format!(
                "username={}&first_name={}&last_name={}&password={}",
                username, first, last, password
            );
            self.post("/register", &form).await
        }

        async fn login(&mut self, username: &str, password: &str) -> Reply {
            self.post("/login", &format!("username={}&password={}", username, password))
                .await
        }
    }

    #[tokio::test]
    async fn register_login_home_logout_scenario() {
        let mut browser = Browser::new();

        let reply = browser.register("alice", "Alice", "A", "pw1").await;
        assert_eq!(reply.status, StatusCode::SEE_OTHER);
        assert_eq!(reply.location.as_deref(), Some("/login"));
        assert!(reply.sets_cookie("register-session"));

        let reply = browser.get("/login").await;
        assert_eq!(reply.status, StatusCode::OK);
        assert!(reply.body.contains(REGISTER_SUCCESS));

        let reply = browser.login("alice", "pw1").await;
        assert_eq!(reply.status, StatusCode::SEE_OTHER);
        assert_eq!(reply.location.as_deref(), Some("/"));
        assert!(reply.sets_cookie("session-name"));

        let reply = browser.get("/").await;
        assert_eq!(reply.status, StatusCode::OK);
        assert!(reply.body.contains("Alice"));

        let reply = browser.login("alice", "wrong").await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        assert_eq!(reply.body, LOGIN_FAILED);

        let reply = browser.post("/logout", "").await;
        assert_eq!(reply.status, StatusCode::SEE_OTHER);
        assert_eq!(reply.location.as_deref(), Some("/login"));
        assert!(reply.expires_cookie("session-name"));
        assert_eq!(browser.audit.events().await, vec![1]);

        let reply = browser.get("/").await;
        assert_eq!(reply.status, StatusCode::SEE_OTHER);
        assert_eq!(reply.location.as_deref(), Some("/login"));
    }

    #[tokio::test]
    async fn home_requires_login() {
        let mut browser = Browser::new();

        let reply = browser.get("/").await;
        assert_eq!(reply.status, StatusCode::SEE_OTHER);
        assert_eq!(reply.location.as_deref(), Some("/login"));
        assert!(!reply.body.contains("Welcome"));

        let reply = browser.post("/", "logout=true").await;
        assert_eq!(reply.status, StatusCode::SEE_OTHER);
        assert_eq!(reply.location.as_deref(), Some("/login"));
        assert!(reply.set_cookies.is_empty());
    }

    #[tokio::test]
    async fn wrong_password_is_rejected_without_touching_the_session() {
        let mut browser = Browser::new();
        browser.register("alice", "Alice", "A", "pw1").await;
        browser.register("bob", "Bob", "B", "pw2").await;
        browser.login("alice", "pw1").await;

        let reply = browser.login("bob", "pw1").await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        assert!(reply.set_cookies.is_empty());

        let reply = browser.login("nobody", "pw1").await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        assert_eq!(reply.body, LOGIN_FAILED);

        let reply = browser.get("/").await;
        assert_eq!(reply.status, StatusCode::OK);
        assert!(reply.body.contains("Alice"));
    }

    #[tokio::test]
    async fn failed_login_creates_no_session() {
        let mut browser = Browser::new();
        browser.register("alice", "Alice", "A", "pw1").await;

        let reply = browser.login("alice", "nope").await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        assert!(!reply.sets_cookie("session-name"));

        let reply = browser.get("/").await;
        assert_eq!(reply.status, StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn logout_invalidates_even_when_audit_fails() {
        let mut browser = Browser::new();
        browser.register("alice", "Alice", "A", "pw1").await;
        browser.login("alice", "pw1").await;
        browser.audit.set_failing(true);

        let reply = browser.post("/logout", "").await;
        assert_eq!(reply.status, StatusCode::SEE_OTHER);
        assert_eq!(reply.location.as_deref(), Some("/login"));
        assert!(reply.expires_cookie("session-name"));
        assert!(browser.audit.attempts() > 0);
        assert!(browser.audit.events().await.is_empty());

        let reply = browser.get("/").await;
        assert_eq!(reply.location.as_deref(), Some("/login"));
    }

    #[tokio::test]
    async fn second_logout_is_a_no_op() {
        let mut browser = Browser::new();
        browser.register("alice", "Alice", "A", "pw1").await;
        browser.login("alice", "pw1").await;

        browser.post("/logout", "").await;
        let attempts = browser.audit.attempts();

        let reply = browser.post("/logout", "").await;
        assert_eq!(reply.status, StatusCode::SEE_OTHER);
        assert_eq!(reply.location.as_deref(), Some("/login"));
        assert!(reply.set_cookies.is_empty());
        assert_eq!(browser.audit.attempts(), attempts);
        assert_eq!(browser.audit.events().await.len(), 1);
    }

    #[tokio::test]
    async fn home_post_logout_skips_the_audit_table() {
        let mut browser = Browser::new();
        browser.register("alice", "Alice", "A", "pw1").await;
        browser.login("alice", "pw1").await;

        let reply = browser.post("/", "logout=true").await;
        assert_eq!(reply.status, StatusCode::SEE_OTHER);
        assert_eq!(reply.location.as_deref(), Some("/login"));
        assert!(reply.expires_cookie("session-name"));
        assert_eq!(browser.audit.attempts(), 0);

        let reply = browser.get("/").await;
        assert_eq!(reply.location.as_deref(), Some("/login"));
    }

    #[tokio::test]
    async fn home_post_without_logout_renders_home() {
        let mut browser = Browser::new();
        browser.register("alice", "Alice", "A", "pw1").await;
        browser.login("alice", "pw1").await;

        let reply = browser.post("/", "logout=false").await;
        assert_eq!(reply.status, StatusCode::OK);
        assert!(reply.body.contains("Alice"));
    }

    #[tokio::test]
    async fn login_message_is_shown_once() {
        let mut browser = Browser::new();
        browser.register("alice", "Alice", "A", "pw1").await;
        browser.login("alice", "pw1").await;

        let reply = browser.get("/").await;
        assert!(reply.body.contains(LOGIN_SUCCESS));

        let reply = browser.get("/").await;
        assert_eq!(reply.status, StatusCode::OK);
        assert!(!reply.body.contains(LOGIN_SUCCESS));
    }

    #[tokio::test]
    async fn registration_accepts_empty_fields() {
        let mut browser = Browser::new();

        let reply = browser.register("", "", "", "").await;
        assert_eq!(reply.status, StatusCode::SEE_OTHER);
        assert_eq!(reply.location.as_deref(), Some("/login"));

        let reply = browser.post("/register", "").await;
        assert_eq!(reply.status, StatusCode::SEE_OTHER);
        assert_eq!(browser.credentials.len().await, 2);
    }

    #[tokio::test]
    async fn duplicate_usernames_are_accepted() {
        let mut browser = Browser::new();
        browser.register("alice", "Alice", "A", "pw1").await;
        let reply = browser.register("alice", "Other", "Alice", "pw2").await;

        assert_eq!(reply.status, StatusCode::SEE_OTHER);
        assert_eq!(browser.credentials.len().await, 2);
    }

    #[tokio::test]
    async fn store_failures_surface_as_500() {
        let mut browser = Browser::new();
        browser.credentials.set_failing(true);

        let reply = browser.register("alice", "Alice", "A", "pw1").await;
        assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!reply.sets_cookie("register-session"));

        let reply = browser.login("alice", "pw1").await;
        assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(reply.body, "Internal Server Error");
    }

    #[tokio::test]
    async fn tampered_session_cookie_is_anonymous() {
        let mut browser = Browser::new();
        browser.register("alice", "Alice", "A", "pw1").await;
        browser.login("alice", "pw1").await;

        let value = browser.jar.get("session-name").cloned().unwrap();
        let mut forged = value.clone();
        let last = forged.pop().unwrap();
        forged.push(if last == 'A' { 'B' } else { 'A' });
        browser.jar.insert("session-name".to_string(), forged);

        let reply = browser.get("/").await;
        assert_eq!(reply.status, StatusCode::SEE_OTHER);
        assert_eq!(reply.location.as_deref(), Some("/login"));
    }

    #[tokio::test]
    async fn cookie_signed_with_another_secret_is_rejected() {
        let mut first = Browser::new();
        first.register("alice", "Alice", "A", "pw1").await;
        first.login("alice", "pw1").await;

        let mut config = Config::for_tests();
        config.session_secret = zeroize::Zeroizing::new(b"rotated-secret".to_vec());
        let mut second = Browser::with_config(config);
        second.jar = first.jar.clone();

        let reply = second.get("/").await;
        assert_eq!(reply.location.as_deref(), Some("/login"));
    }

    #[tokio::test]
    async fn session_cookie_attributes() {
        let mut browser = Browser::new();
        browser.register("alice", "Alice", "A", "pw1").await;
        let reply = browser.login("alice", "pw1").await;

        let cookie = reply
            .set_cookies
            .iter()
            .find(|c| c.starts_with("session-name="))
            .unwrap();
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Path=/"));
        assert!(!cookie.contains("Secure"));
    }

    #[tokio::test]
    async fn form_pages_render() {
        let mut browser = Browser::new();

        for path in ["/register", "/login", "/logout"] {
            let reply = browser.get(path).await;
            assert_eq!(reply.status, StatusCode::OK, "GET {}", path);
            assert!(reply.body.contains("<form"), "GET {}", path);
        }
    }

    #[tokio::test]
    async fn static_assets_are_served() {
        let mut browser = Browser::new();

        let reply = browser.get("/styles/style.css").await;
        assert_eq!(reply.status, StatusCode::OK);

        let reply = browser.get("/script.js").await;
        assert_eq!(reply.status, StatusCode::OK);
        assert!(reply.body.contains("showPopup"));
    }

    #[tokio::test]
    async fn hardened_mode_rejects_weak_registrations() {
        let mut config = Config::for_tests();
        config.hardening = true;
        let mut browser = Browser::with_config(config);

        let reply = browser.register("", "Alice", "A", "pw1").await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(browser.credentials.len().await, 0);

        let reply = browser.register("alice", "Alice", "A", "long-password").await;
        assert_eq!(reply.status, StatusCode::SEE_OTHER);

        let reply = browser.register("alice", "Alice", "A", "long-password").await;
        assert_eq!(reply.status, StatusCode::CONFLICT);

        let reply = browser.login("alice", "long-password").await;
        assert_eq!(reply.status, StatusCode::SEE_OTHER);
        assert_eq!(reply.location.as_deref(), Some("/"));
    }
}
