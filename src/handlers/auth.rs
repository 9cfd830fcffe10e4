use axum::{
    extract::{rejection::FormRejection, State},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use minijinja::context;
use serde::Deserialize;
use tower_cookies::Cookies;

use crate::{
    error::Result,
    models::session::{Session, SessionContext},
    services::auth::{self as auth_service, Registration},
    state::AppState,
};

/// Shown on the login page after a successful registration.
pub const REGISTER_SUCCESS: &str = "Registration successful! Please log in with your account.";
/// Shown on the home page after a successful login.
pub const LOGIN_SUCCESS: &str = "Login successful!";

/// The home page form. Only carries the logout flag.
#[derive(Deserialize, Debug, Default)]
pub struct HomeForm {
    #[serde(default)]
    pub logout: String,
}

/// The registration form.
#[derive(Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub password: String,
}

/// The login form.
#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

fn to_login() -> Response {
    Redirect::to("/login").into_response()
}

/// Renders the home page and consumes the one-shot message.
fn render_home(state: &AppState, cookies: &Cookies, mut session: Session) -> Result<Response> {
    let message = session.take_message();
    let data = session.data();

    let page = state.views.render(
        "home.html",
        context! {
            first_name => data.first_name.as_deref().unwrap_or_default(),
            last_name => data.last_name.as_deref().unwrap_or_default(),
            message => &message,
        },
    )?;

    if message.is_some() {
        state.sessions.save(cookies, &session)?;
    }

    Ok(page.into_response())
}

/// Shows the home page to a logged-in browser.
#[axum::debug_handler]
pub async fn home(State(state): State<AppState>, cookies: Cookies) -> Result<Response> {
    let session = state.sessions.get(&cookies, SessionContext::Auth);
    if !session.data().is_authenticated() {
        tracing::debug!("Anonymous request for home, redirecting to login");
        return Ok(to_login());
    }

    render_home(&state, &cookies, session)
}

/// Handles form posts to the home page.
///
/// `logout=true` ends the session without touching the logout history.
#[axum::debug_handler]
pub async fn home_post(
    State(state): State<AppState>,
    cookies: Cookies,
    form: std::result::Result<Form<HomeForm>, FormRejection>,
) -> Result<Response> {
    let mut session = state.sessions.get(&cookies, SessionContext::Auth);
    let Some(user_id) = session.data().authenticated_user() else {
        return Ok(to_login());
    };

    let logout = form.map(|Form(form)| form.logout == "true").unwrap_or(false);
    if logout {
        session.invalidate();
        state.sessions.save(&cookies, &session)?;
        tracing::info!("👋 User {} logged out from home", user_id);
        return Ok(to_login());
    }

    render_home(&state, &cookies, session)
}

/// Shows the registration form.
pub async fn register_page(State(state): State<AppState>) -> Result<Html<String>> {
    state.views.render("register.html", context! {})
}

/// Handles user registration.
#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    cookies: Cookies,
    Form(form): Form<RegisterForm>,
) -> Result<Response> {
    tracing::info!("📝 Register attempt for username: {:?}", form.username);

    let registration = Registration {
        username: form.username,
        first_name: form.first_name,
        last_name: form.last_name,
        password: form.password,
    };
    auth_service::register_user(state.credentials.as_ref(), state.policy, &registration).await?;

    let mut notice = state.sessions.get(&cookies, SessionContext::Register);
    notice.set_message(REGISTER_SUCCESS);
    state.sessions.save(&cookies, &notice)?;

    Ok(to_login())
}

/// Shows the login form, along with a pending registration message.
pub async fn login_page(State(state): State<AppState>, cookies: Cookies) -> Result<Response> {
    let mut notice = state.sessions.get(&cookies, SessionContext::Register);
    let message = notice.take_message();

    let page = state.views.render("login.html", context! { message => &message })?;

    if message.is_some() {
        state.sessions.save(&cookies, &notice)?;
    }

    Ok(page.into_response())
}

/// Handles user login.
///
/// A rejected login leaves every session cookie untouched.
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    tracing::info!("🔐 Login attempt for username: {:?}", form.username);

    let user = auth_service::authenticate_user(
        state.credentials.as_ref(),
        state.policy,
        &form.username,
        &form.password,
    )
    .await?;

    let mut session = state.sessions.get(&cookies, SessionContext::Auth);
    session.set_user(&user);
    session.set_message(LOGIN_SUCCESS);
    state.sessions.save(&cookies, &session)?;

    tracing::info!("✅ User logged in: {}", user.id);
    Ok(Redirect::to("/").into_response())
}

/// Shows the logout confirmation page.
pub async fn logout_page(State(state): State<AppState>) -> Result<Html<String>> {
    state.views.render("logout.html", context! {})
}

/// Handles user logout.
///
/// The session is invalidated before the logout is recorded, and a failure
/// to record it does not change the response.
#[axum::debug_handler]
pub async fn logout(State(state): State<AppState>, cookies: Cookies) -> Result<Response> {
    let mut session = state.sessions.get(&cookies, SessionContext::Auth);
    let Some(user_id) = session.data().authenticated_user() else {
        tracing::debug!("Logout without a session, nothing to do");
        return Ok(to_login());
    };

    session.invalidate();
    state.sessions.save(&cookies, &session)?;
    tracing::info!("👋 Logout for user: {}", user_id);

    record_logout(&state, user_id).await;

    Ok(to_login())
}

async fn record_logout(state: &AppState, user_id: i32) {
    if let Err(e) = state.audit.ensure_table().await {
        tracing::error!("❌ Failed to create logout_history table: {}", e);
        return;
    }

    match state.audit.insert_logout(user_id).await {
        Ok(()) => tracing::debug!("Logout recorded for user: {}", user_id),
        Err(e) => tracing::error!("❌ Failed to save logout history for user {}: {}", user_id, e),
    }
}
