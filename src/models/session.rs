use serde::{Deserialize, Serialize};

use crate::models::user::User;

/// A named session namespace, each backed by its own cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionContext {
    /// Authentication state shared by the home, login and logout flows.
    Auth,
    /// Carries the registration success message over to the login page.
    Register,
}

impl SessionContext {
    /// The cookie name this context is stored under.
    pub fn cookie_name(self) -> &'static str {
        match self {
            SessionContext::Auth => "session-name",
            SessionContext::Register => "register-session",
        }
    }
}

/// The values a session cookie carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    /// Present and non-zero once the browser has logged in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// One-shot status message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SessionData {
    /// Returns the logged-in user id, if any.
    pub fn authenticated_user(&self) -> Option<i32> {
        self.user_id.filter(|id| *id != 0)
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated_user().is_some()
    }
}

/// A session loaded from (or about to be written to) one context's cookie.
#[derive(Debug, Clone)]
pub struct Session {
    context: SessionContext,
    data: SessionData,
    invalidated: bool,
}

impl Session {
    /// Wraps already-decoded values for `context`.
    pub fn new(context: SessionContext, data: SessionData) -> Self {
        Self {
            context,
            data,
            invalidated: false,
        }
    }

    pub fn context(&self) -> SessionContext {
        self.context
    }

    pub fn data(&self) -> &SessionData {
        &self.data
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalidated
    }

    /// Records `user` as the logged-in identity along with its display name.
    pub fn set_user(&mut self, user: &User) {
        self.data.user_id = Some(user.id);
        self.data.first_name = Some(user.first_name.clone());
        self.data.last_name = Some(user.last_name.clone());
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.data.message = Some(message.into());
    }

    /// Removes and returns the one-shot message.
    pub fn take_message(&mut self) -> Option<String> {
        self.data.message.take()
    }

    /// Marks the session for immediate expiry on the client. Takes effect on save.
    pub fn invalidate(&mut self) {
        self.invalidated = true;
        self.data = SessionData::default();
    }
}
