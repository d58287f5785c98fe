//! Server-rendered pages. Templates live in `templates/` and are compiled in
//! by askama; the login and register pages carry an optional flash notice.

use askama::Template;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashKind {
    Error,
    Success,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flash {
    pub kind: FlashKind,
    pub message: String,
}

impl Flash {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Error,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Success,
            message: message.into(),
        }
    }

    pub fn css_class(&self) -> &'static str {
        match self.kind {
            FlashKind::Error => "flash-error",
            FlashKind::Success => "flash-success",
        }
    }
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub flash: Option<Flash>,
}

#[derive(Template)]
#[template(path = "register.html")]
pub struct RegisterTemplate {
    pub flash: Option<Flash>,
}

#[derive(Template)]
#[template(path = "recovery.html")]
pub struct RecoveryTemplate;

#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate;

#[derive(Template)]
#[template(path = "chat.html")]
pub struct ChatTemplate;

#[derive(Template)]
#[template(path = "passwords.html")]
pub struct PasswordsTemplate;

#[derive(Template)]
#[template(path = "reminders.html")]
pub struct RemindersTemplate;

#[derive(Template)]
#[template(path = "contacts.html")]
pub struct ContactsTemplate;

/// Render a template into an HTML response. A render failure is logged and
/// answered with a bare 500.
pub fn render<T: Template>(page: &T) -> Response {
    match page.render() {
        Ok(body) => Html(body).into_response(),
        Err(e) => {
            warn!("failed to render page: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn login_page(flash: Option<Flash>) -> Response {
    render(&LoginTemplate { flash })
}

pub fn register_page(flash: Option<Flash>) -> Response {
    render(&RegisterTemplate { flash })
}

pub fn dashboard_page() -> Response {
    render(&DashboardTemplate)
}

pub async fn recovery() -> Response {
    render(&RecoveryTemplate)
}

pub async fn dashboard() -> Response {
    dashboard_page()
}

pub async fn chat() -> Response {
    render(&ChatTemplate)
}

pub async fn passwords() -> Response {
    render(&PasswordsTemplate)
}

pub async fn reminders() -> Response {
    render(&RemindersTemplate)
}

pub async fn contacts() -> Response {
    render(&ContactsTemplate)
}
