use axum::extract::{Form, Request, State};
use axum::http::header::{CONTENT_TYPE, SET_COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use chipi_common::Error;
use chipi_security::RegistrationForm;
use chipi_security::validation::MSG_MISSING_FIELDS;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::pages::{self, Flash};
use crate::session::{
    self, CurrentUser, FLASH_COOKIE, SESSION_COOKIE, expire_cookie, read_cookie, set_cookie,
};
use crate::state::SharedState;

pub const MSG_UNAUTHORIZED: &str = "Acceso no autorizado";
pub const MSG_BAD_CREDENTIALS: &str = "Número o contraseña incorrectos";
pub const MSG_PHONE_TAKEN: &str = "Este número ya está registrado";
pub const MSG_REGISTER_FAILED: &str = "Error al crear la cuenta";
pub const MSG_REGISTERED: &str = "Registro exitoso. Ya puedes iniciar sesión.";

/// Flash cookie value meaning "registration succeeded".
const FLASH_REGISTERED: &str = "registered";

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
}

/// GET /: dashboard for logged-in users, login page otherwise.
pub async fn index(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    let logged_in = session::session_id(&headers)
        .and_then(|id| state.touch_session(&id))
        .is_some();
    if logged_in {
        return pages::dashboard_page().into_response();
    }

    match read_cookie(&headers, FLASH_COOKIE).as_deref() {
        Some(FLASH_REGISTERED) => (
            [(SET_COOKIE, expire_cookie(FLASH_COOKIE))],
            pages::login_page(Some(Flash::success(MSG_REGISTERED))),
        )
            .into_response(),
        _ => pages::login_page(None).into_response(),
    }
}

/// GET /login
pub async fn login_page() -> impl IntoResponse {
    pages::login_page(None)
}

/// POST /login: JSON credentials, sets the session cookie on success.
pub async fn login(
    State(state): State<SharedState>,
    Json(body): Json<LoginRequest>,
) -> Response {
    let phone = body.phone.trim();
    let password = body.password.trim();
    if phone.is_empty() || password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": MSG_MISSING_FIELDS })),
        )
            .into_response();
    }

    let user = match state.db.validate_user(phone, password) {
        Ok(user) => user,
        Err(e) => {
            warn!("login lookup failed: {e}");
            None
        }
    };

    let Some(user) = user else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": MSG_BAD_CREDENTIALS })),
        )
            .into_response();
    };

    if let Err(e) = state.db.touch_last_login(user.id) {
        warn!("failed to record last login for user {}: {e}", user.id);
    }
    let session_id = state.create_session(user.id, phone);
    info!("user {} logged in", user.id);

    (
        [(SET_COOKIE, set_cookie(SESSION_COOKIE, &session_id))],
        Json(json!({ "message": "Login exitoso", "redirect": "/dashboard" })),
    )
        .into_response()
}

/// GET /register
pub async fn register_page() -> impl IntoResponse {
    pages::register_page(None)
}

/// POST /register: form submission; errors re-render the page with a notice.
pub async fn register(
    State(state): State<SharedState>,
    Form(body): Form<RegisterRequest>,
) -> Response {
    let form = RegistrationForm::new(&body.phone, &body.password, &body.confirm_password);
    if let Err(e) = form.validate() {
        let message = match e {
            Error::Validation(message) => message,
            other => other.to_string(),
        };
        return pages::register_page(Some(Flash::error(message))).into_response();
    }

    match state.db.user_exists(&form.phone) {
        Ok(true) => {
            return pages::register_page(Some(Flash::error(MSG_PHONE_TAKEN))).into_response();
        }
        Ok(false) => {}
        Err(e) => warn!("failed to check existing user: {e}"),
    }

    match state.db.create_user(&form.phone, &form.password) {
        Ok(true) => (
            [(SET_COOKIE, set_cookie(FLASH_COOKIE, FLASH_REGISTERED))],
            Redirect::to("/"),
        )
            .into_response(),
        Ok(false) => pages::register_page(Some(Flash::error(MSG_REGISTER_FAILED))).into_response(),
        Err(e) => {
            warn!("failed to create user: {e}");
            pages::register_page(Some(Flash::error(MSG_REGISTER_FAILED))).into_response()
        }
    }
}

/// GET /logout
pub async fn logout(State(state): State<SharedState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(id) = session::session_id(&headers) {
        state.end_session(&id);
    }
    (
        [(SET_COOKIE, expire_cookie(SESSION_COOKIE))],
        Redirect::to("/"),
    )
}

/// Route guard: rejects requests without a live session and warms the
/// user's learned profile on the first request after login.
pub async fn require_login(
    State(state): State<SharedState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(current) = session::session_id(request.headers())
        .and_then(|id| state.touch_session(&id))
    else {
        return unauthorized(request.headers());
    };

    if !current.learning_loaded {
        if let Err(e) = state.learning.load_user(current.user_id) {
            warn!("failed to load learning data for user {}: {e}", current.user_id);
        }
        state.mark_learning_loaded(&current.id);
    }

    request.extensions_mut().insert(CurrentUser {
        session_id: current.id,
        user_id: current.user_id,
        phone: current.phone,
    });
    next.run(request).await
}

fn unauthorized(headers: &HeaderMap) -> Response {
    if wants_json(headers) {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": MSG_UNAUTHORIZED })),
        )
            .into_response()
    } else {
        Redirect::to("/").into_response()
    }
}

/// JSON body or an XHR request.
fn wants_json(headers: &HeaderMap) -> bool {
    let is_json_body = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| {
            let mime = v.split(';').next().unwrap_or_default().trim();
            mime == "application/json" || mime.ends_with("+json")
        });
    let is_xhr = headers
        .get("x-requested-with")
        .is_some_and(|v| v.as_bytes() == b"XMLHttpRequest");
    is_json_body || is_xhr
}
