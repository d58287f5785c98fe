use axum::http::header::COOKIE;
use axum::http::{HeaderMap, HeaderValue};
use chipi_common::UserId;
use tracing::warn;

pub const SESSION_COOKIE: &str = "chipi_session";
/// One-shot notice shown on the next page render.
pub const FLASH_COOKIE: &str = "chipi_flash";

/// The logged-in user, attached to requests that passed the route guard.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub session_id: String,
    pub user_id: UserId,
    pub phone: String,
}

/// Value of the cookie `name`, if the request carries it.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

pub fn session_id(headers: &HeaderMap) -> Option<String> {
    read_cookie(headers, SESSION_COOKIE)
}

pub fn set_cookie(name: &str, value: &str) -> HeaderValue {
    cookie_header(format!("{name}={value}; HttpOnly; SameSite=Lax; Path=/"))
}

pub fn expire_cookie(name: &str) -> HeaderValue {
    cookie_header(format!(
        "{name}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0"
    ))
}

fn cookie_header(raw: String) -> HeaderValue {
    HeaderValue::from_str(&raw).unwrap_or_else(|e| {
        warn!("dropping unencodable Set-Cookie value: {e}");
        HeaderValue::from_static("")
    })
}
