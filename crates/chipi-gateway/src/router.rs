use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::SharedState;
use crate::{api, auth, pages};

/// Build the main application router with all routes.
pub fn build_router(state: SharedState) -> Router {
    let static_dir = state.config.gateway.static_dir.clone();

    let guarded = Router::new()
        .route("/dashboard", get(pages::dashboard))
        .route("/chat", get(pages::chat))
        .route("/passwords", get(pages::passwords))
        .route("/reminders", get(pages::reminders))
        .route("/contacts", get(pages::contacts))
        .route("/api/chat", post(api::chat))
        .route("/api/chat/history", get(api::chat_history))
        .route("/api/chat/search", get(api::chat_search))
        .route(
            "/api/passwords",
            get(api::list_passwords).post(api::save_password),
        )
        .route("/api/get-passwords", get(api::list_passwords))
        .route(
            "/api/reminders",
            get(api::list_reminders).post(api::create_reminder),
        )
        .route("/api/get-reminders", get(api::list_reminders))
        .route(
            "/api/contacts",
            get(api::list_contacts).post(api::save_contact),
        )
        .route("/api/get-contacts", get(api::list_contacts))
        .route("/api/clear-chat", post(api::clear_chat))
        .route("/api/user/preferences", get(api::user_preferences))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_login,
        ));

    Router::new()
        .route("/", get(auth::index))
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/register", get(auth::register_page).post(auth::register))
        .route("/logout", get(auth::logout))
        .route("/recovery", get(pages::recovery))
        .route("/health", get(api::health))
        .route("/api/status", get(api::status))
        .merge(guarded)
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
