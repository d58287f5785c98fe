use std::collections::BTreeMap;

use axum::Json;
use axum::extract::{Extension, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chipi_agents::Personalization;
use chipi_db::ConversationTurn;
use chipi_security::InputValidator;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::session::CurrentUser;
use crate::state::SharedState;

pub const MSG_MISSING_DATA: &str = "Faltan datos";
pub const MSG_EMPTY_MESSAGE: &str = "Mensaje vacío";
pub const MSG_MISSING_QUERY: &str = "Query de búsqueda requerida";

/// Exchanges sent to the model as context.
const CHAT_HISTORY_TURNS: usize = 10;
const DEFAULT_HISTORY_LIMIT: usize = 50;

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn message(text: &str) -> Response {
    Json(json!({ "message": text })).into_response()
}

/// Read helpers log store failures and answer with an empty list.
fn or_empty<T>(result: chipi_common::Result<Vec<T>>, what: &str) -> Vec<T> {
    result.unwrap_or_else(|e| {
        warn!("failed to load {what}: {e}");
        Vec::new()
    })
}

// --- Chat ---

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
}

/// POST /api/chat
pub async fn chat(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<ChatRequest>,
) -> Response {
    let text = InputValidator::sanitize(&body.message);
    if text.trim().is_empty() {
        return error(StatusCode::BAD_REQUEST, MSG_EMPTY_MESSAGE);
    }

    let history = or_empty(
        state.db.get_conversations(user.user_id, CHAT_HISTORY_TURNS),
        "chat history",
    );
    let personalization = state
        .learning
        .personalize(user.user_id, &text)
        .unwrap_or_else(|e| {
            warn!("personalization unavailable for user {}: {e}", user.user_id);
            Personalization::default()
        });

    let reply = state.assistant.reply(&text, &history, &personalization).await;
    debug!(
        "reply for user {} from {}",
        user.user_id,
        reply.source.as_str()
    );

    let context = json!({ "source": reply.source.as_str() });
    if let Err(e) =
        state
            .db
            .save_conversation_with_context(user.user_id, &text, &reply.text, Some(&context))
    {
        warn!("failed to save conversation: {e}");
    }
    if let Err(e) = state.learning.observe(user.user_id, &text) {
        warn!("failed to update usage signals: {e}");
    }

    Json(json!({ "response": reply.text })).into_response()
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Kept as text so a malformed value falls back to the default.
    pub limit: Option<String>,
    #[serde(default)]
    pub search: String,
}

/// GET /api/chat/history?limit=50&search=
pub async fn chat_history(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<HistoryQuery>,
) -> Json<serde_json::Value> {
    let limit = query
        .limit
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(DEFAULT_HISTORY_LIMIT);
    let mut conversations = or_empty(
        state.db.get_conversations(user.user_id, limit),
        "chat history",
    );

    if !query.search.is_empty() {
        let needle = query.search.to_lowercase();
        conversations.retain(|turn: &ConversationTurn| {
            turn.user_message.to_lowercase().contains(&needle)
                || turn.bot_response.to_lowercase().contains(&needle)
        });
    }

    Json(json!({ "conversations": conversations }))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// GET /api/chat/search?q=
pub async fn chat_search(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<SearchQuery>,
) -> Response {
    if query.q.is_empty() {
        return error(StatusCode::BAD_REQUEST, MSG_MISSING_QUERY);
    }
    let results = or_empty(
        state.db.search_conversations(user.user_id, &query.q),
        "search results",
    );
    Json(json!({ "results": results, "query": query.q })).into_response()
}

/// POST /api/clear-chat
pub async fn clear_chat(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
) -> Response {
    match state.db.clear_conversations(user.user_id) {
        Ok(removed) => {
            debug!("cleared {removed} conversations for user {}", user.user_id);
            if let Err(e) = state.learning.reset(user.user_id) {
                warn!("failed to reset learning state: {e}");
            }
            message("Chat limpiado correctamente")
        }
        Err(e) => {
            warn!("failed to clear chat: {e}");
            error(StatusCode::INTERNAL_SERVER_ERROR, "Error al limpiar el chat")
        }
    }
}

/// GET /api/user/preferences: what has been learned about the caller.
pub async fn user_preferences(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
) -> Response {
    match state.learning.state(user.user_id) {
        Ok(learned) => {
            let preferences: BTreeMap<&str, bool> = learned
                .signals
                .active_keys()
                .into_iter()
                .map(|key| (key, true))
                .collect();
            Json(json!({
                "preferences": preferences,
                "user_id": user.user_id,
                "profile": learned.profile.as_ref(),
                "style": learned.profile.style_hints(),
            }))
            .into_response()
        }
        Err(e) => {
            warn!("failed to load preferences: {e}");
            Json(json!({ "preferences": {}, "user_id": user.user_id })).into_response()
        }
    }
}

// --- Passwords ---

#[derive(Debug, Deserialize)]
pub struct NewPassword {
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub password: String,
}

/// GET /api/passwords and GET /api/get-passwords
pub async fn list_passwords(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
) -> Json<serde_json::Value> {
    let passwords = or_empty(state.db.get_passwords(user.user_id), "passwords");
    Json(json!({ "passwords": passwords }))
}

/// POST /api/passwords
pub async fn save_password(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<NewPassword>,
) -> Response {
    if body.service.is_empty() || body.password.is_empty() {
        return error(StatusCode::BAD_REQUEST, MSG_MISSING_DATA);
    }
    match state
        .db
        .save_password(user.user_id, &body.service, &body.password)
    {
        Ok(()) => message("Contraseña guardada correctamente"),
        Err(e) => {
            warn!("failed to save password: {e}");
            error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error al guardar la contraseña",
            )
        }
    }
}

// --- Reminders ---

#[derive(Debug, Deserialize)]
pub struct NewReminder {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub time: String,
}

/// GET /api/reminders and GET /api/get-reminders
pub async fn list_reminders(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
) -> Json<serde_json::Value> {
    let reminders = or_empty(state.db.get_reminders(user.user_id), "reminders");
    Json(json!({ "reminders": reminders }))
}

/// POST /api/reminders
pub async fn create_reminder(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<NewReminder>,
) -> Response {
    if body.text.is_empty() || body.time.is_empty() {
        return error(StatusCode::BAD_REQUEST, MSG_MISSING_DATA);
    }
    match state
        .db
        .create_reminder(user.user_id, &body.text, &body.time)
    {
        Ok(()) => message("Recordatorio creado correctamente"),
        Err(e) => {
            warn!("failed to create reminder: {e}");
            error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error al crear el recordatorio",
            )
        }
    }
}

// --- Contacts ---

#[derive(Debug, Deserialize)]
pub struct NewContact {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub relationship: String,
}

/// GET /api/contacts and GET /api/get-contacts
pub async fn list_contacts(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
) -> Json<serde_json::Value> {
    let contacts = or_empty(state.db.get_contacts(user.user_id), "contacts");
    Json(json!({ "contacts": contacts }))
}

/// POST /api/contacts
pub async fn save_contact(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<NewContact>,
) -> Response {
    if body.name.is_empty() || body.phone.is_empty() {
        return error(StatusCode::BAD_REQUEST, MSG_MISSING_DATA);
    }
    match state.db.save_contact(
        user.user_id,
        &body.name,
        &body.phone,
        Some(body.relationship.as_str()),
    ) {
        Ok(()) => message("Contacto guardado correctamente"),
        Err(e) => {
            warn!("failed to save contact: {e}");
            error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error al guardar el contacto",
            )
        }
    }
}

// --- Service ---

/// GET /health
pub async fn health() -> &'static str {
    "ok"
}

/// GET /api/status
pub async fn status(State(state): State<SharedState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "running",
        "app": state.config.app.name,
        "version": state.config.app.version,
        "llm_configured": state.assistant.has_provider(),
        "sessions": state.sessions.len(),
    }))
}
