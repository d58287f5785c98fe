use std::sync::Arc;
use std::time::{Duration, Instant};

use chipi_agents::{Assistant, LearningEngine};
use chipi_common::UserId;
use chipi_config::AppConfig;
use chipi_db::Database;
use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

/// How often the cleanup task runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(300); // 5 minutes

/// Shared application state accessible from all request handlers.
pub struct AppState {
    pub config: AppConfig,
    pub db: Arc<Database>,
    pub assistant: Assistant,
    pub learning: LearningEngine,
    pub sessions: DashMap<String, SessionState>,
    session_ttl: Duration,
}

/// Server-side state behind one `chipi_session` cookie.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub id: String,
    pub user_id: UserId,
    pub phone: String,
    /// Set once the user's profile has been warmed after login.
    pub learning_loaded: bool,
    pub created_at: Instant,
    pub last_active: Instant,
}

impl AppState {
    pub fn new(config: AppConfig, db: Arc<Database>, assistant: Assistant) -> Self {
        let session_ttl = Duration::from_secs(config.gateway.session_timeout_secs);
        Self {
            config,
            learning: LearningEngine::new(Arc::clone(&db)),
            db,
            assistant,
            sessions: DashMap::new(),
            session_ttl,
        }
    }

    /// Start a logged-in session and return its id.
    pub fn create_session(&self, user_id: UserId, phone: &str) -> String {
        let id = Uuid::new_v4().to_string();
        let now = Instant::now();
        self.sessions.insert(
            id.clone(),
            SessionState {
                id: id.clone(),
                user_id,
                phone: phone.to_string(),
                learning_loaded: false,
                created_at: now,
                last_active: now,
            },
        );
        id
    }

    /// Look up a live session and mark it active. Expired sessions are
    /// removed and reported as missing.
    pub fn touch_session(&self, session_id: &str) -> Option<SessionState> {
        let now = Instant::now();
        let mut session = self.sessions.get_mut(session_id)?;
        if now.duration_since(session.last_active) > self.session_ttl {
            drop(session);
            self.sessions.remove(session_id);
            return None;
        }
        session.last_active = now;
        Some(session.value().clone())
    }

    pub fn mark_learning_loaded(&self, session_id: &str) {
        if let Some(mut session) = self.sessions.get_mut(session_id) {
            session.learning_loaded = true;
        }
    }

    pub fn end_session(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    /// Remove sessions idle longer than the configured timeout.
    pub fn cleanup_expired_sessions(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.sessions.retain(|_id, session| {
            if now.duration_since(session.last_active) > self.session_ttl {
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            info!("cleaned up {removed} expired sessions");
        }
        removed
    }

    /// Spawn a background task that periodically cleans up expired sessions.
    pub fn spawn_session_cleanup(self: &Arc<Self>) {
        let state = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                state.cleanup_expired_sessions();
            }
        });
    }
}

pub type SharedState = Arc<AppState>;
