use std::collections::HashSet;
use std::sync::Arc;

use chipi_common::{Result, UserId};
use chipi_db::{ConversationTurn, Database};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info};

use crate::profile::{ContextualInfo, StyleHints, UserProfile, extract_keywords};
use crate::signals::{SIGNAL_KEYS, UsageSignals};

/// Rows scanned when rebuilding a profile.
const ANALYSIS_WINDOW: usize = 500;
const MAX_RELATED: usize = 3;
const MAX_SUGGESTED_TOPICS: usize = 3;

/// Everything learned about one user at a given point of their history.
#[derive(Debug, Clone)]
pub struct LearnedState {
    pub profile: Arc<UserProfile>,
    pub signals: UsageSignals,
}

/// Inputs that shape one reply.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Personalization {
    pub signals: UsageSignals,
    pub style: StyleHints,
    pub context: ContextualInfo,
    pub personalized: bool,
}

struct CachedState {
    latest_conversation: Option<i64>,
    state: LearnedState,
}

/// Per-user profile and usage signals, cached until the user's history changes.
pub struct LearningEngine {
    db: Arc<Database>,
    cache: DashMap<UserId, CachedState>,
}

impl LearningEngine {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            cache: DashMap::new(),
        }
    }

    /// Current state for `user_id`, rebuilt if a conversation was added or
    /// removed since the last call.
    pub fn state(&self, user_id: UserId) -> Result<LearnedState> {
        let latest = self.db.latest_conversation_id(user_id)?;
        if let Some(cached) = self.cache.get(&user_id)
            && cached.latest_conversation == latest
        {
            return Ok(cached.state.clone());
        }

        let history = self.db.get_complete_history(user_id, ANALYSIS_WINDOW, 0)?;
        let profile = UserProfile::analyze(&history);

        let stored = self.db.get_all_user_preferences(user_id)?;
        let mut signals = UsageSignals::from_preferences(&stored);
        let mut learned_new = false;
        for record in &history {
            learned_new |= signals.observe(&record.user_message);
        }
        if learned_new {
            self.persist_signals(user_id, &signals)?;
        }

        debug!(
            "rebuilt profile for user {user_id}: {} conversations, {} topics",
            profile.conversation_count,
            profile.topics.len()
        );

        let state = LearnedState {
            profile: Arc::new(profile),
            signals,
        };
        self.cache.insert(
            user_id,
            CachedState {
                latest_conversation: latest,
                state: state.clone(),
            },
        );
        Ok(state)
    }

    /// Warm the cache right after login.
    pub fn load_user(&self, user_id: UserId) -> Result<()> {
        let state = self.state(user_id)?;
        info!(
            "learning data loaded for user {user_id} ({} conversations)",
            state.profile.conversation_count
        );
        Ok(())
    }

    /// Style hints, related history and learned signals for answering `message`.
    pub fn personalize(&self, user_id: UserId, message: &str) -> Result<Personalization> {
        let state = self.state(user_id)?;
        let context = ContextualInfo {
            previous_topics: self.related_conversations(user_id, message)?,
            suggested_topics: state.profile.top_topics(MAX_SUGGESTED_TOPICS),
        };

        Ok(Personalization {
            signals: state.signals,
            style: state.profile.style_hints(),
            context,
            personalized: state.profile.is_personalized(),
        })
    }

    /// Fold a just-answered message into the stored signals.
    pub fn observe(&self, user_id: UserId, user_message: &str) -> Result<UsageSignals> {
        let stored = self.db.get_all_user_preferences(user_id)?;
        let mut signals = UsageSignals::from_preferences(&stored);
        if signals.observe(user_message) {
            self.persist_signals(user_id, &signals)?;
            self.invalidate(user_id);
        }
        Ok(signals)
    }

    /// Drop the cached state so the next call rebuilds it.
    pub fn invalidate(&self, user_id: UserId) {
        self.cache.remove(&user_id);
    }

    /// Forget everything learned about `user_id`. Other users are untouched.
    pub fn reset(&self, user_id: UserId) -> Result<()> {
        self.invalidate(user_id);
        let removed = self.db.delete_user_preferences(user_id, &SIGNAL_KEYS)?;
        debug!("reset learning state for user {user_id}, {removed} signals removed");
        Ok(())
    }

    fn persist_signals(&self, user_id: UserId, signals: &UsageSignals) -> Result<()> {
        for key in signals.active_keys() {
            self.db.save_user_preference(user_id, key, "true")?;
        }
        Ok(())
    }

    fn related_conversations(
        &self,
        user_id: UserId,
        message: &str,
    ) -> Result<Vec<ConversationTurn>> {
        let mut seen = HashSet::new();
        let mut related = Vec::new();
        for keyword in extract_keywords(message) {
            for turn in self.db.search_conversations(user_id, &keyword)? {
                if related.len() == MAX_RELATED {
                    return Ok(related);
                }
                if seen.insert(turn.id) {
                    related.push(turn);
                }
            }
        }
        Ok(related)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with_users(phones: &[&str]) -> (LearningEngine, Arc<Database>, Vec<UserId>) {
        let db = Arc::new(Database::in_memory().unwrap());
        let ids = phones
            .iter()
            .map(|phone| {
                db.create_user(phone, "secreto").unwrap();
                db.validate_user(phone, "secreto").unwrap().unwrap().id
            })
            .collect();
        (LearningEngine::new(Arc::clone(&db)), db, ids)
    }

    #[test]
    fn state_is_rebuilt_when_history_grows() {
        let (engine, db, ids) = engine_with_users(&["3001234567"]);
        let user = ids[0];

        let empty = engine.state(user).unwrap();
        assert!(!empty.profile.is_personalized());
        assert!(!empty.signals.prefers_reminders);

        db.save_conversation(user, "ponme un recordatorio", "Listo")
            .unwrap();
        let state = engine.state(user).unwrap();
        assert_eq!(state.profile.conversation_count, 1);
        assert!(state.signals.prefers_reminders);

        let cached = engine.state(user).unwrap();
        assert!(Arc::ptr_eq(&state.profile, &cached.profile));
    }

    #[test]
    fn learned_signals_are_persisted_as_preferences() {
        let (engine, db, ids) = engine_with_users(&["3001234567"]);
        let user = ids[0];

        let signals = engine.observe(user, "guarda mi contraseña").unwrap();
        assert!(signals.uses_password_manager);
        assert_eq!(
            db.get_user_preference(user, "uses_password_manager")
                .unwrap()
                .as_deref(),
            Some("true")
        );
    }

    #[test]
    fn reset_only_affects_one_user() {
        let (engine, db, ids) = engine_with_users(&["3001234567", "3007654321"]);
        let (alice, bob) = (ids[0], ids[1]);
        engine.observe(alice, "alarma a las 7").unwrap();
        engine.observe(bob, "alarma a las 9").unwrap();
        db.save_user_preference(alice, "theme", "dark").unwrap();

        engine.reset(alice).unwrap();

        assert!(!engine.state(alice).unwrap().signals.prefers_reminders);
        assert!(engine.state(bob).unwrap().signals.prefers_reminders);
        assert_eq!(
            db.get_user_preference(alice, "theme").unwrap().as_deref(),
            Some("dark")
        );
    }

    #[test]
    fn repeated_messages_are_distinct_related_turns() {
        let (engine, db, ids) = engine_with_users(&["3001234567"]);
        let user = ids[0];
        db.save_conversation(user, "llamar al doctor", "Anotado")
            .unwrap();
        db.save_conversation(user, "llamar al doctor", "Anotado")
            .unwrap();

        let related = engine
            .personalize(user, "doctor mañana")
            .unwrap()
            .context
            .previous_topics;
        assert_eq!(related.len(), 2);
        assert_ne!(related[0].id, related[1].id);
    }

    #[test]
    fn personalize_finds_related_history_and_topics() {
        let (engine, db, ids) = engine_with_users(&["3001234567"]);
        let user = ids[0];
        db.save_conversation(user, "cita con el doctor", "Anotado")
            .unwrap();
        db.save_conversation(user, "pastilla de la tarde", "A las 4")
            .unwrap();
        db.save_conversation(user, "hola", "¡Hola!").unwrap();

        let personalization = engine.personalize(user, "el doctor dijo algo").unwrap();
        assert!(personalization.personalized);
        assert_eq!(personalization.context.previous_topics.len(), 1);
        assert_eq!(
            personalization.context.previous_topics[0].user_message,
            "cita con el doctor"
        );
        assert_eq!(
            personalization.context.suggested_topics[0],
            ("medicina".to_string(), 2)
        );
    }
}
