use std::collections::BTreeMap;

use serde::Serialize;

pub const PREFERS_REMINDERS: &str = "prefers_reminders";
pub const USES_PASSWORD_MANAGER: &str = "uses_password_manager";
pub const MANAGES_CONTACTS: &str = "manages_contacts";

/// Preference-table keys owned by the usage signals.
pub const SIGNAL_KEYS: [&str; 3] = [PREFERS_REMINDERS, USES_PASSWORD_MANAGER, MANAGES_CONTACTS];

const REMINDER_WORDS: &[&str] = &["recordatorio", "recordar", "alarma"];
const PASSWORD_WORDS: &[&str] = &["contraseña", "clave", "password"];
const CONTACT_WORDS: &[&str] = &["contacto", "familiar", "hijo", "hija"];

const REMINDER_TRIGGERS: &[&str] = &["recordar", "recordatorio"];
const PASSWORD_TRIGGERS: &[&str] = &["contraseña", "clave"];

pub const REMINDER_PROMPT: &str =
    "¿Quieres que te ayude a crear un recordatorio? Dime qué necesitas recordar y a qué hora.";
pub const PASSWORD_PROMPT: &str =
    "Puedo ayudarte con tus contraseñas. ¿Quieres guardar una nueva o ver las que tienes guardadas?";

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Per-user flags learned from what the user asks about. Flags only ever
/// switch on; clearing the chat resets them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageSignals {
    pub prefers_reminders: bool,
    pub uses_password_manager: bool,
    pub manages_contacts: bool,
}

impl UsageSignals {
    /// Fold one user message into the flags. Returns true if any flag changed.
    pub fn observe(&mut self, user_message: &str) -> bool {
        let before = *self;
        let lowered = user_message.to_lowercase();
        self.prefers_reminders |= contains_any(&lowered, REMINDER_WORDS);
        self.uses_password_manager |= contains_any(&lowered, PASSWORD_WORDS);
        self.manages_contacts |= contains_any(&lowered, CONTACT_WORDS);
        before != *self
    }

    pub fn from_messages<'a>(messages: impl IntoIterator<Item = &'a str>) -> Self {
        let mut signals = Self::default();
        for message in messages {
            signals.observe(message);
        }
        signals
    }

    /// Rebuild from stored preferences; only the literal `"true"` sets a flag.
    pub fn from_preferences(preferences: &BTreeMap<String, String>) -> Self {
        let flag = |key: &str| preferences.get(key).is_some_and(|v| v == "true");
        Self {
            prefers_reminders: flag(PREFERS_REMINDERS),
            uses_password_manager: flag(USES_PASSWORD_MANAGER),
            manages_contacts: flag(MANAGES_CONTACTS),
        }
    }

    /// Keys of the flags that are set, for persisting as `"true"`.
    pub fn active_keys(&self) -> Vec<&'static str> {
        [
            (PREFERS_REMINDERS, self.prefers_reminders),
            (USES_PASSWORD_MANAGER, self.uses_password_manager),
            (MANAGES_CONTACTS, self.manages_contacts),
        ]
        .into_iter()
        .filter_map(|(key, set)| set.then_some(key))
        .collect()
    }

    /// Scripted answer for a message that matches a learned habit.
    /// The reminder intent wins over the password intent.
    pub fn canned_reply(&self, message: &str) -> Option<&'static str> {
        let lowered = message.to_lowercase();
        if self.prefers_reminders && contains_any(&lowered, REMINDER_TRIGGERS) {
            return Some(REMINDER_PROMPT);
        }
        if self.uses_password_manager && contains_any(&lowered, PASSWORD_TRIGGERS) {
            return Some(PASSWORD_PROMPT);
        }
        None
    }
}
