//! Keyword-driven user profile built from stored conversation history.
//!
//! The profile is a pure function of the history rows, so it can be cached by
//! the id of the newest conversation and rebuilt whenever that changes.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chipi_db::{ConversationRecord, ConversationTurn};
use chrono::{DateTime, Local, NaiveDateTime, Timelike};
use regex::Regex;
use serde::Serialize;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Replies shorter than this many words count towards `prefers_short_responses`.
const SHORT_REPLY_WORDS: usize = 20;

const TOPIC_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "medicina",
        &["medicina", "pastilla", "doctor", "hospital", "salud"],
    ),
    (
        "familia",
        &["hijo", "hija", "nieto", "familia", "esposo", "esposa"],
    ),
    (
        "seguridad",
        &["contraseña", "seguridad", "hack", "cuenta", "correo"],
    ),
    (
        "recordatorios",
        &["recordar", "recordatorio", "olvidar", "memoria"],
    ),
    (
        "tecnología",
        &["teléfono", "app", "aplicación", "internet", "wifi"],
    ),
];

const FORMAL_WORDS: &[&str] = &["por favor", "gracias", "quisiera"];
const EXAMPLE_WORDS: &[&str] = &["ejemplo", "ejemplos"];
const EMOTIONAL_WORDS: &[&str] = &["triste", "preocupado", "ansioso", "solo"];

const STOP_WORDS: &[&str] = &[
    "el", "la", "los", "las", "de", "en", "y", "o", "un", "una", "es", "son",
];

fn word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[a-záéíóúñ]+\b").expect("word pattern is valid"))
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Ratios in `[0, 1]` over the analysed rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CommunicationStyle {
    pub formality_level: f64,
    pub prefers_short_responses: f64,
    pub prefers_examples: f64,
    pub prefers_emotional_support: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    /// Category name to keyword hit count. Categories without hits are absent.
    pub topics: BTreeMap<String, u32>,
    /// Hour of day (0-23) to number of exchanges.
    pub usage_patterns: BTreeMap<u32, u32>,
    pub communication_style: CommunicationStyle,
    pub conversation_count: usize,
    pub last_analysis: DateTime<Local>,
}

impl UserProfile {
    pub fn analyze(history: &[ConversationRecord]) -> Self {
        let mut topics: BTreeMap<String, u32> = BTreeMap::new();
        let mut usage_patterns: BTreeMap<u32, u32> = BTreeMap::new();
        let mut formal = 0u32;
        let mut short = 0u32;
        let mut examples = 0u32;
        let mut emotional = 0u32;

        for record in history {
            let combined =
                format!("{} {}", record.user_message, record.bot_response).to_lowercase();
            for (topic, keywords) in TOPIC_KEYWORDS {
                let hits = keywords.iter().filter(|k| combined.contains(*k)).count() as u32;
                if hits > 0 {
                    *topics.entry((*topic).to_string()).or_default() += hits;
                }
            }

            if let Ok(at) = NaiveDateTime::parse_from_str(&record.timestamp, TIMESTAMP_FORMAT) {
                *usage_patterns.entry(at.hour()).or_default() += 1;
            }

            let user_message = record.user_message.to_lowercase();
            if contains_any(&user_message, FORMAL_WORDS) {
                formal += 1;
            }
            if record.bot_response.split_whitespace().count() < SHORT_REPLY_WORDS {
                short += 1;
            }
            if contains_any(&user_message, EXAMPLE_WORDS) {
                examples += 1;
            }
            if contains_any(&user_message, EMOTIONAL_WORDS) {
                emotional += 1;
            }
        }

        let total = history.len().max(1) as f64;
        Self {
            topics,
            usage_patterns,
            communication_style: CommunicationStyle {
                formality_level: f64::from(formal) / total,
                prefers_short_responses: f64::from(short) / total,
                prefers_examples: f64::from(examples) / total,
                prefers_emotional_support: f64::from(emotional) / total,
            },
            conversation_count: history.len(),
            last_analysis: Local::now(),
        }
    }

    pub fn is_personalized(&self) -> bool {
        self.conversation_count > 0
    }

    pub fn style_hints(&self) -> StyleHints {
        StyleHints::from_style(&self.communication_style)
    }

    /// The `limit` most frequent topics, ties broken alphabetically.
    pub fn top_topics(&self, limit: usize) -> Vec<(String, u32)> {
        let mut ranked: Vec<(String, u32)> = self
            .topics
            .iter()
            .map(|(topic, count)| (topic.clone(), *count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(limit);
        ranked
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Formal,
    Amigable,
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Formal => "formal",
            Self::Amigable => "amigable",
        }
    }
}

/// How a reply should be shaped for this user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StyleHints {
    pub max_length: u32,
    pub tone: Tone,
    pub include_examples: bool,
}

impl StyleHints {
    pub fn from_style(style: &CommunicationStyle) -> Self {
        Self {
            max_length: if style.prefers_short_responses > 0.6 {
                100
            } else {
                300
            },
            tone: if style.formality_level > 0.7 {
                Tone::Formal
            } else {
                Tone::Amigable
            },
            include_examples: style.prefers_examples > 0.5,
        }
    }

    /// Instruction appended to the system prompt.
    pub fn prompt_suffix(&self) -> String {
        let mut suffix = format!(
            "Usa un tono {} y responde en menos de {} palabras.",
            self.tone.as_str(),
            self.max_length
        );
        if self.include_examples {
            suffix.push_str(" Incluye ejemplos sencillos.");
        }
        suffix
    }
}

impl Default for StyleHints {
    fn default() -> Self {
        Self::from_style(&CommunicationStyle::default())
    }
}

/// History that relates to the current message.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContextualInfo {
    pub previous_topics: Vec<ConversationTurn>,
    pub suggested_topics: Vec<(String, u32)>,
}

impl ContextualInfo {
    pub fn is_empty(&self) -> bool {
        self.previous_topics.is_empty() && self.suggested_topics.is_empty()
    }
}

/// First three lowercase words of `message` that are not stop words.
pub fn extract_keywords(message: &str) -> Vec<String> {
    let lowered = message.to_lowercase();
    word_regex()
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|word| !STOP_WORDS.contains(word))
        .take(3)
        .map(str::to_string)
        .collect()
}
