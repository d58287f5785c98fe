use std::sync::Arc;
use std::time::Duration;

use chipi_common::{Error, Result};
use chipi_config::LlmConfig;
use chipi_config::model::API_KEY_PREFIX;
use chipi_db::ConversationTurn;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::fallback;
use crate::learning::Personalization;
use crate::openrouter::OpenRouterProvider;
use crate::providers::{ChatMessage, LlmProvider, LlmRequest};

/// Which path produced a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplySource {
    Canned,
    Model,
    Fallback,
}

impl ReplySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Canned => "canned",
            Self::Model => "model",
            Self::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub source: ReplySource,
}

impl Reply {
    fn new(text: impl Into<String>, source: ReplySource) -> Self {
        Self {
            text: text.into(),
            source,
        }
    }
}

/// How many times to call the model and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Wait after the endpoint answered with an error status.
    pub status_backoff: Duration,
    /// Wait after the endpoint could not be reached.
    pub connection_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            status_backoff: Duration::from_millis(config.retry_backoff_ms),
            connection_backoff: Duration::from_millis(config.connection_backoff_ms),
        }
    }

    fn backoff_for(&self, error: &Error) -> Duration {
        match error {
            Error::Connection(_) => self.connection_backoff,
            _ => self.status_backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&LlmConfig::default())
    }
}

/// Turns a user message into a reply: canned intent, then the model with
/// retries, then the static fallback table. Never fails.
pub struct Assistant {
    provider: Option<Arc<dyn LlmProvider>>,
    model: String,
    system_prompt: String,
    max_tokens: u32,
    temperature: f64,
    retry: RetryPolicy,
}

impl Assistant {
    pub fn new(config: &LlmConfig, provider: Option<Arc<dyn LlmProvider>>) -> Self {
        Self {
            provider,
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            retry: RetryPolicy::from_config(config),
        }
    }

    /// Build the OpenRouter-backed assistant. A missing key, or one without
    /// the `sk-or-v1-` prefix, leaves the assistant on the fallback table.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let provider: Option<Arc<dyn LlmProvider>> = match config.api_key.as_deref() {
            Some(key) if key.starts_with(API_KEY_PREFIX) => {
                info!("model replies enabled ({})", config.model);
                Some(Arc::new(OpenRouterProvider::new(key, config)?))
            }
            Some(_) => {
                warn!("api key does not look like an OpenRouter key, using offline replies");
                None
            }
            None => {
                info!("no api key configured, using offline replies");
                None
            }
        };
        Ok(Self::new(config, provider))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn provider(&self) -> Option<&Arc<dyn LlmProvider>> {
        self.provider.as_ref()
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    pub async fn reply(
        &self,
        message: &str,
        history: &[ConversationTurn],
        personalization: &Personalization,
    ) -> Reply {
        if let Some(canned) = personalization.signals.canned_reply(message) {
            debug!("answered from learned intent");
            return Reply::new(canned, ReplySource::Canned);
        }

        let Some(provider) = &self.provider else {
            return Reply::new(fallback::respond(message), ReplySource::Fallback);
        };

        let request = self.build_request(message, history, personalization);
        match self.complete_with_retries(provider.as_ref(), &request).await {
            Ok(text) => Reply::new(text, ReplySource::Model),
            Err(e) => {
                warn!("model unavailable, using fallback reply: {e}");
                Reply::new(fallback::respond(message), ReplySource::Fallback)
            }
        }
    }

    fn build_request(
        &self,
        message: &str,
        history: &[ConversationTurn],
        personalization: &Personalization,
    ) -> LlmRequest {
        let mut messages = Vec::with_capacity(history.len() * 2 + 1);
        for turn in history {
            messages.push(ChatMessage::user(&turn.user_message));
            messages.push(ChatMessage::assistant(&turn.bot_response));
        }
        messages.push(ChatMessage::user(message));

        LlmRequest {
            model: self.model.clone(),
            messages,
            system: Some(self.system_prompt_for(history, personalization)),
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
        }
    }

    fn system_prompt_for(
        &self,
        history: &[ConversationTurn],
        personalization: &Personalization,
    ) -> String {
        let mut prompt = self.system_prompt.clone();
        if !personalization.personalized || history.is_empty() {
            return prompt;
        }

        prompt.push(' ');
        prompt.push_str(&personalization.style.prompt_suffix());

        let topics: Vec<&str> = personalization
            .context
            .suggested_topics
            .iter()
            .map(|(topic, _)| topic.as_str())
            .collect();
        if !topics.is_empty() {
            prompt.push_str(&format!(
                " Temas que le interesan al usuario: {}.",
                topics.join(", ")
            ));
        }
        prompt
    }

    async fn complete_with_retries(
        &self,
        provider: &dyn LlmProvider,
        request: &LlmRequest,
    ) -> Result<String> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match provider.complete(request).await {
                Ok(response) => return Ok(response.content),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!("model call failed (attempt {attempt}/{max_attempts}): {e}");
                    tokio::time::sleep(self.retry.backoff_for(&e)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ChatRole, LlmResponse};
    use crate::signals::{REMINDER_PROMPT, UsageSignals};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Replays scripted results and records every request it receives.
    struct ScriptedProvider {
        results: Mutex<VecDeque<Result<String>>>,
        requests: Mutex<Vec<LlmRequest>>,
    }

    impl ScriptedProvider {
        fn new(results: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn provider_id(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
            self.requests.lock().unwrap().push(request.clone());
            let next = self
                .results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::Agent("script exhausted".into())));
            next.map(|content| LlmResponse {
                content,
                model: "scripted".into(),
                usage: None,
                stop_reason: None,
            })
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }
    }

    fn no_wait() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            status_backoff: Duration::ZERO,
            connection_backoff: Duration::ZERO,
        }
    }

    fn assistant_with(provider: Arc<ScriptedProvider>) -> Assistant {
        let provider: Arc<dyn LlmProvider> = provider;
        Assistant::new(&LlmConfig::default(), Some(provider)).with_retry_policy(no_wait())
    }

    fn turn(user: &str, bot: &str) -> ConversationTurn {
        ConversationTurn {
            id: 0,
            user_message: user.into(),
            bot_response: bot.into(),
            timestamp: "2024-03-01 10:00:00".into(),
        }
    }

    fn upstream(status: u16) -> Error {
        Error::Upstream {
            status,
            body: String::new(),
        }
    }

    #[tokio::test]
    async fn learned_reminder_intent_skips_the_model() {
        let provider = ScriptedProvider::new(vec![Ok("no deberías verme".into())]);
        let assistant = assistant_with(Arc::clone(&provider));
        let personalization = Personalization {
            signals: UsageSignals::from_messages(["pon un recordatorio"]),
            ..Personalization::default()
        };

        let reply = assistant
            .reply("recordatorio", &[turn("pon un recordatorio", "Listo")], &personalization)
            .await;

        assert_eq!(reply, Reply::new(REMINDER_PROMPT, ReplySource::Canned));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn without_provider_uses_fallback_table() {
        let config = LlmConfig {
            api_key: Some("not-an-openrouter-key".into()),
            ..LlmConfig::default()
        };
        let assistant = Assistant::from_config(&config).unwrap();
        assert!(!assistant.has_provider());

        let reply = assistant
            .reply("hola", &[], &Personalization::default())
            .await;
        assert_eq!(reply.source, ReplySource::Fallback);
        assert!(reply.text.starts_with("¡Hola! Soy Chipi"));
    }

    #[tokio::test]
    async fn request_carries_history_pairs_and_style() {
        let provider = ScriptedProvider::new(vec![Ok("Con gusto".into())]);
        let assistant = assistant_with(Arc::clone(&provider));
        let personalization = Personalization {
            personalized: true,
            context: crate::profile::ContextualInfo {
                previous_topics: Vec::new(),
                suggested_topics: vec![("medicina".into(), 4)],
            },
            ..Personalization::default()
        };
        let history = vec![turn("hola", "¡Hola!"), turn("mi doctor", "Anotado")];

        let reply = assistant
            .reply("¿y mañana?", &history, &personalization)
            .await;
        assert_eq!(reply, Reply::new("Con gusto", ReplySource::Model));

        let requests = provider.requests.lock().unwrap();
        let request = &requests[0];
        let roles: Vec<ChatRole> = request.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                ChatRole::User,
                ChatRole::Assistant,
                ChatRole::User,
                ChatRole::Assistant,
                ChatRole::User
            ]
        );
        assert_eq!(request.messages[4].content, "¿y mañana?");
        assert_eq!(request.max_tokens, Some(1000));
        let system = request.system.as_deref().unwrap();
        assert!(system.starts_with("Eres Chipi"));
        assert!(system.contains("tono amigable"));
        assert!(system.contains("medicina"));
    }

    #[tokio::test]
    async fn first_turn_uses_plain_system_prompt() {
        let provider = ScriptedProvider::new(vec![Ok("Hola".into())]);
        let assistant = assistant_with(Arc::clone(&provider));
        assistant
            .reply("buenas", &[], &Personalization::default())
            .await;

        let requests = provider.requests.lock().unwrap();
        assert_eq!(
            requests[0].system.as_deref(),
            Some(LlmConfig::default().system_prompt.as_str())
        );
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let provider = ScriptedProvider::new(vec![
            Err(upstream(502)),
            Err(Error::Connection("reset".into())),
            Ok("Ya estoy aquí".into()),
        ]);
        let assistant = assistant_with(Arc::clone(&provider));

        let reply = assistant
            .reply("ayuda", &[], &Personalization::default())
            .await;
        assert_eq!(reply, Reply::new("Ya estoy aquí", ReplySource::Model));
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn three_failures_fall_back_to_static_reply() {
        let provider =
            ScriptedProvider::new(vec![Err(upstream(500)), Err(upstream(500)), Err(upstream(500))]);
        let assistant = assistant_with(Arc::clone(&provider));

        let reply = assistant
            .reply("gracias", &[], &Personalization::default())
            .await;
        assert_eq!(reply.source, ReplySource::Fallback);
        assert!(reply.text.starts_with("¡De nada!"));
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn malformed_response_is_not_retried() {
        let provider = ScriptedProvider::new(vec![
            Err(Error::Agent("bad json".into())),
            Ok("never".into()),
        ]);
        let assistant = assistant_with(Arc::clone(&provider));

        let reply = assistant
            .reply("xyz", &[], &Personalization::default())
            .await;
        assert_eq!(reply.text, fallback::DEFAULT_REPLY);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn http_errors_exhaust_retries_then_fall_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let config = LlmConfig {
            base_url: server.uri(),
            api_key: Some("sk-or-v1-test".into()),
            retry_backoff_ms: 0,
            connection_backoff_ms: 0,
            ..LlmConfig::default()
        };
        let assistant = Assistant::from_config(&config).unwrap();
        assert!(assistant.has_provider());

        let reply = assistant
            .reply("hola", &[], &Personalization::default())
            .await;
        assert_eq!(reply.source, ReplySource::Fallback);
        assert!(reply.text.starts_with("¡Hola!"));
    }
}
