use std::time::Duration;

use async_trait::async_trait;
use chipi_common::{Error, Result};
use chipi_config::LlmConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::providers::{LlmProvider, LlmRequest, LlmResponse, Usage};

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// OpenRouter chat-completions provider.
/// Also works with any OpenAI-compatible endpoint via `base_url`.
pub struct OpenRouterProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    referer: String,
    title: String,
}

impl OpenRouterProvider {
    pub fn new(api_key: impl Into<String>, config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Agent(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            model: config.model.clone(),
            base_url: config.base_url.clone(),
            referer: config.referer.clone(),
            title: config.title.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        )
    }

    fn auth_endpoint(&self) -> String {
        format!("{}/v1/auth/key", self.base_url.trim_end_matches('/'))
    }

    fn build_request(&self, request: &LlmRequest) -> OpenRouterRequest {
        let model = if request.model.is_empty() {
            self.model.clone()
        } else {
            request.model.clone()
        };

        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(OpenRouterMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.extend(request.messages.iter().map(|m| OpenRouterMessage {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        }));

        OpenRouterRequest {
            model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: false,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenRouterProvider {
    fn provider_id(&self) -> &str {
        "openrouter"
    }

    #[instrument(skip(self, request), fields(model))]
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let body = self.build_request(request);

        tracing::Span::current().record("model", body.model.as_str());
        debug!(
            "openrouter request: model={}, messages={}",
            body.model,
            body.messages.len()
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream { status, body });
        }

        let api_response: OpenRouterResponse = response
            .json()
            .await
            .map_err(|e| Error::Agent(format!("failed to parse openrouter response: {e}")))?;

        from_openrouter_response(api_response)
    }

    async fn health_check(&self) -> Result<bool> {
        let response = self
            .client
            .get(self.auth_endpoint())
            .bearer_auth(&self.api_key)
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await
            .map_err(transport_error)?;

        Ok(response.status().is_success())
    }
}

fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        Error::Connection(format!("openrouter request failed: {e}"))
    } else {
        Error::Agent(format!("openrouter request failed: {e}"))
    }
}

// --- Wire types ---

#[derive(Debug, Serialize)]
struct OpenRouterRequest {
    model: String,
    messages: Vec<OpenRouterMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OpenRouterMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenRouterResponse {
    choices: Vec<OpenRouterChoice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<OpenRouterUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterChoice {
    message: OpenRouterReplyMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

fn from_openrouter_response(response: OpenRouterResponse) -> Result<LlmResponse> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::Agent("openrouter response has no choices".into()))?;

    let content = choice
        .message
        .content
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| Error::Agent("openrouter response has no content".into()))?;

    Ok(LlmResponse {
        content,
        model: response.model.unwrap_or_default(),
        usage: response.usage.map(|u| Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        }),
        stop_reason: choice.finish_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ChatMessage;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(base_url: &str) -> LlmConfig {
        LlmConfig {
            base_url: base_url.to_string(),
            ..LlmConfig::default()
        }
    }

    fn request(messages: Vec<ChatMessage>) -> LlmRequest {
        LlmRequest {
            model: String::new(),
            messages,
            system: Some("Eres Chipi".to_string()),
            max_tokens: Some(1000),
            temperature: Some(0.7),
        }
    }

    #[test]
    fn builds_request_with_system_first_and_default_model() {
        let provider =
            OpenRouterProvider::new("sk-or-v1-test", &LlmConfig::default()).expect("client");
        let body = provider.build_request(&request(vec![
            ChatMessage::user("hola"),
            ChatMessage::assistant("¡Hola!"),
            ChatMessage::user("gracias"),
        ]));

        assert_eq!(body.model, "meta-llama/llama-3.1-8b-instruct");
        let roles: Vec<&str> = body.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["max_tokens"], 1000);
        assert_eq!(json["temperature"], 0.7);
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn endpoint_strips_trailing_slash() {
        let provider =
            OpenRouterProvider::new("key", &config_for("https://api.example.com/")).unwrap();
        assert_eq!(
            provider.endpoint(),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn missing_choices_is_an_error() {
        let response: OpenRouterResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        let err = from_openrouter_response(response).unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn blank_content_is_a_non_retryable_error() {
        for body in [
            r#"{"choices": [{"message": {"content": "   "}}]}"#,
            r#"{"choices": [{"message": {"content": null}}]}"#,
        ] {
            let response: OpenRouterResponse = serde_json::from_str(body).unwrap();
            let err = from_openrouter_response(response).unwrap_err();
            assert!(matches!(err, Error::Agent(_)), "{body}");
            assert!(!err.is_retryable());
        }
    }

    #[tokio::test]
    async fn complete_sends_headers_and_reads_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-or-v1-test"))
            .and(header("x-title", "Chipi IA Assistant"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "meta-llama/llama-3.1-8b-instruct",
                "choices": [{
                    "message": {"role": "assistant", "content": "Claro, te ayudo."},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 12, "completion_tokens": 5}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenRouterProvider::new("sk-or-v1-test", &config_for(&server.uri())).unwrap();
        let response = provider
            .complete(&request(vec![ChatMessage::user("ayuda")]))
            .await
            .expect("completion should succeed");

        assert_eq!(response.content, "Claro, te ayudo.");
        assert_eq!(response.usage.unwrap().output_tokens, 5);
    }

    #[tokio::test]
    async fn error_status_maps_to_retryable_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let provider = OpenRouterProvider::new("sk-or-v1-test", &config_for(&server.uri())).unwrap();
        let err = provider
            .complete(&request(vec![ChatMessage::user("hola")]))
            .await
            .unwrap_err();

        match &err {
            Error::Upstream { status, body } => {
                assert_eq!(*status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn health_check_probes_auth_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/auth/key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": {}})))
            .mount(&server)
            .await;

        let provider = OpenRouterProvider::new("sk-or-v1-test", &config_for(&server.uri())).unwrap();
        assert!(provider.health_check().await.unwrap());
    }
}
