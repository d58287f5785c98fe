use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Prefix every OpenRouter key carries. Keys without it are treated as unset.
pub const API_KEY_PREFIX: &str = "sk-or-v1-";

const DEFAULT_SYSTEM_PROMPT: &str = "Eres Chipi, un asistente virtual amable y servicial para adultos mayores. Responde de forma clara, simple y directa.";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppInfo,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub log_level: Option<String>,
}

impl AppConfig {
    /// True when an API key with the expected prefix is present.
    pub fn is_api_configured(&self) -> bool {
        self.llm
            .api_key
            .as_deref()
            .is_some_and(|key| key.starts_with(API_KEY_PREFIX))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppInfo {
    #[serde(default = "default_app_name")]
    pub name: String,

    #[serde(default = "default_app_version")]
    pub version: String,

    #[serde(default = "default_app_description")]
    pub description: String,
}

impl Default for AppInfo {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            version: default_app_version(),
            description: default_app_description(),
        }
    }
}

fn default_app_name() -> String {
    "Chipi IA".to_string()
}

fn default_app_version() -> String {
    "2.1.0".to_string()
}

fn default_app_description() -> String {
    "Asistente Virtual para Adultos Mayores".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub secret_key: Option<String>,

    /// Idle time after which a login session is discarded.
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,

    /// Carried for parity with older deployments; login attempts are not limited.
    #[serde(default = "default_max_login_attempts")]
    pub max_login_attempts: u32,

    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            secret_key: None,
            session_timeout_secs: default_session_timeout(),
            max_login_attempts: default_max_login_attempts(),
            static_dir: default_static_dir(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_session_timeout() -> u64 {
    3600
}

fn default_max_login_attempts() -> u32 {
    5
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Wait after the endpoint answers with an error status.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Wait after the endpoint could not be reached.
    #[serde(default = "default_connection_backoff")]
    pub connection_backoff_ms: u64,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    #[serde(default = "default_referer")]
    pub referer: String,

    #[serde(default = "default_title")]
    pub title: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            timeout_secs: default_timeout(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff(),
            connection_backoff_ms: default_connection_backoff(),
            system_prompt: default_system_prompt(),
            referer: default_referer(),
            title: default_title(),
        }
    }
}

fn default_base_url() -> String {
    "https://openrouter.ai/api".to_string()
}

fn default_model() -> String {
    "meta-llama/llama-3.1-8b-instruct".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff() -> u64 {
    1000
}

fn default_connection_backoff() -> u64 {
    2000
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_referer() -> String {
    "https://github.com/chipi-ai/chipi-assistant".to_string()
}

fn default_title() -> String {
    "Chipi IA Assistant".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Explicit SQLite file. When unset the loader probes well-known locations.
    #[serde(default)]
    pub path: Option<PathBuf>,
}
