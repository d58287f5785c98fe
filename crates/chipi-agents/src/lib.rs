pub mod assistant;
pub mod fallback;
pub mod learning;
pub mod openrouter;
pub mod profile;
pub mod providers;
pub mod signals;

pub use assistant::{Assistant, Reply, ReplySource, RetryPolicy};
pub use learning::{LearnedState, LearningEngine, Personalization};
pub use openrouter::OpenRouterProvider;
pub use profile::{CommunicationStyle, ContextualInfo, StyleHints, Tone, UserProfile};
pub use providers::{ChatMessage, ChatRole, LlmProvider, LlmRequest, LlmResponse, Usage};
pub use signals::UsageSignals;
