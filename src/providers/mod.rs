//! Adapters between the conversation model and each LLM backend's wire format.

pub mod anthropic;
pub mod azure;
pub mod bedrock;
pub mod http;
pub mod openai;
pub mod openrouter;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub use anthropic::{AnthropicProvider, AnthropicTransport, MessagesProvider, MessagesTransport};
pub use azure::{AzureProvider, AzureTransport};
pub use bedrock::{BedrockProvider, BedrockTransport};
pub use http::{HttpClient, RetryPolicy};
pub use openai::{OpenAiProvider, OpenAiTransport, ResponsesProvider, ResponsesTransport};
pub use openrouter::OpenRouterProvider;

use crate::conversation::Turn;
use crate::error::ProviderError;
use crate::tools::ComputerDialect;
use crate::types::Dimensions;

/// Environment lookup. Injected so adapters can be built without touching the
/// process environment.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Reads a non-empty variable from the process environment.
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub(crate) fn required(env: EnvLookup<'_>, key: &str) -> Result<String, ProviderError> {
    env(key).ok_or_else(|| ProviderError::Config(format!("{key} is not set")))
}

/// One LLM backend. `generate` receives the whole history and returns the next
/// assistant turn.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// Which `computer` argument shape this backend's model emits.
    fn dialect(&self) -> ComputerDialect;

    async fn generate(&self, history: &[Turn]) -> Result<Turn, ProviderError>;

    /// Forget any server-side conversation state. Called at task start.
    fn reset(&self) {}
}

/// What every adapter needs to describe the environment to the model.
#[derive(Debug, Clone)]
pub struct ProviderContext {
    pub system_prompt: String,
    pub dimensions: Dimensions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    #[default]
    Anthropic,
    OpenAi,
    Azure,
    Bedrock,
    OpenRouter,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 5] = [
        Self::Anthropic,
        Self::OpenAi,
        Self::Azure,
        Self::Bedrock,
        Self::OpenRouter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Azure => "azure",
            Self::Bedrock => "bedrock",
            Self::OpenRouter => "openrouter",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| ProviderError::Config(format!("unknown provider {s:?}")))
    }
}

/// Per-request timeout handed to the HTTP client.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

/// Build the adapter for `kind`, reading credentials through `env`. A missing
/// credential fails here, before any task runs.
pub fn build_provider(
    kind: ProviderKind,
    context: ProviderContext,
    env: EnvLookup<'_>,
) -> Result<Arc<dyn Provider>, ProviderError> {
    let http = HttpClient::new(DEFAULT_REQUEST_TIMEOUT, RetryPolicy::default())?;
    let provider: Arc<dyn Provider> = match kind {
        ProviderKind::Anthropic => Arc::new(MessagesProvider::new(
            AnthropicTransport::from_env(http, env)?,
            context,
        )),
        ProviderKind::Bedrock => Arc::new(MessagesProvider::new(
            BedrockTransport::from_env(http, env)?,
            context,
        )),
        ProviderKind::OpenAi => Arc::new(ResponsesProvider::new(
            OpenAiTransport::from_env(http, env)?,
            context,
        )),
        ProviderKind::Azure => Arc::new(ResponsesProvider::new(
            AzureTransport::from_env(http, env)?,
            context,
        )),
        ProviderKind::OpenRouter => Arc::new(OpenRouterProvider::from_env(http, env, context)?),
    };
    tracing::info!(provider = provider.name(), "provider ready");
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn context() -> ProviderContext {
        ProviderContext {
            system_prompt: "be helpful".to_string(),
            dimensions: Dimensions::default(),
        }
    }

    #[test]
    fn kinds_parse_case_insensitively() {
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!(" bedrock ".parse::<ProviderKind>().unwrap(), ProviderKind::Bedrock);
        assert!("gemini".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn missing_credentials_fail_at_construction() {
        let empty = |_: &str| -> Option<String> { None };
        for kind in ProviderKind::ALL {
            let err = build_provider(kind, context(), &empty).err().unwrap();
            assert!(matches!(err, ProviderError::Config(_)), "{kind}: {err}");
        }
    }

    #[test]
    fn builds_each_provider_with_credentials() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("ANTHROPIC_API_KEY", "a"),
            ("OPENAI_API_KEY", "o"),
            ("AZURE_API_KEY", "z"),
            ("AZURE_RESOURCE_NAME", "res"),
            ("AWS_ACCESS_KEY_ID", "AKID"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
            ("OPENROUTER_API_KEY", "r"),
        ]);
        let env = |k: &str| vars.get(k).map(|v| v.to_string());
        for kind in ProviderKind::ALL {
            let provider = build_provider(kind, context(), &env).unwrap();
            assert_eq!(provider.name(), kind.as_str());
        }
        let openai = build_provider(ProviderKind::OpenAi, context(), &env).unwrap();
        assert_eq!(openai.dialect(), ComputerDialect::OpenAi);
    }
}
