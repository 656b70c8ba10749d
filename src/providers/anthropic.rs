//! Anthropic Messages API, with the computer-use beta tool.
//!
//! The request body is shared with Bedrock, which hosts the same API behind a
//! different endpoint and auth scheme. [`MessagesTransport`] is that seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use super::http::HttpClient;
use super::{EnvLookup, Provider, ProviderContext, required};
use crate::conversation::{ContentPart, ImageData, ResultPart, Role, ToolCall, Turn};
use crate::error::ProviderError;
use crate::tools::{COMPUTER_TOOL, ComputerDialect, definitions};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-3-7-sonnet-20250219";
pub const API_VERSION: &str = "2023-06-01";
pub const COMPUTER_USE_BETA: &str = "computer-use-2025-01-24";
pub const COMPUTER_TOOL_TYPE: &str = "computer_20250124";
pub const MAX_TOKENS: u32 = 8192;
pub const THINKING_BUDGET: u32 = 4096;

// Wire types

#[derive(Debug, Clone, Serialize)]
pub struct MessagesBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anthropic_version: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub anthropic_beta: Vec<String>,
    pub max_tokens: u32,
    pub system: String,
    pub tools: Vec<Value>,
    pub messages: Vec<ApiMessage>,
    pub thinking: ThinkingConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThinkingConfig {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub budget_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiMessage {
    pub role: &'static str,
    pub content: Vec<ApiBlock>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApiBlock {
    Text {
        text: String,
    },
    Image {
        source: ApiImageSource,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: Vec<ApiBlock>,
    },
    Thinking {
        thinking: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    RedactedThinking {
        data: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiImageSource {
    #[serde(rename = "type")]
    pub source_type: String,
    pub media_type: String,
    pub data: String,
}

impl From<&ImageData> for ApiImageSource {
    fn from(image: &ImageData) -> Self {
        Self {
            source_type: "base64".to_string(),
            media_type: image.media_type.clone(),
            data: image.data.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub content: Vec<ResponseBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    Thinking {
        thinking: String,
        #[serde(default)]
        signature: Option<String>,
    },
    RedactedThinking {
        data: String,
    },
    #[serde(other)]
    Other,
}

/// Delivers a Messages request body and returns the decoded response.
#[async_trait]
pub trait MessagesTransport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, body: MessagesBody) -> Result<MessagesResponse, ProviderError>;
}

pub(crate) fn decode_response(value: Value) -> Result<MessagesResponse, ProviderError> {
    serde_json::from_value(value).map_err(|e| ProviderError::Decode(format!("messages response: {e}")))
}

/// Direct Anthropic API transport.
pub struct AnthropicTransport {
    http: HttpClient,
    api_key: String,
    base_url: String,
    model: String,
}

impl AnthropicTransport {
    pub fn new(http: HttpClient, api_key: String, base_url: String, model: String) -> Self {
        Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    /// `ANTHROPIC_API_KEY` is required; `ANTHROPIC_BASE_URL` and
    /// `ANTHROPIC_MODEL` override the defaults.
    pub fn from_env(http: HttpClient, env: EnvLookup<'_>) -> Result<Self, ProviderError> {
        Ok(Self::new(
            http,
            required(env, "ANTHROPIC_API_KEY")?,
            env("ANTHROPIC_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            env("ANTHROPIC_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        ))
    }
}

#[async_trait]
impl MessagesTransport for AnthropicTransport {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn send(&self, mut body: MessagesBody) -> Result<MessagesResponse, ProviderError> {
        body.model = Some(self.model.clone());
        let url = format!("{}/v1/messages", self.base_url);
        let headers = [
            ("x-api-key", self.api_key.clone()),
            ("anthropic-version", API_VERSION.to_string()),
            ("anthropic-beta", COMPUTER_USE_BETA.to_string()),
        ];
        decode_response(self.http.post_json(&url, &headers, &body).await?)
    }
}

/// Provider speaking the Messages format over any [`MessagesTransport`].
pub struct MessagesProvider<T> {
    transport: T,
    context: ProviderContext,
}

pub type AnthropicProvider = MessagesProvider<AnthropicTransport>;

impl<T: MessagesTransport> MessagesProvider<T> {
    pub fn new(transport: T, context: ProviderContext) -> Self {
        Self { transport, context }
    }

    pub fn build_body(&self, history: &[Turn]) -> MessagesBody {
        MessagesBody {
            model: None,
            anthropic_version: None,
            anthropic_beta: Vec::new(),
            max_tokens: MAX_TOKENS,
            system: self.context.system_prompt.clone(),
            tools: tool_declarations(&self.context),
            messages: history.iter().filter_map(to_api_message).collect(),
            thinking: ThinkingConfig {
                kind: "enabled",
                budget_tokens: THINKING_BUDGET,
            },
        }
    }
}

#[async_trait]
impl<T: MessagesTransport> Provider for MessagesProvider<T> {
    fn name(&self) -> &str {
        self.transport.name()
    }

    fn dialect(&self) -> ComputerDialect {
        ComputerDialect::Anthropic
    }

    async fn generate(&self, history: &[Turn]) -> Result<Turn, ProviderError> {
        let body = self.build_body(history);
        let response = self.transport.send(body).await?;
        debug!(
            provider = self.transport.name(),
            stop_reason = response.stop_reason.as_deref().unwrap_or(""),
            blocks = response.content.len(),
            "messages response"
        );
        Ok(from_response(response))
    }
}

pub(crate) fn tool_declarations(context: &ProviderContext) -> Vec<Value> {
    let mut tools = vec![json!({
        "type": COMPUTER_TOOL_TYPE,
        "name": COMPUTER_TOOL,
        "display_width_px": context.dimensions.width,
        "display_height_px": context.dimensions.height,
    })];
    tools.extend(definitions::function_tools().into_iter().map(|tool| {
        json!({
            "name": tool.name,
            "description": tool.description,
            "input_schema": tool.parameters,
        })
    }));
    tools
}

fn to_api_message(turn: &Turn) -> Option<ApiMessage> {
    let role = match turn.role {
        Role::Assistant => "assistant",
        // Tool results travel back in a user message.
        Role::User | Role::Tool => "user",
    };
    let content: Vec<ApiBlock> = turn.content.iter().filter_map(to_api_block).collect();
    (!content.is_empty()).then_some(ApiMessage { role, content })
}

fn to_api_block(part: &ContentPart) -> Option<ApiBlock> {
    Some(match part {
        ContentPart::Text { text } if text.is_empty() => return None,
        ContentPart::Text { text } => ApiBlock::Text { text: text.clone() },
        ContentPart::Image(image) => ApiBlock::Image {
            source: image.into(),
        },
        ContentPart::ToolCall(call) => ApiBlock::ToolUse {
            id: call.id.clone(),
            name: call.name.clone(),
            input: serde_json::from_str(&call.arguments).unwrap_or_else(|_| json!({})),
        },
        ContentPart::ToolResult(result) => ApiBlock::ToolResult {
            tool_use_id: result.call_id.clone(),
            content: result
                .content
                .iter()
                .filter_map(|p| match p {
                    ResultPart::Text { text } if text.is_empty() => None,
                    ResultPart::Text { text } => Some(ApiBlock::Text { text: text.clone() }),
                    ResultPart::Image(image) => Some(ApiBlock::Image {
                        source: image.into(),
                    }),
                })
                .collect(),
        },
        ContentPart::Thinking {
            thinking,
            signature,
        } => ApiBlock::Thinking {
            thinking: thinking.clone(),
            signature: signature.clone(),
        },
        ContentPart::RedactedThinking { data } => ApiBlock::RedactedThinking { data: data.clone() },
    })
}

pub(crate) fn from_response(response: MessagesResponse) -> Turn {
    let content = response
        .content
        .into_iter()
        .filter_map(|block| match block {
            ResponseBlock::Text { text } => Some(ContentPart::Text { text }),
            ResponseBlock::ToolUse { id, name, input } => Some(ContentPart::ToolCall(ToolCall {
                id,
                name,
                arguments: input.to_string(),
            })),
            ResponseBlock::Thinking {
                thinking,
                signature,
            } => Some(ContentPart::Thinking {
                thinking,
                signature,
            }),
            ResponseBlock::RedactedThinking { data } => Some(ContentPart::RedactedThinking { data }),
            ResponseBlock::Other => None,
        })
        .collect();
    Turn::assistant(content)
}
