//! OpenRouter chat completions. Stateless: the whole history goes out on every
//! call, and the routed model is Claude, so computer arguments use the
//! Anthropic shape.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use super::anthropic::COMPUTER_TOOL_TYPE;
use super::http::HttpClient;
use super::{EnvLookup, Provider, ProviderContext, required};
use crate::conversation::{ContentPart, ImageData, ResultPart, Role, ToolCall, Turn};
use crate::error::ProviderError;
use crate::tools::{COMPUTER_TOOL, ComputerDialect, definitions};

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "anthropic/claude-3.7-sonnet";
pub const APP_TITLE: &str = "Grasp";
const MAX_TOKENS: u32 = 8192;

pub struct OpenRouterProvider {
    http: HttpClient,
    api_key: String,
    base_url: String,
    model: String,
    referer: Option<String>,
    context: ProviderContext,
}

impl OpenRouterProvider {
    pub fn new(
        http: HttpClient,
        api_key: String,
        base_url: String,
        model: String,
        context: ProviderContext,
    ) -> Self {
        Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            referer: None,
            context,
        }
    }

    pub fn from_env(
        http: HttpClient,
        env: EnvLookup<'_>,
        context: ProviderContext,
    ) -> Result<Self, ProviderError> {
        let mut provider = Self::new(
            http,
            required(env, "OPENROUTER_API_KEY")?,
            env("OPENROUTER_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            env("OPENROUTER_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            context,
        );
        provider.referer = env("OPENROUTER_REFERER");
        Ok(provider)
    }

    fn tools(&self) -> Vec<Value> {
        let mut tools: Vec<Value> = definitions::function_tools()
            .into_iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    },
                })
            })
            .collect();
        tools.push(json!({
            "type": COMPUTER_TOOL_TYPE,
            "name": COMPUTER_TOOL,
            "display_width_px": self.context.dimensions.width,
            "display_height_px": self.context.dimensions.height,
        }));
        tools
    }

    pub fn build_body(&self, history: &[Turn]) -> Value {
        let mut messages = vec![json!({ "role": "system", "content": self.context.system_prompt })];
        for turn in history {
            messages.extend(to_messages(history, turn));
        }
        json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "tools": self.tools(),
            "messages": messages,
        })
    }
}

#[async_trait]
impl Provider for OpenRouterProvider {
    fn name(&self) -> &str {
        "openrouter"
    }

    fn dialect(&self) -> ComputerDialect {
        ComputerDialect::Anthropic
    }

    async fn generate(&self, history: &[Turn]) -> Result<Turn, ProviderError> {
        let mut headers = vec![
            ("authorization", format!("Bearer {}", self.api_key)),
            ("x-title", APP_TITLE.to_string()),
        ];
        if let Some(referer) = &self.referer {
            headers.push(("http-referer", referer.clone()));
        }
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post_json(&url, &headers, &self.build_body(history))
            .await?;

        // errors can arrive with a 200 status
        if let Some(error) = response.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            let status = error.get("code").and_then(Value::as_u64).unwrap_or(500) as u16;
            return Err(ProviderError::from_status(status, message));
        }
        parse_choice(&response)
    }
}

fn image_part(image: &ImageData) -> Value {
    json!({ "type": "image_url", "image_url": { "url": image.data_url() } })
}

fn to_messages(history: &[Turn], turn: &Turn) -> Vec<Value> {
    match turn.role {
        Role::User => {
            let content: Vec<Value> = turn
                .content
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(json!({ "type": "text", "text": text })),
                    ContentPart::Image(image) => Some(image_part(image)),
                    _ => None,
                })
                .collect();
            vec![json!({ "role": "user", "content": content })]
        }
        Role::Assistant => {
            let text = turn.text();
            let calls: Vec<Value> = turn
                .tool_calls()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": { "name": call.name, "arguments": call.arguments },
                    })
                })
                .collect();
            let content = if text.is_empty() {
                Value::Null
            } else {
                Value::String(text)
            };
            let mut message = json!({ "role": "assistant", "content": content });
            if !calls.is_empty() {
                message["tool_calls"] = Value::Array(calls);
            }
            vec![message]
        }
        Role::Tool => turn
            .results()
            .map(|result| {
                let name = history
                    .iter()
                    .flat_map(|t| t.tool_calls())
                    .find(|c| c.id == result.call_id)
                    .map_or(COMPUTER_TOOL, |c| c.name.as_str());
                let content: Vec<Value> = result
                    .content
                    .iter()
                    .map(|part| match part {
                        ResultPart::Text { text } => json!({ "type": "text", "text": text }),
                        ResultPart::Image(image) => image_part(image),
                    })
                    .collect();
                json!({
                    "role": "tool",
                    "tool_call_id": result.call_id,
                    "name": name,
                    "content": content,
                })
            })
            .collect(),
    }
}

fn parse_choice(response: &Value) -> Result<Turn, ProviderError> {
    let message = response
        .pointer("/choices/0/message")
        .ok_or_else(|| ProviderError::Decode("completion without choices".into()))?;

    let mut content = Vec::new();
    match message.get("content") {
        Some(Value::String(text)) if !text.is_empty() => content.push(ContentPart::text(text.as_str())),
        Some(Value::Array(parts)) => content.extend(
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .map(ContentPart::text),
        ),
        _ => {}
    }

    for call in message
        .get("tool_calls")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let id = call.get("id").and_then(Value::as_str);
        let name = call.pointer("/function/name").and_then(Value::as_str);
        let (Some(id), Some(name)) = (id, name) else {
            return Err(ProviderError::Decode(format!("malformed tool call: {call}")));
        };
        let arguments = match call.pointer("/function/arguments") {
            Some(Value::String(raw)) => raw.clone(),
            Some(other) if !other.is_null() => other.to_string(),
            _ => "{}".to_string(),
        };
        content.push(ContentPart::ToolCall(ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        }));
    }

    debug!(parts = content.len(), "openrouter completion");
    Ok(Turn::assistant(content))
}
