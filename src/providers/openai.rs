//! OpenAI Responses API with the `computer_use_preview` tool.
//!
//! The server keeps the conversation: after the first call only turns added
//! since the previous response are sent, chained by `previous_response_id`.

use std::collections::HashMap;
use std::io::Cursor;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

use super::http::HttpClient;
use super::{EnvLookup, Provider, ProviderContext, required};
use crate::conversation::{ContentPart, ImageData, Role, ToolCall, ToolResult, Turn};
use crate::error::ProviderError;
use crate::tools::{COMPUTER_TOOL, ComputerDialect, definitions};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "computer-use-preview";

const NAVIGATION_HINT: &str =
    "Use the browser_navigate functions to navigate the browser. If you see nothing, try going to bing.com.";

/// Stand-in frame for a computer call answered without a screenshot; the API
/// requires one.
static BLANK_FRAME: Lazy<String> = Lazy::new(|| {
    let mut png = Vec::new();
    let frame = image::RgbaImage::from_pixel(1, 1, image::Rgba([255, 255, 255, 255]));
    match frame.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png) {
        Ok(()) => format!("data:image/png;base64,{}", STANDARD.encode(png)),
        Err(_) => String::new(),
    }
});

#[derive(Debug, Clone, Serialize)]
pub struct ResponsesBody {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
    pub tools: Vec<Value>,
    pub input: Vec<Value>,
    pub reasoning: Value,
    pub truncation: &'static str,
}

/// Delivers a Responses request. Fills in the model (or deployment) name.
#[async_trait]
pub trait ResponsesTransport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, body: ResponsesBody) -> Result<Value, ProviderError>;
}

pub struct OpenAiTransport {
    http: HttpClient,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiTransport {
    pub fn new(http: HttpClient, api_key: String, base_url: String, model: String) -> Self {
        Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    pub fn from_env(http: HttpClient, env: EnvLookup<'_>) -> Result<Self, ProviderError> {
        Ok(Self::new(
            http,
            required(env, "OPENAI_API_KEY")?,
            env("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            env("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        ))
    }
}

#[async_trait]
impl ResponsesTransport for OpenAiTransport {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn send(&self, mut body: ResponsesBody) -> Result<Value, ProviderError> {
        body.model = self.model.clone();
        let url = format!("{}/responses", self.base_url);
        let headers = [("authorization", format!("Bearer {}", self.api_key))];
        self.http.post_json(&url, &headers, &body).await
    }
}

#[derive(Debug, Default)]
struct ChainState {
    previous_response_id: Option<String>,
    /// History length already known to the server.
    sent: usize,
    /// Safety checks raised with each computer call, acknowledged in its output.
    pending_checks: HashMap<String, Vec<Value>>,
}

pub struct ResponsesProvider<T> {
    transport: T,
    context: ProviderContext,
    state: Mutex<ChainState>,
}

pub type OpenAiProvider = ResponsesProvider<OpenAiTransport>;

impl<T: ResponsesTransport> ResponsesProvider<T> {
    pub fn new(transport: T, context: ProviderContext) -> Self {
        Self {
            transport,
            context,
            state: Mutex::new(ChainState::default()),
        }
    }

    pub fn previous_response_id(&self) -> Option<String> {
        self.state.lock().previous_response_id.clone()
    }

    fn tools(&self) -> Vec<Value> {
        let mut tools = vec![json!({
            "type": "computer_use_preview",
            "display_width": self.context.dimensions.width,
            "display_height": self.context.dimensions.height,
            "environment": "browser",
        })];
        tools.extend(definitions::function_tools().into_iter().map(|tool| {
            json!({
                "type": "function",
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters,
                "strict": false,
            })
        }));
        tools
    }

    /// Request body for `history`. Continues the chain when the server already
    /// holds a prefix of it, otherwise starts over with the full conversation.
    fn build_body(&self, history: &[Turn]) -> ResponsesBody {
        let mut state = self.state.lock();
        let continuing = state.previous_response_id.is_some() && state.sent <= history.len();

        let input = if continuing {
            let mut input = Vec::new();
            for turn in &history[state.sent..] {
                match turn.role {
                    // already stored server-side
                    Role::Assistant => {}
                    Role::User => input.push(user_message(turn)),
                    Role::Tool => {
                        for result in turn.results() {
                            let checks = state
                                .pending_checks
                                .remove(&result.call_id)
                                .unwrap_or_default();
                            input.extend(tool_output(history, result, checks));
                        }
                    }
                }
            }
            input
        } else {
            state.previous_response_id = None;
            state.pending_checks.clear();
            self.full_input(history)
        };

        ResponsesBody {
            model: String::new(),
            previous_response_id: state.previous_response_id.clone(),
            tools: self.tools(),
            input,
            reasoning: json!({ "summary": "concise" }),
            truncation: "auto",
        }
    }

    /// Whole conversation as plain messages. Tool exchanges are flattened to
    /// text since their call ids mean nothing to a fresh chain.
    fn full_input(&self, history: &[Turn]) -> Vec<Value> {
        let mut input = vec![
            json!({ "role": "system", "content": self.context.system_prompt }),
            json!({ "role": "developer", "content": NAVIGATION_HINT }),
        ];
        for turn in history {
            match turn.role {
                Role::User => input.push(user_message(turn)),
                Role::Assistant => {
                    let text = turn.text();
                    if !text.is_empty() {
                        input.push(json!({
                            "role": "assistant",
                            "content": [{ "type": "output_text", "text": text }],
                        }));
                    }
                }
                Role::Tool => {
                    let mut content = Vec::new();
                    for result in turn.results() {
                        content.push(json!({ "type": "input_text", "text": result.text() }));
                        content.extend(result.images().map(input_image));
                    }
                    if !content.is_empty() {
                        input.push(json!({ "role": "user", "content": content }));
                    }
                }
            }
        }
        input
    }

    fn record(&self, response_id: Option<String>, sent: usize, turn: &Turn, checks: HashMap<String, Vec<Value>>) {
        let mut state = self.state.lock();
        state.previous_response_id = response_id;
        state.sent = sent;
        state.pending_checks.extend(checks);
        debug!(
            provider = self.transport.name(),
            calls = turn.tool_calls().count(),
            "responses chain advanced"
        );
    }
}

#[async_trait]
impl<T: ResponsesTransport> Provider for ResponsesProvider<T> {
    fn name(&self) -> &str {
        self.transport.name()
    }

    fn dialect(&self) -> ComputerDialect {
        ComputerDialect::OpenAi
    }

    async fn generate(&self, history: &[Turn]) -> Result<Turn, ProviderError> {
        let body = self.build_body(history);
        let response = self.transport.send(body).await?;

        if let Some(message) = response.pointer("/error/message").and_then(Value::as_str) {
            return Err(ProviderError::InvalidRequest(message.to_string()));
        }
        let id = response.get("id").and_then(Value::as_str).map(str::to_string);
        if id.is_none() {
            return Err(ProviderError::Decode("response without id".into()));
        }
        let (turn, checks) = parse_output(&response)?;
        self.record(id, history.len(), &turn, checks);
        Ok(turn)
    }

    fn reset(&self) {
        *self.state.lock() = ChainState::default();
    }
}

fn user_message(turn: &Turn) -> Value {
    let content: Vec<Value> = turn
        .content
        .iter()
        .filter_map(|part| match part {
            ContentPart::Text { text } => Some(json!({ "type": "input_text", "text": text })),
            ContentPart::Image(image) => Some(input_image(image)),
            _ => None,
        })
        .collect();
    json!({ "role": "user", "content": content })
}

fn input_image(image: &ImageData) -> Value {
    json!({ "type": "input_image", "image_url": image.data_url(), "detail": "auto" })
}

fn find_call<'a>(history: &'a [Turn], call_id: &str) -> Option<&'a ToolCall> {
    history
        .iter()
        .rev()
        .flat_map(|t| t.tool_calls())
        .find(|c| c.id == call_id)
}

/// Input items answering one tool call.
fn tool_output(history: &[Turn], result: &ToolResult, checks: Vec<Value>) -> Vec<Value> {
    let is_computer = find_call(history, &result.call_id).is_some_and(|c| c.name == COMPUTER_TOOL);
    if is_computer {
        // the newest frame shows the state after the action
        let image_url = result
            .images()
            .last()
            .map(ImageData::data_url)
            .unwrap_or_else(|| BLANK_FRAME.clone());
        return vec![json!({
            "type": "computer_call_output",
            "call_id": result.call_id,
            "output": { "type": "computer_screenshot", "image_url": image_url },
            "acknowledged_safety_checks": checks,
        })];
    }

    let mut items = vec![json!({
        "type": "function_call_output",
        "call_id": result.call_id,
        "output": result.text(),
    })];
    let images: Vec<Value> = result.images().map(input_image).collect();
    if !images.is_empty() {
        items.push(json!({ "role": "user", "content": images }));
    }
    items
}

type Checks = HashMap<String, Vec<Value>>;

fn parse_output(response: &Value) -> Result<(Turn, Checks), ProviderError> {
    let items = response
        .get("output")
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::Decode("response without output".into()))?;

    let mut content = Vec::new();
    let mut checks = HashMap::new();
    for item in items {
        match item.get("type").and_then(Value::as_str) {
            Some("message") => {
                let parts = item.get("content").and_then(Value::as_array);
                for part in parts.into_iter().flatten() {
                    if let Some(text) = part.get("text").and_then(Value::as_str) {
                        content.push(ContentPart::text(text));
                    }
                }
            }
            Some("reasoning") => {
                let summary: Vec<&str> = item
                    .get("summary")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                    .filter_map(|s| s.get("text").and_then(Value::as_str))
                    .collect();
                if !summary.is_empty() {
                    content.push(ContentPart::Thinking {
                        thinking: summary.join("\n"),
                        signature: None,
                    });
                }
            }
            Some("computer_call") => {
                let call_id = string_field(item, "call_id")?;
                let action = item.get("action").cloned().unwrap_or_else(|| json!({}));
                if let Some(pending) = item.get("pending_safety_checks").and_then(Value::as_array) {
                    if !pending.is_empty() {
                        checks.insert(call_id.clone(), pending.clone());
                    }
                }
                content.push(ContentPart::ToolCall(ToolCall {
                    id: call_id,
                    name: COMPUTER_TOOL.to_string(),
                    arguments: action.to_string(),
                }));
            }
            Some("function_call") => content.push(ContentPart::ToolCall(ToolCall {
                id: string_field(item, "call_id")?,
                name: string_field(item, "name")?,
                arguments: item
                    .get("arguments")
                    .and_then(Value::as_str)
                    .unwrap_or("{}")
                    .to_string(),
            })),
            other => debug!(kind = ?other, "skipping response item"),
        }
    }
    Ok((Turn::assistant(content), checks))
}

fn string_field(item: &Value, key: &str) -> Result<String, ProviderError> {
    item.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ProviderError::Decode(format!("output item without {key}")))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::conversation::ResultPart;
    use crate::providers::http::RetryPolicy;
    use crate::types::Dimensions;

    fn provider(base_url: String) -> OpenAiProvider {
        let http = HttpClient::new(
            Duration::from_secs(5),
            RetryPolicy {
                max_retries: 0,
                base_delay: Duration::from_millis(1),
            },
        )
        .unwrap();
        ResponsesProvider::new(
            OpenAiTransport::new(http, "sk-test".into(), base_url, DEFAULT_MODEL.into()),
            ProviderContext {
                system_prompt: "system prompt".into(),
                dimensions: Dimensions::default(),
            },
        )
    }

    fn first_reply() -> Value {
        json!({
            "id": "resp_1",
            "output": [
                {"type": "reasoning", "summary": [{"type": "summary_text", "text": "need a look"}]},
                {"type": "computer_call", "call_id": "call_c", "action": {"type": "screenshot"},
                 "pending_safety_checks": [{"id": "sc_1", "code": "malicious_instructions", "message": "careful"}]},
                {"type": "function_call", "call_id": "call_f", "name": "browser_navigate",
                 "arguments": "{\"action\":\"current_tab\"}"}
            ]
        })
    }

    fn tool_turn() -> Turn {
        Turn::tool_results(vec![
            ToolResult {
                call_id: "call_c".into(),
                content: vec![
                    ResultPart::Text { text: "Success".into() },
                    ResultPart::Image(ImageData::png_base64("OLD")),
                    ResultPart::Image(ImageData::png_base64("NEW")),
                ],
            },
            ToolResult {
                call_id: "call_f".into(),
                content: vec![
                    ResultPart::Text { text: "Tab 0: Example".into() },
                    ResultPart::Image(ImageData::png_base64("FRAME")),
                ],
            },
        ])
    }

    #[tokio::test]
    async fn chains_responses_and_sends_only_new_turns() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/responses"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(first_reply()))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/responses"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "resp_2",
                "output": [{"type": "message", "role": "assistant",
                            "content": [{"type": "output_text", "text": "All done"}]}]
            })))
            .mount(&server)
            .await;

        let provider = provider(server.uri());
        let mut history = vec![Turn::user("check the tab")];

        let first = provider.generate(&history).await.unwrap();
        assert_eq!(first.tool_calls().count(), 2);
        assert!(matches!(&first.content[0], ContentPart::Thinking { thinking, .. } if thinking == "need a look"));
        assert_eq!(provider.previous_response_id().as_deref(), Some("resp_1"));

        history.push(first);
        history.push(tool_turn());
        let second = provider.generate(&history).await.unwrap();
        assert_eq!(second.text(), "All done");

        let requests = server.received_requests().await.unwrap();
        let opening = requests[0].body_json::<Value>().unwrap();
        assert_eq!(opening["model"], DEFAULT_MODEL);
        assert!(opening.get("previous_response_id").is_none());
        assert_eq!(opening["input"][0]["role"], "system");
        assert_eq!(opening["input"][1]["role"], "developer");
        assert_eq!(opening["input"][2]["content"][0]["text"], "check the tab");
        assert_eq!(opening["tools"][0]["type"], "computer_use_preview");
        assert_eq!(opening["tools"][0]["environment"], "browser");
        assert_eq!(opening["truncation"], "auto");

        let follow_up = requests[1].body_json::<Value>().unwrap();
        assert_eq!(follow_up["previous_response_id"], "resp_1");
        let input = follow_up["input"].as_array().unwrap();
        assert_eq!(input.len(), 3);

        assert_eq!(input[0]["type"], "computer_call_output");
        assert_eq!(input[0]["call_id"], "call_c");
        assert_eq!(input[0]["output"]["image_url"], "data:image/png;base64,NEW");
        assert_eq!(input[0]["acknowledged_safety_checks"][0]["id"], "sc_1");

        assert_eq!(input[1]["type"], "function_call_output");
        assert_eq!(input[1]["output"], "Tab 0: Example");
        assert_eq!(input[2]["role"], "user");
        assert_eq!(input[2]["content"][0]["type"], "input_image");
        assert_eq!(input[2]["content"][0]["image_url"], "data:image/png;base64,FRAME");
    }

    #[tokio::test]
    async fn reset_starts_a_new_chain() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(first_reply()))
            .mount(&server)
            .await;

        let provider = provider(server.uri());
        provider.generate(&[Turn::user("one")]).await.unwrap();
        provider.reset();
        assert_eq!(provider.previous_response_id(), None);
        provider.generate(&[Turn::user("two")]).await.unwrap();

        let second = server.received_requests().await.unwrap()[1]
            .body_json::<Value>()
            .unwrap();
        assert!(second.get("previous_response_id").is_none());
        assert_eq!(second["input"][2]["content"][0]["text"], "two");
    }

    #[test]
    fn computer_output_without_image_uses_blank_frame() {
        let history = vec![Turn::assistant(vec![ContentPart::ToolCall(ToolCall {
            id: "c".into(),
            name: COMPUTER_TOOL.into(),
            arguments: "{}".into(),
        })])];
        let result = ToolResult {
            call_id: "c".into(),
            content: vec![ResultPart::Text { text: "Success".into() }],
        };
        let items = tool_output(&history, &result, Vec::new());
        let url = items[0]["output"]["image_url"].as_str().unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn output_without_items_is_a_decode_error() {
        assert!(matches!(
            parse_output(&json!({"id": "resp"})),
            Err(ProviderError::Decode(_))
        ));
    }
}
