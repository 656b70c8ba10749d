use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageEncoding {
    #[default]
    Base64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageData {
    pub encoding: ImageEncoding,
    pub media_type: String,
    pub data: String,
}

impl ImageData {
    pub fn png_base64(data: impl Into<String>) -> Self {
        Self {
            encoding: ImageEncoding::Base64,
            media_type: "image/png".to_string(),
            data: data.into(),
        }
    }

    /// `data:` URL form used by the OpenAI-style wire formats.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Arguments as the provider sent them, serialized JSON.
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResultPart {
    Text { text: String },
    Image(ImageData),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub content: Vec<ResultPart>,
}

impl ToolResult {
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|p| match p {
                ResultPart::Text { text } => Some(text.as_str()),
                ResultPart::Image(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn images(&self) -> impl Iterator<Item = &ImageData> {
        self.content.iter().filter_map(|p| match p {
            ResultPart::Image(image) => Some(image),
            ResultPart::Text { .. } => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image(ImageData),
    ToolCall(ToolCall),
    ToolResult(ToolResult),
    /// Model reasoning. Replayed verbatim to the provider that produced it.
    Thinking {
        thinking: String,
        signature: Option<String>,
    },
    RedactedThinking { data: String },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: Vec<ContentPart>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentPart::text(text)],
        }
    }

    pub fn assistant(content: Vec<ContentPart>) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }

    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Self {
            role: Role::Tool,
            content: results.into_iter().map(ContentPart::ToolResult).collect(),
        }
    }

    /// Text parts joined by newlines. Thinking is never included.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.content.iter().filter_map(|p| match p {
            ContentPart::ToolCall(call) => Some(call),
            _ => None,
        })
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls().next().is_some()
    }

    pub fn results(&self) -> impl Iterator<Item = &ToolResult> {
        self.content.iter().filter_map(|p| match p {
            ContentPart::ToolResult(result) => Some(result),
            _ => None,
        })
    }

    pub fn has_images(&self) -> bool {
        self.content.iter().any(|p| match p {
            ContentPart::Image(_) => true,
            ContentPart::ToolResult(result) => result.images().next().is_some(),
            _ => false,
        })
    }

    /// Drop every image part, top-level or inside tool results. Text stays.
    pub fn strip_images(&mut self) {
        self.content.retain(|p| !matches!(p, ContentPart::Image(_)));
        for part in &mut self.content {
            if let ContentPart::ToolResult(result) = part {
                result
                    .content
                    .retain(|p| !matches!(p, ResultPart::Image(_)));
            }
        }
    }
}

/// Ordered conversation for one task.
///
/// At most one tool turn keeps its screenshots: adding a new one strips the
/// images from every older tool turn first.
#[derive(Debug, Clone, Default, Serialize)]
pub struct History {
    turns: Vec<Turn>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(task: &str) -> Self {
        Self {
            turns: vec![Turn::user(task)],
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Append the answers to the latest tool calls, stripping older screenshots.
    pub fn push_tool_results(&mut self, results: Vec<ToolResult>) {
        for turn in self.turns.iter_mut().filter(|t| t.role == Role::Tool) {
            turn.strip_images();
        }
        self.turns.push(Turn::tool_results(results));
    }

    /// Keep images only on the newest tool turn that has any.
    pub fn prune_images(&mut self) {
        let mut kept = false;
        for turn in self.turns.iter_mut().rev().filter(|t| t.role == Role::Tool) {
            if !turn.has_images() {
                continue;
            }
            if kept {
                turn.strip_images();
            } else {
                kept = true;
            }
        }
    }

    pub fn tool_turns_with_images(&self) -> usize {
        self.turns
            .iter()
            .filter(|t| t.role == Role::Tool && t.has_images())
            .count()
    }
}
