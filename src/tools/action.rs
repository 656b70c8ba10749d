use std::time::Duration;

use serde_json::Value;

use crate::error::AgentError;
use crate::types::{MouseButton, Position};

/// Anthropic scroll amounts are in wheel clicks.
pub const SCROLL_PX_PER_CLICK: i32 = 50;

/// Which computer-use argument schema a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputerDialect {
    /// `computer_20250124`: `{action, coordinate, text, scroll_direction, ...}`
    Anthropic,
    /// `computer_use_preview`: `{type, x, y, button, scroll_x, keys, path, ...}`
    OpenAi,
}

/// Every browser action the executor knows how to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Key { keys: Vec<String> },
    HoldKey { keys: Vec<String>, duration: Duration },
    Type { text: String },
    CursorPosition,
    MouseMove { to: Position },
    MouseDown { button: MouseButton },
    MouseUp { button: MouseButton },
    LeftClick { at: Option<Position>, modifiers: Vec<String> },
    RightClick { at: Option<Position> },
    MiddleClick { at: Option<Position> },
    DoubleClick { at: Option<Position> },
    TripleClick { at: Option<Position> },
    Drag { path: Vec<Position> },
    Scroll {
        at: Option<Position>,
        delta_x: i32,
        delta_y: i32,
        modifiers: Vec<String>,
    },
    Wait { duration: Duration },
    Screenshot,
    Tabs,
    CurrentTab,
    NewTab { url: String },
    SwitchToTab { index: usize },
    Goto { url: String },
    Back,
    Forward,
    Refresh,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Key { .. } => "key",
            Self::HoldKey { .. } => "hold_key",
            Self::Type { .. } => "type",
            Self::CursorPosition => "cursor_position",
            Self::MouseMove { .. } => "mouse_move",
            Self::MouseDown { .. } => "mouse_down",
            Self::MouseUp { .. } => "mouse_up",
            Self::LeftClick { .. } => "left_click",
            Self::RightClick { .. } => "right_click",
            Self::MiddleClick { .. } => "middle_click",
            Self::DoubleClick { .. } => "double_click",
            Self::TripleClick { .. } => "triple_click",
            Self::Drag { .. } => "drag",
            Self::Scroll { .. } => "scroll",
            Self::Wait { .. } => "wait",
            Self::Screenshot => "screenshot",
            Self::Tabs => "tabs",
            Self::CurrentTab => "current_tab",
            Self::NewTab { .. } => "new_tab",
            Self::SwitchToTab { .. } => "switch_to_tab",
            Self::Goto { .. } => "goto",
            Self::Back => "back",
            Self::Forward => "forward",
            Self::Refresh => "refresh",
        }
    }

    pub fn from_computer(dialect: ComputerDialect, args: &Value) -> Result<Self, AgentError> {
        match dialect {
            ComputerDialect::Anthropic => Self::from_anthropic(args),
            ComputerDialect::OpenAi => Self::from_openai(args),
        }
    }

    /// Parse Anthropic `computer` tool input.
    pub fn from_anthropic(args: &Value) -> Result<Self, AgentError> {
        let action = required_str(args, "action")?;
        let coordinate = || optional_position(args, "coordinate");
        let seconds = |default: f64| {
            let secs = args
                .get("duration")
                .and_then(Value::as_f64)
                .unwrap_or(default);
            Duration::from_secs_f64(secs.clamp(0.0, 3600.0))
        };

        Ok(match action {
            "key" => Self::Key {
                keys: key_list(required_str(args, "text")?),
            },
            "hold_key" => Self::HoldKey {
                keys: key_list(required_str(args, "text")?),
                duration: seconds(1.0),
            },
            "type" => Self::Type {
                text: required_str(args, "text")?.to_string(),
            },
            "cursor_position" => Self::CursorPosition,
            "mouse_move" => Self::MouseMove {
                to: coordinate()?.ok_or_else(|| missing("mouse_move", "coordinate"))?,
            },
            "left_mouse_down" => Self::MouseDown {
                button: MouseButton::Left,
            },
            "left_mouse_up" => Self::MouseUp {
                button: MouseButton::Left,
            },
            "left_click" => Self::LeftClick {
                at: coordinate()?,
                modifiers: args
                    .get("text")
                    .and_then(Value::as_str)
                    .map(key_list)
                    .unwrap_or_default(),
            },
            "left_click_drag" => {
                let start = optional_position(args, "start_coordinate")?
                    .ok_or_else(|| missing("left_click_drag", "start_coordinate"))?;
                let end = coordinate()?.ok_or_else(|| missing("left_click_drag", "coordinate"))?;
                Self::Drag {
                    path: vec![start, end],
                }
            }
            "right_click" => Self::RightClick { at: coordinate()? },
            "middle_click" => Self::MiddleClick { at: coordinate()? },
            "double_click" => Self::DoubleClick { at: coordinate()? },
            "triple_click" => Self::TripleClick { at: coordinate()? },
            "scroll" => {
                let direction = required_str(args, "scroll_direction")?;
                let amount = args
                    .get("scroll_amount")
                    .and_then(Value::as_f64)
                    .ok_or_else(|| missing("scroll", "scroll_amount"))?;
                let px = (amount * f64::from(SCROLL_PX_PER_CLICK)).round() as i32;
                let (delta_x, delta_y) = match direction {
                    "up" => (0, -px),
                    "down" => (0, px),
                    "left" => (-px, 0),
                    "right" => (px, 0),
                    other => {
                        return Err(AgentError::Protocol(format!(
                            "unknown scroll_direction {other:?}"
                        )));
                    }
                };
                Self::Scroll {
                    at: optional_position(args, "start_coordinate")?.or(coordinate()?),
                    delta_x,
                    delta_y,
                    modifiers: args
                        .get("text")
                        .and_then(Value::as_str)
                        .map(key_list)
                        .unwrap_or_default(),
                }
            }
            "wait" => Self::Wait {
                duration: seconds(1.0),
            },
            "screenshot" => Self::Screenshot,
            other => {
                return Err(AgentError::Protocol(format!(
                    "unknown computer action {other:?}"
                )));
            }
        })
    }

    /// Parse an OpenAI `computer_call` action object.
    pub fn from_openai(args: &Value) -> Result<Self, AgentError> {
        let kind = required_str(args, "type")?;
        let point = || -> Result<Position, AgentError> {
            Ok(Position::new(required_int(args, "x", kind)?, required_int(args, "y", kind)?))
        };

        Ok(match kind {
            "screenshot" => Self::Screenshot,
            "click" => match args.get("button").and_then(Value::as_str).unwrap_or("left") {
                "back" => Self::Back,
                "forward" => Self::Forward,
                "wheel" => Self::Scroll {
                    at: None,
                    delta_x: required_int(args, "x", kind)?,
                    delta_y: required_int(args, "y", kind)?,
                    modifiers: Vec::new(),
                },
                "right" => Self::RightClick { at: Some(point()?) },
                "middle" => Self::MiddleClick { at: Some(point()?) },
                _ => Self::LeftClick {
                    at: Some(point()?),
                    modifiers: Vec::new(),
                },
            },
            "double_click" => Self::DoubleClick { at: Some(point()?) },
            "scroll" => Self::Scroll {
                at: Some(point()?),
                delta_x: optional_int(args, "scroll_x").unwrap_or(0),
                delta_y: optional_int(args, "scroll_y").unwrap_or(0),
                modifiers: Vec::new(),
            },
            "type" => Self::Type {
                text: required_str(args, "text")?.to_string(),
            },
            "wait" => Self::Wait {
                duration: Duration::from_millis(
                    args.get("ms").and_then(Value::as_u64).unwrap_or(1000),
                ),
            },
            "move" => Self::MouseMove { to: point()? },
            "keypress" => {
                let keys = args
                    .get("keys")
                    .and_then(Value::as_array)
                    .ok_or_else(|| missing("keypress", "keys"))?
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect();
                Self::Key { keys }
            }
            "drag" => {
                let path = args
                    .get("path")
                    .and_then(Value::as_array)
                    .ok_or_else(|| missing("drag", "path"))?
                    .iter()
                    .map(position_value)
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| AgentError::Protocol("malformed drag path".to_string()))?;
                Self::Drag { path }
            }
            other => {
                return Err(AgentError::Protocol(format!(
                    "unknown computer action {other:?}"
                )));
            }
        })
    }

    /// Parse `browser_navigate` function arguments.
    pub fn from_navigate(args: &Value) -> Result<Self, AgentError> {
        let action = required_str(args, "action")?;
        let url = || required_str(args, "url").map(str::to_string);

        Ok(match action {
            "tabs" => Self::Tabs,
            "current_tab" => Self::CurrentTab,
            "new_tab" => Self::NewTab { url: url()? },
            "switch_to_tab" => {
                // Presence, not truthiness: index 0 is a valid tab.
                let value = args
                    .get("tab_index")
                    .filter(|v| !v.is_null())
                    .ok_or_else(|| missing("switch_to_tab", "tab_index"))?;
                Self::SwitchToTab {
                    index: tab_index(value)?,
                }
            }
            "goto" => Self::Goto { url: url()? },
            "back" => Self::Back,
            "forward" => Self::Forward,
            "refresh" => Self::Refresh,
            other => {
                return Err(AgentError::Protocol(format!(
                    "unknown browser_navigate action {other:?}"
                )));
            }
        })
    }
}

/// A non-negative whole number; `2.0` is accepted, `-1` and `1.5` are not.
fn tab_index(value: &Value) -> Result<usize, AgentError> {
    let index = value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
            .map(|f| f as u64)
    });
    index
        .and_then(|i| usize::try_from(i).ok())
        .ok_or_else(|| AgentError::Protocol(format!("invalid tab_index {value}")))
}

/// `"ctrl+shift+t"` → `["ctrl", "shift", "t"]`.
pub fn key_list(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    if !text.contains('+') || text == "+" {
        return vec![text.to_string()];
    }
    text.split('+')
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

fn missing(action: &str, field: &str) -> AgentError {
    AgentError::Protocol(format!("{action} requires `{field}`"))
}

fn required_str<'a>(args: &'a Value, field: &str) -> Result<&'a str, AgentError> {
    args.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::Protocol(format!("missing string field `{field}`")))
}

fn optional_int(args: &Value, field: &str) -> Option<i32> {
    args.get(field).and_then(number).map(|n| n.round() as i32)
}

fn required_int(args: &Value, field: &str, action: &str) -> Result<i32, AgentError> {
    optional_int(args, field).ok_or_else(|| missing(action, field))
}

fn number(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

/// `[x, y]` or `{"x": .., "y": ..}`; numbers may arrive as strings.
fn position_value(value: &Value) -> Option<Position> {
    let (x, y) = match value {
        Value::Array(pair) if pair.len() == 2 => (number(&pair[0])?, number(&pair[1])?),
        Value::Object(obj) => (number(obj.get("x")?)?, number(obj.get("y")?)?),
        _ => return None,
    };
    Some(Position::new(x.round() as i32, y.round() as i32))
}

/// Absent is fine; present but malformed is a protocol violation.
fn optional_position(args: &Value, field: &str) -> Result<Option<Position>, AgentError> {
    match args.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => position_value(value)
            .map(Some)
            .ok_or_else(|| AgentError::Protocol(format!("malformed `{field}`"))),
    }
}
