//! Browser agent driven by LLM computer-use tools.
//!
//! A task goes in as text. The [`agent::Agent`] loop asks a [`providers::Provider`]
//! for the next turn, runs the tool calls it contains against a
//! [`browser::BrowserSession`] with human-looking input timing, and feeds the
//! screenshots back until the model answers in plain text.

pub mod agent;
pub mod browser;
pub mod conversation;
pub mod error;
pub mod human;
pub mod logs;
pub mod prompt;
pub mod providers;
pub mod tools;
pub mod types;

pub use agent::{Agent, AgentOptions, AgentState, NoopObserver, TaskOutcome, TurnObserver};
pub use browser::{BrowserSession, SessionOptions};
pub use conversation::{ContentPart, History, Role, ToolCall, ToolResult, Turn};
pub use error::{AgentError, BrowserError, ProviderError, Result};
pub use logs::{LogEntry, LogHub, LogKind, TaskLog};
pub use providers::{Provider, ProviderContext, ProviderKind, build_provider};
pub use tools::{ActionExecutor, ExecutorOptions};
pub use types::{Dimensions, MAX_TURNS_PER_TASK, MouseButton, Position, Tab};
