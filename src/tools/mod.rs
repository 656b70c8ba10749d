//! Tool calls from the model, parsed into actions and run against the browser.

pub mod action;
pub mod credentials;
pub mod definitions;
pub mod executor;

use serde_json::Value;

pub use action::{Action, ComputerDialect, SCROLL_PX_PER_CLICK};
pub use credentials::{CredentialField, CredentialStore, Credentials, JsonCredentialStore};
pub use definitions::{COMPUTER_TOOL, CREDENTIALS_TOOL, FunctionTool, NAVIGATE_TOOL};
pub use executor::{ActionExecutor, ExecutionResult, ExecutorOptions};

use crate::conversation::ToolCall;
use crate::error::AgentError;

/// A tool call the executor can run.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInvocation {
    Browser(Action),
    FillCredentials { url: String, field: CredentialField },
}

impl ToolInvocation {
    /// Resolve a model tool call. Unknown tools and malformed arguments are
    /// protocol violations.
    pub fn parse(call: &ToolCall, dialect: ComputerDialect) -> Result<Self, AgentError> {
        let args: Value = if call.arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(&call.arguments).map_err(|e| {
                AgentError::Protocol(format!("arguments of {} are not JSON: {e}", call.name))
            })?
        };

        match call.name.as_str() {
            COMPUTER_TOOL => Action::from_computer(dialect, &args).map(Self::Browser),
            NAVIGATE_TOOL => Action::from_navigate(&args).map(Self::Browser),
            CREDENTIALS_TOOL => {
                let url = args
                    .get("url")
                    .and_then(Value::as_str)
                    .ok_or_else(|| AgentError::Protocol("fillin_credentials requires `url`".into()))?
                    .to_string();
                let field = args
                    .get("field")
                    .cloned()
                    .ok_or_else(|| AgentError::Protocol("fillin_credentials requires `field`".into()))
                    .and_then(|v| {
                        serde_json::from_value(v)
                            .map_err(|e| AgentError::Protocol(format!("bad credential field: {e}")))
                    })?;
                Ok(Self::FillCredentials { url, field })
            }
            other => Err(AgentError::Protocol(format!("unknown tool {other:?}"))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Browser(action) => action.name(),
            Self::FillCredentials { .. } => CREDENTIALS_TOOL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, arguments: &str) -> ToolCall {
        ToolCall {
            id: "call_1".to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }

    #[test]
    fn routes_by_tool_name() {
        let nav = ToolInvocation::parse(
            &call(NAVIGATE_TOOL, r#"{"action":"current_tab"}"#),
            ComputerDialect::Anthropic,
        )
        .unwrap();
        assert_eq!(nav, ToolInvocation::Browser(Action::CurrentTab));

        let openai = ToolInvocation::parse(
            &call(COMPUTER_TOOL, r#"{"type":"screenshot"}"#),
            ComputerDialect::OpenAi,
        )
        .unwrap();
        assert_eq!(openai, ToolInvocation::Browser(Action::Screenshot));

        let creds = ToolInvocation::parse(
            &call(CREDENTIALS_TOOL, r#"{"url":"https://a.com","field":"password"}"#),
            ComputerDialect::Anthropic,
        )
        .unwrap();
        assert_eq!(
            creds,
            ToolInvocation::FillCredentials {
                url: "https://a.com".to_string(),
                field: CredentialField::Password
            }
        );
    }

    #[test]
    fn unknown_tool_and_bad_json_are_protocol_errors() {
        for c in [
            call("file_system", "{}"),
            call(COMPUTER_TOOL, "{not json"),
            call(CREDENTIALS_TOOL, r#"{"url":"https://a.com","field":"pin"}"#),
        ] {
            assert!(matches!(
                ToolInvocation::parse(&c, ComputerDialect::Anthropic),
                Err(AgentError::Protocol(_))
            ));
        }
    }
}
