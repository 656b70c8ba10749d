use serde_json::{Value, json};

pub const COMPUTER_TOOL: &str = "computer";
pub const NAVIGATE_TOOL: &str = "browser_navigate";
pub const CREDENTIALS_TOOL: &str = "fillin_credentials";

const NAVIGATE_DESCRIPTION: &str = "Navigate the browser";

const NAVIGATE_ACTIONS: &str = r#"The action to perform. The available actions are:
* "tabs": Get a list of all open tabs.
* "current_tab": Get the current tab you are on.
* "new_tab": Create a new tab, and navigate to the URL you provide.
* "switch_to_tab": Switch to another tab.
* "goto": Navigate current tab to the URL you provide. This won't create a new tab.
* "back": Go back to the previous page in the current tab.
* "forward": Go forward to the next page in the current tab.
* "refresh": Refresh the current page."#;

const CREDENTIALS_DESCRIPTION: &str = "Fill in username or password into the input field on a website. \
The user does not need to provide the credentials, this tool looks them up by domain. \
This tool only types the text and cannot click or perform any other action, so click on the input field first and then use this tool.";

/// A plain function tool, independent of any provider's wire format.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionTool {
    pub name: &'static str,
    pub description: &'static str,
    /// JSON schema of the arguments object.
    pub parameters: Value,
}

pub fn navigate_tool() -> FunctionTool {
    FunctionTool {
        name: NAVIGATE_TOOL,
        description: NAVIGATE_DESCRIPTION,
        parameters: json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["tabs", "current_tab", "new_tab", "switch_to_tab", "goto", "back", "forward", "refresh"],
                    "description": NAVIGATE_ACTIONS,
                },
                "url": {
                    "type": "string",
                    "description": "The URL to navigate to. Required only by `action=new_tab` or `action=goto`.",
                },
                "tab_index": {
                    "type": "number",
                    "description": "The index of the page to switch to. Required only by `action=switch_to_tab`.",
                },
            },
            "required": ["action"],
        }),
    }
}

pub fn credentials_tool() -> FunctionTool {
    FunctionTool {
        name: CREDENTIALS_TOOL,
        description: CREDENTIALS_DESCRIPTION,
        parameters: json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The full URL of the website you are currently on.",
                },
                "field": {
                    "type": "string",
                    "enum": ["username", "password"],
                    "description": "The field to fill in.",
                },
            },
            "required": ["url", "field"],
        }),
    }
}

/// Function tools offered alongside the provider's native computer tool.
pub fn function_tools() -> Vec<FunctionTool> {
    vec![navigate_tool(), credentials_tool()]
}
