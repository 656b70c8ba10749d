use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::credentials::{CredentialField, CredentialStore, domain_of};
use super::{Action, ToolInvocation};
use crate::browser::{BrowserSession, HistoryOutcome};
use crate::conversation::{ImageData, ResultPart, ToolResult};
use crate::error::BrowserError;
use crate::types::{MouseButton, Position};

pub const DEFAULT_RESULT_TEXT: &str = "Success";

pub const SCROLL_RESULT_TEXT: &str = "Scroll success. Here are two screenshots, the first one is before scrolling, the second one is after scrolling.";

pub const NO_PREVIOUS_PAGE_TEXT: &str = "No previous page to go back to. Maybe the previous page opened a new tab. Use tabs to check it and use switch_to_tab to switch to the one you want.";

const NO_SCREENSHOT_NOTE: &str = "(No screenshot available: there is no active tab.)";

#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Wait before the post-action screenshot.
    pub settle_delay: Duration,
    /// Shorter wait before the after-scroll screenshot.
    pub scroll_settle_delay: Duration,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(2),
            scroll_settle_delay: Duration::from_millis(500),
        }
    }
}

/// What an action produced: text plus base64 PNG screenshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub text: String,
    pub images: Vec<String>,
}

impl ExecutionResult {
    pub fn into_tool_result(self, call_id: impl Into<String>) -> ToolResult {
        let mut content = vec![ResultPart::Text { text: self.text }];
        content.extend(
            self.images
                .into_iter()
                .map(|data| ResultPart::Image(ImageData::png_base64(data))),
        );
        ToolResult {
            call_id: call_id.into(),
            content,
        }
    }
}

/// Runs tool invocations against one browser session.
pub struct ActionExecutor {
    session: Arc<BrowserSession>,
    credentials: Arc<dyn CredentialStore>,
    options: ExecutorOptions,
}

impl ActionExecutor {
    pub fn new(
        session: Arc<BrowserSession>,
        credentials: Arc<dyn CredentialStore>,
        options: ExecutorOptions,
    ) -> Self {
        Self {
            session,
            credentials,
            options,
        }
    }

    pub fn session(&self) -> &Arc<BrowserSession> {
        &self.session
    }

    /// Perform the invocation, then attach the post-action screenshot(s).
    ///
    /// Tab-level problems the model can fix come back as result text; anything
    /// else fails the task.
    pub async fn execute(&self, invocation: &ToolInvocation) -> Result<ExecutionResult, BrowserError> {
        info!(action = invocation.name(), "executing");
        let outcome = match invocation {
            ToolInvocation::Browser(Action::Scroll {
                at,
                delta_x,
                delta_y,
                modifiers,
            }) => {
                self.scroll(*at, *delta_x, *delta_y, modifiers).await
            }
            ToolInvocation::Browser(action) => self.perform(action).await,
            ToolInvocation::FillCredentials { url, field } => self.fill_credentials(url, *field).await,
        };

        let mut result = match outcome {
            Ok(result) => result,
            Err(e) if e.is_transient() => {
                warn!(action = invocation.name(), error = %e, "recoverable browser condition");
                ExecutionResult {
                    text: recovery_text(&e),
                    images: Vec::new(),
                }
            }
            Err(e) => return Err(e),
        };

        if result.text.is_empty() {
            result.text = DEFAULT_RESULT_TEXT.to_string();
        }
        if result.images.is_empty() {
            tokio::time::sleep(self.options.settle_delay).await;
            let shot = self.session.screenshot_base64().await?;
            if shot.is_empty() {
                result.text = format!("{}\n{NO_SCREENSHOT_NOTE}", result.text);
            } else {
                result.images.push(shot);
            }
        }
        Ok(result)
    }

    async fn perform(&self, action: &Action) -> Result<ExecutionResult, BrowserError> {
        let session = &self.session;
        let mut text = String::new();

        match action {
            Action::Key { keys } => session.key_press(keys).await?,
            Action::HoldKey { keys, duration } => {
                session.key_down(keys).await?;
                tokio::time::sleep(*duration).await;
                session.key_up(&reversed(keys)).await?;
            }
            Action::Type { text } => session.type_text(text).await?,
            Action::CursorPosition => {
                let Position { x, y } = session.cursor_position();
                text = format!("X: {x}, Y: {y}");
            }
            Action::MouseMove { to } => session.move_to(to.x, to.y).await?,
            Action::MouseDown { button } => session.mouse_down(*button).await?,
            Action::MouseUp { button } => session.mouse_up(*button).await?,
            Action::LeftClick { at, modifiers } => {
                self.move_if(*at).await?;
                self.with_modifiers(modifiers, session.click(MouseButton::Left, 1))
                    .await?;
            }
            Action::RightClick { at } => {
                self.move_if(*at).await?;
                session.click(MouseButton::Right, 1).await?;
            }
            Action::MiddleClick { at } => {
                self.move_if(*at).await?;
                session.click(MouseButton::Middle, 1).await?;
            }
            Action::DoubleClick { at } => {
                self.move_if(*at).await?;
                session.double_click().await?;
            }
            Action::TripleClick { at } => {
                self.move_if(*at).await?;
                session.click(MouseButton::Left, 3).await?;
            }
            Action::Drag { path } => session.drag(path).await?,
            Action::Scroll {
                at,
                delta_x,
                delta_y,
                modifiers,
            } => {
                self.move_if(*at).await?;
                self.with_modifiers(modifiers, session.scroll(*delta_x, *delta_y))
                    .await?;
            }
            Action::Wait { duration } => tokio::time::sleep(*duration).await,
            Action::Screenshot => {}
            Action::Tabs => text = to_json(&session.tabs().await?),
            Action::CurrentTab => text = to_json(&session.current_tab().await?),
            Action::NewTab { url } => session.new_tab(url).await?,
            Action::SwitchToTab { index } => session.switch_to_tab(*index).await?,
            Action::Goto { url } => session.goto(url).await?,
            Action::Back => {
                if session.back().await? == HistoryOutcome::NoPreviousEntry {
                    text = NO_PREVIOUS_PAGE_TEXT.to_string();
                }
            }
            Action::Forward => {
                session.forward().await?;
            }
            Action::Refresh => session.refresh().await?,
        }

        Ok(ExecutionResult {
            text,
            images: Vec::new(),
        })
    }

    /// Before/after pair around the scroll.
    async fn scroll(
        &self,
        at: Option<Position>,
        delta_x: i32,
        delta_y: i32,
        modifiers: &[String],
    ) -> Result<ExecutionResult, BrowserError> {
        let before = self.session.screenshot_base64().await?;
        self.perform(&Action::Scroll {
            at,
            delta_x,
            delta_y,
            modifiers: modifiers.to_vec(),
        })
        .await?;
        tokio::time::sleep(self.options.scroll_settle_delay).await;
        let after = self.session.screenshot_base64().await?;

        let images: Vec<String> = [before, after]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect();
        let text = if images.is_empty() {
            NO_SCREENSHOT_NOTE.to_string()
        } else {
            SCROLL_RESULT_TEXT.to_string()
        };
        Ok(ExecutionResult { text, images })
    }

    async fn fill_credentials(
        &self,
        url: &str,
        field: CredentialField,
    ) -> Result<ExecutionResult, BrowserError> {
        let Some(domain) = domain_of(url) else {
            return Ok(ExecutionResult {
                text: format!("Could not determine the domain of {url:?}."),
                images: Vec::new(),
            });
        };
        let creds = self.credentials.lookup(&domain);

        let text = match (field, creds) {
            (CredentialField::Username, Some(c)) if !c.username.is_empty() => {
                self.session.type_text(&c.username).await?;
                format!("Input username successfully, the username is: {}", c.username)
            }
            (CredentialField::Password, Some(c)) if !c.password.is_empty() => {
                self.session.type_text(&c.password).await?;
                "Input password successfully.".to_string()
            }
            (CredentialField::Username, _) => {
                format!("No username found for domain: {domain}. Ask the user to log in.")
            }
            (CredentialField::Password, _) => {
                format!("No password found for domain: {domain}. Ask the user to log in.")
            }
        };
        debug!(%domain, ?field, "credential fill");
        Ok(ExecutionResult {
            text,
            images: Vec::new(),
        })
    }

    async fn move_if(&self, at: Option<Position>) -> Result<(), BrowserError> {
        match at {
            Some(p) => self.session.move_to(p.x, p.y).await,
            None => Ok(()),
        }
    }

    /// Hold `modifiers` down around `op`, releasing in reverse order.
    async fn with_modifiers<F>(&self, modifiers: &[String], op: F) -> Result<(), BrowserError>
    where
        F: std::future::Future<Output = Result<(), BrowserError>>,
    {
        if modifiers.is_empty() {
            return op.await;
        }
        self.session.key_down(modifiers).await?;
        let outcome = op.await;
        self.session.key_up(&reversed(modifiers)).await?;
        outcome
    }
}

fn reversed(keys: &[String]) -> Vec<String> {
    keys.iter().rev().cloned().collect()
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
}

fn recovery_text(err: &BrowserError) -> String {
    match err {
        BrowserError::TabOutOfRange { index, count } => format!(
            "Invalid tab index {index}: there are {count} open tab(s). Use tabs to list them."
        ),
        BrowserError::NoActiveTab | BrowserError::TabNotFound(_) => {
            "The current tab is no longer open. Use tabs to check the open tabs and switch_to_tab to pick one.".to_string()
        }
        other => other.to_string(),
    }
}
