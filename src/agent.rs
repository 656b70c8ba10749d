//! The loop that drives one task: ask the model, run the tools it calls, feed
//! the results back, until it answers without calling anything.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::conversation::{History, ToolCall, Turn};
use crate::error::{AgentError, ProviderError, Result};
use crate::providers::Provider;
use crate::tools::{ActionExecutor, ToolInvocation};
use crate::types::MAX_TURNS_PER_TASK;

pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Seeded,
    AwaitingModel,
    DispatchingTools,
    Done,
}

/// Sees every turn as it is appended and every state change.
pub trait TurnObserver: Send + Sync {
    fn on_turn(&self, _turn: &Turn) {}

    fn on_state(&self, _state: AgentState) {}
}

pub struct NoopObserver;

impl TurnObserver for NoopObserver {}

#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// Model calls allowed per task.
    pub max_turns: usize,
    pub provider_timeout: Duration,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            max_turns: MAX_TURNS_PER_TASK,
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskOutcome {
    /// Text of the final reply.
    pub text: String,
    pub history: History,
    pub model_calls: usize,
}

pub struct Agent {
    provider: Arc<dyn Provider>,
    executor: Arc<ActionExecutor>,
    options: AgentOptions,
}

impl Agent {
    pub fn new(provider: Arc<dyn Provider>, executor: Arc<ActionExecutor>, options: AgentOptions) -> Self {
        Self {
            provider,
            executor,
            options,
        }
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn executor(&self) -> &Arc<ActionExecutor> {
        &self.executor
    }

    /// Run `task` to completion and return the model's final text.
    pub async fn run(
        &self,
        task: &str,
        observer: &dyn TurnObserver,
        cancel: &CancellationToken,
    ) -> Result<String> {
        self.run_task(task, observer, cancel).await.map(|o| o.text)
    }

    pub async fn run_task(
        &self,
        task: &str,
        observer: &dyn TurnObserver,
        cancel: &CancellationToken,
    ) -> Result<TaskOutcome> {
        info!(provider = self.provider.name(), %task, "task started");
        self.provider.reset();

        let mut history = History::seeded(task);
        observer.on_state(AgentState::Seeded);
        if let Some(seed) = history.last() {
            observer.on_turn(seed);
        }

        let mut model_calls = 0;
        loop {
            enter(AgentState::AwaitingModel, observer, cancel)?;
            if model_calls >= self.options.max_turns {
                warn!(model_calls, "turn limit reached");
                return Err(AgentError::TurnLimit(self.options.max_turns));
            }
            history.prune_images();
            model_calls += 1;

            let reply = self.generate(&history, cancel).await?;
            observer.on_turn(&reply);
            let calls: Vec<ToolCall> = reply.tool_calls().cloned().collect();
            let text = reply.text();
            history.push(reply);

            if calls.is_empty() {
                enter(AgentState::Done, observer, cancel)?;
                info!(model_calls, "task finished");
                return Ok(TaskOutcome {
                    text,
                    history,
                    model_calls,
                });
            }

            enter(AgentState::DispatchingTools, observer, cancel)?;
            // resolve every call first so a bad one runs nothing
            let dialect = self.provider.dialect();
            let invocations = calls
                .iter()
                .map(|call| ToolInvocation::parse(call, dialect))
                .collect::<Result<Vec<_>>>()?;

            let mut results = Vec::with_capacity(calls.len());
            for (call, invocation) in calls.iter().zip(&invocations) {
                if cancel.is_cancelled() {
                    info!(call_id = %call.id, "task cancelled during dispatch");
                    return Err(AgentError::Cancelled);
                }
                debug!(call_id = %call.id, tool = %call.name, "dispatching");
                let outcome = self.executor.execute(invocation).await?;
                results.push(outcome.into_tool_result(call.id.as_str()));
            }
            history.push_tool_results(results);
            if let Some(turn) = history.last() {
                observer.on_turn(turn);
            }
        }
    }

    async fn generate(&self, history: &History, cancel: &CancellationToken) -> Result<Turn> {
        let timeout = self.options.provider_timeout;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AgentError::Cancelled),
            reply = tokio::time::timeout(timeout, self.provider.generate(history.turns())) => {
                reply
                    .map_err(|_| ProviderError::Timeout(timeout))?
                    .map_err(AgentError::from)
            }
        }
    }
}

fn enter(state: AgentState, observer: &dyn TurnObserver, cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        info!(?state, "task cancelled");
        return Err(AgentError::Cancelled);
    }
    debug!(?state, "agent state");
    observer.on_state(state);
    Ok(())
}
