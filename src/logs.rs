//! Task log fan-out. Every appended turn and every task outcome becomes a
//! [`LogEntry`] on a broadcast channel; slow listeners lose entries.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

use crate::agent::{AgentState, TurnObserver};
use crate::conversation::Turn;

pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Task,
    Turn,
    State,
    Result,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub transaction_id: String,
    pub log_id: String,
    pub kind: LogKind,
    pub message: Value,
}

#[derive(Debug, Clone)]
pub struct LogHub {
    tx: broadcast::Sender<LogEntry>,
}

impl Default for LogHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl LogHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn publish(&self, transaction_id: &str, kind: LogKind, message: Value) -> LogEntry {
        let entry = LogEntry {
            transaction_id: transaction_id.to_string(),
            log_id: Uuid::new_v4().to_string(),
            kind,
            message,
        };
        // no listeners is fine
        let delivered = self.tx.send(entry.clone()).unwrap_or(0);
        trace!(?kind, delivered, "log entry published");
        entry
    }

    /// Logger for one task under a fresh transaction id.
    pub fn transaction(&self) -> TaskLog {
        TaskLog {
            hub: self.clone(),
            transaction_id: Uuid::new_v4().to_string(),
        }
    }
}

/// Publishes one task's entries under a shared transaction id.
#[derive(Debug, Clone)]
pub struct TaskLog {
    hub: LogHub,
    transaction_id: String,
}

impl TaskLog {
    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    pub fn task(&self, task: &str) {
        self.hub
            .publish(&self.transaction_id, LogKind::Task, Value::String(task.to_string()));
    }

    pub fn result(&self, text: &str) {
        self.hub
            .publish(&self.transaction_id, LogKind::Result, Value::String(text.to_string()));
    }

    pub fn error(&self, message: &str) {
        self.hub
            .publish(&self.transaction_id, LogKind::Error, Value::String(message.to_string()));
    }
}

impl TurnObserver for TaskLog {
    /// Screenshots are streamed separately, so turns are logged without images.
    fn on_turn(&self, turn: &Turn) {
        let mut turn = turn.clone();
        turn.strip_images();
        let message = serde_json::to_value(&turn).unwrap_or(Value::Null);
        self.hub.publish(&self.transaction_id, LogKind::Turn, message);
    }

    fn on_state(&self, state: AgentState) {
        self.hub.publish(
            &self.transaction_id,
            LogKind::State,
            Value::String(format!("{state:?}")),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{ImageData, ResultPart, ToolResult};

    #[test]
    fn entries_share_transaction_and_have_unique_ids() {
        let hub = LogHub::default();
        let mut rx = hub.subscribe();
        let log = hub.transaction();

        log.task("find cats");
        log.on_state(AgentState::AwaitingModel);
        log.result("found 3 cats");

        let entries: Vec<LogEntry> = (0..3).map(|_| rx.try_recv().unwrap()).collect();
        assert!(entries.iter().all(|e| e.transaction_id == log.transaction_id()));
        assert_ne!(entries[0].log_id, entries[1].log_id);
        assert_eq!(entries[0].kind, LogKind::Task);
        assert_eq!(entries[1].message, "AwaitingModel");
        assert_eq!(entries[2].message, "found 3 cats");
    }

    #[test]
    fn logged_turns_drop_images() {
        let hub = LogHub::default();
        let mut rx = hub.subscribe();
        let turn = Turn::tool_results(vec![ToolResult {
            call_id: "c".into(),
            content: vec![
                ResultPart::Text { text: "Success".into() },
                ResultPart::Image(ImageData::png_base64("AAAA")),
            ],
        }]);
        hub.transaction().on_turn(&turn);

        let entry = rx.try_recv().unwrap();
        let parts = entry.message["content"][0]["content"].as_array().unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0]["text"], "Success");
    }

    #[test]
    fn serializes_in_camel_case() {
        let entry = LogHub::default().publish("tx", LogKind::Error, Value::from("boom"));
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["transactionId"], "tx");
        assert!(json["logId"].is_string());
        assert_eq!(json["kind"], "error");
    }
}
