use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use grasp_agent::{BrowserSession, LogEntry, LogHub};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const SCREENSHOT_INTERVAL: Duration = Duration::from_millis(200);

/// One task handed from the web front to the worker.
pub struct TaskRequest {
    pub task: String,
    pub reply: oneshot::Sender<Result<String, String>>,
}

#[derive(Clone)]
pub struct AppState {
    pub task_tx: mpsc::Sender<TaskRequest>,
    pub logs: LogHub,
    pub frames: broadcast::Sender<String>,
}

#[derive(Deserialize)]
struct OperatePayload {
    task: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/operate", post(operate_handler))
        .route("/events", get(sse_handler))
        .route("/favicon.ico", get(|| async { StatusCode::NO_CONTENT }))
        .with_state(Arc::new(state))
}

/// Bind the first free port in `first..first + 10` and serve until `shutdown`.
pub async fn serve(state: AppState, first: u16, shutdown: CancellationToken) -> anyhow::Result<u16> {
    let mut bound = None;
    for port in first..first.saturating_add(10) {
        match tokio::net::TcpListener::bind(("127.0.0.1", port)).await {
            Ok(listener) => {
                bound = Some((listener, port));
                break;
            }
            Err(e) => debug!(port, error = %e, "port busy"),
        }
    }
    let Some((listener, port)) = bound else {
        anyhow::bail!("could not bind any port {first}-{}", first.saturating_add(9));
    };

    info!("dashboard running at http://localhost:{port}");
    let app = router(state);
    tokio::spawn(async move {
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
        if let Err(e) = served {
            warn!(error = %e, "dashboard server stopped");
        }
    });
    Ok(port)
}

/// Publish a screenshot every [`SCREENSHOT_INTERVAL`] while someone is watching.
pub fn spawn_screenshot_poller(
    session: Arc<BrowserSession>,
    frames: broadcast::Sender<String>,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SCREENSHOT_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if frames.receiver_count() == 0 {
                continue;
            }
            match session.screenshot().await {
                Ok(png) if !png.is_empty() => {
                    let _ = frames.send(format!("data:image/png;base64,{}", STANDARD.encode(png)));
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "dashboard screenshot failed"),
            }
        }
    });
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn operate_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<OperatePayload>,
) -> Response {
    info!(task = %payload.task, "POST /api/operate");
    let (reply, answer) = oneshot::channel();
    let request = TaskRequest {
        task: payload.task,
        reply,
    };
    if state.task_tx.send(request).await.is_err() {
        return failure("agent is shutting down".to_string());
    }
    match answer.await {
        Ok(Ok(text)) => Json(text).into_response(),
        Ok(Err(message)) => failure(message),
        Err(_) => failure("task was dropped".to_string()),
    }
}

fn failure(message: String) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": message }))).into_response()
}

fn log_event(entry: &LogEntry) -> Event {
    Event::default()
        .event("log")
        .json_data(entry)
        .unwrap_or_else(|_| Event::default().event("log").data("{}"))
}

async fn sse_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    // lagged receivers skip what they missed
    let logs = BroadcastStream::new(state.logs.subscribe())
        .filter_map(|entry| entry.ok().map(|entry| Ok::<_, Infallible>(log_event(&entry))));
    let frames = BroadcastStream::new(state.frames.subscribe()).filter_map(|frame| {
        frame
            .ok()
            .map(|url| Ok::<_, Infallible>(Event::default().event("screenshot").data(url)))
    });
    Sse::new(logs.merge(frames)).keep_alive(KeepAlive::default())
}

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Grasp Agent</title>
<style>
  * { margin: 0; padding: 0; box-sizing: border-box; }
  body {
    background: #0a0a0f;
    color: #e0e0e0;
    font-family: 'Segoe UI', system-ui, -apple-system, sans-serif;
    height: 100vh;
    display: flex;
    flex-direction: column;
  }
  header {
    padding: 24px 32px;
    border-bottom: 1px solid #1a1a2e;
    display: flex;
    align-items: center;
    gap: 12px;
  }
  header h1 { font-size: 20px; font-weight: 600; color: #fff; }
  header .dot {
    width: 8px; height: 8px;
    border-radius: 50%;
    background: #22c55e;
    animation: pulse 2s infinite;
  }
  header .dot.busy { background: #f59e0b; }
  @keyframes pulse { 0%, 100% { opacity: 1; } 50% { opacity: 0.4; } }
  .main {
    flex: 1;
    display: flex;
    gap: 24px;
    padding: 24px 32px;
    overflow: hidden;
  }
  .screen {
    flex: 3;
    display: flex;
    align-items: flex-start;
    justify-content: center;
  }
  .screen img {
    max-width: 100%;
    max-height: 100%;
    border: 1px solid #1a1a2e;
    border-radius: 8px;
    background: #111118;
  }
  .side {
    flex: 2;
    display: flex;
    flex-direction: column;
    gap: 16px;
    min-width: 320px;
  }
  #log {
    flex: 1;
    overflow-y: auto;
    display: flex;
    flex-direction: column;
    gap: 8px;
    padding-right: 8px;
  }
  #log::-webkit-scrollbar { width: 6px; }
  #log::-webkit-scrollbar-thumb { background: #333; border-radius: 3px; }
  .entry {
    padding: 10px 14px;
    border-radius: 8px;
    font-size: 14px;
    line-height: 1.5;
    white-space: pre-wrap;
    word-break: break-word;
    animation: fadeIn 0.2s ease;
  }
  @keyframes fadeIn { from { opacity: 0; transform: translateY(4px); } to { opacity: 1; } }
  .entry.task { background: #1a1a2e; border-left: 3px solid #6366f1; }
  .entry.call {
    background: #111118;
    border-left: 3px solid #3b82f6;
    font-family: 'Cascadia Code', 'Fira Code', monospace;
    font-size: 13px;
  }
  .entry.thinking { background: #111118; border-left: 3px solid #f59e0b; color: #fcd34d; }
  .entry.tool { background: #111118; border-left: 3px solid #475569; color: #94a3b8; font-size: 13px; }
  .entry.error { background: #1a0a0a; border-left: 3px solid #ef4444; color: #fca5a5; }
  .entry.done { background: #0a1a0a; border-left: 3px solid #22c55e; color: #86efac; }
  .input-area { display: flex; gap: 8px; }
  #task {
    flex: 1;
    background: #111118;
    border: 1px solid #222;
    border-radius: 8px;
    padding: 12px 16px;
    color: #fff;
    font-size: 16px;
    outline: none;
  }
  #task:focus { border-color: #6366f1; }
  #task:disabled { opacity: 0.5; }
  button {
    background: #6366f1;
    color: #fff;
    border: none;
    border-radius: 8px;
    padding: 12px 24px;
    font-size: 15px;
    font-weight: 600;
    cursor: pointer;
  }
  button:hover { background: #4f46e5; }
  button:disabled { background: #333; cursor: not-allowed; }
</style>
</head>
<body>
  <header>
    <div class="dot" id="status-dot"></div>
    <h1>Grasp Agent</h1>
  </header>
  <div class="main">
    <div class="screen"><img id="screen" alt="browser"></div>
    <div class="side">
      <div id="log"></div>
      <div class="input-area">
        <input type="text" id="task" placeholder="Tell the agent what to do..." autofocus />
        <button id="send" onclick="send()">Send</button>
      </div>
    </div>
  </div>
<script>
  const log = document.getElementById('log');
  const task = document.getElementById('task');
  const sendBtn = document.getElementById('send');
  const dot = document.getElementById('status-dot');
  const screen = document.getElementById('screen');
  let busy = false;

  function addEntry(cls, text) {
    const div = document.createElement('div');
    div.className = 'entry ' + cls;
    div.textContent = text;
    log.appendChild(div);
    log.scrollTop = log.scrollHeight;
  }

  function setBusy(b) {
    busy = b;
    task.disabled = b;
    sendBtn.disabled = b;
    dot.className = b ? 'dot busy' : 'dot';
    if (!b) task.focus();
  }

  async function send() {
    const text = task.value.trim();
    if (!text || busy) return;
    task.value = '';
    setBusy(true);
    try {
      await fetch('/api/operate', {
        method: 'POST',
        headers: {'Content-Type': 'application/json'},
        body: JSON.stringify({task: text}),
      });
    } finally {
      setBusy(false);
    }
  }

  task.addEventListener('keydown', e => { if (e.key === 'Enter') send(); });

  function showTurn(turn) {
    for (const part of turn.content) {
      switch (part.type) {
        case 'text':
          if (turn.role === 'assistant') addEntry('done', part.text);
          break;
        case 'thinking':
          addEntry('thinking', part.thinking);
          break;
        case 'tool_call':
          addEntry('call', part.name + ' ' + part.arguments);
          break;
        case 'tool_result':
          addEntry('tool', part.content.filter(c => c.type === 'text').map(c => c.text).join('\n'));
          break;
      }
    }
  }

  const es = new EventSource('/events');

  es.addEventListener('log', e => {
    const entry = JSON.parse(e.data);
    switch (entry.kind) {
      case 'task': addEntry('task', 'You: ' + entry.message); break;
      case 'turn': showTurn(entry.message); break;
      case 'error': addEntry('error', 'Task failed: ' + entry.message); break;
    }
  });

  es.addEventListener('screenshot', e => { screen.src = e.data; });

  addEntry('done', 'Agent ready. Type a task to begin.');
</script>
</body>
</html>
"##;

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;

    fn state() -> (AppState, mpsc::Receiver<TaskRequest>) {
        let (task_tx, task_rx) = mpsc::channel(4);
        let (frames, _) = broadcast::channel(4);
        (
            AppState {
                task_tx,
                logs: LogHub::default(),
                frames,
            },
            task_rx,
        )
    }

    fn operate(task: &str) -> Request<Body> {
        Request::post("/api/operate")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "task": task }).to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn operate_returns_final_text() {
        let (state, mut rx) = state();
        tokio::spawn(async move {
            let request = rx.recv().await.unwrap();
            let _ = request.reply.send(Ok(format!("did {}", request.task)));
        });

        let response = router(state).oneshot(operate("search")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], br#""did search""#);
    }

    #[tokio::test]
    async fn operate_failure_is_500_with_error() {
        let (state, mut rx) = state();
        tokio::spawn(async move {
            let request = rx.recv().await.unwrap();
            let _ = request.reply.send(Err("provider down".into()));
        });

        let response = router(state).oneshot(operate("search")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "provider down");
    }
}
