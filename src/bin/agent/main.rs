mod config;
mod face;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use grasp_agent::browser::ChromeDriver;
use grasp_agent::providers::{self, ProviderContext};
use grasp_agent::tools::{CredentialStore, JsonCredentialStore};
use grasp_agent::{ActionExecutor, Agent, BrowserSession, ExecutorOptions, LogHub, prompt};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use face::{AppState, TaskRequest};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();
    info!(provider = %config.provider, "starting browser agent");

    // provider first: a missing key should fail before Chrome starts
    let context = ProviderContext {
        system_prompt: prompt::system_prompt(),
        dimensions: config.dimensions(),
    };
    let provider = providers::build_provider(config.provider, context, &providers::process_env)
        .context("configuring the model provider")?;

    let credentials: Arc<dyn CredentialStore> = match &config.credentials {
        Some(path) => Arc::new(JsonCredentialStore::load(path)?),
        None => Arc::new(JsonCredentialStore::empty()),
    };

    info!("launching Chrome");
    let driver = ChromeDriver::launch(config.chrome_options())
        .await
        .context("launching Chrome")?;
    let session = Arc::new(BrowserSession::launch(Arc::new(driver), config.session_options()).await?);
    let executor = Arc::new(ActionExecutor::new(
        session.clone(),
        credentials,
        ExecutorOptions::default(),
    ));
    let agent = Agent::new(provider, executor, config.agent_options());

    let shutdown = CancellationToken::new();
    let logs = LogHub::default();
    let (frames, _) = broadcast::channel(4);
    let (task_tx, task_rx) = mpsc::channel(8);

    face::spawn_screenshot_poller(session.clone(), frames.clone(), shutdown.clone());
    face::serve(
        AppState {
            task_tx,
            logs: logs.clone(),
            frames,
        },
        config.port,
        shutdown.clone(),
    )
    .await?;

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            signal.cancel();
        }
    });

    run_tasks(&agent, task_rx, &logs, &shutdown).await;

    if let Err(e) = session.close().await {
        warn!(error = %e, "closing the browser failed");
    }
    Ok(())
}

/// One task at a time, in arrival order, until shutdown.
async fn run_tasks(
    agent: &Agent,
    mut tasks: mpsc::Receiver<TaskRequest>,
    logs: &LogHub,
    shutdown: &CancellationToken,
) {
    info!("ready for tasks");
    loop {
        let request = tokio::select! {
            _ = shutdown.cancelled() => break,
            request = tasks.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };

        let log = logs.transaction();
        log.task(&request.task);
        let cancel = shutdown.child_token();
        let outcome = match agent.run(&request.task, &log, &cancel).await {
            Ok(text) => {
                info!(transaction = log.transaction_id(), "task complete");
                log.result(&text);
                Ok(text)
            }
            Err(e) => {
                error!(transaction = log.transaction_id(), error = %e, "task failed");
                log.error(&e.to_string());
                Err(e.to_string())
            }
        };
        // the caller may have gone away
        let _ = request.reply.send(outcome);
    }
}
