use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::Context;

use inbox_triage::api::{AppState, api_routes};
use inbox_triage::config::TriageConfig;
use inbox_triage::llm::{LlmConfig, create_provider};
use inbox_triage::mail::{GmailClient, GmailConfig, MailSource};
use inbox_triage::pipeline::{OutcomeStatus, TriageProcessor, spawn_triage_poller};
use inbox_triage::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = TriageConfig::from_env().context("invalid triage configuration")?;
    let llm_config = LlmConfig::from_env().context("LLM is not configured")?;
    let gmail_config = GmailConfig::from_env().context("Gmail is not configured")?;

    eprintln!("📬 Inbox Triage v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", llm_config.model);
    eprintln!("   Mailbox: {}", gmail_config.user_id);
    eprintln!(
        "   Replies: {}",
        if config.auto_send { "sent automatically" } else { "drafted only" }
    );
    eprintln!("   Database: {}", config.db_path.display());

    // ── Collaborators ───────────────────────────────────────────────────
    let llm = create_provider(&llm_config);
    let mail: Arc<dyn MailSource> = Arc::new(GmailClient::new(gmail_config));
    let store: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("failed to open database at {}", config.db_path.display()))?,
    );

    let processor = Arc::new(TriageProcessor::new(
        llm.clone(),
        Arc::clone(&mail),
        Arc::clone(&store),
        &config,
    ));

    // ── HTTP API ────────────────────────────────────────────────────────
    if let Some(port) = config.api_port {
        let app = api_routes(AppState {
            processor: Arc::clone(&processor),
            mail: Arc::clone(&mail),
            store: Arc::clone(&store),
            llm,
            batch_size: config.batch_size,
        });
        let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
            .await
            .with_context(|| format!("failed to bind API port {port}"))?;
        eprintln!("   API: http://0.0.0.0:{port}");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "API server stopped");
            }
        });
    }

    // ── Run ─────────────────────────────────────────────────────────────
    match config.poll_interval {
        None => {
            let outcomes = processor
                .run_once(config.batch_size)
                .await
                .context("failed to fetch unread batch")?;
            if outcomes.is_empty() {
                eprintln!("\nNo unread messages.");
            }
            for outcome in &outcomes {
                let status = match &outcome.status {
                    OutcomeStatus::Skipped => "skipped".to_string(),
                    OutcomeStatus::Completed { tag, .. } => tag.to_string(),
                    OutcomeStatus::Failed { stage, error } => {
                        format!("failed at {stage:?}: {error}")
                    }
                };
                println!("{}\t{}\t{}", outcome.message_id, outcome.thread_id, status);
            }
            if config.api_port.is_some() {
                eprintln!("   Serving API until Ctrl-C");
                tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
            }
        }
        Some(interval) => {
            eprintln!("   Polling every {}s, Ctrl-C to stop\n", interval.as_secs());
            let (handle, shutdown) =
                spawn_triage_poller(Arc::clone(&processor), interval, config.batch_size);
            tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
            tracing::info!("Shutdown requested");
            shutdown.store(true, Ordering::Relaxed);
            handle.abort();
        }
    }

    Ok(())
}
