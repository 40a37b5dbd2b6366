use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use mailbrief_blob::{BlobStore, FsBlobStore, MemoryBlobStore};
use mailbrief_core::CostTracker;
use mailbrief_enrich::{BraveClient, BraveConfig, FirecrawlClient, FirecrawlConfig};
use mailbrief_gmail::{GmailClient, GmailConfig};
use mailbrief_llm::{LlmConfig, OpenAiClient};
use mailbrief_mailer::{
    DigestMailer, MailBackend, ResendBackend, ResendConfig, SmtpBackend, SmtpConfig,
};
use mailbrief_pipeline::{BreakerRegistry, Orchestrator, Services};
use mailbrief_server::api::{AppState, router};
use mailbrief_server::config::MailbriefConfig;
use mailbrief_server::executions::ExecutionRegistry;
use mailbrief_server::runner::DigestRunner;
use mailbrief_server::scheduler::Scheduler;
use mailbrief_state::TokenStore;
use mailbrief_state_memory::{MemoryProcessedStore, MemorySenderStore, MemoryTokenStore};

/// mailbrief digest server.
#[derive(Parser, Debug)]
#[command(name = "mailbrief-server", about = "AI email digest pipeline server")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "mailbrief.toml")]
    config: String,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,
}

/// Read a secret from config, falling back to the environment.
fn secret(configured: &str, env_var: &str) -> String {
    if configured.is_empty() {
        std::env::var(env_var).unwrap_or_default()
    } else {
        configured.to_owned()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing from RUST_LOG or default to info.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Load configuration, or use defaults if the file does not exist.
    let config: MailbriefConfig = if Path::new(&cli.config).exists() {
        let contents = std::fs::read_to_string(&cli.config)?;
        toml::from_str(&contents)?
    } else {
        info!(path = %cli.config, "config file not found, using defaults");
        MailbriefConfig::default()
    };

    // Stores. The sender/processed/token stores are in-process; the blob
    // store optionally persists to the local filesystem.
    let processed = Arc::new(MemoryProcessedStore::new());
    let senders = Arc::new(MemorySenderStore::new());
    let tokens: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
    let blobs: Arc<dyn BlobStore> = match config.storage.backend.as_str() {
        "fs" => {
            info!(path = %config.storage.path, "filesystem blob store");
            Arc::new(FsBlobStore::new(config.storage.path.clone()))
        }
        "memory" => Arc::new(MemoryBlobStore::new()),
        other => return Err(format!("unknown storage backend: {other}").into()),
    };

    // Mailbox client.
    let mut gmail_config = GmailConfig::new(
        secret(&config.gmail.client_id, "GMAIL_CLIENT_ID"),
        secret(&config.gmail.client_secret, "GMAIL_CLIENT_SECRET"),
    );
    gmail_config.user_id = config.gmail.user_id.clone();
    let mailbox = Arc::new(GmailClient::new(gmail_config, Arc::clone(&tokens))?);

    // LLM client.
    let llm_config = LlmConfig::new(
        config.openai.endpoint.clone(),
        secret(&config.openai.api_key, "OPENAI_API_KEY"),
    );
    let chat = Arc::new(OpenAiClient::new(llm_config)?);

    // Enrichment clients.
    let extractor = Arc::new(FirecrawlClient::new(FirecrawlConfig::new(secret(
        &config.firecrawl.api_key,
        "FIRECRAWL_API_KEY",
    )))?);
    let search = Arc::new(BraveClient::new(BraveConfig::new(secret(
        &config.brave.api_key,
        "BRAVE_API_KEY",
    )))?);

    // Outbound mail.
    let backend: Arc<dyn MailBackend> = match config.mailer.backend.as_str() {
        "resend" => Arc::new(ResendBackend::new(ResendConfig::new(secret(
            &config.mailer.resend_api_key,
            "RESEND_API_KEY",
        )))?),
        "smtp" => Arc::new(SmtpBackend::new(SmtpConfig {
            smtp_host: config.mailer.smtp.host.clone(),
            smtp_port: config.mailer.smtp.port,
            username: config.mailer.smtp.username.clone(),
            password: config.mailer.smtp.password.clone(),
            tls: config.mailer.smtp.tls,
        })?),
        other => return Err(format!("unknown mailer backend: {other}").into()),
    };
    let mailer = Arc::new(DigestMailer::new(
        backend,
        config.mailer.from.clone(),
        config.mailer.reauth_url.clone(),
    )?);
    info!(backend = %config.mailer.backend, "mailer initialized");

    // Pipeline services.
    let pipeline_config = config
        .pipeline
        .build(config.mailer.recipient.clone(), config.mailer.from.clone());
    let mut cost = CostTracker::new(pipeline_config.max_cost_per_run);
    for (service, cap) in [
        ("openai", config.pipeline.max_openai_calls),
        ("firecrawl", config.pipeline.max_firecrawl_calls),
        ("brave", config.pipeline.max_brave_calls),
    ] {
        if let Some(cap) = cap {
            cost = cost.with_call_cap(service, cap);
        }
    }
    let cost = Arc::new(cost);
    let services = Arc::new(Services {
        mailbox,
        chat,
        extractor,
        search,
        mailer,
        processed,
        senders,
        tokens,
        blobs,
        cost,
        breakers: Arc::new(BreakerRegistry::default()),
        config: pipeline_config,
    });

    let cancel = CancellationToken::new();
    let orchestrator = Arc::new(Orchestrator::new(services).with_cancellation(cancel.clone()));
    let executions = Arc::new(ExecutionRegistry::default());
    let runner = Arc::new(DigestRunner::new(
        Arc::clone(&orchestrator),
        Arc::clone(&executions),
    ));

    // Weekly schedule.
    let _scheduler_handle = if config.schedule.enabled {
        let scheduler = Scheduler::new(
            Arc::clone(&runner),
            &config.schedule.cron,
            &config.schedule.timezone,
            cancel.clone(),
        )?;
        info!(
            cron = %config.schedule.cron,
            timezone = %config.schedule.timezone,
            "weekly schedule enabled"
        );
        Some(scheduler.spawn())
    } else {
        None
    };

    let state = AppState { runner, executions };
    let app = router(state);

    // Resolve the bind address (CLI overrides take precedence).
    let host = cli.host.unwrap_or(config.server.host);
    let port = cli.port.unwrap_or(config.server.port);
    let addr = format!("{host}:{port}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "mailbrief-server listening");

    // Serve with graceful shutdown on SIGINT / SIGTERM.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cancel in-flight stages; handlers discard partial output.
    cancel.cancel();
    warn!("shutdown signalled, in-flight stages cancelled");

    info!("mailbrief-server shut down");
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM, then return to trigger graceful
/// shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
