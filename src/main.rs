use anyhow::{Context, Result};
use clap::Parser;
use consent_recorder::{
    create_router, telemetry, AppState, Config, ConsentStore, CueLibrary, LocalVoiceGateway,
    NatsClient, RecordingSessionOrchestrator, RejectionFeedbackConsumer, SessionRegistry,
    SessionServices,
};
use futures::StreamExt;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "consent-recorder", version, about = "Consent-gated voice recording service")]
struct Args {
    /// Configuration file, extension optional
    #[arg(long, default_value = "config/consent-recorder")]
    config: String,

    /// Log filter, overrides the config file
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut cfg = Config::load(&args.config)?;
    if let Some(level) = args.log_level {
        cfg.logging.level = level;
    }

    telemetry::init(&cfg.logging)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    let cues = Arc::new(CueLibrary::load(&cfg.cues).context("Failed to load cue clips")?);
    let nats = Arc::new(NatsClient::connect(&cfg.nats).await?);

    let registry = Arc::new(SessionRegistry::new());
    let gateway = Arc::new(LocalVoiceGateway::new(cues));
    let services = SessionServices {
        consent: Arc::new(ConsentStore::new(&cfg.consent.file)),
        publisher: nats.clone(),
        notifier: nats.clone(),
        registry: Arc::clone(&registry),
    };

    let orchestrator = Arc::new(RecordingSessionOrchestrator::new(
        gateway.clone(),
        services,
        cfg.session_config(),
    ));

    let rejections = nats.subscribe_rejections().await?;
    let consumer =
        RejectionFeedbackConsumer::new(registry, cfg.feedback.threshold, cfg.feedback.scope);
    let feedback = tokio::spawn(consumer.run(rejections.map(|message| message.payload)));

    let app = create_router(AppState::new(Arc::clone(&orchestrator), gateway));
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Shutting down");
    orchestrator.shutdown().await;
    feedback.abort();

    if let Err(e) = nats.close().await {
        error!("{:#}", e);
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
    }
}
