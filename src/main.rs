use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use voicebridge::application::{DispatchEngine, SessionManager};
use voicebridge::config::AppConfig;
use voicebridge::domain::handler::HandlerRegistry;
use voicebridge::infrastructure::protocols::AgentSettings;
use voicebridge::infrastructure::transport::DeepgramConnector;
use voicebridge::interface::api::{build_router, init_metrics, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before anything reads the environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("voicebridge=info,tower_http=info")),
        )
        .init();

    info!("Starting VoiceBridge");

    // Load configuration
    let config = AppConfig::load()?;
    info!("Configuration loaded: {:?}", config);
    if config.agent.api_key.is_none() {
        warn!("No voice agent API key configured; every call will be rejected");
    }

    // Register function handlers
    let mut builder = HandlerRegistry::builder();
    config.dispatch.catalog.register(&mut builder)?;
    let registry = Arc::new(builder.build());
    info!(
        "Registered {} functions: {}",
        config.dispatch.catalog,
        registry.names().join(", ")
    );

    let settings = AgentSettings::load(
        &config.agent.settings_file,
        &registry,
        config.agent.audio_encoding,
    )?;

    let engine = Arc::new(
        DispatchEngine::new(registry, config.handler_timeout())
            .with_max_retries(config.dispatch.max_retries),
    );
    let connector = Arc::new(DeepgramConnector::new(
        config.agent.url.clone(),
        config.agent.api_key.clone(),
        config.connect_timeout(),
    ));
    let manager = Arc::new(SessionManager::new(
        connector,
        engine,
        settings,
        config.session_config(),
    ));

    // Initialize metrics exporter
    info!("Initializing Prometheus metrics exporter");
    let prometheus_handle = init_metrics()?;

    let app = build_router(
        AppState::new(manager.clone()),
        &config.server.media_path,
        prometheus_handle,
    );
    let listener = tokio::net::TcpListener::bind(config.listen_addr()).await?;
    info!(
        "Listening on {} (media stream at {})",
        config.listen_addr(),
        config.server.media_path
    );

    let grace = config.shutdown_grace();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutting down...");
            let forced = manager.shutdown(grace).await;
            if forced > 0 {
                warn!("{} sessions did not close within {:?}", forced, grace);
            }
        })
        .await?;

    info!("VoiceBridge stopped");
    Ok(())
}
