//! Gamble-Guard - Main Entry Point
//!
//! Receives bank-transaction webhooks, classifies them with the multi-head
//! model, and records intervention decisions for downstream collaborators.

use anyhow::Result;
use gamble_guard::{
    config::AppConfig,
    features::NeutralContextProvider,
    intervention::InterventionPolicy,
    metrics::{MetricsReporter, PipelineMetrics},
    model::RiskClassifier,
    pipeline::TransactionPipeline,
    publisher::InterventionPublisher,
    signature::SignatureValidator,
    store::MemoryStore,
    webhook::{router, AppState},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gamble_guard=info".parse()?),
        )
        .init();

    info!("Starting Gamble-Guard detection pipeline");

    // Load configuration
    let config = AppConfig::load()?;
    info!("Configuration loaded successfully");
    info!(
        "Alert threshold: {:.2}, handler timeout: {}ms",
        config.detection.alert_threshold, config.pipeline.timeout_ms
    );

    // Initialize metrics
    let metrics = Arc::new(PipelineMetrics::new());

    // Durable store contract; seeded with configured whitelist patterns
    let store = Arc::new(MemoryStore::with_whitelist(&config.detection.whitelist));
    info!(
        whitelist_entries = config.detection.whitelist.len(),
        "Transaction store initialized"
    );

    // Load the model, degrading to an untrained fallback if absent
    let classifier = Arc::new(RiskClassifier::from_path(config.model.path.clone()));
    let model_info = classifier.model_info();
    if model_info.degraded {
        warn!(
            path = %config.model.path,
            "Serving untrained fallback model; run the train-model tool to publish an artifact"
        );
    } else {
        info!(
            version = %model_info.version,
            architecture = %model_info.architecture,
            "Model ready"
        );
    }

    // Optional NATS publisher for intervention records
    let publisher = match &config.alerts.nats_url {
        Some(url) => Some(InterventionPublisher::connect(url, &config.alerts.subject).await?),
        None => {
            info!("NATS publishing disabled; intervention records are store-only");
            None
        }
    };

    let pipeline = Arc::new(TransactionPipeline::new(
        store,
        Arc::new(NeutralContextProvider),
        classifier,
        InterventionPolicy::new(config.detection.alert_threshold),
        metrics.clone(),
        publisher,
    ));

    // Start metrics reporter (prints summary every 30 seconds)
    let metrics_clone = metrics.clone();
    tokio::spawn(async move {
        let reporter = MetricsReporter::new(metrics_clone, 30);
        reporter.start().await;
    });

    let state = AppState {
        pipeline,
        validator: Arc::new(SignatureValidator::new(config.webhook.secret.clone().into_bytes())),
        metrics,
        signature_header: config.webhook.signature_header.clone(),
        timeout: Duration::from_millis(config.pipeline.timeout_ms),
    };

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    info!("Listening on {}", config.server.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
