//! Bidpilot - Ad Management Control Plane
//! Mission: pull performance snapshots, decide bids / budgets / lifecycle
//! stages, persist every recommendation, and push only what the execution
//! mode allows.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::middleware as axum_mw;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bidpilot_backend::api::routes::AppState;
use bidpilot_backend::api::build_router;
use bidpilot_backend::apply::{ApplySink, HttpApplySink, RecordingApplySink};
use bidpilot_backend::middleware::logging::request_logging;
use bidpilot_backend::models::ExecutionMode;
use bidpilot_backend::notify::{LogNotifier, Notifier, WebhookNotifier};
use bidpilot_backend::{Config, EngineConfigs, Orchestrator, Warehouse};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bidpilot_backend=info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Config errors are fatal before any run begins.
    let config = Config::from_env().context("loading configuration")?;
    info!(
        mode = ?config.execution_mode,
        port = config.port,
        "starting bidpilot backend"
    );

    let warehouse = Warehouse::open(&config.database_path)?;

    let apply_sink: Arc<dyn ApplySink> = match (&config.execution_mode, &config.apply_api_base_url)
    {
        (ExecutionMode::Apply, Some(base_url)) => Arc::new(HttpApplySink::new(
            base_url.clone(),
            config.apply_timeout_secs,
        )?),
        (ExecutionMode::Apply, None) => {
            anyhow::bail!("APPLY mode requires APPLY_API_BASE_URL");
        }
        // Shadow mode never calls the sink; the recorder satisfies the seam.
        (ExecutionMode::Shadow, _) => Arc::new(RecordingApplySink::new()),
    };

    let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
        None => Arc::new(LogNotifier),
    };

    let orchestrator = Arc::new(Orchestrator::new(
        config.clone(),
        EngineConfigs::default(),
        warehouse,
        apply_sink,
        notifier,
    ));

    let app = build_router(AppState { orchestrator })
        .layer(axum_mw::from_fn(request_logging))
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, app).await.context("server exited")?;
    Ok(())
}
