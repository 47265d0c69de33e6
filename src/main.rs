//! Conversation analytics web server
//!
//! (c) Softlandia 2025

use conversation_analytics_api::api;
use conversation_analytics_api::core::assistant::GeminiGateway;
use conversation_analytics_api::infrastructure::config::AppConfig;
use conversation_analytics_api::infrastructure::database::DatabaseConnection;
use conversation_analytics_api::service_collection;

use anyhow::anyhow;
use axum::http::{HeaderValue, Method};
use di::Injectable;
use di_axum::RouterServiceProviderExtensions;
use log::info;
use tokio::net::TcpListener;
use tokio::runtime::{Builder, Runtime};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

fn main() -> anyhow::Result<()> {
    // initialize tracing, honoring RUST_LOG
    tracing_subscriber::fmt::init();

    let runtime: Runtime = Builder::new_multi_thread().enable_all().build()?;

    let web_task_handle = runtime.spawn(web_server_task());

    runtime.block_on(async { web_task_handle.await? })
}

async fn web_server_task() -> anyhow::Result<()> {
    let mut services = service_collection();
    services.add(GeminiGateway::singleton());
    let provider = services
        .build_provider()
        .map_err(|e| anyhow!("invalid service registrations: {e:?}"))?;

    let config = provider.get_required::<AppConfig>();
    api::error::expose_internal_errors(!config.is_production());

    provider.get_required::<DatabaseConnection>().migrate().await?;

    let app = api::router()
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_headers(Any)
                .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
                .allow_origin(config.frontend_url.parse::<HeaderValue>()?),
        )
        .with_provider(provider);

    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(
        "listening on {} ({} environment)",
        listener.local_addr()?,
        config.environment
    );
    axum::serve(listener, app).await?;
    info!("Shutting down...");

    Ok(())
}
