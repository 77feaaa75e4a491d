use std::sync::Arc;

use rowforge::llm::{HttpCompletionModel, LlmConfig};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod routes;
mod state;


#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting rowforge backend");

    let config = config::Config::from_env()?;
    std::fs::create_dir_all(config.upload_dir())?;
    std::fs::create_dir_all(config.output_dir())?;

    let llm_config = LlmConfig::from_env()?;
    tracing::info!(
        "Completion model: {} via {}",
        llm_config.model,
        llm_config.endpoint
    );
    let model = Arc::new(HttpCompletionModel::new(llm_config)?);

    let addr = format!("0.0.0.0:{}", config.port);
    let state = state::AppState::new(config, model);

    let app = routes::construct_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
