use anyhow::Result;
use axum::Router;
use docchat::{Config, Pipeline};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    axum::state::{self, AppState},
    http::routes,
};

/// Builds the app from the process configuration.
///
/// # Errors
///
/// Fails on missing or malformed configuration, or if the vector index can't be located.
pub async fn create() -> Result<Router> {
    let config = Config::from_env()?;
    let pipeline = Pipeline::from_config(&config).await?;

    info!(
        model = %config.openai.chat_model,
        top_k = config.retrieval.top_k,
        "Pipeline ready"
    );

    Ok(router(state::create(pipeline)))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::mount())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
