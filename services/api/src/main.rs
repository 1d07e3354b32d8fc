//! API Service - Public API for SSP/DF occurrence statistics
//!
//! Endpoints:
//! - GET /health - Health check and cache state
//! - GET /ocorrencias_nomes - Occurrences of a region in a month
//! - GET /ocorrencias_media - Current quantity vs. historical monthly mean
//! - POST /ocorrencias - Register a new occurrence record
//! - GET /natureza/{codigo} - Category name by code

mod config;
mod logging;
mod routes;
mod validation;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dataset::Dataset;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::{Args, Settings};
use crate::routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let settings = Settings::from_env(&args);

    logging::init_logging(settings.log_dir.as_deref())?;

    info!(title = %settings.title, version = %settings.version, "starting API");

    let dataset = Dataset::new(settings.data_sources()?);
    let sources = dataset.sources();
    info!(
        facts = %sources.facts.path.display(),
        categories = %sources.categories.path.display(),
        regions = %sources.regions.path.display(),
        "data sources configured"
    );

    let state = Arc::new(AppState {
        dataset: Arc::new(dataset),
        title: settings.title.clone(),
        version: settings.version.clone(),
    });

    let cors = config::cors_layer(&settings.cors_origins)?;

    let app = routes::app(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&settings.bind)
        .await
        .with_context(|| format!("Failed to bind {}", settings.bind))?;

    info!("API listening on http://{}", settings.bind);
    info!("  GET  /health");
    info!("  GET  /ocorrencias_nomes?id_ra=&ano=&mes=");
    info!("  GET  /ocorrencias_media?id_ra=&ano=&mes=&cod_natureza=");
    info!("  POST /ocorrencias");
    info!("  GET  /natureza/{{codigo}}");

    axum::serve(listener, app).await?;

    Ok(())
}
