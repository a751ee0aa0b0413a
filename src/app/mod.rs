use crate::api::{ApiServer, AppState};
use crate::assembler::AudioAssembler;
use crate::config::Config;
use crate::db::Database;
use crate::ingest::ChunkStore;
use crate::pipeline::{PipelineLock, ProcessingOrchestrator};
use crate::retention::RetentionReaper;
use crate::services::{HttpDiarizer, HttpPdfRenderer, OpenAiGenerator, WhisperTranscriber};
use crate::share::ShareTokenIssuer;
use crate::storage::Storage;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info};

pub async fn run_service() -> Result<()> {
    info!("Starting Referent service");

    let config = Config::load()?;
    let db = Database::open_default()?;
    let storage = Storage::open_default()?;

    let api_key = config
        .services
        .openai_api_key
        .clone()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .context("No OpenAI API key configured (services.openai_api_key or OPENAI_API_KEY)")?;

    let assembler = AudioAssembler::new(
        storage.clone(),
        config.assembly.ffmpeg_path.clone(),
        config.assembly.allow_lossy_fallback,
    );
    let chunks = Arc::new(ChunkStore::new(storage.clone(), assembler));

    let diarizer = Arc::new(HttpDiarizer::new(config.services.diarizer_url.clone())?);
    let transcriber = Arc::new(WhisperTranscriber::new(
        &config.services.openai_api_endpoint,
        api_key.clone(),
    )?);
    let generator = Arc::new(OpenAiGenerator::new(
        &config.services.openai_api_endpoint,
        api_key,
        config.services.openai_model.clone(),
    )?);
    let pdf_renderer = Arc::new(HttpPdfRenderer::new(config.services.pdf_renderer_url.clone())?);

    let orchestrator = Arc::new(ProcessingOrchestrator::new(
        db.clone(),
        storage.clone(),
        diarizer,
        transcriber,
        generator,
        pdf_renderer,
        PipelineLock::new(),
        config.services.language.clone(),
    ));

    let shares = Arc::new(ShareTokenIssuer::new(
        db.clone(),
        storage.clone(),
        config.server.public_url.clone(),
    ));

    let reaper = RetentionReaper::new(db.clone(), storage.clone());
    let sweep_interval = config.retention.sweep_interval_seconds;
    tokio::spawn(async move {
        reaper.run(sweep_interval).await;
    });

    let state = AppState {
        db,
        storage,
        chunks,
        orchestrator,
        shares,
        demo_retention_hours: config.retention.demo_retention_hours,
    };

    let api_server = ApiServer::new(config.server.port, state);
    info!("Referent is ready");
    if let Err(e) = api_server.start().await {
        error!("API server failed: {}", e);
        return Err(e);
    }

    Ok(())
}

/// One-shot retention sweep for the `reap` subcommand.
pub fn run_reap() -> Result<()> {
    let db = Database::open_default()?;
    let storage = Storage::open_default()?;
    let reaper = RetentionReaper::new(db, storage);
    let removed = reaper.sweep(chrono::Utc::now())?;
    println!("Removed {removed} expired meeting(s)");
    Ok(())
}
