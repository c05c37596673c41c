use anyhow::Context;
use clap::Parser;
use live_vision::{
    Cli, ConsoleSurface, HttpStreamConnector, InferenceWorker, MockVisionModel, OllamaAdapter,
    RenderLoop, SessionController, SharedState, StreamConnector, SyntheticConnector, UiEvent,
    ViewerConfig, VisionModel,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout is the answer log.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = ViewerConfig::from(Cli::parse());
    info!("Starting live vision viewer");
    info!("Stream engine: {} ({} {})", config.form.endpoint, config.form.camera_kind, config.form.camera_path);

    let model: Arc<dyn VisionModel> = if config.mock_model {
        Arc::new(MockVisionModel::describing())
    } else {
        let adapter = OllamaAdapter::new(&config.model)
            .with_context(|| format!("invalid model server URL {}", config.model.base_url))?;
        match adapter.is_available(&config.model.model).await {
            Ok(true) => {}
            Ok(false) => warn!("Model {} is not installed on {}", config.model.model, config.model.base_url),
            Err(e) => warn!("Could not reach model server at {}: {}", config.model.base_url, e),
        }
        Arc::new(adapter)
    };

    let connector: Arc<dyn StreamConnector> = if config.synthetic {
        Arc::new(SyntheticConnector::new())
    } else {
        Arc::new(HttpStreamConnector::new(config.stream.clone()))
    };

    let shared = SharedState::new(config.prompt.clone()).with_output_capacity(config.output_capacity);
    let worker = InferenceWorker::new(model, shared.clone(), config.worker.clone());
    let session = SessionController::new(connector);

    let mut initial = Vec::new();
    if config.load_on_start {
        initial.push(UiEvent::LoadModel);
    }
    if config.connect_on_start {
        initial.push(UiEvent::Connect(config.form.request()));
    }

    eprintln!("{}", live_vision::console::HELP);
    let surface = ConsoleSurface::spawn(config.form.clone(), initial);
    RenderLoop::new(surface, session, shared, worker)
        .with_tick(config.tick)
        .run()
        .await;

    info!("Viewer closed");
    Ok(())
}
