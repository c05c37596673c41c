use crate::console::ConnectionForm;
use crate::types::{CameraKind, ModelConfig, StreamEngineConfig, WorkerConfig};
use crate::ui::DEFAULT_TICK;
use clap::Parser;
use std::time::Duration;

pub const DEFAULT_PROMPT: &str = "Describe the scene concisely.";
pub const DEFAULT_ENDPOINT: &str = "http://0.0.0.0:7005";
pub const DEFAULT_CAMERA_PATH: &str = "http://renzo.dyndns.tv/mjpg/video.mjpg";

/// Live multimodal viewer: streams camera frames to a vision-language model
#[derive(Debug, Parser)]
#[command(name = "live-vision", version, about)]
pub struct Cli {
    /// Stream engine base URL
    #[arg(long, env = "STREAM_ENGINE_URL", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Bearer token for the stream engine
    #[arg(long, env = "STREAM_ENGINE_TOKEN", default_value = "", hide_env_values = true)]
    pub token: String,

    /// Camera type: CSI, USB or RTSP/HTTP
    #[arg(long, default_value = "RTSP/HTTP")]
    pub camera_type: CameraKind,

    /// Camera device path or stream URL
    #[arg(long, default_value = DEFAULT_CAMERA_PATH)]
    pub camera: String,

    /// Model server (Ollama API): `host`, `host:port` or a full URL
    #[arg(long, env = "OLLAMA_HOST", default_value = "http://localhost:11434")]
    pub model_url: String,

    /// Vision-language model identifier
    #[arg(long, env = "VISION_MODEL", default_value = "llava:7b-v1.6")]
    pub model: String,

    /// Initial prompt
    #[arg(long, default_value = DEFAULT_PROMPT)]
    pub prompt: String,

    /// Seconds to wait between inference attempts
    #[arg(long, default_value = "3", value_parser = parse_cooldown)]
    pub cooldown_secs: Duration,

    /// UI poll timeout in milliseconds
    #[arg(long, default_value_t = DEFAULT_TICK.as_millis() as u64)]
    pub tick_ms: u64,

    /// Number of completed answers kept for display
    #[arg(long, default_value_t = crate::state::DEFAULT_OUTPUT_CAPACITY)]
    pub output_capacity: usize,

    /// Connect to the stream engine on startup
    #[arg(long)]
    pub connect: bool,

    /// Start the model worker on startup
    #[arg(long)]
    pub load: bool,

    /// Use the built-in test pattern instead of a stream engine
    #[arg(long)]
    pub synthetic: bool,

    /// Use a canned model instead of the model server
    #[arg(long)]
    pub mock_model: bool,
}

/// Parse a non-negative, finite number of seconds
fn parse_cooldown(value: &str) -> Result<Duration, String> {
    let secs: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("'{}' is not a number of seconds: {}", value, e))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("'{}' is not a usable cool-down: {}", value, e))
}

/// Resolved application settings
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    pub form: ConnectionForm,
    pub prompt: String,
    pub model: ModelConfig,
    pub stream: StreamEngineConfig,
    pub worker: WorkerConfig,
    pub tick: Duration,
    pub output_capacity: usize,
    pub connect_on_start: bool,
    pub load_on_start: bool,
    pub synthetic: bool,
    pub mock_model: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            form: ConnectionForm {
                endpoint: DEFAULT_ENDPOINT.to_string(),
                token: String::new(),
                camera_kind: CameraKind::Network,
                camera_path: DEFAULT_CAMERA_PATH.to_string(),
            },
            prompt: DEFAULT_PROMPT.to_string(),
            model: ModelConfig::default(),
            stream: StreamEngineConfig::default(),
            worker: WorkerConfig::default(),
            tick: DEFAULT_TICK,
            output_capacity: crate::state::DEFAULT_OUTPUT_CAPACITY,
            connect_on_start: false,
            load_on_start: false,
            synthetic: false,
            mock_model: false,
        }
    }
}

impl From<Cli> for ViewerConfig {
    fn from(cli: Cli) -> Self {
        let defaults = ViewerConfig::default();
        let tick = Duration::from_millis(cli.tick_ms.max(1));
        Self {
            form: ConnectionForm {
                endpoint: cli.endpoint,
                token: cli.token,
                camera_kind: cli.camera_type,
                camera_path: cli.camera,
            },
            prompt: cli.prompt,
            model: ModelConfig {
                base_url: cli.model_url,
                model: cli.model.clone(),
                ..defaults.model
            },
            stream: StreamEngineConfig {
                frame_poll_ms: tick.as_millis() as u64,
                ..defaults.stream
            },
            worker: WorkerConfig {
                model: cli.model,
                cooldown: cli.cooldown_secs,
                ..defaults.worker
            },
            tick,
            output_capacity: cli.output_capacity,
            connect_on_start: cli.connect,
            load_on_start: cli.load,
            synthetic: cli.synthetic,
            mock_model: cli.mock_model,
        }
    }
}
