use std::time::Duration;
// Use the interfaces crate for core types
pub use interfaces::defs::{
    CameraKind, CameraSource, CaptureFormat, ConnectRequest, CsiParams, Frame, StreamTarget, UsbParams,
};

/// Separator appended to every completed answer before it is queued.
pub const ANSWER_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone)]
pub struct StreamEngineConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    /// Delay between frame polls once a stream is running.
    pub frame_poll_ms: u64,
    /// Initial delay after a failed frame poll; doubles up to `max_retry_delay_ms`.
    pub retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
}

impl Default for StreamEngineConfig {
    fn default() -> Self {
        Self {
            user_agent: "Live-Vision/1.0".to_string(),
            timeout_seconds: 10,
            frame_poll_ms: 30,
            retry_delay_ms: 100,
            max_retry_delay_ms: 3_200,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub base_url: String,
    pub model: String,
    pub user_agent: String,
    pub connect_timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llava:7b-v1.6".to_string(),
            user_agent: "Live-Vision/1.0".to_string(),
            connect_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub model: String,
    /// Pause between inference attempts, bounds the request rate.
    pub cooldown: Duration,
    /// Retry delay while no frame has been published yet.
    pub idle_poll: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default().model,
            cooldown: Duration::from_secs(3),
            idle_poll: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Model endpoint error: {0}")]
    Model(String),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("No active stream session")]
    NotConnected,

    #[error("General error: {0}")]
    General(String),
}

impl From<tokio::task::JoinError> for ViewerError {
    fn from(err: tokio::task::JoinError) -> Self {
        ViewerError::General(format!("background task failed: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, ViewerError>;
