use crate::types::{CsiParams, Frame, Result, StreamTarget, UsbParams};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

/// Lazy sequence of answer fragments produced by a streaming model call.
/// Dropping it ends the request early.
pub type FragmentStream = BoxStream<'static, Result<String>>;

/// Trait for vision-language model backends that stream text answers
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Human-readable name of this backend
    fn backend_name(&self) -> String;

    /// Start a streaming generation for `prompt` grounded on base64 encoded images
    async fn generate(&self, model: &str, prompt: &str, images: Vec<String>) -> Result<FragmentStream>;

    /// Check whether `model` is installed and can serve requests
    async fn is_available(&self, model: &str) -> Result<bool>;
}

/// Outcome of the remote connectivity/auth check.
#[derive(Debug, Clone)]
pub struct CheckStatus {
    pub ok: bool,
    /// Diagnostic payload on success, structured error payload on failure.
    pub payload: String,
}

/// Client for one stream-engine connection
#[async_trait]
pub trait StreamSource: Send + Sync {
    /// Verify the engine is reachable and the token is accepted
    async fn check(&self) -> Result<CheckStatus>;

    async fn open_csi(&mut self, path: &str, params: CsiParams) -> Result<()>;

    async fn open_usb(&mut self, path: &str, params: UsbParams) -> Result<()>;

    async fn open_ip(&mut self, path: &str) -> Result<()>;

    /// Begin delivering frames from the opened camera
    async fn run(&mut self) -> Result<()>;

    /// Latest frame not yet returned by a previous call, without blocking
    fn read(&mut self) -> Option<Arc<Frame>>;

    /// Release the remote stream and any local reader; calling it twice is fine
    async fn close(&mut self) -> Result<()>;
}

/// Factory for stream sources, one per connect attempt
#[async_trait]
pub trait StreamConnector: Send + Sync {
    async fn connect(&self, target: &StreamTarget) -> Result<Box<dyn StreamSource>>;
}
