use crate::encoder::decode_image;
use crate::traits::{CheckStatus, StreamConnector, StreamSource};
use crate::types::{CsiParams, Frame, Result, StreamEngineConfig, StreamTarget, UsbParams, ViewerError};
use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Serialize)]
struct OpenRequest<'a> {
    path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sensor_mode: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fps: Option<u32>,
}

impl<'a> OpenRequest<'a> {
    fn bare(path: &'a str) -> Self {
        Self {
            path,
            sensor_mode: None,
            width: None,
            height: None,
            fps: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenResponse {
    id: String,
}

/// HTTP client for a remote stream engine.
///
/// Frames are polled by a background reader once `run` is called and handed
/// over through a watch channel, so `read` never waits on the network.
pub struct StreamEngineClient {
    client: Client,
    base_url: Url,
    token: String,
    config: StreamEngineConfig,
    stream_id: Option<String>,
    frames: Option<watch::Receiver<Option<Arc<Frame>>>>,
    reader: Option<JoinHandle<()>>,
}

impl StreamEngineClient {
    pub fn new(target: &StreamTarget, config: StreamEngineConfig) -> Result<Self> {
        let base_url = Url::parse(&target.endpoint)?;
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url,
            token: target.token.clone(),
            config,
            stream_id: None,
            frames: None,
            reader: None,
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    fn stream_url(&self, suffix: &str) -> Result<Url> {
        let id = self.stream_id.as_deref().ok_or(ViewerError::NotConnected)?;
        self.url(&format!("streams/{}/{}", id, suffix))
    }

    async fn open_stream(&mut self, backend: &str, request: OpenRequest<'_>) -> Result<()> {
        if self.stream_id.is_some() {
            debug!("Replacing previously opened stream");
            self.close().await?;
        }

        let url = self.url(&format!("streams/{}", backend))?;
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ViewerError::Transport(format!(
                "opening {} stream {} failed with HTTP {}: {}",
                backend, request.path, status, body
            )));
        }

        let opened: OpenResponse = response.json().await?;
        info!("Opened {} stream {} as {}", backend, request.path, opened.id);
        self.stream_id = Some(opened.id);
        Ok(())
    }

    fn stop_reader(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.frames = None;
    }
}

#[async_trait]
impl StreamSource for StreamEngineClient {
    async fn check(&self) -> Result<CheckStatus> {
        let url = self.url("check")?;
        let response = self.client.get(url).bearer_auth(&self.token).send().await?;
        let ok = response.status().is_success();
        let payload = response.text().await?;
        debug!("Stream engine check at {}: ok={}", self.base_url, ok);
        Ok(CheckStatus { ok, payload })
    }

    async fn open_csi(&mut self, path: &str, params: CsiParams) -> Result<()> {
        let request = OpenRequest {
            path,
            sensor_mode: Some(params.sensor_mode),
            width: Some(params.width),
            height: Some(params.height),
            fps: Some(params.fps),
        };
        self.open_stream("csi", request).await
    }

    async fn open_usb(&mut self, path: &str, params: UsbParams) -> Result<()> {
        let request = OpenRequest {
            path,
            sensor_mode: None,
            width: Some(params.width),
            height: Some(params.height),
            fps: Some(params.fps),
        };
        self.open_stream("usb", request).await
    }

    async fn open_ip(&mut self, path: &str) -> Result<()> {
        self.open_stream("ip", OpenRequest::bare(path)).await
    }

    async fn run(&mut self) -> Result<()> {
        let url = self.stream_url("run")?;
        let response = self.client.post(url).bearer_auth(&self.token).send().await?;
        if !response.status().is_success() {
            return Err(ViewerError::Transport(format!("run failed with HTTP {}", response.status())));
        }

        self.stop_reader();
        let (sender, receiver) = watch::channel(None);
        let reader = tokio::spawn(poll_frames(
            self.client.clone(),
            self.stream_url("frame")?,
            self.token.clone(),
            self.config.clone(),
            sender,
        ));
        self.frames = Some(receiver);
        self.reader = Some(reader);
        Ok(())
    }

    fn read(&mut self) -> Option<Arc<Frame>> {
        let frames = self.frames.as_mut()?;
        if frames.has_changed().unwrap_or(false) {
            frames.borrow_and_update().clone()
        } else {
            None
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stop_reader();
        let Some(id) = self.stream_id.take() else {
            return Ok(());
        };

        let url = self.url(&format!("streams/{}/close", id))?;
        let response = self.client.post(url).bearer_auth(&self.token).send().await?;
        if !response.status().is_success() {
            warn!("Stream engine refused to close stream {}: HTTP {}", id, response.status());
        }
        info!("Closed stream {}", id);
        Ok(())
    }
}

impl Drop for StreamEngineClient {
    fn drop(&mut self) {
        self.stop_reader();
    }
}

async fn poll_frames(
    client: Client,
    url: Url,
    token: String,
    config: StreamEngineConfig,
    sender: watch::Sender<Option<Arc<Frame>>>,
) {
    let poll_interval = Duration::from_millis(config.frame_poll_ms);
    let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
        current_interval: Duration::from_millis(config.retry_delay_ms),
        initial_interval: Duration::from_millis(config.retry_delay_ms),
        max_interval: Duration::from_millis(config.max_retry_delay_ms),
        multiplier: 2.0,
        max_elapsed_time: None,
        ..Default::default()
    };

    while !sender.is_closed() {
        let delay = match fetch_frame(&client, &url, &token).await {
            Ok(Some(frame)) => {
                backoff.reset();
                sender.send_replace(Some(Arc::new(frame)));
                poll_interval
            }
            Ok(None) => poll_interval,
            Err(e) => {
                // Capture failures are transient: the tick simply has no frame.
                debug!("Frame poll from {} failed: {}", url, e);
                backoff
                    .next_backoff()
                    .unwrap_or(Duration::from_millis(config.max_retry_delay_ms))
            }
        };
        tokio::time::sleep(delay).await;
    }
    debug!("Frame reader for {} stopped", url);
}

async fn fetch_frame(client: &Client, url: &Url, token: &str) -> Result<Option<Frame>> {
    let response = client.get(url.clone()).bearer_auth(token).send().await?;
    let status = response.status();
    if status == StatusCode::NO_CONTENT {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(ViewerError::Transport(format!("frame request returned HTTP {}", status)));
    }

    let bytes = response.bytes().await?;
    let frame = tokio::task::spawn_blocking(move || decode_image(&bytes)).await??;
    Ok(Some(frame))
}

/// Connects to stream engines over HTTP
#[derive(Debug, Clone, Default)]
pub struct HttpStreamConnector {
    config: StreamEngineConfig,
}

impl HttpStreamConnector {
    pub fn new(config: StreamEngineConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl StreamConnector for HttpStreamConnector {
    async fn connect(&self, target: &StreamTarget) -> Result<Box<dyn StreamSource>> {
        let client = StreamEngineClient::new(target, self.config.clone())?;
        Ok(Box::new(client))
    }
}
