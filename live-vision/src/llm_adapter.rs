use crate::traits::{FragmentStream, VisionModel};
use crate::types::{ModelConfig, Result, ViewerError};
use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    images: &'a [String],
    stream: bool,
}

/// One NDJSON line of a streaming `/api/generate` response
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GenerateChunk {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

/// Splits a byte stream into newline-terminated lines.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and get back every complete, non-blank line it finished
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if !line.iter().all(u8::is_ascii_whitespace) {
                lines.push(line);
            }
        }
        lines
    }

    /// Trailing data that never got a newline
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        let rest = std::mem::take(&mut self.buffer);
        if rest.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            Some(rest)
        }
    }
}

/// Parse one NDJSON line into a chunk
pub fn parse_chunk(line: &[u8]) -> Result<GenerateChunk> {
    Ok(serde_json::from_slice(line)?)
}

struct ChunkState<S> {
    body: S,
    decoder: NdjsonDecoder,
    pending: VecDeque<Result<String>>,
    finished: bool,
}

impl<S> ChunkState<S> {
    fn enqueue(&mut self, line: &[u8]) {
        if self.finished {
            return;
        }
        match parse_chunk(line) {
            Ok(chunk) => {
                if let Some(error) = chunk.error {
                    self.pending.push_back(Err(ViewerError::Model(error)));
                    self.finished = true;
                    return;
                }
                if !chunk.response.is_empty() {
                    self.pending.push_back(Ok(chunk.response));
                }
                if chunk.done {
                    self.finished = true;
                }
            }
            Err(e) => {
                self.pending.push_back(Err(e));
                self.finished = true;
            }
        }
    }
}

/// Turn a streaming HTTP body of NDJSON generate chunks into answer fragments
pub fn fragments_from_body<S, B>(body: S) -> impl Stream<Item = Result<String>>
where
    S: Stream<Item = reqwest::Result<B>> + Unpin,
    B: AsRef<[u8]>,
{
    let state = ChunkState {
        body,
        decoder: NdjsonDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(bytes)) => {
                    for line in state.decoder.push(bytes.as_ref()) {
                        state.enqueue(&line);
                    }
                }
                Some(Err(e)) => {
                    state.pending.push_back(Err(ViewerError::Http(e)));
                    state.finished = true;
                }
                None => {
                    if let Some(line) = state.decoder.finish() {
                        state.enqueue(&line);
                    }
                    state.finished = true;
                }
            }
        }
    })
}

/// Port the model server listens on when the host names none
pub const DEFAULT_OLLAMA_PORT: u16 = 11434;

/// Turn an `OLLAMA_HOST` style value into a base URL that `Url::join` can extend.
///
/// Accepts bare `host`, `host:port` and full URLs. A bare host gets `http://` and
/// the default port, `0.0.0.0` (a listen address) is dialled as `localhost`, and
/// the path always ends in `/` so a proxy prefix survives joining.
pub fn normalize_host(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Url::parse(&format!("http://localhost:{}/", DEFAULT_OLLAMA_PORT))?);
    }

    let bare = !raw.contains("://");
    let mut url = if bare {
        Url::parse(&format!("http://{}", raw))?
    } else {
        Url::parse(raw)?
    };

    if bare && !has_explicit_port(raw) {
        url.set_port(Some(DEFAULT_OLLAMA_PORT))
            .map_err(|_| ViewerError::InvalidUrl(url::ParseError::InvalidPort))?;
    }
    if url.host_str() == Some("0.0.0.0") {
        url.set_host(Some("localhost"))?;
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn has_explicit_port(bare: &str) -> bool {
    let authority = bare.split('/').next().unwrap_or_default();
    authority
        .rsplit_once(':')
        .is_some_and(|(host, port)| {
            !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) && (!host.contains(':') || host.ends_with(']'))
        })
}

/// Ollama-compatible HTTP backend
pub struct OllamaAdapter {
    client: Client,
    base_url: Url,
}

impl OllamaAdapter {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let base_url = normalize_host(&config.base_url)?;
        // No overall timeout: a generation may legitimately stream for minutes.
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .build()?;

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }
}

#[async_trait]
impl VisionModel for OllamaAdapter {
    fn backend_name(&self) -> String {
        format!("Ollama ({})", self.base_url)
    }

    async fn generate(&self, model: &str, prompt: &str, images: Vec<String>) -> Result<FragmentStream> {
        let url = self.endpoint("api/generate")?;
        debug!("Requesting generation from {} with model {}", url, model);

        let request = GenerateRequest {
            model,
            prompt,
            images: &images,
            stream: true,
        };
        let response = self.client.post(url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<GenerateChunk>(&body)
                .ok()
                .and_then(|chunk| chunk.error)
                .unwrap_or(body);
            return Err(ViewerError::Model(format!("HTTP {}: {}", status, message)));
        }

        Ok(fragments_from_body(Box::pin(response.bytes_stream())).boxed())
    }

    async fn is_available(&self, model: &str) -> Result<bool> {
        let url = self.endpoint("api/tags")?;
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            warn!("Model listing failed with HTTP {}", response.status());
            return Ok(false);
        }

        let tags: TagsResponse = response.json().await?;
        let found = tags.models.iter().any(|entry| {
            entry.name == model || entry.name.strip_suffix(":latest") == Some(model)
        });
        info!("Model {} available on {}: {}", model, self.base_url, found);
        Ok(found)
    }
}

/// A recorded `generate` call
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateCall {
    pub model: String,
    pub prompt: String,
    pub image_count: usize,
}

/// Mock model for development and testing: replays a fixed list of fragments
#[derive(Clone)]
pub struct MockVisionModel {
    fragments: Vec<String>,
    fragment_delay: Duration,
    failure: Option<String>,
    calls: Arc<RwLock<Vec<GenerateCall>>>,
}

impl MockVisionModel {
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            fragment_delay: Duration::ZERO,
            failure: None,
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Mock that describes whatever it is shown, a few words at a time
    pub fn describing() -> Self {
        Self::new(["A ", "live ", "camera ", "frame."]).with_delay(Duration::from_millis(150))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.fragment_delay = delay;
        self
    }

    /// Make every `generate` call fail with `message`
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    pub async fn calls(&self) -> Vec<GenerateCall> {
        self.calls.read().await.clone()
    }
}

#[async_trait]
impl VisionModel for MockVisionModel {
    fn backend_name(&self) -> String {
        "Mock vision model".to_string()
    }

    async fn generate(&self, model: &str, prompt: &str, images: Vec<String>) -> Result<FragmentStream> {
        self.calls.write().await.push(GenerateCall {
            model: model.to_string(),
            prompt: prompt.to_string(),
            image_count: images.len(),
        });

        if let Some(message) = &self.failure {
            return Err(ViewerError::Model(message.clone()));
        }

        let delay = self.fragment_delay;
        let fragments = stream::iter(self.fragments.clone()).then(move |fragment| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok::<_, ViewerError>(fragment)
        });
        Ok(fragments.boxed())
    }

    async fn is_available(&self, _model: &str) -> Result<bool> {
        Ok(self.failure.is_none())
    }
}
