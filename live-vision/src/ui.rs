use crate::session::{establish, Session, SessionController};
use crate::state::SharedState;
use crate::types::{ConnectRequest, Frame, Result, ViewerError};
use crate::worker::InferenceWorker;
use async_trait::async_trait;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default poll timeout, roughly 33 ticks per second
pub const DEFAULT_TICK: Duration = Duration::from_millis(30);

pub const PREPARING_NOTICE: &str = "First time model answer is preparing...";

/// User actions delivered by a UI surface
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    LoadModel,
    ChangePrompt(String),
    Connect(ConnectRequest),
    /// The camera source field was edited; Connect may be pressed again
    SourceEdited,
    Exit,
}

/// The widget toolkit side of the application
#[async_trait]
pub trait UiSurface: Send {
    /// Wait up to `timeout` for the next user event
    async fn poll_event(&mut self, timeout: Duration) -> Option<UiEvent>;

    /// Blocking notice, used for connection failures
    fn show_notice(&mut self, message: &str);

    fn clear_output(&mut self);

    fn append_output(&mut self, text: &str);

    fn show_frame(&mut self, frame: &Frame);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Polls the surface and glues it to the session, the worker and the shared state
pub struct RenderLoop<S: UiSurface> {
    surface: S,
    session: SessionController,
    shared: SharedState,
    worker: Option<InferenceWorker>,
    worker_handle: Option<JoinHandle<()>>,
    connecting: Option<JoinHandle<Result<Session>>>,
    tick: Duration,
    connect_armed: bool,
}

impl<S: UiSurface> RenderLoop<S> {
    pub fn new(surface: S, session: SessionController, shared: SharedState, worker: InferenceWorker) -> Self {
        Self {
            surface,
            session,
            shared,
            worker: Some(worker),
            worker_handle: None,
            connecting: None,
            tick: DEFAULT_TICK,
            connect_armed: true,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    pub fn is_model_loaded(&self) -> bool {
        self.worker.is_none()
    }

    /// A connection attempt is running in the background
    pub fn is_connecting(&self) -> bool {
        self.connecting.is_some()
    }

    /// Run until the user exits, then close the session
    pub async fn run(mut self) -> S {
        loop {
            let event = self.surface.poll_event(self.tick).await;
            if self.tick_once(event).await == Flow::Exit {
                break;
            }
        }
        self.shutdown().await;
        self.surface
    }

    /// Handle one event (or a timeout) and do the per-tick frame and output work
    pub async fn tick_once(&mut self, event: Option<UiEvent>) -> Flow {
        match event {
            Some(UiEvent::Exit) => return Flow::Exit,
            Some(UiEvent::LoadModel) => self.load_model(),
            Some(UiEvent::Connect(request)) => self.begin_connect(request).await,
            Some(UiEvent::SourceEdited) => self.connect_armed = true,
            Some(UiEvent::ChangePrompt(text)) => self.change_prompt(text).await,
            None => {}
        }

        self.finish_connect().await;

        if let Some(frame) = self.session.read_latest() {
            self.shared.frames.publish(frame.clone()).await;
            self.surface.show_frame(&frame);
        }

        if let Some(answer) = self.shared.output.pop_latest().await {
            self.surface.append_output(&answer);
        }

        Flow::Continue
    }

    fn load_model(&mut self) {
        // Only the first press starts the worker.
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.surface.clear_output();
        self.worker_handle = Some(worker.spawn());
        self.surface.append_output(PREPARING_NOTICE);
        info!("Inference worker started");
    }

    /// Start a connection attempt on its own task so the tick keeps its pace
    async fn begin_connect(&mut self, request: ConnectRequest) {
        if self.connecting.is_some() {
            debug!("Connection attempt already in progress");
            return;
        }
        if !self.connect_armed {
            debug!("Already connected; edit the camera source to reconnect");
            return;
        }
        self.connect_armed = false;

        // Frames from the previous camera must not reach the worker.
        self.shared.frames.clear().await;
        let previous = self.session.detach();
        let connector = self.session.connector();
        self.connecting = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                previous.close().await;
            }
            establish(connector, &request).await
        }));
    }

    async fn finish_connect(&mut self) {
        if !self.connecting.as_ref().is_some_and(|attempt| attempt.is_finished()) {
            return;
        }
        let Some(attempt) = self.connecting.take() else {
            return;
        };

        match attempt.await.map_err(ViewerError::from).and_then(|result| result) {
            Ok(session) => {
                let id = self.session.install(session).await;
                info!("Connected, session {}", id);
            }
            Err(e) => {
                warn!("Connection failed: {}", e);
                self.connect_armed = true;
                self.shared.frames.clear().await;
                self.surface.show_notice(&e.to_string());
            }
        }
    }

    async fn change_prompt(&mut self, text: String) {
        info!("Prompt changed: {}", text);
        self.shared.prompt.set(text.clone()).await;
        self.surface.clear_output();
        self.surface.append_output(&format!("Prompt has been changed: {}", text));
    }

    async fn shutdown(&mut self) {
        info!("Shutting down");
        if let Some(attempt) = self.connecting.take() {
            if let Ok(Ok(session)) = attempt.await {
                session.close().await;
            }
        }
        self.session.close().await;
        if let Some(handle) = self.worker_handle.take() {
            handle.abort();
        }
    }
}
