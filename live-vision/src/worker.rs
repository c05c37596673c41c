use crate::encoder::encode_frame;
use crate::state::SharedState;
use crate::traits::VisionModel;
use crate::types::{Frame, Result, WorkerConfig, ANSWER_SEPARATOR};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Waiting for a frame or cooling down between attempts
    Idle,
    /// A streaming generation is in flight
    Querying,
}

/// What a single inference attempt ended with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// No frame has been published yet
    NoFrame,
    /// The answer was queued for display
    Completed,
    /// The prompt changed mid-stream and the partial answer was dropped
    Interrupted,
    /// Encoding or the model call failed
    Failed,
}

/// Background loop that keeps asking the model about the latest frame
pub struct InferenceWorker {
    model: Arc<dyn VisionModel>,
    shared: SharedState,
    config: WorkerConfig,
    state: watch::Sender<WorkerState>,
}

impl InferenceWorker {
    pub fn new(model: Arc<dyn VisionModel>, shared: SharedState, config: WorkerConfig) -> Self {
        let (state, _) = watch::channel(WorkerState::Idle);
        Self {
            model,
            shared,
            config,
            state,
        }
    }

    /// Observe Idle/Querying transitions
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// Run the loop on its own task. The task lives as long as the runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Loop forever. Failed attempts are logged and never end the loop.
    pub async fn run(self) {
        info!(
            "Inference worker running with {} (model {})",
            self.model.backend_name(),
            self.config.model
        );

        loop {
            match self.run_once().await {
                AttemptOutcome::NoFrame => tokio::time::sleep(self.config.idle_poll).await,
                AttemptOutcome::Interrupted => continue,
                AttemptOutcome::Completed | AttemptOutcome::Failed => {
                    tokio::time::sleep(self.config.cooldown).await;
                }
            }
        }
    }

    /// One attempt: snapshot frame and prompt, stream an answer, queue it unless interrupted
    pub async fn run_once(&self) -> AttemptOutcome {
        let Some(frame) = self.shared.frames.current().await else {
            return AttemptOutcome::NoFrame;
        };

        // The text read below already reflects any pending change.
        self.shared.prompt.take_changed();
        let prompt = self.shared.prompt.text().await;

        self.state.send_replace(WorkerState::Querying);
        let result = self.query(frame, &prompt).await;
        self.state.send_replace(WorkerState::Idle);

        match result {
            Ok(Some(answer)) => {
                info!("Answer complete ({} chars)", answer.len());
                self.shared.output.push(answer + ANSWER_SEPARATOR).await;
                AttemptOutcome::Completed
            }
            Ok(None) => AttemptOutcome::Interrupted,
            Err(e) => {
                error!("Inference attempt failed: {}", e);
                AttemptOutcome::Failed
            }
        }
    }

    /// Stream one answer. `Ok(None)` when a prompt change interrupted it.
    async fn query(&self, frame: Arc<Frame>, prompt: &str) -> Result<Option<String>> {
        let image = tokio::task::spawn_blocking(move || encode_frame(&frame)).await??;

        let mut fragments = self
            .model
            .generate(&self.config.model, prompt, vec![image])
            .await?;

        let mut answer = String::new();
        while let Some(fragment) = fragments.next().await {
            let fragment = fragment?;
            debug!(fragment = %fragment, "model fragment");
            answer.push_str(&fragment);

            if self.shared.prompt.take_changed() {
                info!("Prompt changed mid-answer, discarding {} chars", answer.len());
                return Ok(None);
            }
        }

        Ok(Some(answer))
    }
}
