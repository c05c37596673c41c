use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::stream::{self, StreamExt};
use interfaces::Frame;
use live_vision::llm_adapter::MockVisionModel;
use live_vision::{
    AttemptOutcome, FragmentStream, InferenceWorker, PromptRegister, SharedState, ViewerError,
    VisionModel, WorkerConfig, WorkerState,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber;

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .try_init()
            .ok();
    });
}

fn test_config() -> WorkerConfig {
    WorkerConfig {
        model: "llava:test".to_string(),
        cooldown: Duration::from_millis(20),
        idle_poll: Duration::from_millis(5),
    }
}

fn test_frame() -> Frame {
    let (w, h) = (8u32, 6u32);
    let data = (0..w * h * 3).map(|i| (i % 251) as u8).collect();
    Frame::from_raw(w, h, 3, data).expect("valid frame")
}

/// Streams "A", "B", "C" on the first call and changes the prompt right after
/// "B" is produced. Later calls stream "fresh".
struct InterruptingModel {
    prompt: PromptRegister,
    new_prompt: String,
    prompts: Arc<Mutex<Vec<String>>>,
    calls: AtomicUsize,
}

#[async_trait]
impl VisionModel for InterruptingModel {
    fn backend_name(&self) -> String {
        "interrupting test model".to_string()
    }

    async fn generate(&self, _model: &str, prompt: &str, _images: Vec<String>) -> live_vision::Result<FragmentStream> {
        self.prompts.lock().await.push(prompt.to_string());
        if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
            return Ok(stream::iter(vec![Ok("fresh".to_string())]).boxed());
        }

        let register = self.prompt.clone();
        let new_prompt = self.new_prompt.clone();
        let fragments = stream::iter(["A", "B", "C"]).then(move |fragment| {
            let register = register.clone();
            let new_prompt = new_prompt.clone();
            async move {
                if fragment == "B" {
                    register.set(new_prompt).await;
                }
                Ok::<_, ViewerError>(fragment.to_string())
            }
        });
        Ok(fragments.boxed())
    }

    async fn is_available(&self, _model: &str) -> live_vision::Result<bool> {
        Ok(true)
    }
}

/// Yields one fragment and then fails mid-stream
struct BrokenStreamModel;

#[async_trait]
impl VisionModel for BrokenStreamModel {
    fn backend_name(&self) -> String {
        "broken stream".to_string()
    }

    async fn generate(&self, _model: &str, _prompt: &str, _images: Vec<String>) -> live_vision::Result<FragmentStream> {
        let items = vec![
            Ok("partial".to_string()),
            Err(ViewerError::Model("connection reset".to_string())),
        ];
        Ok(stream::iter(items).boxed())
    }

    async fn is_available(&self, _model: &str) -> live_vision::Result<bool> {
        Ok(true)
    }
}

/// Keeps the images it was sent
#[derive(Default)]
struct CapturingModel {
    images: Mutex<Vec<String>>,
}

#[async_trait]
impl VisionModel for CapturingModel {
    fn backend_name(&self) -> String {
        "capturing".to_string()
    }

    async fn generate(&self, _model: &str, _prompt: &str, images: Vec<String>) -> live_vision::Result<FragmentStream> {
        self.images.lock().await.extend(images);
        Ok(stream::iter(vec![Ok("seen".to_string())]).boxed())
    }

    async fn is_available(&self, _model: &str) -> live_vision::Result<bool> {
        Ok(true)
    }
}

#[tokio::test]
async fn test_worker_stays_idle_without_frames() {
    init_tracing();

    let shared = SharedState::new("describe");
    let model = MockVisionModel::new(["never"]);
    let worker = InferenceWorker::new(Arc::new(model.clone()), shared.clone(), test_config());
    let state = worker.subscribe();

    assert_eq!(worker.run_once().await, AttemptOutcome::NoFrame);

    let handle = worker.spawn();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(model.calls().await.is_empty(), "generate must not be called without a frame");
    assert!(shared.output.is_empty().await);
    assert_eq!(*state.borrow(), WorkerState::Idle);
    assert!(!handle.is_finished());
    handle.abort();
}

#[tokio::test]
async fn test_worker_queues_completed_answer() {
    init_tracing();

    let shared = SharedState::new("describe");
    shared.frames.publish(test_frame()).await;

    let model = MockVisionModel::new(["A", "B", "C"]);
    let worker = InferenceWorker::new(Arc::new(model.clone()), shared.clone(), test_config());

    assert_eq!(worker.run_once().await, AttemptOutcome::Completed);

    assert_eq!(shared.output.len().await, 1);
    assert_eq!(shared.output.pop_latest().await.as_deref(), Some("ABC\n\n"));

    let calls = model.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].prompt, "describe");
    assert_eq!(calls[0].model, "llava:test");
    assert_eq!(calls[0].image_count, 1);
}

#[tokio::test]
async fn test_prompt_change_mid_stream_discards_partial_answer() {
    init_tracing();

    let shared = SharedState::new("describe");
    shared.frames.publish(test_frame()).await;

    let prompts = Arc::new(Mutex::new(Vec::new()));
    let model = InterruptingModel {
        prompt: shared.prompt.clone(),
        new_prompt: "count the cars".to_string(),
        prompts: prompts.clone(),
        calls: AtomicUsize::new(0),
    };
    let worker = InferenceWorker::new(Arc::new(model), shared.clone(), test_config());

    assert_eq!(worker.run_once().await, AttemptOutcome::Interrupted);
    assert!(shared.output.is_empty().await, "interrupted answer must not be queued");
    assert!(!shared.prompt.is_changed(), "worker clears the flag it acted on");

    assert_eq!(worker.run_once().await, AttemptOutcome::Completed);
    assert_eq!(*prompts.lock().await, vec!["describe".to_string(), "count the cars".to_string()]);
    assert_eq!(shared.output.pop_latest().await.as_deref(), Some("fresh\n\n"));
    assert!(shared.output.is_empty().await);
}

#[tokio::test]
async fn test_interrupted_attempt_restarts_without_cooldown() {
    init_tracing();

    let shared = SharedState::new("describe");
    shared.frames.publish(test_frame()).await;

    let prompts = Arc::new(Mutex::new(Vec::new()));
    let model = InterruptingModel {
        prompt: shared.prompt.clone(),
        new_prompt: "what changed?".to_string(),
        prompts: prompts.clone(),
        calls: AtomicUsize::new(0),
    };
    let config = WorkerConfig {
        cooldown: Duration::from_secs(30),
        ..test_config()
    };
    let handle = InferenceWorker::new(Arc::new(model), shared.clone(), config).spawn();

    let answer = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Some(answer) = shared.output.pop_latest().await {
                return answer;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("second attempt should start immediately after the interruption");

    assert_eq!(answer, "fresh\n\n");
    assert_eq!(prompts.lock().await.last().map(String::as_str), Some("what changed?"));
    handle.abort();
}

#[tokio::test]
async fn test_failed_generation_keeps_worker_running() {
    init_tracing();

    let shared = SharedState::new("describe");
    shared.frames.publish(test_frame()).await;

    let model = MockVisionModel::new(["unused"]).failing("model not found");
    let worker = InferenceWorker::new(Arc::new(model.clone()), shared.clone(), test_config());

    assert_eq!(worker.run_once().await, AttemptOutcome::Failed);
    assert!(shared.output.is_empty().await);

    let handle = worker.spawn();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let attempts = model.calls().await.len();
    info!("Failing model was called {} times", attempts);
    assert!(attempts >= 3, "worker should keep retrying after failures, saw {}", attempts);
    assert!(!handle.is_finished());
    assert!(shared.output.is_empty().await);
    handle.abort();
}

#[tokio::test]
async fn test_mid_stream_error_emits_nothing() {
    init_tracing();

    let shared = SharedState::new("describe");
    shared.frames.publish(test_frame()).await;

    let worker = InferenceWorker::new(Arc::new(BrokenStreamModel), shared.clone(), test_config());
    assert_eq!(worker.run_once().await, AttemptOutcome::Failed);
    assert!(shared.output.is_empty().await);
}

#[tokio::test]
async fn test_frame_sent_as_base64_png() {
    init_tracing();

    let shared = SharedState::new("describe");
    let frame = test_frame();
    shared.frames.publish(frame.clone()).await;

    let model = Arc::new(CapturingModel::default());
    let worker = InferenceWorker::new(model.clone(), shared.clone(), test_config());
    assert_eq!(worker.run_once().await, AttemptOutcome::Completed);

    let images = model.images.lock().await;
    assert_eq!(images.len(), 1);
    let png = BASE64.decode(&images[0]).expect("valid base64");
    assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");

    let decoded = image::load_from_memory(&png).expect("valid png").to_rgb8();
    assert_eq!(decoded.dimensions(), (frame.width(), frame.height()));
    assert_eq!(decoded.as_raw().as_slice(), frame.data());
}

#[tokio::test]
async fn test_worker_reports_querying_while_streaming() {
    init_tracing();

    let shared = SharedState::new("describe");
    shared.frames.publish(test_frame()).await;

    let model = MockVisionModel::new(["slow ", "answer"]).with_delay(Duration::from_millis(100));
    let worker = Arc::new(InferenceWorker::new(Arc::new(model), shared.clone(), test_config()));
    let mut state = worker.subscribe();

    let running = worker.clone();
    let attempt = tokio::spawn(async move { running.run_once().await });

    tokio::time::timeout(Duration::from_secs(2), state.wait_for(|s| *s == WorkerState::Querying))
        .await
        .expect("worker entered Querying")
        .expect("state channel open");

    assert_eq!(attempt.await.expect("attempt finished"), AttemptOutcome::Completed);
    assert_eq!(*state.borrow(), WorkerState::Idle);
    assert_eq!(shared.output.pop_latest().await.as_deref(), Some("slow answer\n\n"));
}
