use crate::types::Frame;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Default number of completed answers kept before the oldest is dropped.
pub const DEFAULT_OUTPUT_CAPACITY: usize = 32;

/// Holds the most recently captured frame. Last write wins; there is no queue.
#[derive(Clone, Default)]
pub struct FrameSlot {
    latest: Arc<RwLock<Option<Arc<Frame>>>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever frame is currently held
    pub async fn publish(&self, frame: impl Into<Arc<Frame>>) {
        let frame = frame.into();
        *self.latest.write().await = Some(frame);
    }

    /// The latest published frame, or `None` when nothing has been captured yet
    pub async fn current(&self) -> Option<Arc<Frame>> {
        self.latest.read().await.clone()
    }

    pub async fn clear(&self) {
        *self.latest.write().await = None;
    }

    pub async fn is_empty(&self) -> bool {
        self.latest.read().await.is_none()
    }
}

/// Current prompt text plus a changed flag with test-and-clear semantics.
#[derive(Clone)]
pub struct PromptRegister {
    text: Arc<RwLock<String>>,
    changed: Arc<AtomicBool>,
}

impl PromptRegister {
    /// A register holding `initial`. The initial text does not count as a change.
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            text: Arc::new(RwLock::new(initial.into())),
            changed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the prompt and raise the changed flag
    pub async fn set(&self, text: impl Into<String>) {
        *self.text.write().await = text.into();
        // Raised after the text is visible so a consumer that sees the flag reads the new text.
        self.changed.store(true, Ordering::Release);
    }

    pub async fn text(&self) -> String {
        self.text.read().await.clone()
    }

    /// Returns `true` once per change event and clears the flag
    pub fn take_changed(&self) -> bool {
        self.changed.swap(false, Ordering::AcqRel)
    }

    /// Peek at the flag without consuming it
    pub fn is_changed(&self) -> bool {
        self.changed.load(Ordering::Acquire)
    }
}

impl Default for PromptRegister {
    fn default() -> Self {
        Self::new(String::new())
    }
}

/// Completed answers waiting to be displayed.
///
/// The consumer drains from the newest end, so when answers pile up the UI shows
/// the freshest one first and older ones may never be displayed.
#[derive(Clone)]
pub struct OutputQueue {
    items: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl OutputQueue {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_OUTPUT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub async fn push(&self, answer: String) {
        let mut items = self.items.lock().await;
        if items.len() == self.capacity {
            if let Some(dropped) = items.pop_front() {
                debug!("Output queue full, dropping oldest answer ({} chars)", dropped.len());
            }
        }
        items.push_back(answer);
    }

    /// Remove and return the most recently pushed answer
    pub async fn pop_latest(&self) -> Option<String> {
        self.items.lock().await.pop_back()
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    pub async fn clear(&self) {
        self.items.lock().await.clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for OutputQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// The three handoff points shared by the render loop and the inference worker
#[derive(Clone, Default)]
pub struct SharedState {
    pub frames: FrameSlot,
    pub prompt: PromptRegister,
    pub output: OutputQueue,
}

impl SharedState {
    pub fn new(initial_prompt: impl Into<String>) -> Self {
        Self {
            frames: FrameSlot::new(),
            prompt: PromptRegister::new(initial_prompt),
            output: OutputQueue::new(),
        }
    }

    pub fn with_output_capacity(mut self, capacity: usize) -> Self {
        self.output = OutputQueue::with_capacity(capacity);
        self
    }
}
