pub mod types;
pub mod traits;
pub mod state;
pub mod encoder;
pub mod llm_adapter;
pub mod sources;
pub mod session;
pub mod worker;
pub mod ui;
pub mod console;
pub mod config;

pub use types::*;
pub use traits::{CheckStatus, FragmentStream, StreamConnector, StreamSource, VisionModel};
pub use state::{FrameSlot, OutputQueue, PromptRegister, SharedState};
pub use llm_adapter::{MockVisionModel, OllamaAdapter};
pub use sources::{HttpStreamConnector, StreamEngineClient, SyntheticConnector};
pub use session::{establish, Session, SessionController};
pub use worker::{AttemptOutcome, InferenceWorker, WorkerState};
pub use ui::{RenderLoop, UiEvent, UiSurface};
pub use console::{ConnectionForm, ConsoleSurface};
pub use config::{Cli, ViewerConfig};
