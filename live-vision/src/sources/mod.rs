pub mod stream_engine;
pub mod synthetic;

pub use stream_engine::{HttpStreamConnector, StreamEngineClient};
pub use synthetic::{SourceCall, SyntheticConnector, SyntheticSource};
