use crate::traits::{CheckStatus, StreamConnector, StreamSource};
use crate::types::{CsiParams, Frame, Result, StreamTarget, UsbParams, ViewerError};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Calls made against a synthetic source, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceCall {
    Connect { endpoint: String },
    Check,
    OpenCsi { path: String, params: CsiParams },
    OpenUsb { path: String, params: UsbParams },
    OpenIp { path: String },
    Run,
    Close,
}

#[derive(Debug, Clone)]
enum CheckBehaviour {
    Accept,
    Reject(String),
    Unreachable,
}

/// In-process stand-in for a stream engine that renders a moving test pattern.
///
/// Useful for demos without a camera and for exercising the session lifecycle.
#[derive(Debug, Clone)]
pub struct SyntheticConnector {
    width: u32,
    height: u32,
    check: CheckBehaviour,
    calls: Arc<RwLock<Vec<SourceCall>>>,
}

impl SyntheticConnector {
    pub fn new() -> Self {
        Self {
            width: 320,
            height: 240,
            check: CheckBehaviour::Accept,
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width.max(1);
        self.height = height.max(1);
        self
    }

    /// Fail the check with `payload` as the engine's structured response
    pub fn rejecting(mut self, payload: impl Into<String>) -> Self {
        self.check = CheckBehaviour::Reject(payload.into());
        self
    }

    /// Fail the check as if the engine could not be reached
    pub fn unreachable(mut self) -> Self {
        self.check = CheckBehaviour::Unreachable;
        self
    }

    pub async fn calls(&self) -> Vec<SourceCall> {
        self.calls.read().await.clone()
    }
}

impl Default for SyntheticConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamConnector for SyntheticConnector {
    async fn connect(&self, target: &StreamTarget) -> Result<Box<dyn StreamSource>> {
        self.calls.write().await.push(SourceCall::Connect {
            endpoint: target.endpoint.clone(),
        });
        Ok(Box::new(SyntheticSource {
            width: self.width,
            height: self.height,
            check: self.check.clone(),
            calls: self.calls.clone(),
            opened: false,
            running: false,
            tick: 0,
        }))
    }
}

pub struct SyntheticSource {
    width: u32,
    height: u32,
    check: CheckBehaviour,
    calls: Arc<RwLock<Vec<SourceCall>>>,
    opened: bool,
    running: bool,
    tick: u32,
}

impl SyntheticSource {
    async fn record(&self, call: SourceCall) {
        self.calls.write().await.push(call);
    }

    fn render(&self) -> Option<Frame> {
        let (w, h) = (self.width, self.height);
        let mut data = Vec::with_capacity(w as usize * h as usize * 3);
        let shift = self.tick.wrapping_mul(4);
        for y in 0..h {
            for x in 0..w {
                data.push((x.wrapping_add(shift) % 256) as u8);
                data.push((y.wrapping_add(shift) % 256) as u8);
                data.push((shift % 256) as u8);
            }
        }
        Frame::from_raw(w, h, 3, data)
    }
}

#[async_trait]
impl StreamSource for SyntheticSource {
    async fn check(&self) -> Result<CheckStatus> {
        self.record(SourceCall::Check).await;
        match &self.check {
            CheckBehaviour::Accept => Ok(CheckStatus {
                ok: true,
                payload: r#"{"status":"ok","engine":"synthetic"}"#.to_string(),
            }),
            CheckBehaviour::Reject(payload) => Ok(CheckStatus {
                ok: false,
                payload: payload.clone(),
            }),
            CheckBehaviour::Unreachable => Err(ViewerError::Transport("connection refused".to_string())),
        }
    }

    async fn open_csi(&mut self, path: &str, params: CsiParams) -> Result<()> {
        self.record(SourceCall::OpenCsi { path: path.to_string(), params }).await;
        self.opened = true;
        Ok(())
    }

    async fn open_usb(&mut self, path: &str, params: UsbParams) -> Result<()> {
        self.record(SourceCall::OpenUsb { path: path.to_string(), params }).await;
        self.opened = true;
        Ok(())
    }

    async fn open_ip(&mut self, path: &str) -> Result<()> {
        self.record(SourceCall::OpenIp { path: path.to_string() }).await;
        self.opened = true;
        Ok(())
    }

    async fn run(&mut self) -> Result<()> {
        self.record(SourceCall::Run).await;
        if !self.opened {
            return Err(ViewerError::NotConnected);
        }
        self.running = true;
        Ok(())
    }

    fn read(&mut self) -> Option<Arc<Frame>> {
        if !self.running {
            return None;
        }
        self.tick = self.tick.wrapping_add(1);
        self.render().map(Arc::new)
    }

    async fn close(&mut self) -> Result<()> {
        self.record(SourceCall::Close).await;
        if self.running {
            debug!("Synthetic source stopped after {} frames", self.tick);
        }
        self.running = false;
        self.opened = false;
        Ok(())
    }
}
