use crate::traits::{StreamConnector, StreamSource};
use crate::types::{CameraKind, CameraSource, CaptureFormat, ConnectRequest, Frame, Result, ViewerError};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A checked, opened and running stream-engine session
pub struct Session {
    id: Uuid,
    endpoint: String,
    camera: Option<CameraSource>,
    source: Box<dyn StreamSource>,
    running: bool,
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Open a camera, dispatching on its kind
    async fn open(&mut self, camera: &CameraSource) -> Result<()> {
        let source = &mut self.source;

        match camera.kind {
            CameraKind::Csi => {
                let params = match camera.format {
                    CaptureFormat::Csi(params) => params,
                    _ => Default::default(),
                };
                source.open_csi(&camera.path, params).await?;
            }
            CameraKind::Usb => {
                let params = match camera.format {
                    CaptureFormat::Usb(params) => params,
                    _ => Default::default(),
                };
                source.open_usb(&camera.path, params).await?;
            }
            CameraKind::Network => {
                source.open_ip(&camera.path).await?;
            }
        }

        self.camera = Some(camera.clone());
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        if self.camera.is_none() {
            return Err(ViewerError::General("no camera opened on this session".to_string()));
        }
        self.source.run().await?;
        self.running = true;
        Ok(())
    }

    /// Release the remote stream. Errors are logged, not returned.
    pub async fn close(mut self) {
        if let Err(e) = self.source.close().await {
            warn!("Error while closing session {}: {}", self.id, e);
        }
        info!("Session {} with {} closed", self.id, self.endpoint);
    }
}

/// Check, open and start a new session through `connector`.
///
/// A refused check whose payload carries an `error` field is reported as
/// [`ViewerError::Authentication`]; every other failure is a transport error.
/// Any session the caller already holds is left alone.
pub async fn establish(connector: Arc<dyn StreamConnector>, request: &ConnectRequest) -> Result<Session> {
    let endpoint = request.target.endpoint.clone();
    info!("Connecting to stream engine at {}", endpoint);

    let source = connector.connect(&request.target).await.map_err(as_transport)?;
    let status = source.check().await.map_err(as_transport)?;
    if !status.ok {
        warn!("Stream engine at {} refused the session", endpoint);
        return Err(classify_check_failure(&status.payload));
    }
    debug!("Stream engine check: {}", status.payload);

    let mut session = Session {
        id: Uuid::new_v4(),
        endpoint,
        camera: None,
        source,
        running: false,
    };

    let started = match session.open(&request.camera).await {
        Ok(()) => session.start().await,
        Err(e) => Err(e),
    };
    if let Err(e) = started {
        session.close().await;
        return Err(as_transport(e));
    }

    info!("Session {} streaming {} {}", session.id, request.camera.kind, request.camera.path);
    Ok(session)
}

/// Owns the stream-engine connection and its lifecycle
pub struct SessionController {
    connector: Arc<dyn StreamConnector>,
    session: Option<Session>,
}

impl SessionController {
    pub fn new(connector: Arc<dyn StreamConnector>) -> Self {
        Self {
            connector,
            session: None,
        }
    }

    /// Close any previous session, then check, open and start a new one
    pub async fn connect(&mut self, request: &ConnectRequest) -> Result<Uuid> {
        self.close().await;
        let session = establish(self.connector.clone(), request).await?;
        Ok(self.install(session).await)
    }

    pub fn connector(&self) -> Arc<dyn StreamConnector> {
        self.connector.clone()
    }

    /// Take the current session out, leaving the controller disconnected
    pub fn detach(&mut self) -> Option<Session> {
        self.session.take()
    }

    /// Make `session` current, closing whatever it replaces
    pub async fn install(&mut self, session: Session) -> Uuid {
        self.close().await;
        let id = session.id;
        self.session = Some(session);
        id
    }

    /// Open a camera on the established session
    pub async fn open(&mut self, camera: &CameraSource) -> Result<()> {
        self.session
            .as_mut()
            .ok_or(ViewerError::NotConnected)?
            .open(camera)
            .await
    }

    /// Start frame delivery for the opened camera
    pub async fn start(&mut self) -> Result<()> {
        self.session.as_mut().ok_or(ViewerError::NotConnected)?.start().await
    }

    /// Newest frame since the last call. Never blocks; `None` means no frame this tick.
    pub fn read_latest(&mut self) -> Option<Arc<Frame>> {
        let session = self.session.as_mut()?;
        if !session.running {
            return None;
        }
        session.source.read()
    }

    /// Tear down the current session, if any
    pub async fn close(&mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.as_ref().is_some_and(|session| session.running)
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(|session| session.id)
    }

    pub fn camera(&self) -> Option<&CameraSource> {
        self.session.as_ref().and_then(|session| session.camera.as_ref())
    }
}

/// Interpret the payload of a refused check
pub fn classify_check_failure(payload: &str) -> ViewerError {
    let error = serde_json::from_str::<serde_json::Value>(payload)
        .ok()
        .and_then(|value| value.get("error").cloned());

    match error {
        Some(serde_json::Value::String(message)) => ViewerError::Authentication(message),
        Some(other) => ViewerError::Authentication(other.to_string()),
        None => ViewerError::Transport(format!("stream engine check failed: {}", payload)),
    }
}

fn as_transport(err: ViewerError) -> ViewerError {
    match err {
        ViewerError::Authentication(_) | ViewerError::Transport(_) => err,
        other => ViewerError::Transport(other.to_string()),
    }
}
