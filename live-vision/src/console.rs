use crate::types::{CameraKind, CameraSource, ConnectRequest, Frame, StreamTarget};
use crate::ui::{UiEvent, UiSurface};
use async_trait::async_trait;
use std::io::Write;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, warn};

const FRAME_STATUS_INTERVAL: Duration = Duration::from_secs(5);

pub const HELP: &str = "\
Commands:
  /load                     start the model worker
  /connect [type] [source]  connect (type: CSI, USB, RTSP/HTTP)
  /source <path>            change the camera source
  /help                     show this help
  /exit                     quit
Any other line replaces the prompt.";

/// Connection fields a graphical surface would keep in its input boxes
#[derive(Debug, Clone)]
pub struct ConnectionForm {
    pub endpoint: String,
    pub token: String,
    pub camera_kind: CameraKind,
    pub camera_path: String,
}

impl ConnectionForm {
    pub fn request(&self) -> ConnectRequest {
        ConnectRequest {
            target: StreamTarget {
                endpoint: self.endpoint.clone(),
                token: self.token.clone(),
            },
            camera: CameraSource::new(self.camera_kind, self.camera_path.clone()),
        }
    }
}

/// Turns console input into UI events, updating `form` for connection commands.
/// `Err` carries text to show the user instead of an event.
pub fn parse_command(line: &str, form: &mut ConnectionForm) -> Result<Option<UiEvent>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if !line.starts_with('/') {
        return Ok(Some(UiEvent::ChangePrompt(line.to_string())));
    }

    let mut parts = line.splitn(3, char::is_whitespace);
    let command = parts.next().unwrap_or_default();
    let first = parts.next().map(str::trim).filter(|s| !s.is_empty());
    let rest = parts.next().map(str::trim).filter(|s| !s.is_empty());

    match command {
        "/load" => Ok(Some(UiEvent::LoadModel)),
        "/exit" | "/quit" => Ok(Some(UiEvent::Exit)),
        "/help" => Err(HELP.to_string()),
        "/source" => match first {
            Some(path) => {
                form.camera_path = match rest {
                    Some(more) => format!("{} {}", path, more),
                    None => path.to_string(),
                };
                Ok(Some(UiEvent::SourceEdited))
            }
            None => Err("usage: /source <path>".to_string()),
        },
        "/connect" => {
            if let Some(kind) = first {
                form.camera_kind = kind.parse::<CameraKind>().map_err(|e| e.to_string())?;
            }
            if let Some(path) = rest {
                form.camera_path = path.to_string();
            }
            Ok(Some(UiEvent::Connect(form.request())))
        }
        other => Err(format!("unknown command {}, try /help", other)),
    }
}

/// Line-oriented terminal surface: commands on stdin, answers on stdout
pub struct ConsoleSurface {
    events: mpsc::UnboundedReceiver<UiEvent>,
    last_frame_status: Option<Instant>,
    frames_seen: u64,
}

impl ConsoleSurface {
    /// Start reading stdin. `initial` events are delivered before any typed command.
    pub fn spawn(form: ConnectionForm, initial: Vec<UiEvent>) -> Self {
        let (sender, events) = mpsc::unbounded_channel();
        for event in initial {
            let _ = sender.send(event);
        }

        let ctrl_c = sender.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = ctrl_c.send(UiEvent::Exit);
            }
        });

        std::thread::spawn(move || read_commands(form, sender));

        Self {
            events,
            last_frame_status: None,
            frames_seen: 0,
        }
    }
}

// Blocking stdin reads cannot be cancelled, so they run on a detached thread
// that does not hold up runtime shutdown.
fn read_commands(mut form: ConnectionForm, sender: mpsc::UnboundedSender<UiEvent>) {
    for line in std::io::stdin().lines() {
        match line {
            Ok(line) => match parse_command(&line, &mut form) {
                Ok(Some(event)) => {
                    if sender.send(event).is_err() {
                        return;
                    }
                }
                Ok(None) => {}
                Err(message) => eprintln!("{}", message),
            },
            Err(e) => {
                warn!("Failed to read stdin: {}", e);
                break;
            }
        }
    }
    debug!("stdin closed");
    let _ = sender.send(UiEvent::Exit);
}

#[async_trait]
impl UiSurface for ConsoleSurface {
    async fn poll_event(&mut self, timeout: Duration) -> Option<UiEvent> {
        tokio::time::timeout(timeout, self.events.recv()).await.ok().flatten()
    }

    fn show_notice(&mut self, message: &str) {
        eprintln!("!! {}", message);
    }

    fn clear_output(&mut self) {
        println!("{}", "-".repeat(20));
    }

    fn append_output(&mut self, text: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{}", text.trim_end());
        let _ = writeln!(stdout);
        let _ = stdout.flush();
    }

    fn show_frame(&mut self, frame: &Frame) {
        self.frames_seen += 1;
        let due = self
            .last_frame_status
            .map_or(true, |at| at.elapsed() >= FRAME_STATUS_INTERVAL);
        if due {
            self.last_frame_status = Some(Instant::now());
            eprintln!(
                "[frame {}x{} | {} frames received]",
                frame.width(),
                frame.height(),
                self.frames_seen
            );
        }
    }
}
