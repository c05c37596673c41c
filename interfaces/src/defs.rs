use std::fmt;
use std::str::FromStr;

/// A decoded video frame: `height * width * channels` bytes, row-major.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
}

impl Frame {
    /// Wraps a raw pixel buffer. Returns `None` when the buffer length does not
    /// match the dimensions or the channel count is not 1, 3 or 4.
    pub fn from_raw(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Option<Self> {
        if !matches!(channels, 1 | 3 | 4) {
            return None;
        }
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return None;
        }
        Some(Self { width, height, channels, data })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

// Pixel buffers are large; keep debug output to the shape.
impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Capture backends offered by the stream engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CameraKind {
    /// On-board camera attached over the CSI bus.
    Csi,
    /// USB (V4L2) camera.
    Usb,
    /// RTSP / HTTP network stream.
    Network,
}

impl CameraKind {
    pub const ALL: [CameraKind; 3] = [CameraKind::Csi, CameraKind::Usb, CameraKind::Network];

    /// Label shown in the camera type selector.
    pub fn label(&self) -> &'static str {
        match self {
            CameraKind::Csi => "CSI",
            CameraKind::Usb => "USB",
            CameraKind::Network => "RTSP/HTTP",
        }
    }

    /// Capture parameters used when the user does not override them.
    pub fn default_format(&self) -> CaptureFormat {
        match self {
            CameraKind::Csi => CaptureFormat::Csi(CsiParams::default()),
            CameraKind::Usb => CaptureFormat::Usb(UsbParams::default()),
            CameraKind::Network => CaptureFormat::Network,
        }
    }
}

impl fmt::Display for CameraKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown camera type '{0}' (expected CSI, USB or RTSP/HTTP)")]
pub struct UnknownCameraKind(pub String);

impl FromStr for CameraKind {
    type Err = UnknownCameraKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csi" => Ok(CameraKind::Csi),
            "usb" => Ok(CameraKind::Usb),
            "rtsp/http" | "rtsp" | "http" | "ip" | "network" => Ok(CameraKind::Network),
            _ => Err(UnknownCameraKind(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsiParams {
    pub sensor_mode: u8,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CsiParams {
    fn default() -> Self {
        Self {
            sensor_mode: 4,
            width: 1920,
            height: 1080,
            fps: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbParams {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for UsbParams {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

/// Backend-specific capture parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFormat {
    Csi(CsiParams),
    Usb(UsbParams),
    Network,
}

/// What to open once a session is established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraSource {
    pub kind: CameraKind,
    /// Device path (`/dev/video0`, sensor id) or stream URL.
    pub path: String,
    pub format: CaptureFormat,
}

impl CameraSource {
    pub fn new(kind: CameraKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            format: kind.default_format(),
        }
    }

    pub fn with_format(mut self, format: CaptureFormat) -> Self {
        self.format = format;
        self
    }
}

/// Where the stream engine lives and how to authenticate against it.
#[derive(Clone, PartialEq, Eq)]
pub struct StreamTarget {
    pub endpoint: String,
    pub token: String,
}

impl fmt::Debug for StreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamTarget")
            .field("endpoint", &self.endpoint)
            .field("token", &"***")
            .finish()
    }
}

/// A user request to (re)connect: engine target plus camera to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub target: StreamTarget,
    pub camera: CameraSource,
}

// Object style note:
// The camera and model collaborators live in the live-vision crate as async
// traits. The types here are plain data shared between the UI surface and the
// session/inference side so either can be swapped without touching the other.
