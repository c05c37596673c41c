pub mod defs;

pub use defs::{
    CameraKind, CameraSource, CaptureFormat, ConnectRequest, CsiParams, Frame, StreamTarget,
    UnknownCameraKind, UsbParams,
};
