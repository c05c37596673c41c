use clap::Parser;
use interfaces::{CameraKind, CaptureFormat, CsiParams, UnknownCameraKind};
use live_vision::config::{DEFAULT_CAMERA_PATH, DEFAULT_ENDPOINT, DEFAULT_PROMPT};
use live_vision::console::{parse_command, HELP};
use live_vision::{Cli, ConnectionForm, UiEvent, ViewerConfig};
use std::time::Duration;

fn form() -> ConnectionForm {
    ConnectionForm {
        endpoint: "http://engine.local:7005".to_string(),
        token: "secret".to_string(),
        camera_kind: CameraKind::Network,
        camera_path: "rtsp://cam/stream".to_string(),
    }
}

#[test]
fn test_plain_line_changes_prompt() {
    let mut form = form();
    assert_eq!(
        parse_command("  How many cars?  ", &mut form),
        Ok(Some(UiEvent::ChangePrompt("How many cars?".to_string())))
    );
    assert_eq!(parse_command("   ", &mut form), Ok(None));
}

#[test]
fn test_simple_commands() {
    let mut form = form();
    assert_eq!(parse_command("/load", &mut form), Ok(Some(UiEvent::LoadModel)));
    assert_eq!(parse_command("/exit", &mut form), Ok(Some(UiEvent::Exit)));
    assert_eq!(parse_command("/quit", &mut form), Ok(Some(UiEvent::Exit)));
    assert_eq!(parse_command("/help", &mut form), Err(HELP.to_string()));

    let err = parse_command("/frobnicate", &mut form).expect_err("unknown command");
    assert!(err.contains("/frobnicate"));
}

#[test]
fn test_source_edit_rearms_connect() {
    let mut form = form();
    assert_eq!(
        parse_command("/source /dev/video1", &mut form),
        Ok(Some(UiEvent::SourceEdited))
    );
    assert_eq!(form.camera_path, "/dev/video1");
    assert!(parse_command("/source", &mut form).is_err());
}

#[test]
fn test_connect_uses_form_fields() {
    let mut form = form();

    match parse_command("/connect", &mut form) {
        Ok(Some(UiEvent::Connect(request))) => {
            assert_eq!(request.target.endpoint, "http://engine.local:7005");
            assert_eq!(request.target.token, "secret");
            assert_eq!(request.camera.kind, CameraKind::Network);
            assert_eq!(request.camera.path, "rtsp://cam/stream");
        }
        other => panic!("unexpected {:?}", other),
    }

    match parse_command("/connect csi 0", &mut form) {
        Ok(Some(UiEvent::Connect(request))) => {
            assert_eq!(request.camera.kind, CameraKind::Csi);
            assert_eq!(request.camera.path, "0");
            assert_eq!(request.camera.format, CaptureFormat::Csi(CsiParams::default()));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(form.camera_kind, CameraKind::Csi);

    assert!(parse_command("/connect firewire", &mut form).is_err());
    assert_eq!(form.camera_kind, CameraKind::Csi);
}

#[test]
fn test_camera_kind_parsing() {
    assert_eq!("CSI".parse::<CameraKind>(), Ok(CameraKind::Csi));
    assert_eq!("usb".parse::<CameraKind>(), Ok(CameraKind::Usb));
    assert_eq!("RTSP/HTTP".parse::<CameraKind>(), Ok(CameraKind::Network));
    assert_eq!("http".parse::<CameraKind>(), Ok(CameraKind::Network));
    assert_eq!(
        "firewire".parse::<CameraKind>(),
        Err(UnknownCameraKind("firewire".to_string()))
    );
    assert_eq!(CameraKind::Network.to_string(), "RTSP/HTTP");
}

#[test]
fn test_cli_defaults() {
    let cli = Cli::try_parse_from(["live-vision", "--token", "t"]).expect("defaults parse");
    let config = ViewerConfig::from(cli);

    assert_eq!(config.prompt, DEFAULT_PROMPT);
    assert_eq!(config.form.camera_kind, CameraKind::Network);
    assert_eq!(config.form.token, "t");
    assert_eq!(config.worker.cooldown, Duration::from_secs(3));
    assert_eq!(config.worker.model, config.model.model);
    assert!(!config.connect_on_start);
    assert!(!config.load_on_start);

    let defaults = ViewerConfig::default();
    assert_eq!(defaults.form.endpoint, DEFAULT_ENDPOINT);
    assert_eq!(defaults.form.camera_path, DEFAULT_CAMERA_PATH);
}

#[test]
fn test_cli_overrides() {
    let cli = Cli::try_parse_from([
        "live-vision",
        "--endpoint",
        "http://10.0.0.5:7005",
        "--camera-type",
        "usb",
        "--camera",
        "/dev/video0",
        "--model",
        "llava:13b",
        "--cooldown-secs",
        "0.5",
        "--tick-ms",
        "0",
        "--connect",
        "--load",
        "--synthetic",
        "--mock-model",
    ])
    .expect("overrides parse");
    let config = ViewerConfig::from(cli);

    assert_eq!(config.form.endpoint, "http://10.0.0.5:7005");
    assert_eq!(config.form.camera_kind, CameraKind::Usb);
    assert_eq!(config.form.camera_path, "/dev/video0");
    assert_eq!(config.model.model, "llava:13b");
    assert_eq!(config.worker.model, "llava:13b");
    assert_eq!(config.worker.cooldown, Duration::from_millis(500));
    assert_eq!(config.tick, Duration::from_millis(1));
    assert!(config.connect_on_start && config.load_on_start);
    assert!(config.synthetic && config.mock_model);

    assert!(Cli::try_parse_from(["live-vision", "--camera-type", "firewire"]).is_err());
}

#[test]
fn test_cli_rejects_unusable_cooldown() {
    for bad in ["inf", "-inf", "NaN", "1e30", "-1", "soon"] {
        let parsed = Cli::try_parse_from(["live-vision", "--cooldown-secs", bad]);
        assert!(parsed.is_err(), "--cooldown-secs {} should be rejected", bad);
    }

    let cli = Cli::try_parse_from(["live-vision", "--cooldown-secs", "0"]).expect("zero is allowed");
    assert_eq!(ViewerConfig::from(cli).worker.cooldown, Duration::ZERO);
}
