mod common;

use common::mock_devices::{config, Call, Rig};
use visionarm::parser::ParsedResponse;
use visionarm::perception::Perceiver;
use visionarm::{BridgeError, SessionState};

fn is_model_call(call: &Call) -> bool {
    matches!(call, Call::Describe { .. })
}

#[test]
fn test_capture_failure_never_reaches_model() {
    let rig = Rig::new();
    let config = config(false, false);
    let mut session = rig.open_session(&config);
    let perceiver = Perceiver::new(rig.model(), &config.vision);
    rig.set(|state| state.fail_frame = true);

    let result = perceiver.capture(&mut session);

    assert!(matches!(result, Err(BridgeError::CaptureFailed(_))));
    assert_eq!(rig.count(is_model_call), 0);
    assert_eq!(session.state(), SessionState::Active);
}

#[test]
fn test_large_frames_are_downsampled_before_upload() {
    let rig = Rig::new();
    let config = config(false, false);
    let mut session = rig.open_session(&config);
    let perceiver = Perceiver::new(rig.model(), &config.vision);
    rig.set(|state| state.frame_size = (1920, 1080));

    perceiver.capture(&mut session).unwrap();

    assert_eq!(rig.count(|c| *c == Call::Describe { width: 800, height: 450 }), 1);
}

#[test]
fn test_small_frames_are_sent_as_is() {
    let rig = Rig::new();
    let config = config(false, false);
    let mut session = rig.open_session(&config);
    let perceiver = Perceiver::new(rig.model(), &config.vision);

    perceiver.capture(&mut session).unwrap();

    assert_eq!(rig.count(|c| *c == Call::Describe { width: 640, height: 480 }), 1);
}

#[test]
fn test_model_failure_leaves_session_usable() {
    let rig = Rig::new();
    let config = config(false, false);
    let mut session = rig.open_session(&config);
    let perceiver = Perceiver::new(rig.model(), &config.vision);

    rig.set(|state| state.fail_model = true);
    assert!(matches!(
        perceiver.capture(&mut session),
        Err(BridgeError::VisionRequestFailed(_))
    ));

    rig.set(|state| state.fail_model = false);
    rig.reply_with_object("mug", 1.0, 2.0, 3.0);
    let response = perceiver.capture(&mut session).unwrap();
    assert_eq!(response.detections()[0].name, "mug");
}

#[test]
fn test_unstructured_reply_is_passed_through() {
    let rig = Rig::new();
    let config = config(false, false);
    let mut session = rig.open_session(&config);
    let perceiver = Perceiver::new(rig.model(), &config.vision);

    let response = perceiver.capture(&mut session).unwrap();

    assert_eq!(response, ParsedResponse::RawText("I see nothing of interest.".to_string()));
}
