mod common;

use common::mock_devices::{config, Call, Rig};
use visionarm::devices::DriveChannel;
use visionarm::{BridgeError, DeviceSession, SessionState};

#[test]
fn test_vision_only_session_releases_camera_once() {
    let rig = Rig::new();
    {
        let session = rig.open_session(&config(false, false));
        assert_eq!(session.state(), SessionState::Active);
        assert!(!session.has_arm());
        assert!(!session.has_drive());
    }

    assert_eq!(rig.count(|c| *c == Call::ReleaseCamera), 1);
    assert_eq!(rig.count(|c| *c == Call::CloseArm), 0);
    assert_eq!(rig.count(|c| *c == Call::Pose), 0);
}

#[test]
fn test_full_session_reads_pose_and_releases_everything() {
    let rig = Rig::new();
    let mut session = rig.open_session(&config(true, true));
    assert_eq!(rig.calls(), vec![Call::Pose]);

    session.close();
    session.close();
    drop(session);

    assert_eq!(
        rig.calls(),
        vec![
            Call::Pose,
            Call::ReleaseCamera,
            Call::SetDuty(DriveChannel::Left, 0),
            Call::SetDuty(DriveChannel::Right, 0),
            Call::CloseDrive,
            Call::CloseArm,
        ]
    );
}

#[test]
fn test_camera_failure_aborts_before_other_devices() {
    let rig = Rig::new();
    rig.set(|state| state.fail_camera_open = true);

    let result = DeviceSession::open(&config(true, true), &mut rig.provider());
    assert!(matches!(result, Err(BridgeError::DeviceUnavailable { .. })));
    assert!(rig.calls().is_empty());
}

#[test]
fn test_failed_arm_open_releases_camera() {
    let rig = Rig::new();
    rig.set(|state| state.fail_arm_open = true);

    match DeviceSession::open(&config(true, false), &mut rig.provider()) {
        Err(BridgeError::DeviceUnavailable { device, reason }) => {
            assert!(device.contains("/dev/ttyMOCK0"), "{}", device);
            assert!(reason.contains("could not open"), "{}", reason);
        }
        Err(other) => panic!("unexpected error {:?}", other),
        Ok(_) => panic!("session should not open"),
    }
    assert_eq!(rig.calls(), vec![Call::ReleaseCamera]);
}

#[test]
fn test_unreadable_initial_pose_is_a_startup_failure() {
    let rig = Rig::new();
    rig.set(|state| state.fail_pose = true);

    match DeviceSession::open(&config(true, true), &mut rig.provider()) {
        Err(BridgeError::DeviceUnavailable { device, reason }) => {
            assert!(device.contains("/dev/ttyMOCK0"), "{}", device);
            assert!(reason.contains("pose read timed out"), "{}", reason);
        }
        Err(other) => panic!("unexpected error {:?}", other),
        Ok(_) => panic!("session should not open"),
    }
    assert_eq!(rig.calls(), vec![Call::Pose, Call::ReleaseCamera, Call::CloseArm]);
}

#[test]
fn test_closed_session_rejects_operations_without_device_calls() {
    let rig = Rig::new();
    let mut session = rig.open_session(&config(true, true));
    session.close();
    rig.clear_calls();

    assert_eq!(session.state(), SessionState::Closed);
    assert!(matches!(
        session.camera(),
        Err(BridgeError::SessionNotActive(SessionState::Closed))
    ));
    assert!(matches!(session.arm(), Err(BridgeError::SessionNotActive(_))));
    assert!(matches!(session.drive(), Err(BridgeError::SessionNotActive(_))));
    assert!(matches!(session.pose(), Err(BridgeError::SessionNotActive(_))));
    assert!(rig.calls().is_empty());
}

#[test]
fn test_pose_cache_is_reused_until_invalidated() {
    let rig = Rig::new();
    let mut session = rig.open_session(&config(true, false));
    rig.clear_calls();

    let pose = session.pose().unwrap();
    assert_eq!(pose.x, 200.0);
    assert!(rig.calls().is_empty(), "cached pose must not hit the arm");

    session.invalidate_pose();
    session.pose().unwrap();
    assert_eq!(rig.calls(), vec![Call::Pose]);

    session.refresh_pose().unwrap();
    assert_eq!(rig.count(|c| *c == Call::Pose), 2);
}

#[test]
fn test_missing_devices_are_reported_as_unavailable() {
    let rig = Rig::new();
    let mut session = rig.open_session(&config(false, false));

    assert!(matches!(session.arm(), Err(BridgeError::DeviceUnavailable { .. })));
    assert!(matches!(session.drive(), Err(BridgeError::DeviceUnavailable { .. })));
    assert!(session.camera().is_ok());
}
