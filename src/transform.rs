//! Camera-to-robot coordinate conversion.
//!
//! Detections are reported in millimetres on axes aligned with the arm's base
//! frame and are treated as offsets from the current tool position. No
//! rotation or scaling is applied: the two frames are assumed axis-aligned and
//! unit-compatible. This is a working assumption, not a calibration.

use serde::{Deserialize, Serialize};

use crate::parser::Detection;
use crate::session::RobotPose;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RobotCoordinates {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

pub fn to_robot_frame(detection: &Detection, pose: &RobotPose) -> RobotCoordinates {
    RobotCoordinates {
        x: detection.position.x + pose.x,
        y: detection.position.y + pose.y,
        z: detection.position.z + pose.z,
    }
}

/// Finds `name` among `detections` and converts it. `None` when absent.
pub fn locate(detections: &[Detection], name: &str, pose: &RobotPose) -> Option<RobotCoordinates> {
    let wanted = normalize_name(name);
    detections
        .iter()
        .find(|d| normalize_name(&d.name) == wanted)
        .map(|d| to_robot_frame(d, pose))
}

/// "Red Cube", "red-cube" and "red_cube" all name the same object.
pub fn normalize_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Position;

    fn pose(x: f64, y: f64, z: f64) -> RobotPose {
        RobotPose {
            x,
            y,
            z,
            ..RobotPose::default()
        }
    }

    fn detection(name: &str, x: f64, y: f64, z: f64) -> Detection {
        Detection {
            name: name.to_string(),
            position: Position { x, y, z },
        }
    }

    #[test]
    fn composition_is_additive() {
        let cases = [
            (detection("a", 0.0, 0.0, 0.0), pose(200.0, 0.0, 50.0)),
            (detection("b", 12.5, -40.0, 3.0), pose(180.2, 10.1, -20.0)),
            (detection("c", -120.0, 75.5, -9.25), pose(0.0, 0.0, 0.0)),
        ];
        for (d, p) in cases {
            let c = to_robot_frame(&d, &p);
            assert_eq!(c.x, d.position.x + p.x);
            assert_eq!(c.y, d.position.y + p.y);
            assert_eq!(c.z, d.position.z + p.z);
        }
    }

    #[test]
    fn joints_and_rotation_do_not_affect_result() {
        let d = detection("cube", 10.0, 20.0, 30.0);
        let mut p = pose(1.0, 2.0, 3.0);
        let before = to_robot_frame(&d, &p);
        p.r = 45.0;
        p.base = -30.0;
        p.elbow = 60.0;
        assert_eq!(to_robot_frame(&d, &p), before);
    }

    #[test]
    fn locate_matches_normalized_names() {
        let detections = vec![detection("green cube", 1.0, 1.0, 1.0), detection("Red_Cube", 5.0, 6.0, 7.0)];
        let p = pose(100.0, 0.0, 0.0);

        let found = locate(&detections, "red cube", &p).unwrap();
        assert_eq!(found, RobotCoordinates { x: 105.0, y: 6.0, z: 7.0 });
        assert!(locate(&detections, "green-cube", &p).is_some());
        assert!(locate(&detections, "blue_cube", &p).is_none());
        assert!(locate(&[], "red_cube", &p).is_none());
    }
}
