//! In-process camera, arm, rover and vision model.
//!
//! Every device call is appended to one shared log so tests can assert on
//! ordering across devices.

use anyhow::{anyhow, bail, Result};
use base64::{engine::general_purpose, Engine as _};
use image::RgbImage;
use parking_lot::Mutex;
use std::sync::Arc;

use visionarm::config::{ArmConfig, CameraConfig, RoverConfig, VisionArmConfig};
use visionarm::devices::{ArmLink, DeviceProvider, DriveChannel, DriveLink, FrameSource};
use visionarm::intent::JointAngles;
use visionarm::session::RobotPose;
use visionarm::vision_model::{VisionModel, VisionRequest};
use visionarm::{CommandDispatcher, DeviceSession};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ReadFrame,
    ReleaseCamera,
    Pose,
    MoveTo { x: f64, y: f64, z: f64, r: f64, wait: bool },
    PointToPoint { joints: JointAngles, mode: u8, wait: bool },
    Suck(bool),
    CloseArm,
    SetDuty(DriveChannel, u8),
    SetDirection([bool; 4]),
    CloseDrive,
    Describe { width: u32, height: u32 },
}

#[derive(Debug)]
pub struct RigState {
    pub calls: Vec<Call>,
    pub pose: RobotPose,
    pub frame_size: (u32, u32),
    pub fail_camera_open: bool,
    pub fail_arm_open: bool,
    pub fail_frame: bool,
    pub fail_motion: bool,
    pub fail_direction: bool,
    pub fail_model: bool,
    pub fail_pose: bool,
    pub model_reply: String,
}

impl Default for RigState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            pose: RobotPose {
                x: 200.0,
                y: 0.0,
                z: 50.0,
                r: 0.0,
                base: 10.0,
                shoulder: 20.0,
                elbow: 30.0,
                end_effector: 40.0,
            },
            frame_size: (640, 480),
            fail_camera_open: false,
            fail_arm_open: false,
            fail_frame: false,
            fail_motion: false,
            fail_direction: false,
            fail_model: false,
            fail_pose: false,
            model_reply: "I see nothing of interest.".to_string(),
        }
    }
}

/// Shared handle to the fake hardware.
#[derive(Clone, Default)]
pub struct Rig(Arc<Mutex<RigState>>);

impl Rig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, update: impl FnOnce(&mut RigState)) {
        update(&mut self.0.lock());
    }

    pub fn reply_with_object(&self, name: &str, x: f64, y: f64, z: f64) {
        let reply = format!(
            "Here is what I see:\n```json\n{{\"object\": {{\"name\": \"{}\", \"position\": {{\"x\": {}, \"y\": {}, \"z\": {}}}}}}}\n```\n",
            name, x, y, z
        );
        self.set(|state| state.model_reply = reply);
    }

    fn record(&self, call: Call) {
        self.0.lock().calls.push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.0.lock().calls.clear();
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.0.lock().calls.iter().filter(|call| matches(call)).count()
    }

    pub fn provider(&self) -> MockProvider {
        MockProvider { rig: self.clone() }
    }

    pub fn model(&self) -> Box<dyn VisionModel> {
        Box::new(MockModel { rig: self.clone() })
    }

    pub fn open_session(&self, config: &VisionArmConfig) -> DeviceSession {
        DeviceSession::open(config, &mut self.provider()).expect("session opens")
    }

    pub fn dispatcher(&self, config: &VisionArmConfig) -> CommandDispatcher {
        CommandDispatcher::from_config(self.model(), config)
    }
}

/// Configuration with the arm and rover ports set or left empty.
pub fn config(with_arm: bool, with_rover: bool) -> VisionArmConfig {
    let mut config = VisionArmConfig::default();
    if with_arm {
        config.arm.port = Some("/dev/ttyMOCK0".to_string());
    }
    if with_rover {
        config.rover.port = Some("/dev/ttyMOCK1".to_string());
    }
    config
}

pub struct MockProvider {
    rig: Rig,
}

impl DeviceProvider for MockProvider {
    fn open_camera(&mut self, _config: &CameraConfig) -> Result<Box<dyn FrameSource>> {
        if self.rig.0.lock().fail_camera_open {
            bail!("no camera at index 0");
        }
        Ok(Box::new(MockCamera { rig: self.rig.clone() }))
    }

    fn open_arm(&mut self, port: &str, _config: &ArmConfig) -> Result<Box<dyn ArmLink>> {
        if self.rig.0.lock().fail_arm_open {
            bail!("could not open {}", port);
        }
        Ok(Box::new(MockArm { rig: self.rig.clone() }))
    }

    fn open_drive(&mut self, _port: &str, _config: &RoverConfig) -> Result<Box<dyn DriveLink>> {
        Ok(Box::new(MockDrive { rig: self.rig.clone() }))
    }
}

struct MockCamera {
    rig: Rig,
}

impl FrameSource for MockCamera {
    fn read_frame(&mut self) -> Result<RgbImage> {
        self.rig.record(Call::ReadFrame);
        let state = self.rig.0.lock();
        if state.fail_frame {
            bail!("frame grab timed out");
        }
        let (width, height) = state.frame_size;
        Ok(RgbImage::new(width, height))
    }

    fn release(&mut self) -> Result<()> {
        self.rig.record(Call::ReleaseCamera);
        Ok(())
    }
}

struct MockArm {
    rig: Rig,
}

impl MockArm {
    fn motion(&self, call: Call) -> Result<()> {
        self.rig.record(call);
        if self.rig.0.lock().fail_motion {
            bail!("no reply from arm");
        }
        Ok(())
    }
}

impl ArmLink for MockArm {
    fn pose(&mut self) -> Result<RobotPose> {
        self.rig.record(Call::Pose);
        let state = self.rig.0.lock();
        if state.fail_pose {
            bail!("pose read timed out");
        }
        Ok(state.pose)
    }

    fn move_to(&mut self, x: f64, y: f64, z: f64, r: f64, wait: bool) -> Result<()> {
        self.motion(Call::MoveTo { x, y, z, r, wait })?;
        let mut state = self.rig.0.lock();
        state.pose.x = x;
        state.pose.y = y;
        state.pose.z = z;
        Ok(())
    }

    fn set_point_to_point(&mut self, joints: JointAngles, mode: u8, wait: bool) -> Result<()> {
        self.motion(Call::PointToPoint { joints, mode, wait })?;
        let mut state = self.rig.0.lock();
        state.pose.base = joints.base;
        state.pose.shoulder = joints.shoulder;
        state.pose.elbow = joints.elbow;
        state.pose.end_effector = joints.end_effector;
        Ok(())
    }

    fn suck(&mut self, enable: bool) -> Result<()> {
        self.rig.record(Call::Suck(enable));
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.rig.record(Call::CloseArm);
        Ok(())
    }
}

struct MockDrive {
    rig: Rig,
}

impl DriveLink for MockDrive {
    fn set_duty(&mut self, channel: DriveChannel, duty: u8) -> Result<()> {
        self.rig.record(Call::SetDuty(channel, duty));
        Ok(())
    }

    fn set_direction(&mut self, levels: [bool; 4]) -> Result<()> {
        self.rig.record(Call::SetDirection(levels));
        if self.rig.0.lock().fail_direction {
            bail!("board stopped responding");
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.rig.record(Call::CloseDrive);
        Ok(())
    }
}

struct MockModel {
    rig: Rig,
}

impl VisionModel for MockModel {
    fn describe(&self, request: &VisionRequest<'_>) -> Result<String> {
        let bytes = general_purpose::STANDARD.decode(request.jpeg_base64)?;
        let image = image::load_from_memory(&bytes)?;
        self.rig.record(Call::Describe {
            width: image.width(),
            height: image.height(),
        });
        let state = self.rig.0.lock();
        if state.fail_model {
            return Err(anyhow!("503 Service Unavailable"));
        }
        Ok(state.model_reply.clone())
    }
}
