//! Scoped ownership of the camera, the arm and the rover.
//!
//! A session is only handed out once it is `Active`. Dropping it, on any
//! path, releases every device that was acquired.

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::VisionArmConfig;
use crate::devices::{ArmLink, DeviceProvider, DriveChannel, DriveLink, FrameSource};
use crate::error::BridgeError;
use crate::intent::JointAngles;

/// Pose reported by the arm: tool position and rotation, then the four joints.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RobotPose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub r: f64,
    pub base: f64,
    pub shoulder: f64,
    pub elbow: f64,
    pub end_effector: f64,
}

impl RobotPose {
    pub fn joints(&self) -> JointAngles {
        JointAngles {
            base: self.base,
            shoulder: self.shoulder,
            elbow: self.elbow,
            end_effector: self.end_effector,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    CameraReady,
    DeviceReady,
    Active,
    Closed,
}

pub struct DeviceSession {
    state: SessionState,
    camera: Option<Box<dyn FrameSource>>,
    arm: Option<Box<dyn ArmLink>>,
    drive: Option<Box<dyn DriveLink>>,
    pose: Option<RobotPose>,
}

impl DeviceSession {
    /// Acquires the camera, then the arm and the rover when their ports are set.
    pub fn open(config: &VisionArmConfig, provider: &mut dyn DeviceProvider) -> Result<Self, BridgeError> {
        // Built empty first so that Drop releases whatever a failing step leaves behind.
        let mut session = Self {
            state: SessionState::Uninitialized,
            camera: None,
            arm: None,
            drive: None,
            pose: None,
        };

        let camera = provider
            .open_camera(&config.camera)
            .map_err(|e| BridgeError::unavailable(format!("camera {}", config.camera.index), format!("{:#}", e)))?;
        session.camera = Some(camera);
        session.state = SessionState::CameraReady;

        if let Some(port) = config.arm.port.as_deref() {
            let arm = provider
                .open_arm(port, &config.arm)
                .map_err(|e| BridgeError::unavailable(format!("robot arm on {}", port), format!("{:#}", e)))?;
            session.arm = Some(arm);
            session
                .refresh_arm_pose()
                .map_err(|e| BridgeError::unavailable(format!("robot arm on {}", port), e))?;
            session.state = SessionState::DeviceReady;
        } else {
            info!("No arm port configured, running vision-only");
        }

        if let Some(port) = config.rover.port.as_deref() {
            let drive = provider
                .open_drive(port, &config.rover)
                .map_err(|e| BridgeError::unavailable(format!("rover on {}", port), format!("{:#}", e)))?;
            session.drive = Some(drive);
        }

        session.state = SessionState::Active;
        info!("Device session active");
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn has_arm(&self) -> bool {
        self.arm.is_some()
    }

    pub fn has_drive(&self) -> bool {
        self.drive.is_some()
    }

    fn ensure_active(&self) -> Result<(), BridgeError> {
        match self.state {
            SessionState::Active => Ok(()),
            other => Err(BridgeError::SessionNotActive(other)),
        }
    }

    pub fn camera(&mut self) -> Result<&mut (dyn FrameSource + 'static), BridgeError> {
        self.ensure_active()?;
        self.camera
            .as_deref_mut()
            .ok_or_else(|| BridgeError::unavailable("camera", "not open"))
    }

    pub fn arm(&mut self) -> Result<&mut (dyn ArmLink + 'static), BridgeError> {
        self.ensure_active()?;
        self.arm
            .as_deref_mut()
            .ok_or_else(|| BridgeError::unavailable("robot arm", "no arm port configured"))
    }

    pub fn drive(&mut self) -> Result<&mut (dyn DriveLink + 'static), BridgeError> {
        self.ensure_active()?;
        self.drive
            .as_deref_mut()
            .ok_or_else(|| BridgeError::unavailable("rover", "no rover port configured"))
    }

    /// Cached pose if it is trusted, otherwise a fresh read.
    pub fn pose(&mut self) -> Result<RobotPose, BridgeError> {
        self.ensure_active()?;
        match self.pose {
            Some(pose) => Ok(pose),
            None => self.refresh_arm_pose(),
        }
    }

    /// Re-reads the pose from the arm, the only source of truth.
    pub fn refresh_pose(&mut self) -> Result<RobotPose, BridgeError> {
        self.ensure_active()?;
        self.refresh_arm_pose()
    }

    /// Forces a re-read before the next arm command.
    pub fn invalidate_pose(&mut self) {
        if self.pose.take().is_some() {
            warn!("Pose cache invalidated");
        }
    }

    fn refresh_arm_pose(&mut self) -> Result<RobotPose, BridgeError> {
        self.pose = None;
        let arm = self
            .arm
            .as_deref_mut()
            .ok_or_else(|| BridgeError::unavailable("robot arm", "no arm port configured"))?;
        let pose = arm.pose().map_err(BridgeError::device_fault)?;
        info!("Robot pose: {:?}", pose);
        self.pose = Some(pose);
        Ok(pose)
    }

    /// Releases every open device. Each release is attempted even if another
    /// fails; failures are logged.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }

        if let Some(mut camera) = self.camera.take() {
            if let Err(e) = camera.release() {
                error!("Failed to release camera: {:#}", e);
            }
        }

        if let Some(mut drive) = self.drive.take() {
            for channel in [DriveChannel::Left, DriveChannel::Right] {
                if let Err(e) = drive.set_duty(channel, 0) {
                    error!("Failed to stop rover {:?} channel: {:#}", channel, e);
                }
            }
            if let Err(e) = drive.close() {
                error!("Failed to close rover connection: {:#}", e);
            }
        }

        if let Some(mut arm) = self.arm.take() {
            if let Err(e) = arm.close() {
                error!("Failed to close robot connection: {:#}", e);
            }
        }

        self.pose = None;
        self.state = SessionState::Closed;
        info!("Device session closed");
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.close();
    }
}
