//! Hardware boundaries used by a device session.
//!
//! The session and the dispatcher only talk to these traits. The concrete
//! drivers live in [`crate::camera`], [`crate::dobot`] and [`crate::rover`];
//! tests substitute in-process fakes through [`DeviceProvider`].

use anyhow::Result;
use image::RgbImage;

use crate::camera::CameraSystem;
use crate::config::{ArmConfig, CameraConfig, RoverConfig};
use crate::dobot::Dobot;
use crate::intent::JointAngles;
use crate::rover::FirmataRover;
use crate::session::RobotPose;

pub trait FrameSource {
    fn read_frame(&mut self) -> Result<RgbImage>;

    fn release(&mut self) -> Result<()>;
}

/// Joint-space and Cartesian-space primitives exposed by the arm firmware.
pub trait ArmLink {
    fn pose(&mut self) -> Result<RobotPose>;

    /// Cartesian move. With `wait` the call returns once the arm has executed it.
    fn move_to(&mut self, x: f64, y: f64, z: f64, r: f64, wait: bool) -> Result<()>;

    /// Point-to-point move of all four joints in a single command.
    fn set_point_to_point(&mut self, joints: JointAngles, mode: u8, wait: bool) -> Result<()>;

    fn suck(&mut self, enable: bool) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveChannel {
    Left,
    Right,
}

/// Two PWM enable channels and four H-bridge direction lines.
pub trait DriveLink {
    fn set_duty(&mut self, channel: DriveChannel, duty: u8) -> Result<()>;

    /// Levels for IN1..IN4.
    fn set_direction(&mut self, levels: [bool; 4]) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

/// Opens devices for a session.
pub trait DeviceProvider {
    fn open_camera(&mut self, config: &CameraConfig) -> Result<Box<dyn FrameSource>>;

    fn open_arm(&mut self, port: &str, config: &ArmConfig) -> Result<Box<dyn ArmLink>>;

    fn open_drive(&mut self, port: &str, config: &RoverConfig) -> Result<Box<dyn DriveLink>>;
}

/// Opens the real camera, arm and rover board.
#[derive(Debug, Default)]
pub struct HardwareProvider;

impl DeviceProvider for HardwareProvider {
    fn open_camera(&mut self, config: &CameraConfig) -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(CameraSystem::open(config)?))
    }

    fn open_arm(&mut self, port: &str, config: &ArmConfig) -> Result<Box<dyn ArmLink>> {
        Ok(Box::new(Dobot::connect(port, config)?))
    }

    fn open_drive(&mut self, port: &str, config: &RoverConfig) -> Result<Box<dyn DriveLink>> {
        Ok(Box::new(FirmataRover::connect(port, config)?))
    }
}
